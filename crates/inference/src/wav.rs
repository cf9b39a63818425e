//! WAV decoding and small waveform helpers.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use voxgate_core::audio::Waveform;

/// Read a WAV file into a mono `f32` waveform.
///
/// Integer samples of any width are normalized to `[-1, 1]`. Multi-channel
/// audio is mixed down by averaging the channels of each frame.
pub fn read_wav(path: impl AsRef<Path>) -> Result<Waveform, hound::Error> {
    let mut reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(Waveform::new(samples, spec.sample_rate))
}

/// Apply a linear fade over the first and last `fade_ms` of `samples`.
pub fn apply_edge_fade(samples: &mut [f32], fade_ms: f32, sample_rate: u32) {
    let fade = ((fade_ms / 1000.0) * sample_rate as f32) as usize;
    let fade = fade.min(samples.len() / 2);
    if fade == 0 {
        return;
    }

    let len = samples.len();
    for i in 0..fade {
        let gain = i as f32 / fade as f32;
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}
