//! In-memory audio produced by a synthesis backend.

/// Mono PCM samples in `[-1.0, 1.0]` at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length in seconds. Zero for a zero sample rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_count() {
        let wave = Waveform::new(vec![0.0; 48_000], 24_000);
        assert!((wave.duration_secs() - 2.0).abs() < f64::EPSILON);
        assert!(!wave.is_empty());
    }

    #[test]
    fn zero_rate_has_zero_duration() {
        assert_eq!(Waveform::new(vec![0.1], 0).duration_secs(), 0.0);
    }
}
