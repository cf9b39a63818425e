//! Synthetic backend producing a sine tone.
//!
//! Used for development without a model and throughout the test suites.
//! Latency and failures are configurable, and the backend records how many
//! calls ran at the same time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use voxgate_core::audio::Waveform;
use voxgate_core::synthesis::SynthesisRequest;

use crate::synthesizer::{
    InferenceError, ProgressReporter, Synthesizer, PHASE_GENERATING, PHASE_LOADING,
    PHASE_PREPARING,
};
use crate::wav;

pub const MOCK_SAMPLE_RATE: u32 = 16_000;

/// Seconds of audio generated per input character.
const SECS_PER_CHAR: f32 = 0.02;

const MIN_SECS: f32 = 0.1;

#[derive(Debug, Default)]
pub struct MockSynthesizer {
    delay: Duration,
    failure_marker: Option<String>,
    panic_marker: Option<String>,
    silent_marker: Option<String>,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail any request whose text contains `marker`.
    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.failure_marker = Some(marker.into());
        self
    }

    /// Panic on any request whose text contains `marker`.
    pub fn with_panic_marker(mut self, marker: impl Into<String>) -> Self {
        self.panic_marker = Some(marker.into());
        self
    }

    /// Return an empty waveform for any request whose text contains `marker`.
    pub fn with_silent_marker(mut self, marker: impl Into<String>) -> Self {
        self.silent_marker = Some(marker.into());
        self
    }

    /// Highest number of calls observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total number of calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn matches(marker: &Option<String>, text: &str) -> bool {
        marker.as_deref().is_some_and(|m| text.contains(m))
    }
}

/// Decrements the active-call counter even when the call panics.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Synthesizer for MockSynthesizer {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn synthesize(
        &self,
        request: &SynthesisRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<Waveform, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        progress.phase(PHASE_LOADING);
        progress.phase(PHASE_PREPARING);
        progress.phase(PHASE_GENERATING);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        if Self::matches(&self.panic_marker, &request.text) {
            panic!("mock synthesizer panicked on request");
        }
        if Self::matches(&self.failure_marker, &request.text) {
            return Err(InferenceError::Backend(
                "mock synthesizer rejected the request".into(),
            ));
        }
        if Self::matches(&self.silent_marker, &request.text) {
            return Ok(Waveform::new(Vec::new(), MOCK_SAMPLE_RATE));
        }

        Ok(tone(request))
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

/// Sine tone whose pitch follows the resolved seed and whose length
/// follows the text length.
fn tone(request: &SynthesisRequest) -> Waveform {
    let secs = (request.text.chars().count() as f32 * SECS_PER_CHAR).max(MIN_SECS);
    let len = (secs * MOCK_SAMPLE_RATE as f32) as usize;
    let freq = 220.0 + (request.resolve_seed() % 220) as f32;
    let step = std::f32::consts::TAU * freq / MOCK_SAMPLE_RATE as f32;

    let mut samples: Vec<f32> = (0..len).map(|i| (i as f32 * step).sin() * 0.3).collect();
    wav::apply_edge_fade(&mut samples, 10.0, MOCK_SAMPLE_RATE);
    Waveform::new(samples, MOCK_SAMPLE_RATE)
}
