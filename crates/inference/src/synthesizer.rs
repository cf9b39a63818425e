//! The synthesis backend interface.

use std::io;

use voxgate_core::audio::Waveform;
use voxgate_core::error::CoreError;
use voxgate_core::synthesis::SynthesisRequest;

// ---------------------------------------------------------------------------
// Progress phases reported by backends
// ---------------------------------------------------------------------------

pub const PHASE_LOADING: (f64, &str) = (0.1, "Loading model");
pub const PHASE_PREPARING: (f64, &str) = (0.2, "Preparing generation parameters");
pub const PHASE_GENERATING: (f64, &str) = (0.3, "Generating audio");

/// Receives phase progress from a running synthesis.
///
/// Values outside `[0, 1]` are tolerated; receivers clamp.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: f64, message: &str);

    fn phase(&self, (progress, message): (f64, &str)) {
        self.report(progress, message);
    }
}

/// Reporter that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _progress: f64, _message: &str) {}
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Model is not ready: {0}")]
    NotReady(String),

    /// The backend reported a failure for this request.
    #[error("{0}")]
    Backend(String),

    /// The inference process misbehaved (crash, protocol violation).
    #[error("Inference process failed: {0}")]
    Process(String),

    #[error("Inference I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid audio output: {0}")]
    Audio(#[from] hound::Error),
}

impl From<InferenceError> for CoreError {
    fn from(err: InferenceError) -> Self {
        CoreError::Inference(err.to_string())
    }
}

/// A text-to-speech backend.
///
/// `synthesize` blocks for the whole generation and must be called from a
/// thread that may block.
pub trait Synthesizer: Send + Sync {
    /// Short backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Generate audio for `request`, reporting phase progress.
    fn synthesize(
        &self,
        request: &SynthesisRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<Waveform, InferenceError>;

    /// Whether the backend can serve requests right now.
    fn is_ready(&self) -> bool {
        true
    }

    /// Whether model weights are resident. Backends that load lazily
    /// report `false` until their first load completes.
    fn model_loaded(&self) -> bool {
        self.is_ready()
    }

    /// Whether concurrent calls with different adapters are safe.
    ///
    /// Backends that swap adapter weights in place return `false`, which
    /// limits execution to one job at a time.
    fn is_reentrant(&self) -> bool {
        false
    }
}
