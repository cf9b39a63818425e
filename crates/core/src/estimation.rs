//! Advisory duration estimate for a synthesis job.
//!
//! Computed once at submission from the request shape. Clients use it to
//! pace their polling; nothing in the dispatcher depends on it.

use crate::synthesis::SynthesisRequest;

/// Seconds added per character of input text.
pub const SECS_PER_CHAR: f64 = 0.3;

/// Lower bound of every estimate, covering model load time.
pub const MIN_ESTIMATE_SECS: f64 = 30.0;

/// Estimate wall-clock seconds for a request: `max(0.3 * chars + steps, 30)`.
pub fn estimate_duration_secs(request: &SynthesisRequest) -> f64 {
    let chars = request.text.chars().count() as f64;
    (chars * SECS_PER_CHAR + request.steps as f64).max(MIN_ESTIMATE_SECS)
}
