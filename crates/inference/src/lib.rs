//! Speech synthesis backends and adapter discovery.
//!
//! Backends implement [`Synthesizer`]. They are synchronous and are expected
//! to be driven from a blocking thread by the caller.

pub mod adapters;
pub mod mock;
pub mod script;
pub mod synthesizer;
pub mod wav;

pub use adapters::AdapterCatalog;
pub use mock::MockSynthesizer;
pub use script::ScriptSynthesizer;
pub use synthesizer::{InferenceError, NoopProgress, ProgressReporter, Synthesizer};
