//! Job execution engine.
//!
//! The gateway turns submissions into registry jobs, the dispatcher owns the
//! worker pool and execution slots, and the executor drives a single job
//! through inference and artifact storage.

pub mod dispatcher;
pub mod executor;
pub mod gateway;
pub mod progress;
