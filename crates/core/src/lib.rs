//! Domain types and pure logic for the voxgate TTS job gateway.
//!
//! No I/O lives here: job state machine, request validation, estimation,
//! and artifact naming are shared by the store, inference, and api crates.

pub mod audio;
pub mod error;
pub mod estimation;
pub mod job;
pub mod naming;
pub mod synthesis;
pub mod types;
