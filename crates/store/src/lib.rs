//! In-process state owned by the gateway: the job registry and the
//! on-disk artifact store.

pub mod artifacts;
pub mod registry;

pub use artifacts::{ArtifactError, ArtifactStore};
pub use registry::{JobRegistry, RegistrySnapshot};
