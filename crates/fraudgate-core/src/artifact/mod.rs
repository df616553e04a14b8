//! Checksum-verified model artifacts.
//!
//! The manifest names the active artifact and its expected SHA-256 digest.
//! A [`ModelHandle`] only exists for an artifact whose content matched that
//! digest when it was loaded.

pub mod checksum;
pub mod registry;

pub use checksum::{digests_match, sha256_file, verify_file, CHUNK_SIZE};
pub use registry::{ArtifactManifest, ArtifactRegistry, ModelHandle, ModelLoader};
