//! Manifest-driven loading of the active model artifact.

use super::checksum::verify_file;
use crate::error::ArtifactError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};

/// Default manifest location, relative to the working directory.
pub const DEFAULT_MANIFEST_PATH: &str = "model_artifacts/manifest.json";

/// The `active_model` section of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactManifest {
    pub active_version: String,
    pub artifact_path: PathBuf,
    /// Lowercase hex SHA-256.
    pub expected_checksum: String,
}

impl ArtifactManifest {
    /// Parse a manifest document of shape
    /// `{ "active_model": { "version", "path", "sha256" } }`.
    pub fn parse(document: &str) -> Result<Self, ArtifactError> {
        let root: Value = serde_json::from_str(document)
            .map_err(|e| ArtifactError::ManifestInvalid(format!("not valid JSON: {}", e)))?;

        let active = root
            .get("active_model")
            .and_then(Value::as_object)
            .filter(|section| !section.is_empty())
            .ok_or_else(|| {
                ArtifactError::ManifestInvalid("missing 'active_model' section".to_string())
            })?;

        let field = |name: &str| -> String {
            match active.get(name) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            }
        };

        let version = field("version");
        let path = field("path");
        let sha256 = field("sha256").to_ascii_lowercase();

        if version.is_empty() || path.is_empty() || sha256.is_empty() {
            return Err(ArtifactError::ManifestInvalid(
                "active_model must include version, path, sha256".to_string(),
            ));
        }

        Ok(Self {
            active_version: version,
            artifact_path: PathBuf::from(path),
            expected_checksum: sha256,
        })
    }
}

/// Proof that an artifact matched its declared digest at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelHandle {
    version: String,
    artifact_path: PathBuf,
}

impl ModelHandle {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }
}

/// Source of verified model handles.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load and verify the currently active artifact.
    async fn load_active(&self) -> Result<ModelHandle, ArtifactError>;
}

/// Reads the manifest and re-hashes the artifact on every load; nothing is
/// cached, so a manifest or artifact change is seen by the next call.
#[derive(Debug, Clone)]
pub struct ArtifactRegistry {
    manifest_path: PathBuf,
}

impl ArtifactRegistry {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub async fn read_manifest(&self) -> Result<ArtifactManifest, ArtifactError> {
        let document = match tokio::fs::read_to_string(&self.manifest_path).await {
            Ok(document) => document,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ArtifactError::ManifestMissing {
                    path: self.manifest_path.clone(),
                })
            }
            Err(err) => return Err(ArtifactError::Io(err)),
        };
        ArtifactManifest::parse(&document)
    }
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_PATH)
    }
}

#[async_trait]
impl ModelLoader for ArtifactRegistry {
    async fn load_active(&self) -> Result<ModelHandle, ArtifactError> {
        let manifest = self.read_manifest().await?;

        match verify_file(&manifest.artifact_path, &manifest.expected_checksum).await {
            Ok(_) => {
                tracing::debug!(
                    version = %manifest.active_version,
                    path = %manifest.artifact_path.display(),
                    "model artifact verified"
                );
                Ok(ModelHandle {
                    version: manifest.active_version,
                    artifact_path: manifest.artifact_path,
                })
            }
            Err(err) => {
                tracing::error!(
                    version = %manifest.active_version,
                    path = %manifest.artifact_path.display(),
                    error = %err,
                    "model artifact rejected"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    fn write_fixture(content: &[u8]) -> (TempDir, ArtifactRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("model.bin");
        std::fs::write(&artifact, content).unwrap();
        let digest = hex::encode(Sha256::digest(content));
        let manifest = serde_json::json!({
            "active_model": {
                "version": "v1.2.0",
                "path": artifact.to_string_lossy(),
                "sha256": digest,
            }
        });
        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(&manifest_path, manifest.to_string()).unwrap();
        (dir, ArtifactRegistry::new(manifest_path))
    }

    #[tokio::test]
    async fn loads_verified_artifact() {
        let (dir, registry) = write_fixture(b"weights");
        let handle = registry.load_active().await.unwrap();
        assert_eq!(handle.version(), "v1.2.0");
        assert_eq!(handle.artifact_path(), dir.path().join("model.bin"));
    }

    #[tokio::test]
    async fn tampering_after_a_successful_load_is_detected() {
        let (dir, registry) = write_fixture(b"weights");
        registry.load_active().await.unwrap();

        std::fs::write(dir.path().join("model.bin"), b"weightz").unwrap();
        assert!(matches!(
            registry.load_active().await,
            Err(ArtifactError::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn missing_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ArtifactRegistry::new(dir.path().join("manifest.json"));
        assert!(matches!(
            registry.load_active().await,
            Err(ArtifactError::ManifestMissing { .. })
        ));
    }

    #[tokio::test]
    async fn missing_artifact_is_reported() {
        let (dir, registry) = write_fixture(b"weights");
        std::fs::remove_file(dir.path().join("model.bin")).unwrap();
        assert!(matches!(
            registry.load_active().await,
            Err(ArtifactError::ArtifactMissing { .. })
        ));
    }

    #[test]
    fn manifest_requires_active_model_section() {
        for doc in [
            "{}",
            r#"{"active_model": null}"#,
            r#"{"active_model": {}}"#,
            r#"{"active_model": "v1"}"#,
            "not json",
        ] {
            assert!(
                matches!(ArtifactManifest::parse(doc), Err(ArtifactError::ManifestInvalid(_))),
                "accepted {}",
                doc
            );
        }
    }

    #[test]
    fn manifest_rejects_blank_fields() {
        let doc = r#"{"active_model": {"version": " ", "path": "m.bin", "sha256": "ab"}}"#;
        assert!(matches!(
            ArtifactManifest::parse(doc),
            Err(ArtifactError::ManifestInvalid(_))
        ));
        let doc = r#"{"active_model": {"version": "v1", "path": "m.bin"}}"#;
        assert!(matches!(
            ArtifactManifest::parse(doc),
            Err(ArtifactError::ManifestInvalid(_))
        ));
    }

    #[test]
    fn manifest_normalizes_fields() {
        let doc = r#"{"active_model": {"version": " v2 ", "path": " m.bin ", "sha256": " ABCDEF "}}"#;
        let manifest = ArtifactManifest::parse(doc).unwrap();
        assert_eq!(manifest.active_version, "v2");
        assert_eq!(manifest.artifact_path, PathBuf::from("m.bin"));
        assert_eq!(manifest.expected_checksum, "abcdef");
    }
}
