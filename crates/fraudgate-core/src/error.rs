use std::path::PathBuf;
use thiserror::Error;

/// Credential resolution failures.
///
/// All three variants are reported to the caller as the same generic
/// authorization failure; the distinction only reaches logs and the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing API key")]
    Unauthenticated,

    #[error("invalid API key")]
    Forbidden,

    #[error("API keys are not configured on the server")]
    Misconfigured,
}

impl AuthError {
    /// Stable label recorded in audit events.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "missing_credential",
            AuthError::Forbidden => "invalid_credential",
            AuthError::Misconfigured => "credentials_not_configured",
        }
    }
}

/// Model artifact integrity failures. Every variant is fatal to the load attempt.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("model manifest not found: {}", path.display())]
    ManifestMissing { path: PathBuf },

    #[error("model manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("model artifact not found: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("model artifact checksum mismatch: expected={expected} actual={actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("artifact IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtifactError {
    pub fn reason(&self) -> &'static str {
        match self {
            ArtifactError::ManifestMissing { .. } => "manifest_missing",
            ArtifactError::ManifestInvalid(_) => "manifest_invalid",
            ArtifactError::ArtifactMissing { .. } => "artifact_missing",
            ArtifactError::IntegrityMismatch { .. } => "integrity_mismatch",
            ArtifactError::Io(_) => "artifact_io",
        }
    }
}

/// Audit append failures. Never fatal to the caller's response.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Terminal outcome of a rejected pipeline call.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("scoring produced an invalid outcome: {0}")]
    InvalidOutcome(String),
}

impl AdmissionError {
    /// Whether the failure is attributable to the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AdmissionError::Auth(_)
                | AdmissionError::RateLimited { .. }
                | AdmissionError::InvalidPayload(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionError::Auth(_) => "auth",
            AdmissionError::RateLimited { .. } => "rate_limited",
            AdmissionError::InvalidPayload(_) => "invalid_payload",
            AdmissionError::Artifact(_) => "artifact",
            AdmissionError::InvalidOutcome(_) => "invalid_outcome",
        }
    }
}
