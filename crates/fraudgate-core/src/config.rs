//! Gateway configuration

use crate::artifact::registry::DEFAULT_MANIFEST_PATH;
use crate::audit::DEFAULT_AUDIT_LOG_PATH;
use crate::identity::Credentials;
use crate::rate_limit::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything the admission pipeline needs to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Never serialized; always sourced from the environment or injected.
    #[serde(skip)]
    pub credentials: Credentials,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Manifest naming the active model artifact.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// JSON Lines audit log.
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: PathBuf,
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from(DEFAULT_MANIFEST_PATH)
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_AUDIT_LOG_PATH)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            rate_limit: RateLimitConfig::default(),
            manifest_path: default_manifest_path(),
            audit_log_path: default_audit_log_path(),
        }
    }
}

impl GatewayConfig {
    /// Defaults with credentials read from `API_KEY_ADMIN` / `API_KEY_SERVICE`.
    pub fn from_env() -> Self {
        Self {
            credentials: Credentials::from_env(),
            ..Self::default()
        }
    }
}
