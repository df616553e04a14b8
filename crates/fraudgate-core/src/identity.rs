//! API-key authentication and role derivation.
//!
//! A presented credential is compared against the two configured keys and
//! mapped to a [`CallerIdentity`]. The identity never carries the credential;
//! its `key_reference` is a fixed label derived from the role.

use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Environment variable holding the admin credential.
pub const ADMIN_KEY_ENV: &str = "API_KEY_ADMIN";
/// Environment variable holding the service credential.
pub const SERVICE_KEY_ENV: &str = "API_KEY_SERVICE";

/// Authorization tier of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Service,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Service => "service",
        }
    }

    /// Non-sensitive label used in audit records and as the rate-limit key.
    pub fn key_reference(&self) -> &'static str {
        match self {
            Role::Admin => "admin-key",
            Role::Service => "service-key",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an authenticated caller, scoped to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    role: Role,
    key_reference: &'static str,
}

impl CallerIdentity {
    fn for_role(role: Role) -> Self {
        Self {
            role,
            key_reference: role.key_reference(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn key_reference(&self) -> &str {
        self.key_reference
    }
}

/// The configured credentials. Empty values count as not configured.
#[derive(Clone, Default)]
pub struct Credentials {
    admin: Option<String>,
    service: Option<String>,
}

impl Credentials {
    pub fn new(admin: Option<&str>, service: Option<&str>) -> Self {
        Self {
            admin: normalize(admin),
            service: normalize(service),
        }
    }

    /// Read `API_KEY_ADMIN` and `API_KEY_SERVICE` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let admin = lookup(ADMIN_KEY_ENV);
        let service = lookup(SERVICE_KEY_ENV);
        Self::new(admin.as_deref(), service.as_deref())
    }

    /// True when neither role has a credential, i.e. every request fails closed.
    pub fn is_empty(&self) -> bool {
        self.admin.is_none() && self.service.is_none()
    }

    pub fn configured_roles(&self) -> Vec<Role> {
        let mut roles = Vec::new();
        if self.admin.is_some() {
            roles.push(Role::Admin);
        }
        if self.service.is_some() {
            roles.push(Role::Service);
        }
        roles
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "<redacted>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("admin", &redact(&self.admin))
            .field("service", &redact(&self.service))
            .finish()
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn key_matches(configured: Option<&str>, provided: &str) -> bool {
    match configured {
        Some(expected) => bool::from(expected.as_bytes().ct_eq(provided.as_bytes())),
        None => false,
    }
}

/// Maps a presented credential to a [`CallerIdentity`].
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    credentials: Credentials,
}

impl IdentityResolver {
    pub fn new(credentials: Credentials) -> Self {
        if credentials.is_empty() {
            tracing::warn!("no API keys configured; every request will be rejected");
        }
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Resolve the raw `X-API-Key` value.
    ///
    /// Missing or blank credentials fail with [`AuthError::Unauthenticated`].
    /// With nothing configured every credential fails with
    /// [`AuthError::Misconfigured`]; an unset key is never a wildcard.
    pub fn resolve(&self, presented: Option<&str>) -> Result<CallerIdentity, AuthError> {
        let provided = presented.map(str::trim).unwrap_or_default();
        if provided.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        if self.credentials.is_empty() {
            return Err(AuthError::Misconfigured);
        }

        if key_matches(self.credentials.admin.as_deref(), provided) {
            return Ok(CallerIdentity::for_role(Role::Admin));
        }
        if key_matches(self.credentials.service.as_deref(), provided) {
            return Ok(CallerIdentity::for_role(Role::Service));
        }

        Err(AuthError::Forbidden)
    }
}
