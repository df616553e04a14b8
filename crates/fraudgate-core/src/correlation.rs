//! Request-scoped correlation identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Inbound header carrying an upstream correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identifier joining audit records, logs and the response for one call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh canonical UUID v4 id (36 characters).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Propagate the inbound hint when it is non-blank, otherwise generate.
    ///
    /// A propagated value is used as sent, minus surrounding whitespace; no
    /// format validation is applied.
    pub fn assign(inbound: Option<&str>) -> Self {
        match inbound.map(str::trim).filter(|v| !v.is_empty()) {
            Some(hint) => Self(hint.to_string()),
            None => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagates_inbound_hint_exactly() {
        assert_eq!(CorrelationId::assign(Some("abc-123")).as_str(), "abc-123");
        assert_eq!(CorrelationId::assign(Some("  abc-123 ")).as_str(), "abc-123");
    }

    #[test]
    fn generates_uuid_when_hint_missing_or_blank() {
        for hint in [None, Some(""), Some("   ")] {
            let id = CorrelationId::assign(hint);
            assert_eq!(id.as_str().len(), 36);
            assert!(Uuid::parse_str(id.as_str()).is_ok());
        }
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(CorrelationId::assign(None), CorrelationId::assign(None));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = CorrelationId::assign(Some("req-0001"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"req-0001\"");
        assert_eq!(id.to_string(), "req-0001");
        assert_eq!(id.into_inner(), "req-0001");
    }
}
