//! Audit event types

use crate::correlation::CorrelationId;
use crate::identity::CallerIdentity;
use crate::rate_limit::ANONYMOUS;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const RESERVED_FIELDS: [&str; 5] = [
    "timestamp",
    "event_type",
    "correlation_id",
    "caller_role",
    "caller_key_reference",
];

/// Kinds of decisions recorded by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    Prediction,
    AuthRejected,
    RateLimited,
    PayloadRejected,
    ArtifactRejected,
    OutcomeRejected,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Prediction => "prediction",
            AuditEventType::AuthRejected => "auth_rejected",
            AuditEventType::RateLimited => "rate_limited",
            AuditEventType::PayloadRejected => "payload_rejected",
            AuditEventType::ArtifactRejected => "artifact_rejected",
            AuditEventType::OutcomeRejected => "outcome_rejected",
        }
    }
}

/// A decision to be recorded, before it is timestamped by a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub correlation_id: String,
    pub caller_role: String,
    pub caller_key_reference: String,

    /// Outcome fields (decision, score, reason, ...).
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl AuditEvent {
    /// Event attributed to `caller`, or to the anonymous caller when
    /// authentication did not succeed.
    pub fn new(
        event_type: AuditEventType,
        correlation_id: &CorrelationId,
        caller: Option<&CallerIdentity>,
    ) -> Self {
        let (role, key_reference) = match caller {
            Some(identity) => (identity.role().as_str(), identity.key_reference()),
            None => (ANONYMOUS, ANONYMOUS),
        };
        Self {
            event_type: event_type.as_str().to_string(),
            correlation_id: correlation_id.to_string(),
            caller_role: role.to_string(),
            caller_key_reference: key_reference.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Attach an outcome field. A value that fails to serialize is dropped
    /// and reported.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(v) => {
                self.fields.insert(key, v);
            }
            Err(err) => tracing::warn!(
                event_type = %self.event_type,
                correlation_id = %self.correlation_id,
                field = %key,
                error = %err,
                "audit field dropped: value not serializable"
            ),
        }
        self
    }
}

/// A timestamped event as written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// ISO-8601 UTC with a trailing `Z`, microsecond precision.
    pub timestamp: String,

    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    /// Stamp a copy of `event`; the caller's event is left untouched.
    ///
    /// Outcome fields that would shadow a top-level field are discarded.
    pub fn stamp(event: &AuditEvent, at: DateTime<Utc>) -> Self {
        let mut event = event.clone();
        event
            .fields
            .retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Micros, true),
            event,
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
