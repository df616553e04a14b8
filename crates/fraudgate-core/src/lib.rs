//! Fraudgate core: the admission and integrity layer in front of a fraud-scoring model.
//!
//! Every scoring call is authenticated against configured API keys, rate-limited per
//! caller identity, tagged with a correlation id, scored only against a model artifact
//! whose checksum matched its manifest, and recorded in an append-only audit trail.

#![deny(unsafe_code)]

pub mod artifact;
pub mod audit;
pub mod config;
pub mod correlation;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod rate_limit;
pub mod schema;
pub mod scoring;

pub use artifact::{ArtifactManifest, ArtifactRegistry, ModelHandle, ModelLoader};
pub use audit::{AuditEvent, AuditEventType, AuditRecord, AuditSink, FileAuditSink, MemoryAuditSink};
pub use config::GatewayConfig;
pub use correlation::{CorrelationId, REQUEST_ID_HEADER};
pub use error::{AdmissionError, ArtifactError, AuditError, AuthError};
pub use identity::{CallerIdentity, Credentials, IdentityResolver, Role};
pub use pipeline::{AdmissionPipeline, InboundCall, PipelineOutcome};
pub use rate_limit::{RateDecision, RateLimitConfig, RateLimiter, ANONYMOUS};
pub use schema::{Channel, FraudDecision, FraudRequest, FraudResponse};
pub use scoring::{validate_score, PlaceholderScorer, Scorer};
