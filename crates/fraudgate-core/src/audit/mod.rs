//! Append-only audit trail.
//!
//! One JSON line per pipeline decision. Records carry the caller's role and
//! key reference, never the credential itself.

pub mod event;
pub mod sink;

pub use event::{AuditEvent, AuditEventType, AuditRecord};
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink, DEFAULT_AUDIT_LOG_PATH};
