//! Admission pipeline.
//!
//! Every call moves through a fixed sequence:
//!
//! ```text
//! Received -> Authenticated -> RateChecked -> CorrelationAssigned
//!          -> ArtifactLoaded -> Audited -> Responded
//! ```
//!
//! Authentication and rate-limit failures end the call before any payload
//! parsing, artifact load or scoring. Artifact failures and invalid scores
//! end it as server errors; no fallback model or default score is ever
//! substituted. Every call, admitted or not, produces exactly one audit
//! record carrying the call's correlation id.

use crate::artifact::{ArtifactRegistry, ModelLoader};
use crate::audit::{AuditEvent, AuditEventType, AuditSink, FileAuditSink};
use crate::config::GatewayConfig;
use crate::correlation::CorrelationId;
use crate::error::{AdmissionError, AuditError};
use crate::identity::{CallerIdentity, IdentityResolver};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::schema::{FraudDecision, FraudRequest, FraudResponse};
use crate::scoring::{validate_score, PlaceholderScorer, Scorer};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const MAX_MODEL_VERSION_LEN: usize = 64;

/// One inbound scoring call, as presented by the transport.
#[derive(Clone, Copy)]
pub struct InboundCall<'a> {
    /// Raw `X-API-Key` value.
    pub credential: Option<&'a str>,
    /// Raw `X-Request-Id` value.
    pub correlation_hint: Option<&'a str>,
    /// Unparsed JSON body.
    pub body: &'a [u8],
}

/// Result of one pipeline run. The correlation id is always present so it
/// can be echoed to the caller, rejected or not.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub correlation_id: CorrelationId,
    pub result: Result<FraudResponse, AdmissionError>,
}

pub struct AdmissionPipeline {
    resolver: IdentityResolver,
    limiter: Arc<RateLimiter>,
    models: Arc<dyn ModelLoader>,
    scorer: Arc<dyn Scorer>,
    audit: Arc<dyn AuditSink>,
    audit_failures: AtomicU64,
}

impl AdmissionPipeline {
    pub fn new(
        resolver: IdentityResolver,
        limiter: Arc<RateLimiter>,
        models: Arc<dyn ModelLoader>,
        scorer: Arc<dyn Scorer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            resolver,
            limiter,
            models,
            scorer,
            audit,
            audit_failures: AtomicU64::new(0),
        }
    }

    /// Wire the production collaborators: manifest registry, file audit log
    /// and the placeholder scorer.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, AuditError> {
        let audit = FileAuditSink::new(&config.audit_log_path).await?;
        Ok(Self::new(
            IdentityResolver::new(config.credentials.clone()),
            Arc::new(RateLimiter::new(config.rate_limit.clone())),
            Arc::new(ArtifactRegistry::new(&config.manifest_path)),
            Arc::new(PlaceholderScorer::new()),
            Arc::new(audit),
        ))
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Number of audit records that could not be written.
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    pub async fn handle(&self, call: InboundCall<'_>) -> PipelineOutcome {
        self.handle_at(call, Utc::now()).await
    }

    /// Run the pipeline with an explicit clock reading for the rate limiter.
    pub async fn handle_at(&self, call: InboundCall<'_>, now: DateTime<Utc>) -> PipelineOutcome {
        let identity = match self.resolver.resolve(call.credential) {
            Ok(identity) => identity,
            Err(err) => {
                let correlation_id = CorrelationId::assign(call.correlation_hint);
                let event = AuditEvent::new(AuditEventType::AuthRejected, &correlation_id, None)
                    .with_field("reason", err.reason());
                return self.finish(correlation_id, None, event, Err(err.into())).await;
            }
        };

        if let RateDecision::Rejected { retry_after_secs } =
            self.limiter.admit(identity.key_reference(), now)
        {
            let correlation_id = CorrelationId::assign(call.correlation_hint);
            let event =
                AuditEvent::new(AuditEventType::RateLimited, &correlation_id, Some(&identity))
                    .with_field("reason", "rate_limit_exceeded")
                    .with_field("retry_after_secs", retry_after_secs);
            return self
                .finish(
                    correlation_id,
                    Some(&identity),
                    event,
                    Err(AdmissionError::RateLimited { retry_after_secs }),
                )
                .await;
        }

        let correlation_id = CorrelationId::assign(call.correlation_hint);
        let (event, result) = self.score(&correlation_id, &identity, call.body, now).await;
        self.finish(correlation_id, Some(&identity), event, result)
            .await
    }

    async fn score(
        &self,
        correlation_id: &CorrelationId,
        identity: &CallerIdentity,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> (AuditEvent, Result<FraudResponse, AdmissionError>) {
        let rejected = |event_type: AuditEventType, reason: &str| {
            AuditEvent::new(event_type, correlation_id, Some(identity)).with_field("reason", reason)
        };

        let request = match FraudRequest::from_json(body) {
            Ok(request) => request,
            Err(message) => {
                return (
                    rejected(AuditEventType::PayloadRejected, "invalid_payload"),
                    Err(AdmissionError::InvalidPayload(message)),
                )
            }
        };

        let model = match self.models.load_active().await {
            Ok(model) => model,
            Err(err) => {
                return (
                    rejected(AuditEventType::ArtifactRejected, err.reason()),
                    Err(err.into()),
                )
            }
        };

        if model.version().chars().count() > MAX_MODEL_VERSION_LEN {
            return (
                rejected(AuditEventType::OutcomeRejected, "model_version_too_long"),
                Err(AdmissionError::InvalidOutcome(format!(
                    "model version longer than {} characters",
                    MAX_MODEL_VERSION_LEN
                ))),
            );
        }

        let score = match validate_score(self.scorer.score(&model, &request)) {
            Ok(score) => score,
            Err(message) => {
                return (
                    rejected(AuditEventType::OutcomeRejected, "score_out_of_range")
                        .with_field("model_version", model.version()),
                    Err(AdmissionError::InvalidOutcome(message)),
                )
            }
        };
        let decision = FraudDecision::from_score(score);

        let event = AuditEvent::new(AuditEventType::Prediction, correlation_id, Some(identity))
            .with_field("decision", decision.as_str())
            .with_field("score", score)
            .with_field("model_version", model.version());

        let response = FraudResponse {
            request_id: correlation_id.to_string(),
            model_version: model.version().to_string(),
            score,
            decision,
            timestamp_utc: now,
            reasons: None,
            rules_version: None,
            risk_band: None,
        };

        (event, Ok(response))
    }

    async fn finish(
        &self,
        correlation_id: CorrelationId,
        identity: Option<&CallerIdentity>,
        event: AuditEvent,
        result: Result<FraudResponse, AdmissionError>,
    ) -> PipelineOutcome {
        if let Err(err) = self.audit.append(&event).await {
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                correlation_id = %correlation_id,
                event_type = %event.event_type,
                error = %err,
                "audit write failed"
            );
        }

        let role = identity.map(|i| i.role().as_str()).unwrap_or("anonymous");
        match &result {
            Ok(response) => tracing::info!(
                correlation_id = %correlation_id,
                caller_role = role,
                decision = response.decision.as_str(),
                model_version = %response.model_version,
                "request admitted"
            ),
            Err(err) if err.is_client_error() => tracing::warn!(
                correlation_id = %correlation_id,
                caller_role = role,
                kind = err.kind(),
                error = %err,
                "request rejected"
            ),
            Err(err) => tracing::error!(
                correlation_id = %correlation_id,
                caller_role = role,
                kind = err.kind(),
                error = %err,
                "request failed"
            ),
        }

        PipelineOutcome {
            correlation_id,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ModelHandle;
    use crate::audit::{AuditRecord, MemoryAuditSink};
    use crate::error::{ArtifactError, AuthError};
    use crate::identity::Credentials;
    use crate::rate_limit::RateLimitConfig;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    const ADMIN: &str = "admin-secret-123";
    const BODY: &[u8] =
        br#"{"amount": 25.5, "currency": "USD", "merchant_country": "US", "channel": "card_present"}"#;

    /// Loader that counts calls and fails with a configurable error.
    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load_active(&self) -> Result<ModelHandle, ArtifactError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(if self.fail {
                ArtifactError::IntegrityMismatch {
                    expected: "aa".into(),
                    actual: "bb".into(),
                }
            } else {
                ArtifactError::ManifestMissing {
                    path: "unused".into(),
                }
            })
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn append(&self, _event: &AuditEvent) -> Result<AuditRecord, AuditError> {
            Err(AuditError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    fn pipeline_with(
        loader: Arc<dyn ModelLoader>,
        audit: Arc<dyn AuditSink>,
        max_requests: u32,
    ) -> AdmissionPipeline {
        AdmissionPipeline::new(
            IdentityResolver::new(Credentials::new(Some(ADMIN), Some("service-secret-123"))),
            Arc::new(RateLimiter::new(RateLimitConfig {
                max_requests,
                ..RateLimitConfig::default()
            })),
            loader,
            Arc::new(PlaceholderScorer::new()),
            audit,
        )
    }

    fn call<'a>(credential: Option<&'a str>, hint: Option<&'a str>) -> InboundCall<'a> {
        InboundCall {
            credential,
            correlation_hint: hint,
            body: BODY,
        }
    }

    #[tokio::test]
    async fn wrong_key_never_reaches_the_loader() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let sink = Arc::new(MemoryAuditSink::new());
        let pipeline = pipeline_with(loader.clone(), sink.clone(), 60);

        let outcome = pipeline.handle(call(Some("wrong-key"), Some("req-abc"))).await;

        assert!(matches!(
            outcome.result,
            Err(AdmissionError::Auth(AuthError::Forbidden))
        ));
        assert_eq!(outcome.correlation_id.as_str(), "req-abc");
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event.event_type, "auth_rejected");
        assert_eq!(records[0].event.caller_role, "anonymous");
        assert_eq!(records[0].event.correlation_id, "req-abc");
        assert_eq!(records[0].event.fields["reason"], "invalid_credential");
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_artifact_load() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let sink = Arc::new(MemoryAuditSink::new());
        let pipeline = pipeline_with(loader.clone(), sink.clone(), 60);

        let outcome = pipeline
            .handle(InboundCall {
                credential: Some(ADMIN),
                correlation_hint: None,
                body: b"{}",
            })
            .await;

        assert!(matches!(outcome.result, Err(AdmissionError::InvalidPayload(_))));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.records()[0].event.event_type, "payload_rejected");
        assert_eq!(sink.records()[0].event.caller_role, "admin");
    }

    #[tokio::test]
    async fn integrity_failure_is_a_server_error_not_a_score() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let sink = Arc::new(MemoryAuditSink::new());
        let pipeline = pipeline_with(loader.clone(), sink.clone(), 60);

        let outcome = pipeline.handle(call(Some(ADMIN), None)).await;

        match outcome.result {
            Err(err @ AdmissionError::Artifact(ArtifactError::IntegrityMismatch { .. })) => {
                assert!(!err.is_client_error());
            }
            other => panic!("expected integrity failure, got {:?}", other),
        }
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        let record = &sink.records()[0];
        assert_eq!(record.event.event_type, "artifact_rejected");
        assert_eq!(record.event.fields["reason"], "integrity_mismatch");
    }

    #[tokio::test]
    async fn rate_limit_applies_per_identity_and_is_audited() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let sink = Arc::new(MemoryAuditSink::new());
        let pipeline = pipeline_with(loader.clone(), sink.clone(), 2);
        let now = Utc::now();

        for _ in 0..2 {
            let outcome = pipeline.handle_at(call(Some(ADMIN), None), now).await;
            assert!(!matches!(
                outcome.result,
                Err(AdmissionError::RateLimited { .. })
            ));
        }
        let outcome = pipeline.handle_at(call(Some(ADMIN), None), now).await;
        assert!(matches!(
            outcome.result,
            Err(AdmissionError::RateLimited { retry_after_secs: 60 })
        ));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);

        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].event.event_type, "rate_limited");
        assert_eq!(records[2].event.caller_key_reference, "admin-key");
        assert_eq!(records[2].event.fields["retry_after_secs"], 60);
    }

    #[tokio::test]
    async fn audit_failure_does_not_mask_the_outcome() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let pipeline = pipeline_with(loader, Arc::new(FailingSink), 60);

        let outcome = pipeline.handle(call(None, None)).await;
        assert!(matches!(
            outcome.result,
            Err(AdmissionError::Auth(AuthError::Unauthenticated))
        ));
        assert_eq!(pipeline.audit_failures(), 1);
    }

    #[tokio::test]
    async fn unconfigured_server_rejects_like_a_bad_key() {
        let sink = Arc::new(MemoryAuditSink::new());
        let pipeline = AdmissionPipeline::new(
            IdentityResolver::new(Credentials::default()),
            Arc::new(RateLimiter::default()),
            Arc::new(CountingLoader {
                calls: AtomicUsize::new(0),
                fail: true,
            }),
            Arc::new(PlaceholderScorer::new()),
            sink.clone(),
        );

        let outcome = pipeline.handle(call(Some(ADMIN), None)).await;
        assert!(matches!(
            outcome.result,
            Err(AdmissionError::Auth(AuthError::Misconfigured))
        ));
        assert_eq!(sink.records()[0].event.fields["reason"], "credentials_not_configured");
    }

    /// Verified artifact on disk, declared under `version`.
    fn verified_registry(version: &str) -> (tempfile::TempDir, ArtifactRegistry) {
        use sha2::{Digest, Sha256};

        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("model.bin");
        std::fs::write(&artifact, b"weights").unwrap();
        let manifest = serde_json::json!({
            "active_model": {
                "version": version,
                "path": artifact.to_string_lossy(),
                "sha256": hex::encode(Sha256::digest(b"weights")),
            }
        });
        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(&manifest_path, manifest.to_string()).unwrap();
        (dir, ArtifactRegistry::new(manifest_path))
    }

    async fn run_with_outcome(
        version: &str,
        scorer: PlaceholderScorer,
    ) -> (PipelineOutcome, Vec<AuditRecord>) {
        let (_dir, registry) = verified_registry(version);
        let sink = Arc::new(MemoryAuditSink::new());
        let pipeline = AdmissionPipeline::new(
            IdentityResolver::new(Credentials::new(Some(ADMIN), None)),
            Arc::new(RateLimiter::default()),
            Arc::new(registry),
            Arc::new(scorer),
            sink.clone(),
        );
        let outcome = pipeline.handle(call(Some(ADMIN), None)).await;
        (outcome, sink.records())
    }

    fn assert_outcome_rejected(outcome: &PipelineOutcome, records: &[AuditRecord], reason: &str) {
        match &outcome.result {
            Err(err @ AdmissionError::InvalidOutcome(_)) => assert!(!err.is_client_error()),
            other => panic!("expected invalid outcome, got {:?}", other),
        }
        assert_eq!(records.len(), 1);
        let event = &records[0].event;
        assert_eq!(event.event_type, "outcome_rejected");
        assert_eq!(event.correlation_id, outcome.correlation_id.as_str());
        assert_eq!(event.fields["reason"], reason);
        assert!(!event.fields.contains_key("score"));
        assert!(!event.fields.contains_key("decision"));
    }

    #[tokio::test]
    async fn out_of_range_scores_are_rejected_not_clamped() {
        for score in [1.5, -0.1, f64::NAN, f64::INFINITY] {
            let (outcome, records) =
                run_with_outcome("v1.0.0", PlaceholderScorer::fixed(score)).await;
            assert_outcome_rejected(&outcome, &records, "score_out_of_range");
            assert_eq!(records[0].event.fields["model_version"], "v1.0.0");
        }
    }

    #[tokio::test]
    async fn overlong_model_version_is_rejected() {
        let version = "v".repeat(MAX_MODEL_VERSION_LEN + 1);
        let (outcome, records) = run_with_outcome(&version, PlaceholderScorer::new()).await;
        assert_outcome_rejected(&outcome, &records, "model_version_too_long");
    }

    #[tokio::test]
    async fn boundary_scores_and_version_length_are_admitted() {
        let version = "v".repeat(MAX_MODEL_VERSION_LEN);
        for (score, decision) in [(0.0, FraudDecision::Allow), (1.0, FraudDecision::Block)] {
            let (outcome, records) =
                run_with_outcome(&version, PlaceholderScorer::fixed(score)).await;
            let response = outcome.result.unwrap();
            assert_eq!(response.score, score);
            assert_eq!(response.decision, decision);
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].event.event_type, "prediction");
        }
    }
}
