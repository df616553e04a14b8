#![deny(unsafe_code)]

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fraudgate_core::{
    AdmissionError, AdmissionPipeline, AuditError, GatewayConfig, InboundCall, REQUEST_ID_HEADER,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

pub const API_KEY_HEADER: &str = "x-api-key";

const INVALID_API_KEY: &str = "Invalid API key.";
const RATE_LIMIT_EXCEEDED: &str = "Rate limit exceeded.";
const INTERNAL_ERROR: &str = "Internal server error.";

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    (
        "permissions-policy",
        "geolocation=(), microphone=(), camera=()",
    ),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
];

#[derive(Clone)]
pub struct ServiceState {
    pub pipeline: Arc<AdmissionPipeline>,
}

impl ServiceState {
    pub fn new(pipeline: AdmissionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub async fn bootstrap(config: GatewayConfig) -> Result<Self, ServiceError> {
        let pipeline = AdmissionPipeline::from_config(&config).await?;
        tracing::info!(
            manifest = %config.manifest_path.display(),
            audit_log = %config.audit_log_path.display(),
            max_requests = config.rate_limit.max_requests,
            window_secs = config.rate_limit.window_secs,
            "admission pipeline ready"
        );
        Ok(Self::new(pipeline))
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/predict", post(predict))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("audit log unavailable: {0}")]
    Audit(#[from] AuditError),
}

/// HTTP rendering of a rejected call.
///
/// Authentication failures collapse to one body so callers cannot tell a
/// missing key from a wrong one. Server-side failures never carry detail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Admission(err) = self;
        let (status, message) = match &err {
            AdmissionError::Auth(_) => (StatusCode::FORBIDDEN, INVALID_API_KEY.to_string()),
            AdmissionError::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_EXCEEDED.to_string())
            }
            AdmissionError::InvalidPayload(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, detail.clone())
            }
            AdmissionError::Artifact(_) | AdmissionError::InvalidOutcome(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string())
            }
        };

        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        if let AdmissionError::RateLimited { retry_after_secs } = err {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    tracked_identities: usize,
    audit_failures: u64,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "fraudgate",
        tracked_identities: state.pipeline.limiter().tracked_identities(),
        audit_failures: state.pipeline.audit_failures(),
    })
}

async fn predict(State(state): State<ServiceState>, headers: HeaderMap, body: Bytes) -> Response {
    let outcome = state
        .pipeline
        .handle(InboundCall {
            credential: header_str(&headers, API_KEY_HEADER),
            correlation_hint: header_str(&headers, REQUEST_ID_HEADER),
            body: &body,
        })
        .await;

    let mut response = match outcome.result {
        Ok(prediction) => (StatusCode::OK, Json(prediction)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(outcome.correlation_id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}
