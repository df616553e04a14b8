//! Scoring collaborator.
//!
//! The pipeline only relies on the contract: a score for a verified model
//! handle and a validated request. Scores outside [0, 1] are rejected by the
//! pipeline, never clamped.

use crate::artifact::ModelHandle;
use crate::schema::FraudRequest;

pub trait Scorer: Send + Sync {
    fn score(&self, model: &ModelHandle, request: &FraudRequest) -> f64;
}

/// Deterministic placeholder until real inference lands.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderScorer {
    score: f64,
}

impl PlaceholderScorer {
    pub const DEFAULT_SCORE: f64 = 0.50;

    pub fn new() -> Self {
        Self::fixed(Self::DEFAULT_SCORE)
    }

    pub fn fixed(score: f64) -> Self {
        Self { score }
    }
}

impl Default for PlaceholderScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for PlaceholderScorer {
    fn score(&self, _model: &ModelHandle, _request: &FraudRequest) -> f64 {
        self.score
    }
}

/// Reject scores that are not finite or fall outside [0, 1].
pub fn validate_score(score: f64) -> Result<f64, String> {
    if !score.is_finite() {
        return Err(format!("score is not finite: {}", score));
    }
    if !(0.0..=1.0).contains(&score) {
        return Err(format!("score {} outside [0.0, 1.0]", score));
    }
    Ok(score)
}
