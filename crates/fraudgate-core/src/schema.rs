//! Request and response shapes of the scoring endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Where the transaction originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    CardPresent,
    Web,
    Mobile,
    Api,
}

/// Recommended action derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudDecision {
    Allow,
    Review,
    Block,
}

impl FraudDecision {
    pub const BLOCK_THRESHOLD: f64 = 0.80;
    pub const REVIEW_THRESHOLD: f64 = 0.50;

    pub fn from_score(score: f64) -> Self {
        if score >= Self::BLOCK_THRESHOLD {
            FraudDecision::Block
        } else if score >= Self::REVIEW_THRESHOLD {
            FraudDecision::Review
        } else {
            FraudDecision::Allow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudDecision::Allow => "allow",
            FraudDecision::Review => "review",
            FraudDecision::Block => "block",
        }
    }
}

/// Scoring request. Unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FraudRequest {
    pub amount: f64,
    pub currency: String,
    pub merchant_country: String,
    pub channel: Channel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl FraudRequest {
    /// Parse, trim and validate a JSON body.
    pub fn from_json(body: &[u8]) -> Result<Self, String> {
        let mut request: FraudRequest =
            serde_json::from_slice(body).map_err(|e| format!("malformed request body: {}", e))?;
        request.normalize();
        request.validate()?;
        Ok(request)
    }

    fn normalize(&mut self) {
        let trim = |s: &mut String| *s = s.trim().to_string();
        trim(&mut self.currency);
        trim(&mut self.merchant_country);
        for field in [
            &mut self.customer_id,
            &mut self.device_id,
            &mut self.ip_address,
            &mut self.transaction_id,
        ]
        .into_iter()
        .flatten()
        {
            trim(field);
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err("amount must be greater than 0".to_string());
        }
        exact_len("currency", &self.currency, 3)?;
        exact_len("merchant_country", &self.merchant_country, 2)?;
        max_len("customer_id", self.customer_id.as_deref(), 64)?;
        max_len("device_id", self.device_id.as_deref(), 128)?;
        max_len("ip_address", self.ip_address.as_deref(), 64)?;
        max_len("transaction_id", self.transaction_id.as_deref(), 64)?;
        Ok(())
    }
}

fn exact_len(name: &str, value: &str, len: usize) -> Result<(), String> {
    if value.chars().count() != len {
        return Err(format!("{} must be exactly {} characters", name, len));
    }
    Ok(())
}

fn max_len(name: &str, value: Option<&str>, max: usize) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > max => {
            Err(format!("{} must be at most {} characters", name, max))
        }
        _ => Ok(()),
    }
}

/// Scoring response. Minimal and safe to disclose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudResponse {
    pub request_id: String,
    pub model_version: String,
    pub score: f64,
    pub decision: FraudDecision,
    pub timestamp_utc: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_band: Option<String>,
}
