//! Per-identity fixed-window rate limiter.
//!
//! Each identity owns a window start and a request count. A check past the
//! end of the window resets it; every check increments the count, rejected
//! ones included. Up to `max_requests` calls per window are admitted. Bursts
//! of up to twice the limit are possible across a window boundary.
//!
//! State is owned by the limiter and guarded by a single lock, so the
//! read-modify-write for one identity is atomic with respect to concurrent
//! callers. Expired windows are swept periodically and the number of tracked
//! identities is capped.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Rate-limit key used when no identity is available.
pub const ANONYMOUS: &str = "anonymous";

// Keeps window arithmetic inside chrono's representable range.
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per identity per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Hard cap on distinct identities held in memory.
    ///
    /// A new identity arriving while the table is still full after a sweep
    /// is rejected for one window (fails closed). Known identities are
    /// unaffected.
    #[serde(default = "default_max_tracked")]
    pub max_tracked_identities: usize,

    /// Sweep expired windows every N checks (0 disables periodic sweeps).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
}

fn default_max_requests() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_tracked() -> usize {
    10_000
}

fn default_sweep_interval() -> u64 {
    256
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            max_tracked_identities: default_max_tracked(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted { remaining: u32 },
    Rejected { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateDecision::Admitted { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: DateTime<Utc>,
    count: u32,
}

/// In-memory, single-process rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<HashMap<String, WindowState>>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check `identity_key` at `now` against the configured limit.
    pub fn admit(&self, identity_key: &str, now: DateTime<Utc>) -> RateDecision {
        self.check(
            identity_key,
            now,
            self.config.max_requests,
            self.config.window_secs,
        )
    }

    /// Check `identity_key` at `now` with an explicit limit and window.
    pub fn check(
        &self,
        identity_key: &str,
        now: DateTime<Utc>,
        max_requests: u32,
        window_secs: u64,
    ) -> RateDecision {
        let window = Duration::seconds(window_secs.min(MAX_WINDOW_SECS) as i64);
        let tick = self.checks.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();

        if self.config.sweep_interval > 0 && tick > 0 && tick % self.config.sweep_interval == 0 {
            let removed = sweep(&mut state, now, window);
            tracing::debug!(removed, remaining = state.len(), "swept expired rate windows");
        }

        if !state.contains_key(identity_key) && state.len() >= self.config.max_tracked_identities
        {
            sweep(&mut state, now, window);
            if state.len() >= self.config.max_tracked_identities {
                tracing::warn!(
                    tracked = state.len(),
                    max = self.config.max_tracked_identities,
                    "rate limiter identity table full; rejecting new identity"
                );
                return RateDecision::Rejected {
                    retry_after_secs: window_secs.max(1),
                };
            }
        }

        let entry = state
            .entry(identity_key.to_string())
            .or_insert(WindowState {
                window_start: now,
                count: 0,
            });

        if now - entry.window_start > window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count = entry.count.saturating_add(1);

        if entry.count > max_requests {
            let retry_after_secs = retry_after(entry.window_start, window, now);
            tracing::warn!(
                identity = identity_key,
                count = entry.count,
                max = max_requests,
                retry_after_secs,
                "rate limit exceeded"
            );
            RateDecision::Rejected { retry_after_secs }
        } else {
            RateDecision::Admitted {
                remaining: max_requests - entry.count,
            }
        }
    }

    /// Drop every identity whose window has expired at `now`.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let window = Duration::seconds(self.config.window_secs.min(MAX_WINDOW_SECS) as i64);
        sweep(&mut self.state.lock(), now, window)
    }

    pub fn tracked_identities(&self) -> usize {
        self.state.lock().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// Expired entries would be reset on their next check, so dropping them does
// not change any admit/reject decision.
fn sweep(state: &mut HashMap<String, WindowState>, now: DateTime<Utc>, window: Duration) -> usize {
    let before = state.len();
    state.retain(|_, entry| now - entry.window_start <= window);
    before - state.len()
}

fn retry_after(window_start: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> u64 {
    let remaining_ms = (window_start + window - now).num_milliseconds();
    let secs = (remaining_ms.max(0) as u64).div_ceil(1000);
    secs.max(1)
}
