//! Fixed-window rate limiting keyed by client IP
//!
//! Two windows per IP: a short burst window (`ddos_{ip}`) checked first, then
//! the regular window (`{ip}`). Counters live in the store document so they
//! survive restarts.

use chrono::{DateTime, Utc};
use raffle_core::{RateLimitConfig, RateWindow, SecurityEvent, SecurityEventKind};
use std::collections::BTreeMap;

pub const DDOS_REASON: &str = "DDoS protection triggered";
pub const RATE_LIMIT_REASON: &str = "Rate limit exceeded";

#[derive(Clone, Debug, PartialEq)]
pub enum RateDecision {
    Allowed,
    Denied {
        reason: &'static str,
        event: SecurityEvent,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Clone, Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }

    pub fn ddos_key(ip: &str) -> String {
        format!("ddos_{}", ip)
    }

    /// Count one request from `ip` and decide whether it may proceed.
    pub fn check(
        &self,
        windows: &mut BTreeMap<String, RateWindow>,
        ip: &str,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let now_ms = now.timestamp_millis();

        if let Some(count) = bump(
            windows,
            Self::ddos_key(ip),
            now_ms,
            self.config.ddos_window_ms,
            self.config.ddos_max_requests,
        ) {
            return RateDecision::Denied {
                reason: DDOS_REASON,
                event: SecurityEvent::new(
                    SecurityEventKind::DdosAttempt,
                    ip,
                    now,
                    format!("{} requests in {}ms", count, self.config.ddos_window_ms),
                ),
            };
        }

        if let Some(count) = bump(
            windows,
            ip.to_string(),
            now_ms,
            self.config.window_ms,
            self.config.max_requests,
        ) {
            return RateDecision::Denied {
                reason: RATE_LIMIT_REASON,
                event: SecurityEvent::new(
                    SecurityEventKind::RateLimitExceeded,
                    ip,
                    now,
                    format!("{} requests in {}ms", count, self.config.window_ms),
                ),
            };
        }

        RateDecision::Allowed
    }

    /// Drop windows that no longer constrain anything. Returns how many were removed.
    pub fn prune(&self, windows: &mut BTreeMap<String, RateWindow>, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let before = windows.len();
        windows.retain(|key, w| {
            let span = if key.starts_with("ddos_") {
                self.config.ddos_window_ms
            } else {
                self.config.window_ms
            };
            in_window(now_ms, w.window_start, span)
        });
        before - windows.len()
    }
}

/// A start in the future or unreachably far in the past means the stored
/// window is garbage; treat it as expired.
fn in_window(now_ms: i64, window_start: i64, window_ms: i64) -> bool {
    (0..window_ms).contains(&now_ms.saturating_sub(window_start))
}

/// Advance one window. Returns `Some(count)` when the window is already full.
fn bump(
    windows: &mut BTreeMap<String, RateWindow>,
    key: String,
    now_ms: i64,
    window_ms: i64,
    max: u32,
) -> Option<u32> {
    match windows.get_mut(&key) {
        Some(w) if in_window(now_ms, w.window_start, window_ms) => {
            if w.count >= max {
                return Some(w.count);
            }
            w.count += 1;
        }
        _ => {
            windows.insert(key, RateWindow::fresh(now_ms));
        }
    }
    None
}
