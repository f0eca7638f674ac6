//! Bot screening for referral visits

use chrono::{DateTime, Duration, Utc};
use raffle_core::{ActivityLog, BotConfig, SecurityEvent, SecurityEventKind};

#[derive(Clone, Debug)]
pub struct BotDetector {
    config: BotConfig,
    lowered: Vec<String>,
}

impl BotDetector {
    pub fn new(config: BotConfig) -> Self {
        let lowered = config
            .suspicious_user_agents
            .iter()
            .map(|s| s.to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { config, lowered }
    }

    /// Start of the look-back window for burst detection.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::milliseconds(self.config.rapid_window_ms)
    }

    pub fn is_suspicious_user_agent(&self, user_agent: &str) -> bool {
        let ua = user_agent.to_lowercase();
        self.lowered.iter().any(|needle| ua.contains(needle.as_str()))
    }

    /// Returns the security event to record when the visit looks automated.
    ///
    /// `recent` is this IP's activity inside the look-back window, newest first.
    pub fn inspect(
        &self,
        user_agent: Option<&str>,
        ip: &str,
        recent: &[&ActivityLog],
        now: DateTime<Utc>,
    ) -> Option<SecurityEvent> {
        let user_agent = user_agent.unwrap_or_default();
        if self.is_suspicious_user_agent(user_agent) {
            return Some(SecurityEvent::new(
                SecurityEventKind::SuspiciousUserAgent,
                ip,
                now,
                user_agent,
            ));
        }

        if recent.len() > self.config.rapid_min_actions {
            let newest = recent.first()?.timestamp;
            let oldest = recent.last()?.timestamp;
            let span = (newest - oldest).num_milliseconds().abs();
            if span < self.config.rapid_span_ms {
                return Some(SecurityEvent::new(
                    SecurityEventKind::RapidRequests,
                    ip,
                    now,
                    format!("{} requests in {}ms", recent.len(), span),
                ));
            }
        }

        None
    }
}
