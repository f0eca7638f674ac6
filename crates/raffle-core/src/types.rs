//! Core types for Raffle
//!
//! Records serialize in camelCase so documents written by older deployments
//! (`hostName`, `referralCount`, `isValid`, ...) load without migration.

use crate::links::format_time_left;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A hosted promotional campaign.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Giveaway {
    pub id: String,
    pub title: String,
    pub host_name: String,
    pub channel_url: String,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub creator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Participant>,
    #[serde(default)]
    pub is_ended: bool,
}

impl Giveaway {
    /// True once the end date has passed, whether or not the flag was flipped yet.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end_date
    }

    /// Copy safe to hand to anyone but the creator.
    pub fn public_view(&self) -> Self {
        Self {
            creator_id: String::new(),
            ..self.clone()
        }
    }
}

/// Someone who joined a giveaway and holds a referral link.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub giveaway_id: String,
    #[serde(default)]
    pub referral_count: u32,
    pub referral_link: String,
}

impl Participant {
    /// Draw weight: every participant holds at least one ticket.
    pub fn weight(&self) -> u32 {
        self.referral_count.max(1)
    }
}

/// One visit to a referral link.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub giveaway_id: String,
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    pub is_valid: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    GiveawaySaved,
    GiveawayDeleted,
    UserSaved,
    ReferralTracked,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub action: ActivityAction,
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub giveaway_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ActivityLog {
    pub fn new(action: ActivityAction, ip_address: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            action,
            ip_address: ip_address.into(),
            timestamp,
            giveaway_id: None,
            user_id: None,
            details: None,
        }
    }

    pub fn giveaway(mut self, id: impl Into<String>) -> Self {
        self.giveaway_id = Some(id.into());
        self
    }

    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    DuplicateReferral,
    DdosAttempt,
    RateLimitExceeded,
    SuspiciousUserAgent,
    RapidRequests,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateReferral => "DUPLICATE_REFERRAL",
            Self::DdosAttempt => "DDOS_ATTEMPT",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SuspiciousUserAgent => "SUSPICIOUS_USER_AGENT",
            Self::RapidRequests => "RAPID_REQUESTS",
        }
    }
}

impl std::fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub kind: SecurityEventKind,
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

impl SecurityEvent {
    pub fn new(
        kind: SecurityEventKind,
        ip_address: impl Into<String>,
        timestamp: DateTime<Utc>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            ip_address: ip_address.into(),
            timestamp,
            details: details.into(),
        }
    }
}

/// Fixed-window counter; `window_start` is epoch milliseconds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateWindow {
    pub count: u32,
    pub window_start: i64,
}

impl RateWindow {
    pub fn fresh(now_ms: i64) -> Self {
        Self {
            count: 1,
            window_start: now_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGiveaway {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub channel_url: String,
    pub end_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGiveaway {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Where the request came from, as observed by the server.
#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub ip: IpAddr,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: IpAddr, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackOutcome {
    pub success: bool,
    pub redirect_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub participant: Participant,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicStats {
    pub active_giveaways: usize,
    pub ended_giveaways: usize,
    pub total_participants: usize,
    pub total_referrals: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub giveaways: GiveawayCounts,
    pub users: UserCounts,
    pub referrals: ReferralCounts,
    pub security: SecurityCounts,
    pub activity: ActivityCounts,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GiveawayCounts {
    pub total: usize,
    pub active: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserCounts {
    pub total: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferralCounts {
    pub total: usize,
    pub valid: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityCounts {
    pub total_events: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCounts {
    pub recent_activity: usize,
}

/// What anyone but the creator sees: no creator id, plus a countdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveawayView {
    #[serde(flatten)]
    pub giveaway: Giveaway,
    pub time_left: String,
}

impl GiveawayView {
    pub fn new(giveaway: &Giveaway, now: DateTime<Utc>) -> Self {
        Self {
            giveaway: giveaway.public_view(),
            time_left: format_time_left(giveaway.end_date, now),
        }
    }
}

/// A giveaway together with its drawn winner, if any.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerView {
    pub giveaway: GiveawayView,
    pub winner: Option<Participant>,
    pub participant_count: usize,
}
