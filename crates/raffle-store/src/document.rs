//! The persisted document and its collection helpers

use chrono::{DateTime, Utc};
use raffle_core::{
    ActivityAction, ActivityLog, Giveaway, Participant, RateWindow, Referral, RetentionConfig,
    SecurityEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Address recorded on activity caused by the service itself.
pub const SYSTEM_IP: &str = "127.0.0.1";

/// Caps on the prepend-only logs.
#[derive(Clone, Copy, Debug)]
pub struct RetentionLimits {
    pub activity_logs: usize,
    pub security_events: usize,
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl From<&RetentionConfig> for RetentionLimits {
    fn from(cfg: &RetentionConfig) -> Self {
        Self {
            activity_logs: cfg.activity_logs,
            security_events: cfg.security_events,
        }
    }
}

/// Every collection the service keeps. Logs are newest-first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Database {
    pub activity_logs: Vec<ActivityLog>,
    pub security_events: Vec<SecurityEvent>,
    pub giveaways: Vec<Giveaway>,
    pub users: Vec<Participant>,
    pub referrals: Vec<Referral>,
    pub rate_limit_data: BTreeMap<String, RateWindow>,
    #[serde(skip)]
    limits: Option<RetentionLimits>,
}

impl Database {
    pub fn set_limits(&mut self, limits: RetentionLimits) {
        self.limits = Some(limits);
    }

    fn limits(&self) -> RetentionLimits {
        self.limits.unwrap_or_default()
    }

    // -- giveaways ---------------------------------------------------------

    pub fn giveaway(&self, id: &str) -> Option<&Giveaway> {
        self.giveaways.iter().find(|g| g.id == id)
    }

    pub fn giveaway_mut(&mut self, id: &str) -> Option<&mut Giveaway> {
        self.giveaways.iter_mut().find(|g| g.id == id)
    }

    /// Replace by id, or append.
    pub fn upsert_giveaway(&mut self, giveaway: Giveaway, now: DateTime<Utc>) {
        self.log_activity(
            ActivityLog::new(ActivityAction::GiveawaySaved, SYSTEM_IP, now)
                .giveaway(&giveaway.id)
                .details(&giveaway.title),
        );
        match self.giveaways.iter_mut().find(|g| g.id == giveaway.id) {
            Some(slot) => *slot = giveaway,
            None => self.giveaways.push(giveaway),
        }
    }

    /// Remove a giveaway together with its participants and referrals.
    /// Returns false when no such giveaway existed.
    pub fn remove_giveaway_cascade(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        let before = self.giveaways.len();
        self.giveaways.retain(|g| g.id != id);
        if self.giveaways.len() == before {
            return false;
        }
        self.users.retain(|u| u.giveaway_id != id);
        self.referrals.retain(|r| r.giveaway_id != id);
        self.log_activity(
            ActivityLog::new(ActivityAction::GiveawayDeleted, SYSTEM_IP, now).giveaway(id),
        );
        true
    }

    // -- participants ------------------------------------------------------

    pub fn user(&self, id: &str) -> Option<&Participant> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    pub fn upsert_user(&mut self, user: Participant, now: DateTime<Utc>) {
        self.log_activity(
            ActivityLog::new(ActivityAction::UserSaved, SYSTEM_IP, now)
                .user(&user.id)
                .giveaway(&user.giveaway_id)
                .details(&user.name),
        );
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(slot) => *slot = user,
            None => self.users.push(user),
        }
    }

    pub fn users_by_giveaway(&self, giveaway_id: &str) -> Vec<Participant> {
        self.users
            .iter()
            .filter(|u| u.giveaway_id == giveaway_id)
            .cloned()
            .collect()
    }

    // -- referrals ---------------------------------------------------------

    pub fn push_referral(&mut self, referral: Referral) {
        self.log_activity(
            ActivityLog::new(
                ActivityAction::ReferralTracked,
                &referral.ip_address,
                referral.timestamp,
            )
            .user(&referral.referrer_id)
            .giveaway(&referral.giveaway_id)
            .details(format!("Valid: {}", referral.is_valid)),
        );
        self.referrals.push(referral);
    }

    pub fn referrals_by_giveaway(&self, giveaway_id: &str) -> Vec<Referral> {
        self.referrals
            .iter()
            .filter(|r| r.giveaway_id == giveaway_id)
            .cloned()
            .collect()
    }

    pub fn has_referred_before(&self, giveaway_id: &str, ip: &str) -> bool {
        self.referrals
            .iter()
            .any(|r| r.giveaway_id == giveaway_id && r.ip_address == ip)
    }

    // -- logs --------------------------------------------------------------

    pub fn log_activity(&mut self, entry: ActivityLog) {
        self.activity_logs.insert(0, entry);
        self.activity_logs.truncate(self.limits().activity_logs);
    }

    pub fn log_security_event(&mut self, event: SecurityEvent) {
        self.security_events.insert(0, event);
        self.security_events.truncate(self.limits().security_events);
    }

    /// Activity from `ip` newer than `since`, newest first.
    pub fn recent_activity(&self, ip: &str, since: DateTime<Utc>) -> Vec<&ActivityLog> {
        self.activity_logs
            .iter()
            .filter(|log| log.ip_address == ip && log.timestamp > since)
            .collect()
    }
}
