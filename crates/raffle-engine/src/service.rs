//! Giveaway service: every business rule, executed against the store
//!
//! Each public operation is one store read or one store transaction. Referral
//! screening (bot check, rate limit, duplicate suppression) runs inside the
//! same transaction that records the referral, so concurrent visits from one
//! IP cannot both count.

use crate::bot::BotDetector;
use crate::clock::{Clock, SystemClock};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::winner::select_winner;
use chrono::{DateTime, Duration, Utc};
use raffle_core::{
    generate_id, is_valid_url, random_avatar, referral_link, ActivityCounts, ActivityLog,
    AdminStats, ClientInfo, CreateGiveaway, Error, FieldError, Giveaway, GiveawayCounts, GiveawayView,
    JoinGiveaway, LeaderboardEntry, Participant, PublicStats, RaffleConfig, RateWindow, Referral,
    ReferralCounts, Result, SecurityCounts, SecurityEvent, SecurityEventKind, TrackOutcome,
    UserCounts, WinnerView,
};
use raffle_store::{Database, JsonStore, RetentionLimits};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Size of the cross-giveaway leaderboard.
pub const GLOBAL_LEADERBOARD_SIZE: usize = 50;

pub struct GiveawayService {
    store: Arc<JsonStore>,
    config: RaffleConfig,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
    bots: BotDetector,
}

/// What happened inside a referral transaction. Denials are committed (their
/// counters and security events must persist) and only then turned into errors.
enum Screened {
    Bot,
    Limited(&'static str),
    Tracked(TrackOutcome),
}

impl GiveawayService {
    pub fn new(store: Arc<JsonStore>, config: RaffleConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<JsonStore>, config: RaffleConfig, clock: Arc<dyn Clock>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let bots = BotDetector::new(config.bot.clone());
        Self {
            store,
            config,
            clock,
            limiter,
            bots,
        }
    }

    /// Open the store named in `config` and build a service over it.
    pub async fn open(config: RaffleConfig) -> Result<Self> {
        let store = JsonStore::open(
            &config.store.path,
            RetentionLimits::from(&config.retention),
        )
        .await?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn config(&self) -> &RaffleConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JsonStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Giveaways
    // -----------------------------------------------------------------------

    pub async fn create_giveaway(&self, req: CreateGiveaway) -> Result<Giveaway> {
        let now = self.now();
        validate_create(&req, now)?;

        let giveaway = Giveaway {
            id: generate_id(),
            title: req.title.trim().to_string(),
            host_name: req.host_name.trim().to_string(),
            channel_url: req.channel_url.trim().to_string(),
            end_date: req.end_date,
            created_at: now,
            creator_id: generate_id(),
            winner: None,
            is_ended: false,
        };

        let saved = giveaway.clone();
        self.store
            .update(move |db| {
                db.upsert_giveaway(saved, now);
                Ok(())
            })
            .await?;

        info!(giveaway = %giveaway.id, title = %giveaway.title, ends = %giveaway.end_date, "Giveaway created");
        Ok(giveaway)
    }

    /// Fetch a giveaway, closing it and drawing a winner if its end date has passed.
    pub async fn get_giveaway(&self, id: &str) -> Result<Giveaway> {
        let now = self.now();
        let needs_settle = self
            .store
            .read(|db| db.giveaway(id).map(|g| !g.is_ended && g.has_expired(now)))
            .await
            .ok_or_else(|| Error::not_found("giveaway", id))?;

        if !needs_settle {
            return self
                .store
                .read(|db| db.giveaway(id).cloned())
                .await
                .ok_or_else(|| Error::not_found("giveaway", id));
        }

        self.store
            .update(|db| {
                settle(db, id, now);
                db.giveaway(id)
                    .cloned()
                    .ok_or_else(|| Error::not_found("giveaway", id))
            })
            .await
    }

    /// Every giveaway, with expired ones settled first.
    pub async fn list_giveaways(&self) -> Result<Vec<Giveaway>> {
        let now = self.now();
        let expired: Vec<String> = self
            .store
            .read(|db| {
                db.giveaways
                    .iter()
                    .filter(|g| !g.is_ended && g.has_expired(now))
                    .map(|g| g.id.clone())
                    .collect()
            })
            .await;

        if expired.is_empty() {
            return Ok(self.store.read(|db| db.giveaways.clone()).await);
        }

        self.store
            .update(|db| {
                for id in &expired {
                    settle(db, id, now);
                }
                Ok(db.giveaways.clone())
            })
            .await
    }

    pub async fn delete_giveaway(&self, id: &str, creator_id: &str) -> Result<()> {
        let now = self.now();
        self.store
            .update(|db| {
                let giveaway = db
                    .giveaway(id)
                    .ok_or_else(|| Error::not_found("giveaway", id))?;
                if giveaway.creator_id.is_empty() || giveaway.creator_id != creator_id {
                    return Err(Error::unauthorized("creator id does not match"));
                }
                db.remove_giveaway_cascade(id, now);
                Ok(())
            })
            .await?;
        info!(giveaway = %id, "Giveaway deleted");
        Ok(())
    }

    pub async fn winner(&self, id: &str) -> Result<WinnerView> {
        let now = self.now();
        let giveaway = self.get_giveaway(id).await?;
        let participant_count = self
            .store
            .read(|db| db.users.iter().filter(|u| u.giveaway_id == id).count())
            .await;
        Ok(WinnerView {
            winner: giveaway.winner.clone(),
            giveaway: GiveawayView::new(&giveaway, now),
            participant_count,
        })
    }

    // -----------------------------------------------------------------------
    // Participants
    // -----------------------------------------------------------------------

    pub async fn join_giveaway(&self, giveaway_id: &str, req: JoinGiveaway) -> Result<Participant> {
        let now = self.now();
        validate_join(&req)?;

        // Settles the giveaway if its end date has passed.
        if self.get_giveaway(giveaway_id).await?.is_ended {
            return Err(Error::GiveawayEnded);
        }

        let base_url = self.config.server.public_base_url.clone();
        let participant = self
            .store
            .update(|db| {
                let giveaway = db
                    .giveaway(giveaway_id)
                    .ok_or_else(|| Error::not_found("giveaway", giveaway_id))?;
                if giveaway.is_ended || giveaway.has_expired(now) {
                    return Err(Error::GiveawayEnded);
                }

                let id = generate_id();
                let avatar = match req.avatar.as_deref().map(str::trim) {
                    Some(url) if !url.is_empty() => url.to_string(),
                    _ => random_avatar(&mut rand::thread_rng()),
                };
                let participant = Participant {
                    referral_link: referral_link(&base_url, giveaway_id, &id),
                    id,
                    name: req.name.trim().to_string(),
                    avatar: Some(avatar),
                    joined_at: now,
                    giveaway_id: giveaway_id.to_string(),
                    referral_count: 0,
                };
                db.upsert_user(participant.clone(), now);
                Ok(participant)
            })
            .await?;

        info!(giveaway = %giveaway_id, user = %participant.id, "Participant joined");
        Ok(participant)
    }

    pub async fn participant(&self, user_id: &str) -> Result<Participant> {
        self.store
            .read(|db| db.user(user_id).cloned())
            .await
            .ok_or_else(|| Error::not_found("user", user_id))
    }

    pub async fn participants(&self, giveaway_id: &str) -> Result<Vec<Participant>> {
        self.store
            .read(|db| {
                db.giveaway(giveaway_id)
                    .map(|_| db.users_by_giveaway(giveaway_id))
            })
            .await
            .ok_or_else(|| Error::not_found("giveaway", giveaway_id))
    }

    /// Ranked by referral count, highest first. With a giveaway id every
    /// participant is listed; without one, the top entries across all giveaways.
    pub async fn leaderboard(&self, giveaway_id: Option<&str>) -> Result<Vec<LeaderboardEntry>> {
        let mut users = match giveaway_id {
            Some(id) => self.participants(id).await?,
            None => self.store.read(|db| db.users.clone()).await,
        };
        users.sort_by(|a, b| b.referral_count.cmp(&a.referral_count));
        if giveaway_id.is_none() {
            users.truncate(GLOBAL_LEADERBOARD_SIZE);
        }
        Ok(users
            .into_iter()
            .enumerate()
            .map(|(i, participant)| LeaderboardEntry {
                rank: i + 1,
                participant,
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Referrals
    // -----------------------------------------------------------------------

    pub async fn referrals(&self, giveaway_id: &str) -> Result<Vec<Referral>> {
        self.store
            .read(|db| {
                db.giveaway(giveaway_id)
                    .map(|_| db.referrals_by_giveaway(giveaway_id))
            })
            .await
            .ok_or_else(|| Error::not_found("giveaway", giveaway_id))
    }

    /// Record one visit to `referrer_id`'s link and say where to send the visitor.
    pub async fn track_referral(
        &self,
        giveaway_id: &str,
        referrer_id: &str,
        client: &ClientInfo,
    ) -> Result<TrackOutcome> {
        let now = self.now();
        let ip = client.ip.to_string();
        let user_agent = client.user_agent.as_deref();

        let screened = self
            .store
            .update(|db| {
                if db.giveaway(giveaway_id).is_none() {
                    return Err(Error::not_found("giveaway", giveaway_id));
                }

                let since = self.bots.window_start(now);
                let flagged = {
                    let recent = db.recent_activity(&ip, since);
                    self.bots.inspect(user_agent, &ip, &recent, now)
                };
                if let Some(event) = flagged {
                    record_security_event(db, event);
                    return Ok(Screened::Bot);
                }

                if let RateDecision::Denied { reason, event } =
                    self.limiter.check(&mut db.rate_limit_data, &ip, now)
                {
                    record_security_event(db, event);
                    return Ok(Screened::Limited(reason));
                }

                settle(db, giveaway_id, now);
                let giveaway = db
                    .giveaway(giveaway_id)
                    .cloned()
                    .ok_or_else(|| Error::not_found("giveaway", giveaway_id))?;
                if giveaway.is_ended {
                    return Ok(Screened::Tracked(TrackOutcome {
                        success: false,
                        redirect_url: format!("/winner/{}", giveaway_id),
                    }));
                }

                let is_valid = !db.has_referred_before(giveaway_id, &ip);
                db.push_referral(Referral {
                    id: generate_id(),
                    referrer_id: referrer_id.to_string(),
                    giveaway_id: giveaway_id.to_string(),
                    ip_address: ip.clone(),
                    timestamp: now,
                    is_valid,
                });

                if is_valid {
                    let referrer = db
                        .user(referrer_id)
                        .filter(|u| u.giveaway_id == giveaway_id)
                        .cloned();
                    if let Some(mut referrer) = referrer {
                        referrer.referral_count += 1;
                        db.upsert_user(referrer, now);
                    }
                } else {
                    record_security_event(
                        db,
                        SecurityEvent::new(
                            SecurityEventKind::DuplicateReferral,
                            &ip,
                            now,
                            format!("IP already referred giveaway {}", giveaway_id),
                        ),
                    );
                }

                Ok(Screened::Tracked(TrackOutcome {
                    success: is_valid,
                    redirect_url: giveaway.channel_url,
                }))
            })
            .await?;

        match screened {
            Screened::Bot => Err(Error::BotDetected),
            Screened::Limited(reason) => Err(Error::rate_limited(reason)),
            Screened::Tracked(outcome) => {
                info!(
                    giveaway = %giveaway_id,
                    referrer = %referrer_id,
                    ip = %ip,
                    valid = outcome.success,
                    "Referral tracked"
                );
                Ok(outcome)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub async fn public_stats(&self) -> PublicStats {
        let now = self.now();
        self.store
            .read(|db| {
                let ended = db
                    .giveaways
                    .iter()
                    .filter(|g| g.is_ended || g.has_expired(now))
                    .count();
                PublicStats {
                    active_giveaways: db.giveaways.len() - ended,
                    ended_giveaways: ended,
                    total_participants: db.users.len(),
                    total_referrals: db.referrals.iter().filter(|r| r.is_valid).count(),
                }
            })
            .await
    }

    pub async fn admin_stats(&self) -> AdminStats {
        let now = self.now();
        let recent_since = now - Duration::hours(self.config.retention.recent_activity_hours);
        self.store
            .read(|db| AdminStats {
                giveaways: GiveawayCounts {
                    total: db.giveaways.len(),
                    active: db
                        .giveaways
                        .iter()
                        .filter(|g| !g.is_ended && !g.has_expired(now))
                        .count(),
                },
                users: UserCounts {
                    total: db.users.len(),
                },
                referrals: ReferralCounts {
                    total: db.referrals.len(),
                    valid: db.referrals.iter().filter(|r| r.is_valid).count(),
                },
                security: SecurityCounts {
                    total_events: db.security_events.len(),
                },
                activity: ActivityCounts {
                    recent_activity: db
                        .activity_logs
                        .iter()
                        .filter(|l| l.timestamp > recent_since)
                        .count(),
                },
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Admin collections
    // -----------------------------------------------------------------------

    pub async fn security_events(&self) -> Vec<SecurityEvent> {
        self.store.read(|db| db.security_events.clone()).await
    }

    pub async fn activity_logs(&self) -> Vec<ActivityLog> {
        self.store.read(|db| db.activity_logs.clone()).await
    }

    pub async fn all_users(&self) -> Vec<Participant> {
        self.store.read(|db| db.users.clone()).await
    }

    pub async fn all_referrals(&self) -> Vec<Referral> {
        self.store.read(|db| db.referrals.clone()).await
    }

    pub async fn rate_limit_data(&self) -> BTreeMap<String, RateWindow> {
        self.store.read(|db| db.rate_limit_data.clone()).await
    }

    pub async fn admin_upsert_giveaway(&self, giveaway: Giveaway) -> Result<Giveaway> {
        if giveaway.id.trim().is_empty() {
            return Err(Error::Validation(vec![FieldError::new("id", "Id is required")]));
        }
        let now = self.now();
        let saved = giveaway.clone();
        self.store
            .update(move |db| {
                db.upsert_giveaway(saved, now);
                Ok(())
            })
            .await?;
        Ok(giveaway)
    }

    pub async fn admin_upsert_user(&self, user: Participant) -> Result<Participant> {
        let mut errors = Vec::new();
        if user.id.trim().is_empty() {
            errors.push(FieldError::new("id", "Id is required"));
        }
        if user.giveaway_id.trim().is_empty() {
            errors.push(FieldError::new("giveawayId", "Giveaway id is required"));
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }
        let now = self.now();
        let saved = user.clone();
        self.store
            .update(move |db| {
                db.upsert_user(saved, now);
                Ok(())
            })
            .await?;
        Ok(user)
    }

    pub async fn admin_replace_rate_limits(
        &self,
        windows: BTreeMap<String, RateWindow>,
    ) -> Result<usize> {
        self.store
            .update(move |db| {
                db.rate_limit_data = windows;
                Ok(db.rate_limit_data.len())
            })
            .await
    }

    /// Drop expired rate-limit windows. Returns how many were removed.
    pub async fn prune_rate_limits(&self) -> Result<usize> {
        let now = self.now();
        self.store
            .update(|db| Ok(self.limiter.prune(&mut db.rate_limit_data, now)))
            .await
    }
}

/// Close an expired giveaway and draw its winner. No-op otherwise.
fn settle(db: &mut Database, id: &str, now: DateTime<Utc>) -> bool {
    let Some(giveaway) = db.giveaway(id) else {
        return false;
    };
    if giveaway.is_ended || !giveaway.has_expired(now) {
        return false;
    }

    let mut closed = giveaway.clone();
    closed.is_ended = true;
    if closed.winner.is_none() {
        let pool = db.users_by_giveaway(id);
        closed.winner = select_winner(&pool, &mut rand::thread_rng()).cloned();
    }

    match &closed.winner {
        Some(w) => info!(giveaway = %id, winner = %w.id, referrals = w.referral_count, "Giveaway ended"),
        None => info!(giveaway = %id, "Giveaway ended without participants"),
    }
    db.upsert_giveaway(closed, now);
    true
}

fn record_security_event(db: &mut Database, event: SecurityEvent) {
    warn!(
        kind = %event.kind,
        ip = %event.ip_address,
        details = %event.details,
        "Security event"
    );
    db.log_security_event(event);
}

fn validate_create(req: &CreateGiveaway, now: DateTime<Utc>) -> Result<()> {
    let mut errors = Vec::new();
    if req.title.trim().is_empty() {
        errors.push(FieldError::new("title", "Title is required"));
    }
    if req.host_name.trim().is_empty() {
        errors.push(FieldError::new("hostName", "Host name is required"));
    }
    if req.channel_url.trim().is_empty() {
        errors.push(FieldError::new("channelUrl", "Channel URL is required"));
    } else if !is_valid_url(&req.channel_url) {
        errors.push(FieldError::new("channelUrl", "Invalid URL format"));
    }
    if req.end_date <= now {
        errors.push(FieldError::new("endDate", "End date must be in the future"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}

fn validate_join(req: &JoinGiveaway) -> Result<()> {
    let mut errors = Vec::new();
    if req.name.trim().is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    }
    if let Some(avatar) = req.avatar.as_deref().map(str::trim) {
        if !avatar.is_empty() && !is_valid_url(avatar) {
            errors.push(FieldError::new("avatar", "Invalid URL format"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}
