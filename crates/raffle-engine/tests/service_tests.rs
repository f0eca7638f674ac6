//! Tests for raffle-engine: GiveawayService against a real store file

use chrono::{DateTime, Duration, TimeZone, Utc};
use raffle_core::*;
use raffle_engine::{FixedClock, GiveawayService};
use raffle_store::{JsonStore, RetentionLimits};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

struct Harness {
    _dir: tempfile::TempDir,
    clock: Arc<FixedClock>,
    svc: GiveawayService,
}

async fn harness_with(config: RaffleConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::open(dir.path().join("db.json"), RetentionLimits::default())
        .await
        .unwrap();
    let clock = Arc::new(FixedClock::new(t0()));
    let svc = GiveawayService::with_clock(Arc::new(store), config, clock.clone());
    Harness {
        _dir: dir,
        clock,
        svc,
    }
}

async fn harness() -> Harness {
    let mut config = RaffleConfig::default();
    config.server.public_base_url = "https://raffle.test".into();
    harness_with(config).await
}

fn create_req(days: i64) -> CreateGiveaway {
    CreateGiveaway {
        title: "  Mechanical keyboard ".into(),
        host_name: "Hans".into(),
        channel_url: "https://whatsapp.com/channel/abc".into(),
        end_date: t0() + Duration::days(days),
    }
}

fn join_req(name: &str) -> JoinGiveaway {
    JoinGiveaway {
        name: name.into(),
        avatar: None,
    }
}

fn visitor(last_octet: u8) -> ClientInfo {
    ClientInfo::new(
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, last_octet)),
        Some(BROWSER.into()),
    )
}

// ===========================================================================
// Create / get
// ===========================================================================

#[tokio::test]
async fn create_giveaway_assigns_ids_and_trims() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    assert_eq!(g.title, "Mechanical keyboard");
    assert_eq!(g.id.len(), 9);
    assert_eq!(g.creator_id.len(), 9);
    assert_ne!(g.id, g.creator_id);
    assert!(!g.is_ended);
    assert_eq!(g.created_at, t0());

    let fetched = h.svc.get_giveaway(&g.id).await.unwrap();
    assert_eq!(fetched, g);
}

#[tokio::test]
async fn create_giveaway_collects_all_field_errors() {
    let h = harness().await;
    let err = h
        .svc
        .create_giveaway(CreateGiveaway {
            title: " ".into(),
            host_name: "".into(),
            channel_url: "nope".into(),
            end_date: t0(),
        })
        .await
        .unwrap_err();
    match err {
        Error::Validation(fields) => {
            let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
            assert_eq!(names, vec!["title", "hostName", "channelUrl", "endDate"]);
            assert_eq!(fields[2].message, "Invalid URL format");
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(h.svc.list_giveaways().await.unwrap().is_empty());
}

#[tokio::test]
async fn get_missing_giveaway_is_not_found() {
    let h = harness().await;
    assert!(matches!(
        h.svc.get_giveaway("nope").await,
        Err(Error::NotFound { what: "giveaway", .. })
    ));
}

// ===========================================================================
// Join
// ===========================================================================

#[tokio::test]
async fn join_builds_referral_link_and_avatar() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req(" Rin ")).await.unwrap();

    assert_eq!(p.name, "Rin");
    assert_eq!(p.referral_count, 0);
    assert_eq!(
        p.referral_link,
        format!("https://raffle.test/g/{}?ref={}", g.id, p.id)
    );
    assert!(AVATARS.contains(&p.avatar.as_deref().unwrap()));

    assert_eq!(h.svc.participants(&g.id).await.unwrap().len(), 1);
    assert_eq!(h.svc.participant(&p.id).await.unwrap(), p);
}

#[tokio::test]
async fn join_keeps_supplied_avatar() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h
        .svc
        .join_giveaway(
            &g.id,
            JoinGiveaway {
                name: "Ayu".into(),
                avatar: Some("https://cdn.example.com/a.png".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(p.avatar.as_deref(), Some("https://cdn.example.com/a.png"));
}

#[tokio::test]
async fn join_rejects_blank_name_and_missing_giveaway() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    assert!(matches!(
        h.svc.join_giveaway(&g.id, join_req("   ")).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        h.svc.join_giveaway("missing", join_req("Rin")).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn join_after_end_is_rejected_and_settles() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(1)).await.unwrap();
    h.svc.join_giveaway(&g.id, join_req("early")).await.unwrap();

    h.clock.advance(Duration::days(2));
    assert!(matches!(
        h.svc.join_giveaway(&g.id, join_req("late")).await,
        Err(Error::GiveawayEnded)
    ));

    let settled = h.svc.get_giveaway(&g.id).await.unwrap();
    assert!(settled.is_ended);
    assert_eq!(settled.winner.unwrap().name, "early");
}

// ===========================================================================
// Ending and winner
// ===========================================================================

#[tokio::test]
async fn expired_giveaway_without_participants_has_no_winner() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(1)).await.unwrap();
    h.clock.advance(Duration::days(1) + Duration::seconds(1));

    let view = h.svc.winner(&g.id).await.unwrap();
    assert!(view.giveaway.giveaway.is_ended);
    assert_eq!(view.giveaway.time_left, "Ended");
    assert!(view.giveaway.giveaway.creator_id.is_empty());
    assert!(view.winner.is_none());
    assert_eq!(view.participant_count, 0);
}

#[tokio::test]
async fn winner_is_drawn_once_and_stays() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(1)).await.unwrap();
    for name in ["a", "b", "c", "d"] {
        h.svc.join_giveaway(&g.id, join_req(name)).await.unwrap();
    }
    h.clock.advance(Duration::days(3));

    let first = h.svc.winner(&g.id).await.unwrap().winner.unwrap();
    for _ in 0..5 {
        let again = h.svc.get_giveaway(&g.id).await.unwrap().winner.unwrap();
        assert_eq!(again.id, first.id);
    }
    assert_eq!(h.svc.winner(&g.id).await.unwrap().participant_count, 4);
}

#[tokio::test]
async fn list_settles_expired_giveaways() {
    let h = harness().await;
    let short = h.svc.create_giveaway(create_req(1)).await.unwrap();
    let long = h.svc.create_giveaway(create_req(10)).await.unwrap();
    h.clock.advance(Duration::days(2));

    let all = h.svc.list_giveaways().await.unwrap();
    let by_id = |id: &str| all.iter().find(|g| g.id == id).unwrap().clone();
    assert!(by_id(&short.id).is_ended);
    assert!(!by_id(&long.id).is_ended);

    let stats = h.svc.public_stats().await;
    assert_eq!(stats.active_giveaways, 1);
    assert_eq!(stats.ended_giveaways, 1);
}

// ===========================================================================
// Referrals
// ===========================================================================

#[tokio::test]
async fn referral_counts_once_per_ip() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();

    let first = h.svc.track_referral(&g.id, &p.id, &visitor(1)).await.unwrap();
    assert!(first.success);
    assert_eq!(first.redirect_url, g.channel_url);

    h.clock.advance(Duration::minutes(2));
    let dup = h.svc.track_referral(&g.id, &p.id, &visitor(1)).await.unwrap();
    assert!(!dup.success);
    assert_eq!(dup.redirect_url, g.channel_url);

    h.clock.advance(Duration::minutes(2));
    assert!(h.svc.track_referral(&g.id, &p.id, &visitor(2)).await.unwrap().success);

    assert_eq!(h.svc.participant(&p.id).await.unwrap().referral_count, 2);

    let referrals = h.svc.referrals(&g.id).await.unwrap();
    assert_eq!(referrals.len(), 3);
    assert_eq!(referrals.iter().filter(|r| r.is_valid).count(), 2);

    let events = h.svc.security_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SecurityEventKind::DuplicateReferral);
    assert_eq!(events[0].ip_address, "203.0.113.1");
    assert_eq!(
        events[0].details,
        format!("IP already referred giveaway {}", g.id)
    );
}

#[tokio::test]
async fn same_ip_may_refer_different_giveaways() {
    let h = harness().await;
    let g1 = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let g2 = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p1 = h.svc.join_giveaway(&g1.id, join_req("a")).await.unwrap();
    let p2 = h.svc.join_giveaway(&g2.id, join_req("b")).await.unwrap();

    assert!(h.svc.track_referral(&g1.id, &p1.id, &visitor(9)).await.unwrap().success);
    assert!(h.svc.track_referral(&g2.id, &p2.id, &visitor(9)).await.unwrap().success);
}

#[tokio::test]
async fn referrer_from_other_giveaway_is_not_credited() {
    let h = harness().await;
    let g1 = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let g2 = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let outsider = h.svc.join_giveaway(&g2.id, join_req("x")).await.unwrap();

    let outcome = h
        .svc
        .track_referral(&g1.id, &outsider.id, &visitor(5))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(h.svc.participant(&outsider.id).await.unwrap().referral_count, 0);
}

#[tokio::test]
async fn bot_user_agent_is_blocked_and_logged() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();

    let bot = ClientInfo::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)), Some("curl/8.4".into()));
    assert!(matches!(
        h.svc.track_referral(&g.id, &p.id, &bot).await,
        Err(Error::BotDetected)
    ));

    let events = h.svc.security_events().await;
    assert_eq!(events[0].kind, SecurityEventKind::SuspiciousUserAgent);
    assert_eq!(events[0].details, "curl/8.4");
    assert!(h.svc.referrals(&g.id).await.unwrap().is_empty());
    assert_eq!(h.svc.participant(&p.id).await.unwrap().referral_count, 0);
}

#[tokio::test]
async fn rapid_requests_trip_bot_detection() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();

    // Six referral visits within a few seconds produce six activity entries.
    for _ in 0..6 {
        h.svc.track_referral(&g.id, &p.id, &visitor(3)).await.unwrap();
        h.clock.advance(Duration::milliseconds(500));
    }
    assert!(matches!(
        h.svc.track_referral(&g.id, &p.id, &visitor(3)).await,
        Err(Error::BotDetected)
    ));
    assert_eq!(
        h.svc.security_events().await[0].kind,
        SecurityEventKind::RapidRequests
    );
}

#[tokio::test]
async fn rate_limit_denies_and_persists_counters() {
    let mut config = RaffleConfig::default();
    config.rate_limit.max_requests = 2;
    let h = harness_with(config).await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();

    h.svc.track_referral(&g.id, &p.id, &visitor(4)).await.unwrap();
    h.clock.advance(Duration::seconds(30));
    h.svc.track_referral(&g.id, &p.id, &visitor(4)).await.unwrap();
    h.clock.advance(Duration::seconds(30));

    match h.svc.track_referral(&g.id, &p.id, &visitor(4)).await {
        Err(Error::RateLimited { reason }) => assert_eq!(reason, "Rate limit exceeded"),
        other => panic!("expected rate limit, got {:?}", other),
    }

    let windows = h.svc.rate_limit_data().await;
    assert_eq!(windows["203.0.113.4"].count, 2);
    assert_eq!(
        h.svc.security_events().await[0].kind,
        SecurityEventKind::RateLimitExceeded
    );

    // Fresh window after fifteen minutes.
    h.clock.advance(Duration::minutes(15));
    assert!(h.svc.track_referral(&g.id, &p.id, &visitor(4)).await.is_ok());
}

#[tokio::test]
async fn burst_limit_denies_through_service_and_logs_ddos_attempt() {
    let mut config = RaffleConfig::default();
    config.rate_limit.max_requests = 100;
    config.rate_limit.ddos_max_requests = 3;
    config.bot.rapid_min_actions = 100;
    let h = harness_with(config).await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();

    for _ in 0..3 {
        h.svc.track_referral(&g.id, &p.id, &visitor(5)).await.unwrap();
        h.clock.advance(Duration::seconds(5));
    }

    match h.svc.track_referral(&g.id, &p.id, &visitor(5)).await {
        Err(Error::RateLimited { reason }) => assert_eq!(reason, "DDoS protection triggered"),
        other => panic!("expected burst denial, got {:?}", other),
    }

    let event = &h.svc.security_events().await[0];
    assert_eq!(event.kind, SecurityEventKind::DdosAttempt);
    assert_eq!(event.ip_address, "203.0.113.5");
    assert_eq!(event.details, "3 requests in 60000ms");

    // Denied visit is not recorded as a referral.
    assert_eq!(h.svc.referrals(&g.id).await.unwrap().len(), 3);
    assert_eq!(h.svc.rate_limit_data().await["ddos_203.0.113.5"].count, 3);

    // Burst window is one minute.
    h.clock.advance(Duration::seconds(60));
    assert!(h.svc.track_referral(&g.id, &p.id, &visitor(5)).await.is_ok());
}

#[tokio::test]
async fn corrupt_rate_window_is_reset_not_fatal() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();

    let mut windows = std::collections::BTreeMap::new();
    windows.insert(
        "ddos_203.0.113.9".to_string(),
        RateWindow {
            count: 1,
            window_start: i64::MIN,
        },
    );
    windows.insert(
        "203.0.113.9".to_string(),
        RateWindow {
            count: 1,
            window_start: i64::MAX,
        },
    );
    h.svc.admin_replace_rate_limits(windows).await.unwrap();

    let outcome = h.svc.track_referral(&g.id, &p.id, &visitor(9)).await.unwrap();
    assert!(outcome.success);

    let now_ms = t0().timestamp_millis();
    let windows = h.svc.rate_limit_data().await;
    assert_eq!(windows["ddos_203.0.113.9"], RateWindow::fresh(now_ms));
    assert_eq!(windows["203.0.113.9"], RateWindow::fresh(now_ms));
}

#[tokio::test]
async fn referral_to_ended_giveaway_redirects_to_winner_page() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(1)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();
    h.clock.advance(Duration::days(2));

    let outcome = h.svc.track_referral(&g.id, &p.id, &visitor(8)).await.unwrap();
    assert_eq!(
        outcome,
        TrackOutcome {
            success: false,
            redirect_url: format!("/winner/{}", g.id),
        }
    );
    assert!(h.svc.referrals(&g.id).await.unwrap().is_empty());
    assert!(h.svc.get_giveaway(&g.id).await.unwrap().is_ended);
}

#[tokio::test]
async fn referral_to_missing_giveaway_is_not_found() {
    let h = harness().await;
    assert!(matches!(
        h.svc.track_referral("nope", "u", &visitor(1)).await,
        Err(Error::NotFound { .. })
    ));
}

// ===========================================================================
// Leaderboard
// ===========================================================================

#[tokio::test]
async fn leaderboard_orders_by_referrals() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let low = h.svc.join_giveaway(&g.id, join_req("low")).await.unwrap();
    let high = h.svc.join_giveaway(&g.id, join_req("high")).await.unwrap();

    for octet in 10..13 {
        h.svc.track_referral(&g.id, &high.id, &visitor(octet)).await.unwrap();
    }
    h.svc.track_referral(&g.id, &low.id, &visitor(20)).await.unwrap();

    let board = h.svc.leaderboard(Some(&g.id)).await.unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].rank, 1);
    assert_eq!(board[0].participant.id, high.id);
    assert_eq!(board[0].participant.referral_count, 3);
    assert_eq!(board[1].participant.id, low.id);

    let global = h.svc.leaderboard(None).await.unwrap();
    assert_eq!(global[0].participant.id, high.id);

    assert!(matches!(
        h.svc.leaderboard(Some("missing")).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn global_leaderboard_is_capped() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    for i in 0..55 {
        h.svc.join_giveaway(&g.id, join_req(&format!("p{i}"))).await.unwrap();
    }
    assert_eq!(h.svc.leaderboard(None).await.unwrap().len(), 50);
    assert_eq!(h.svc.leaderboard(Some(&g.id)).await.unwrap().len(), 55);
}

// ===========================================================================
// Delete
// ===========================================================================

#[tokio::test]
async fn delete_requires_creator_and_cascades() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();
    h.svc.track_referral(&g.id, &p.id, &visitor(1)).await.unwrap();

    assert!(matches!(
        h.svc.delete_giveaway(&g.id, "wrong").await,
        Err(Error::Unauthorized(_))
    ));
    assert!(h.svc.get_giveaway(&g.id).await.is_ok());

    h.svc.delete_giveaway(&g.id, &g.creator_id).await.unwrap();
    assert!(h.svc.get_giveaway(&g.id).await.is_err());
    assert!(h.svc.all_users().await.is_empty());
    assert!(h.svc.all_referrals().await.is_empty());
    assert_eq!(
        h.svc.activity_logs().await[0].action,
        ActivityAction::GiveawayDeleted
    );

    assert!(matches!(
        h.svc.delete_giveaway(&g.id, &g.creator_id).await,
        Err(Error::NotFound { .. })
    ));
}

// ===========================================================================
// Stats and admin
// ===========================================================================

#[tokio::test]
async fn admin_stats_reflect_store() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();
    h.svc.track_referral(&g.id, &p.id, &visitor(1)).await.unwrap();
    h.clock.advance(Duration::minutes(5));
    h.svc.track_referral(&g.id, &p.id, &visitor(1)).await.unwrap();

    let stats = h.svc.admin_stats().await;
    assert_eq!(stats.giveaways.total, 1);
    assert_eq!(stats.giveaways.active, 1);
    assert_eq!(stats.users.total, 1);
    assert_eq!(stats.referrals.total, 2);
    assert_eq!(stats.referrals.valid, 1);
    assert_eq!(stats.security.total_events, 1);
    assert!(stats.activity.recent_activity >= 4);

    h.clock.advance(Duration::days(2));
    assert_eq!(h.svc.admin_stats().await.activity.recent_activity, 0);

    let public = h.svc.public_stats().await;
    assert_eq!(public.total_participants, 1);
    assert_eq!(public.total_referrals, 1);
}

#[tokio::test]
async fn admin_raw_writes() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();

    let mut edited = g.clone();
    edited.title = "Edited".into();
    h.svc.admin_upsert_giveaway(edited).await.unwrap();
    assert_eq!(h.svc.get_giveaway(&g.id).await.unwrap().title, "Edited");

    let mut blank = g.clone();
    blank.id = " ".into();
    assert!(matches!(
        h.svc.admin_upsert_giveaway(blank).await,
        Err(Error::Validation(_))
    ));

    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();
    let mut boosted = p.clone();
    boosted.referral_count = 12;
    h.svc.admin_upsert_user(boosted).await.unwrap();
    assert_eq!(h.svc.participant(&p.id).await.unwrap().referral_count, 12);

    let mut windows = std::collections::BTreeMap::new();
    windows.insert("1.2.3.4".to_string(), RateWindow::fresh(0));
    assert_eq!(h.svc.admin_replace_rate_limits(windows).await.unwrap(), 1);
    assert_eq!(h.svc.rate_limit_data().await.len(), 1);
}

#[tokio::test]
async fn prune_removes_stale_windows() {
    let h = harness().await;
    let g = h.svc.create_giveaway(create_req(3)).await.unwrap();
    let p = h.svc.join_giveaway(&g.id, join_req("Rin")).await.unwrap();
    h.svc.track_referral(&g.id, &p.id, &visitor(1)).await.unwrap();
    assert_eq!(h.svc.rate_limit_data().await.len(), 2);

    h.clock.advance(Duration::hours(1));
    assert_eq!(h.svc.prune_rate_limits().await.unwrap(), 2);
    assert!(h.svc.rate_limit_data().await.is_empty());
}

#[tokio::test]
async fn state_survives_service_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RaffleConfig::default();
    config.store.path = dir.path().join("db.json");

    let id = {
        let svc = GiveawayService::open(config.clone()).await.unwrap();
        let mut req = create_req(3);
        req.end_date = Utc::now() + Duration::days(3);
        svc.create_giveaway(req).await.unwrap().id
    };

    let svc = GiveawayService::open(config).await.unwrap();
    assert_eq!(svc.get_giveaway(&id).await.unwrap().title, "Mechanical keyboard");
}
