//! Request handlers
//!
//! Public responses never carry a giveaway's creator id; it is returned once,
//! from the create call, and through the admin routes.

use crate::client::resolve_client;
use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    Json,
};
use raffle_core::{
    ActivityLog, AdminStats, CreateGiveaway, Error, FieldError, Giveaway, GiveawayView, JoinGiveaway,
    LeaderboardEntry, Participant, PublicStats, RateWindow, Referral, SecurityEvent, TrackOutcome,
    WinnerView,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

pub const CREATOR_HEADER: &str = "x-creator-id";

type ApiResult<T> = Result<T, ApiError>;
type Shared = State<Arc<AppState>>;

#[derive(Debug, Deserialize)]
pub struct RefQuery {
    #[serde(rename = "ref")]
    pub referrer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackBody {
    pub referrer_id: String,
}

// ---------------------------------------------------------------------------
// Health and stats
// ---------------------------------------------------------------------------

pub async fn health(State(state): Shared) -> impl IntoResponse {
    let giveaways = state.service.store().read(|db| db.giveaways.len()).await;
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "giveaways": giveaways,
    }))
}

pub async fn public_stats(State(state): Shared) -> Json<PublicStats> {
    Json(state.service.public_stats().await)
}

// ---------------------------------------------------------------------------
// Giveaways
// ---------------------------------------------------------------------------

pub async fn list_giveaways(State(state): Shared) -> ApiResult<Json<Vec<GiveawayView>>> {
    let giveaways = state.service.list_giveaways().await?;
    let now = state.service.now();
    Ok(Json(giveaways.iter().map(|g| GiveawayView::new(g, now)).collect()))
}

pub async fn create_giveaway(
    State(state): Shared,
    Json(req): Json<CreateGiveaway>,
) -> ApiResult<(StatusCode, Json<Giveaway>)> {
    let giveaway = state.service.create_giveaway(req).await?;
    Ok((StatusCode::CREATED, Json(giveaway)))
}

pub async fn get_giveaway(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<GiveawayView>> {
    let giveaway = state.service.get_giveaway(&id).await?;
    Ok(Json(GiveawayView::new(&giveaway, state.service.now())))
}

pub async fn delete_giveaway(
    State(state): Shared,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let creator_id = headers
        .get(CREATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::unauthorized("creator id required"))?;
    state.service.delete_giveaway(&id, creator_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn winner(State(state): Shared, Path(id): Path<String>) -> ApiResult<Json<WinnerView>> {
    Ok(Json(state.service.winner(&id).await?))
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

pub async fn join_giveaway(
    State(state): Shared,
    Path(id): Path<String>,
    Json(req): Json<JoinGiveaway>,
) -> ApiResult<(StatusCode, Json<Participant>)> {
    let participant = state.service.join_giveaway(&id, req).await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

pub async fn participants(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Participant>>> {
    Ok(Json(state.service.participants(&id).await?))
}

pub async fn get_user(State(state): Shared, Path(id): Path<String>) -> ApiResult<Json<Participant>> {
    Ok(Json(state.service.participant(&id).await?))
}

pub async fn giveaway_leaderboard(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.service.leaderboard(Some(&id)).await?))
}

pub async fn global_leaderboard(State(state): Shared) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.service.leaderboard(None).await?))
}

// ---------------------------------------------------------------------------
// Referrals
// ---------------------------------------------------------------------------

pub async fn referrals(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Referral>>> {
    Ok(Json(state.service.referrals(&id).await?))
}

/// `GET /g/:id?ref=<user>`: count the visit, then send the visitor on.
pub async fn referral_redirect(
    State(state): Shared,
    Path(id): Path<String>,
    Query(query): Query<RefQuery>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult<Redirect> {
    let referrer = query
        .referrer
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| Error::Validation(vec![FieldError::new("ref", "Referrer is required")]))?;
    let client = resolve_client(peer.map(|c| c.0), &headers, state.trust_forwarded_for)?;
    let outcome = state.service.track_referral(&id, &referrer, &client).await?;
    Ok(Redirect::to(&outcome.redirect_url))
}

/// JSON flavour of the referral redirect, for clients that route themselves.
pub async fn track_referral(
    State(state): Shared,
    Path(id): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<TrackBody>,
) -> ApiResult<Json<TrackOutcome>> {
    let client = resolve_client(peer.map(|c| c.0), &headers, state.trust_forwarded_for)?;
    Ok(Json(
        state
            .service
            .track_referral(&id, &body.referrer_id, &client)
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn admin_stats(State(state): Shared) -> Json<AdminStats> {
    Json(state.service.admin_stats().await)
}

pub async fn admin_security(State(state): Shared) -> Json<Vec<SecurityEvent>> {
    Json(state.service.security_events().await)
}

pub async fn admin_activity(State(state): Shared) -> Json<Vec<ActivityLog>> {
    Json(state.service.activity_logs().await)
}

pub async fn admin_giveaways(State(state): Shared) -> ApiResult<Json<Vec<Giveaway>>> {
    Ok(Json(state.service.list_giveaways().await?))
}

pub async fn admin_put_giveaway(
    State(state): Shared,
    Json(giveaway): Json<Giveaway>,
) -> ApiResult<Json<Giveaway>> {
    Ok(Json(state.service.admin_upsert_giveaway(giveaway).await?))
}

pub async fn admin_users(State(state): Shared) -> Json<Vec<Participant>> {
    Json(state.service.all_users().await)
}

pub async fn admin_put_user(
    State(state): Shared,
    Json(user): Json<Participant>,
) -> ApiResult<Json<Participant>> {
    Ok(Json(state.service.admin_upsert_user(user).await?))
}

pub async fn admin_referrals(State(state): Shared) -> Json<Vec<Referral>> {
    Json(state.service.all_referrals().await)
}

pub async fn admin_rate_limit(State(state): Shared) -> Json<BTreeMap<String, RateWindow>> {
    Json(state.service.rate_limit_data().await)
}

pub async fn admin_put_rate_limit(
    State(state): Shared,
    Json(windows): Json<BTreeMap<String, RateWindow>>,
) -> ApiResult<Json<serde_json::Value>> {
    let entries = state.service.admin_replace_rate_limits(windows).await?;
    Ok(Json(serde_json::json!({ "entries": entries })))
}

pub async fn admin_prune_rate_limit(State(state): Shared) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.service.prune_rate_limits().await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
