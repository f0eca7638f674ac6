//! HTTP server: shared state, router, and listener

use crate::auth::{require_admin, AdminGate};
use crate::routes;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use raffle_core::RaffleConfig;
use raffle_engine::GiveawayService;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for request handlers.
pub struct AppState {
    pub service: Arc<GiveawayService>,
    pub auth: AdminGate,
    /// Take client IPs from `X-Forwarded-For`.
    pub trust_forwarded_for: bool,
    /// When the gateway started.
    pub started_at: std::time::Instant,
}

impl AppState {
    pub fn new(service: Arc<GiveawayService>) -> Self {
        let config = service.config();
        Self {
            auth: AdminGate::from_config(&config.auth),
            trust_forwarded_for: config.server.trust_forwarded_for,
            service,
            started_at: std::time::Instant::now(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/stats", get(routes::admin_stats))
        .route("/security", get(routes::admin_security))
        .route("/activity", get(routes::admin_activity))
        .route(
            "/giveaways",
            get(routes::admin_giveaways).put(routes::admin_put_giveaway),
        )
        .route(
            "/users",
            get(routes::admin_users).put(routes::admin_put_user),
        )
        .route("/referrals", get(routes::admin_referrals))
        .route(
            "/rate-limit",
            get(routes::admin_rate_limit).put(routes::admin_put_rate_limit),
        )
        .route("/rate-limit/prune", post(routes::admin_prune_rate_limit))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api = Router::new()
        .route("/stats", get(routes::public_stats))
        .route(
            "/giveaways",
            get(routes::list_giveaways).post(routes::create_giveaway),
        )
        .route(
            "/giveaways/:id",
            get(routes::get_giveaway).delete(routes::delete_giveaway),
        )
        .route("/giveaways/:id/join", post(routes::join_giveaway))
        .route("/giveaways/:id/participants", get(routes::participants))
        .route(
            "/giveaways/:id/referrals",
            get(routes::referrals).post(routes::track_referral),
        )
        .route("/giveaways/:id/leaderboard", get(routes::giveaway_leaderboard))
        .route("/giveaways/:id/winner", get(routes::winner))
        .route("/leaderboard", get(routes::global_leaderboard))
        .route("/users/:id", get(routes::get_user))
        .nest("/admin", admin);

    Router::new()
        .route("/health", get(routes::health))
        .route("/g/:id", get(routes::referral_redirect))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Bind, serve, and block until the listener fails.
pub async fn start_gateway(config: RaffleConfig) -> anyhow::Result<()> {
    let service = Arc::new(GiveawayService::open(config.clone()).await?);
    let state = Arc::new(AppState::new(service));

    if state.auth.is_locked() {
        tracing::warn!("No admin token configured; admin endpoints will reject every request");
    }

    let app = build_router(state);

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind.to_addr(), config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {}", e))?;

    info!("Raffle Gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Public URL:   {}", config.server.public_base_url);
    info!("  Store:        {}", config.store.path.display());
    info!("  Auth mode:    {:?}", config.auth.mode);
    if config.server.trust_forwarded_for {
        info!("  Client IPs taken from X-Forwarded-For");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
