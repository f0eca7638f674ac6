//! Raffle Gateway - HTTP API over the giveaway service

pub mod auth;
pub mod client;
pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, start_gateway, AppState};
