//! Raffle Engine - referral screening, winner draw, and the service layer

pub mod bot;
pub mod clock;
pub mod rate_limit;
pub mod service;
pub mod winner;

pub use bot::BotDetector;
pub use clock::{Clock, FixedClock, SystemClock};
pub use rate_limit::{RateDecision, RateLimiter};
pub use service::GiveawayService;
pub use winner::select_winner;
