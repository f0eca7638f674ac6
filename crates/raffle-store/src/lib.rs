//! Raffle Store - one JSON document holding every collection
//!
//! The whole document lives in memory behind a single async mutex and is
//! rewritten to disk after every successful mutation.

pub mod document;
pub mod store;

pub use document::{Database, RetentionLimits};
pub use store::JsonStore;
