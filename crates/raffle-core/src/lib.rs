//! Raffle Core - Types, configuration, and error handling

pub mod config;
pub mod error;
pub mod links;
pub mod types;

pub use config::*;
pub use error::{Error, FieldError, Result};
pub use links::*;
pub use types::*;
