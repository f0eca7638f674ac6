//! Service configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaffleConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub bot: BotConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: BindMode,
    /// Origin used when building referral links.
    pub public_base_url: String,
    /// Take the client IP from `X-Forwarded-For` (only behind a proxy you run).
    pub trust_forwarded_for: bool,
}

/// Bind mode for the HTTP server
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "loopback" | "localhost" | "127.0.0.1" => BindMode::Loopback,
            _ => BindMode::Lan,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

/// Admin authentication configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token: Option<String>,
}

/// Authentication mode
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Token,
    None,
}

/// Fixed-window limits applied to referral visits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_requests: u32,
    pub ddos_window_ms: i64,
    pub ddos_max_requests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Case-insensitive substrings that mark a user agent as automated.
    pub suspicious_user_agents: Vec<String>,
    /// How far back activity is considered when looking for bursts.
    pub rapid_window_ms: i64,
    /// A burst needs strictly more than this many actions.
    pub rapid_min_actions: usize,
    /// ...all within this span.
    pub rapid_span_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub activity_logs: usize,
    pub security_events: usize,
    /// Window used for the admin "recent activity" counter.
    pub recent_activity_hours: i64,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            bind: BindMode::default(),
            public_base_url: "http://localhost:3000".into(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/db.json"),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            max_requests: 10,
            ddos_window_ms: 60 * 1000,
            ddos_max_requests: 50,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            suspicious_user_agents: [
                "bot", "crawler", "spider", "scraper", "curl", "wget", "python", "requests",
                "axios", "fetch",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rapid_window_ms: 60 * 1000,
            rapid_min_actions: 5,
            rapid_span_ms: 10 * 1000,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            activity_logs: 1000,
            security_events: 500,
            recent_activity_hours: 24,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl RaffleConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Strict variant for callers that want a broken file to stop startup.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::ConfigError(e.to_string()))
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Fill a missing admin token from the environment.
    pub fn with_env_token(mut self, env_token: Option<String>) -> Self {
        if self.auth.token.is_none() {
            self.auth.token = env_token;
        }
        self
    }
}
