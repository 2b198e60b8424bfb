//! Application configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::infrastructure::database::DatabaseConfig;

/// Deployment environment. Development logs full error chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Whether redeemed launch tokens are burned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// Tokens flip to `used=1` on redemption.
    SingleUse,
    /// Tokens stay at `used=0` so one token can be redeemed repeatedly.
    /// For manual testing only.
    Reusable,
}

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Primary SQLite database URL
    pub database_url: String,
    /// Predecessor database, enables legacy import when set
    pub legacy_database_url: Option<String>,

    /// Shared secret for the in-world request HMAC
    pub shared_secret: String,

    pub server_host: String,
    pub server_port: u16,

    /// Directory holding attach points and templates
    pub asset_dir: PathBuf,

    pub environment: Environment,
    pub token_mode: TokenMode,
    /// Treat every request as HTTPS (for deployments behind TLS termination
    /// that do not set `X-Forwarded-Proto`)
    pub force_https: bool,

    /// Handoff capacity and lock wait bound
    pub handoff: HandoffConfig,

    /// Outbound callback request timeout
    pub callback_timeout: Duration,

    /// Lifetime of HUD sessions and server-side session data
    pub session_ttl_hours: i64,

    /// Where a successful launch redirects
    pub hud_interface_path: String,
}

/// Concurrency bound for launch token redemption
#[derive(Debug, Clone)]
pub struct HandoffConfig {
    /// Simultaneous redemptions allowed
    pub max_concurrent_redemptions: usize,
    /// Wait bound for a redemption permit and for SQLite write locks
    pub lock_wait_timeout: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str| {
            lookup(key)
                .map(|v| {
                    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
                })
                .unwrap_or(false)
        };

        let shared_secret = lookup("RPHUD_SHARED_SECRET")
            .filter(|s| !s.trim().is_empty())
            .context("RPHUD_SHARED_SECRET environment variable is required")?;

        let environment = match var("APP_ENV", "production").to_ascii_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            _ => Environment::Production,
        };

        let token_mode = if flag("RPHUD_TOKEN_TEST_MODE") {
            TokenMode::Reusable
        } else {
            TokenMode::SingleUse
        };

        Ok(Self {
            database_url: var("DATABASE_URL", "sqlite:data/rphud.db?mode=rwc"),
            legacy_database_url: lookup("LEGACY_DATABASE_URL").filter(|s| !s.trim().is_empty()),

            shared_secret,

            server_host: var("SERVER_HOST", "0.0.0.0"),
            server_port: var("SERVER_PORT", "3000")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,

            asset_dir: PathBuf::from(var("ASSET_DIR", "crates/engine/assets")),

            environment,
            token_mode,
            force_https: flag("RPHUD_FORCE_HTTPS"),

            handoff: HandoffConfig {
                max_concurrent_redemptions: var("MAX_CONCURRENT_REDEMPTIONS", "100")
                    .parse()
                    .context("MAX_CONCURRENT_REDEMPTIONS must be a positive integer")?,
                lock_wait_timeout: Duration::from_millis(
                    var("LOCK_WAIT_TIMEOUT_MS", "5000")
                        .parse()
                        .context("LOCK_WAIT_TIMEOUT_MS must be a number of milliseconds")?,
                ),
            },

            callback_timeout: Duration::from_secs(
                var("CALLBACK_TIMEOUT_SECS", "5").parse().unwrap_or(5),
            ),

            session_ttl_hours: var("SESSION_TTL_HOURS", "24").parse().unwrap_or(24),

            hud_interface_path: var("HUD_INTERFACE_PATH", "/hud"),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database_url.clone(),
            legacy_url: self.legacy_database_url.clone(),
            busy_timeout: self.handoff.lock_wait_timeout,
            max_connections: u32::try_from(self.handoff.max_concurrent_redemptions)
                .unwrap_or(u32::MAX)
                .clamp(1, 16),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours.max(1))
    }
}
