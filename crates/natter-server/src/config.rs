//! Server configuration loaded from environment variables.
//!
//! Everything except `SESSION_SECRET` has a default suitable for local
//! development. The secret has no fallback: a server that cannot
//! authenticate its own tokens refuses to start.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use natter_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_PASSWORD_ITERATIONS, DEFAULT_PASSWORD_MEMORY_KIB,
    DEFAULT_SESSION_TTL_DAYS, MAX_SESSION_TTL_DAYS, MIN_SESSION_SECRET_LEN,
};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SESSION_SECRET must be set")]
    MissingSecret,

    #[error("SESSION_SECRET must be at least {min} bytes (got {got})")]
    SecretTooShort { min: usize, got: usize },
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None` (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Secret from which the session signing key is derived.
    /// Env: `SESSION_SECRET` (required, at least 32 bytes)
    pub session_secret: Zeroizing<String>,

    /// Session token lifetime in days.
    /// Env: `SESSION_TTL_DAYS`
    /// Default: `7`
    pub session_ttl_days: i64,

    /// Argon2id memory cost in KiB.
    /// Env: `PASSWORD_MEMORY_KIB`
    pub password_memory_kib: u32,

    /// Argon2id iteration count.
    /// Env: `PASSWORD_ITERATIONS`
    pub password_iterations: u32,

    /// Allow any origin, for browser clients served from elsewhere.
    /// Env: `CORS_ALLOW_ANY` (true/false)
    /// Default: `true`
    pub cors_allow_any: bool,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("session_secret", &"<redacted>")
            .field("session_ttl_days", &self.session_ttl_days)
            .field("password_memory_kib", &self.password_memory_kib)
            .field("password_iterations", &self.password_iterations)
            .field("cors_allow_any", &self.cors_allow_any)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// anything absent or unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_secret = Zeroizing::new(
            lookup("SESSION_SECRET")
                .filter(|s| !s.is_empty())
                .ok_or(ConfigError::MissingSecret)?,
        );
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::SecretTooShort {
                min: MIN_SESSION_SECRET_LEN,
                got: session_secret.len(),
            });
        }

        let mut config = Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            session_secret,
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
            password_memory_kib: DEFAULT_PASSWORD_MEMORY_KIB,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
            cors_allow_any: true,
        };

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("SESSION_TTL_DAYS") {
            match val.parse::<i64>() {
                Ok(days) if (1..=MAX_SESSION_TTL_DAYS).contains(&days) => {
                    config.session_ttl_days = days
                }
                _ => tracing::warn!(value = %val, "Invalid SESSION_TTL_DAYS, using default"),
            }
        }

        if let Some(val) = lookup("PASSWORD_MEMORY_KIB") {
            if let Ok(n) = val.parse::<u32>() {
                config.password_memory_kib = n;
            }
        }

        if let Some(val) = lookup("PASSWORD_ITERATIONS") {
            if let Ok(n) = val.parse::<u32>() {
                config.password_iterations = n;
            }
        }

        if let Some(val) = lookup("CORS_ALLOW_ANY") {
            config.cors_allow_any = val != "false" && val != "0";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        Ok(config)
    }
}
