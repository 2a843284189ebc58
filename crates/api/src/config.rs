//! Server settings loaded from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use stagebill_infra::{BillingConfig, ConfigError};

const DEV_JWT_SECRET: &str = "dev-secret";

/// | Env Var                       | Default        |
/// |-------------------------------|----------------|
/// | `BIND_ADDR`                   | `0.0.0.0:8080` |
/// | `JWT_SECRET`                  | dev secret     |
/// | `OVERDUE_SWEEP_INTERVAL_SECS` | `3600` (`0` disables) |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// `None` when the periodic sweep is disabled.
    pub overdue_sweep_interval: Option<Duration>,
    pub billing: BillingConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr: SocketAddr = match lookup("BIND_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "BIND_ADDR",
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let interval_secs: u64 = match lookup("OVERDUE_SWEEP_INTERVAL_SECS") {
            Some(raw) => raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                var: "OVERDUE_SWEEP_INTERVAL_SECS",
                reason: e.to_string(),
            })?,
            None => 3600,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            overdue_sweep_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            billing: BillingConfig::from_lookup(lookup)?,
        })
    }
}
