//! Load server settings from the environment (and a `.env` file when present).

use crate::config::types::ServerConfig;
use crate::error::ConfigError;

pub const ENV_BIND: &str = "ARCHITECT_BIND";
pub const ENV_BODY_LIMIT: &str = "ARCHITECT_BODY_LIMIT";
pub const ENV_LOG: &str = "ARCHITECT_LOG";

impl ServerConfig {
    /// Reads `.env`, then the `ARCHITECT_*` variables over the defaults, then validates.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();
        if let Some(bind) = lookup(ENV_BIND) {
            config.bind_addr = bind;
        }
        if let Some(limit) = lookup(ENV_BODY_LIMIT) {
            config.body_limit_bytes = limit.trim().parse().map_err(|e| ConfigError::Env {
                key: ENV_BODY_LIMIT,
                reason: format!("{}", e),
            })?;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            config.log_filter = filter;
        }
        config.validate()?;
        Ok(config)
    }
}
