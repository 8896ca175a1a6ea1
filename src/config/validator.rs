//! Server settings validation.

use crate::config::types::ServerConfig;
use crate::error::ConfigError;
use std::net::SocketAddr;

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.body_limit_bytes == 0 {
            return Err(ConfigError::Validation("body_limit_bytes must be positive".into()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Validation("log_filter must not be empty".into()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|_| {
            ConfigError::Validation(format!("bind_addr '{}' is not host:port", self.bind_addr))
        })
    }
}
