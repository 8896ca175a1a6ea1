//! Server settings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
/// 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;
pub const DEFAULT_LOG_FILTER: &str = "architect_dispatch=info";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` the listener binds to.
    pub bind_addr: String,
    /// Upper bound on collected request bodies.
    pub body_limit_bytes: usize,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: DEFAULT_BIND.into(),
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            log_filter: DEFAULT_LOG_FILTER.into(),
        }
    }
}
