use std::net::SocketAddr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Resolved runtime configuration shared by both gateway flavors.
///
/// Each binary owns its own clap `Cli` (env prefix `PREFLIGHT_` or
/// `STATUS_`) and converts it into this struct at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub redis_url: String,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
    pub redis_request_timeout: Duration,
    pub redis_retry_base: Duration,
    pub redis_retry_max: Duration,
    /// 0 means retry forever.
    pub redis_max_retries: u32,
    pub log_level: String,
    pub allowed_origins: Vec<String>,
    pub metrics_enabled: bool,
    pub max_message_size: usize,
}

impl GatewayConfig {
    pub fn retry_policy(&self, jitter: bool) -> RetryPolicy {
        RetryPolicy::new(
            self.redis_retry_base,
            self.redis_retry_max,
            self.redis_max_retries,
            jitter,
        )
    }
}
