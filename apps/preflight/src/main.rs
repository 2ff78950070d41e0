use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::router::Gateway;
use gateway_core::{GatewayConfig, OriginAllowList};
use metrics_exporter_prometheus::PrometheusHandle;
use preflight_gateway::push::PreflightFlavor;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "preflight-gateway",
    author,
    version,
    about = "WebSocket gateway pushing run readiness checklists from Redis"
)]
struct Cli {
    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "PREFLIGHT_LISTEN_ADDR", default_value = "0.0.0.0:9001")]
    listen_addr: String,

    /// Redis connection URI; its database number selects the keyspace
    /// notification channel prefix.
    #[arg(
        long,
        env = "PREFLIGHT_REDIS_URL",
        default_value = "redis://127.0.0.1:6379"
    )]
    redis_url: String,

    /// Interval between heartbeat pings.
    #[arg(long, env = "PREFLIGHT_PING_INTERVAL", default_value = "30s", value_parser = humantime::parse_duration)]
    ping_interval: Duration,

    /// How long a client may stay silent after a ping before it is dropped.
    #[arg(long, env = "PREFLIGHT_PONG_TIMEOUT", default_value = "65s", value_parser = humantime::parse_duration)]
    pong_timeout: Duration,

    /// Per-write deadline on the WebSocket, including the final hangup.
    #[arg(long, env = "PREFLIGHT_WRITE_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    write_timeout: Duration,

    /// Deadline for individual Redis requests (subscribe ack, hash reads).
    #[arg(long, env = "PREFLIGHT_REDIS_REQUEST_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    redis_request_timeout: Duration,

    /// First retry delay for Redis subscribe/bring-up failures.
    #[arg(long, env = "PREFLIGHT_REDIS_RETRY_BASE", default_value = "1s", value_parser = humantime::parse_duration)]
    redis_retry_base: Duration,

    /// Ceiling on the exponential retry delay.
    #[arg(long, env = "PREFLIGHT_REDIS_RETRY_MAX", default_value = "30s", value_parser = humantime::parse_duration)]
    redis_retry_max: Duration,

    /// Retry budget before giving up; 0 retries forever.
    #[arg(long, env = "PREFLIGHT_REDIS_MAX_RETRIES", default_value_t = 0)]
    redis_max_retries: u32,

    /// Log verbosity when RUST_LOG is not set.
    #[arg(
        long,
        env = "PREFLIGHT_LOG_LEVEL",
        default_value = "info",
        value_parser = ["debug", "info", "warn", "error"],
    )]
    log_level: String,

    /// Comma-separated origin host patterns; empty disables the check.
    #[arg(
        long,
        env = "PREFLIGHT_ALLOWED_ORIGINS",
        value_delimiter = ',',
        num_args = 0..,
    )]
    allowed_origins: Vec<String>,

    /// Expose Prometheus metrics on /metrics.
    #[arg(
        long,
        env = "PREFLIGHT_METRICS_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set,
    )]
    metrics_enabled: bool,

    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long, env = "PREFLIGHT_MAX_MESSAGE_SIZE", default_value_t = 32_768)]
    max_message_size: usize,
}

impl TryFrom<Cli> for GatewayConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        Ok(GatewayConfig {
            listen_addr,
            redis_url: cli.redis_url,
            ping_interval: cli.ping_interval,
            pong_timeout: cli.pong_timeout,
            write_timeout: cli.write_timeout,
            redis_request_timeout: cli.redis_request_timeout,
            redis_retry_base: cli.redis_retry_base,
            redis_retry_max: cli.redis_retry_max,
            redis_max_retries: cli.redis_max_retries,
            log_level: cli.log_level,
            allowed_origins: cli.allowed_origins,
            metrics_enabled: cli.metrics_enabled,
            max_message_size: cli.max_message_size,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(1);
    });
    let config = GatewayConfig::try_from(cli)?;
    let metrics = gateway_core::telemetry::init(&config.log_level, config.metrics_enabled)?;

    info!(
        listen_addr = %config.listen_addr,
        redis_url = %config.redis_url,
        "starting preflight gateway"
    );

    run(config, metrics).await
}

async fn run(config: GatewayConfig, metrics: Option<PrometheusHandle>) -> Result<()> {
    let retry = config.retry_policy(false);
    let redis = gateway_core::redis::connect(&config.redis_url, config.redis_request_timeout, &retry)
        .await
        .context("redis bring-up failed")?;

    let flavor = PreflightFlavor::new(redis.manager.clone(), redis.db, config.redis_request_timeout);
    let listen_addr = config.listen_addr;
    let gateway = Arc::new(Gateway {
        retry,
        origins: OriginAllowList::new(config.allowed_origins.clone()),
        redis: redis.client,
        flavor,
        metrics,
        config,
    });

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .context("failed to bind listener")?;
    info!("preflight gateway listening on {listen_addr}");

    gateway_core::server::serve(listener, gateway_core::router::router(gateway)).await
}
