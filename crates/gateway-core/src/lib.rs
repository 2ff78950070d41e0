//! Shared engine for the run gateway services.
//!
//! Both gateway flavors (preflight, status) are a thin push strategy on top
//! of the same machinery: an axum WebSocket endpoint per run, a three-loop
//! connection supervisor (client reads, heartbeats, Redis subscription), and
//! a resubscribe state machine with bounded exponential backoff.

pub mod config;
pub mod connection;
pub mod error;
pub mod liveness;
pub mod origin;
pub mod payload;
pub mod redis;
pub mod retry;
pub mod router;
pub mod server;
pub mod subscribe;
pub mod telemetry;

pub use config::GatewayConfig;
pub use connection::WsSink;
pub use error::GatewayError;
pub use origin::OriginAllowList;
pub use payload::{ClientMessage, ServerMessage};
pub use retry::RetryPolicy;
pub use router::{Gateway, GatewayFlavor};
pub use subscribe::{PushStrategy, SubscribeMode};
