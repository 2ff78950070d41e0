use async_trait::async_trait;
use gateway_core::router::GatewayFlavor;
use gateway_core::subscribe::{PushStrategy, SubscribeMode};
use gateway_core::{GatewayError, ServerMessage, WsSink};
use once_cell::sync::Lazy;
use regex::Regex;

static CHANNEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+:[A-Za-z0-9_-]+$").unwrap());

/// Binds each accepted `<run_id>:<channel>` path to a verbatim forwarding
/// strategy on that exact pub/sub topic.
#[derive(Debug, Default)]
pub struct StatusFlavor;

impl GatewayFlavor for StatusFlavor {
    type Push = StatusPush;

    fn name(&self) -> &'static str {
        "status"
    }

    fn reject_message(&self) -> &'static str {
        "invalid channel"
    }

    fn bind(&self, path: &str) -> Option<StatusPush> {
        if !CHANNEL_PATTERN.is_match(path) {
            return None;
        }
        Some(StatusPush {
            channel: path.to_string(),
        })
    }
}

/// Forwards message bodies as they arrive. No de-duplication: consecutive
/// identical publishes are meaningful to status consumers.
pub struct StatusPush {
    channel: String,
}

#[async_trait]
impl PushStrategy for StatusPush {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn mode(&self) -> SubscribeMode {
        SubscribeMode::Exact
    }

    async fn on_notification(&mut self, body: String, sink: &WsSink) -> Result<(), GatewayError> {
        sink.send_message(&ServerMessage::Status { data: body }).await
    }
}
