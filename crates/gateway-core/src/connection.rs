use std::borrow::Cow;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, decrement_gauge, increment_gauge};
use tokio::sync::Mutex;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::liveness::Liveness;
use crate::payload::{ClientMessage, ServerMessage, HANGUP_FRAME, PING_FRAME};
use crate::retry::RetryPolicy;
use crate::subscribe::{run_subscription, PushStrategy};

/// Serialised write half of the socket. Every write, including the final
/// hangup, is bounded by the configured write timeout.
pub struct WsSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
    write_timeout: Duration,
}

impl WsSink {
    fn new(tx: SplitSink<WebSocket, Message>, write_timeout: Duration) -> Self {
        Self {
            tx: Mutex::new(tx),
            write_timeout,
        }
    }

    pub async fn send_text(&self, frame: impl Into<String>) -> Result<(), GatewayError> {
        let mut tx = self.tx.lock().await;
        match timeout(self.write_timeout, tx.send(Message::Text(frame.into()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                counter!("gateway_write_errors_total", 1);
                Err(err.into())
            }
            Err(_) => {
                counter!("gateway_write_errors_total", 1);
                Err(GatewayError::WriteTimeout)
            }
        }
    }

    /// Encode and write one payload envelope.
    pub async fn send_message(&self, message: &ServerMessage) -> Result<(), GatewayError> {
        let frame = message.encode()?;
        self.send_text(frame).await?;
        counter!("gateway_messages_sent_total", 1);
        Ok(())
    }

    async fn send_hangup(&self) {
        let _ = self.send_text(HANGUP_FRAME).await;
    }

    async fn close(&self) {
        let mut tx = self.tx.lock().await;
        let close = Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Borrowed("closing"),
        }));
        let _ = timeout(self.write_timeout, tx.send(close)).await;
    }
}

/// Drive one accepted WebSocket until any loop fails or the client goes
/// away. The three loops (read, heartbeat, subscription) are polled
/// together; the first error drops the siblings, which cancels their
/// outstanding socket and Redis awaits. A hangup frame is attempted on
/// every exit path before the socket is closed.
pub async fn run_connection<P: PushStrategy>(
    socket: WebSocket,
    redis: redis::Client,
    config: &GatewayConfig,
    retry: RetryPolicy,
    mut push: P,
) -> Result<(), GatewayError> {
    increment_gauge!("gateway_connections_active", 1.0);

    let (tx, mut rx) = socket.split();
    let sink = WsSink::new(tx, config.write_timeout);
    let liveness = Liveness::now();

    let result = async {
        push.initial(&sink).await?;
        tokio::try_join!(
            read_loop(&mut rx, &liveness),
            ping_loop(&sink, &liveness, config.ping_interval, config.pong_timeout),
            run_subscription(
                &redis,
                &retry,
                config.redis_request_timeout,
                &mut push,
                &sink
            ),
        )
        .map(|_| ())
    }
    .await;

    sink.send_hangup().await;
    sink.close().await;

    decrement_gauge!("gateway_connections_active", 1.0);
    result
}

async fn read_loop(
    rx: &mut SplitStream<WebSocket>,
    liveness: &Liveness,
) -> Result<(), GatewayError> {
    while let Some(frame) = rx.next().await {
        match frame? {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => match msg.normalized_kind().as_deref() {
                    Some("pong") | Some("init") => liveness.touch(),
                    other => {
                        // unknown types are ignored for forward compatibility
                        debug!(kind = ?other, "ignoring client message");
                    }
                },
                Err(err) => warn!(error = %err, "invalid client message"),
            },
            Message::Close(_) => return Err(GatewayError::ClientClosed),
            _ => {}
        }
    }
    Err(GatewayError::ClientClosed)
}

async fn ping_loop(
    sink: &WsSink,
    liveness: &Liveness,
    ping_interval: Duration,
    pong_timeout: Duration,
) -> Result<(), GatewayError> {
    // First tick one full interval after accept, like a fresh ticker.
    let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
    loop {
        ticker.tick().await;
        sink.send_text(PING_FRAME).await?;
        debug!("sent ping to client");
        if liveness.expired(pong_timeout) {
            return Err(GatewayError::PongTimeout);
        }
    }
}
