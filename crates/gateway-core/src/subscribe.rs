use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use metrics::counter;
use redis::aio::PubSub;
use redis::{Client, RedisResult};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::connection::WsSink;
use crate::error::GatewayError;
use crate::redis::timeout_error;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMode {
    /// `PSUBSCRIBE`: any keyspace event for the run's hash key.
    Pattern,
    /// `SUBSCRIBE`: a single `<run_id>:<channel>` topic.
    Exact,
}

/// The flavor-specific half of a connection: which channel to follow and
/// what to do with each notification. The resubscribe state machine,
/// backoff, and teardown are shared.
#[async_trait]
pub trait PushStrategy: Send {
    fn channel(&self) -> &str;

    fn mode(&self) -> SubscribeMode;

    /// Runs once before the loops start, so clients see state without
    /// waiting for the first notification. Errors here kill the connection.
    async fn initial(&mut self, _sink: &WsSink) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn on_notification(&mut self, body: String, sink: &WsSink) -> Result<(), GatewayError>;
}

/// Subscribe → receive → backoff → resubscribe, until the retry budget is
/// exhausted or the connection is torn down (this future is dropped, which
/// closes the pub/sub session).
///
/// Push failures are logged and swallowed: the next notification retries,
/// and a genuinely dead socket surfaces through the heartbeat loop.
pub async fn run_subscription<P: PushStrategy>(
    client: &Client,
    retry: &RetryPolicy,
    request_timeout: Duration,
    push: &mut P,
    sink: &WsSink,
) -> Result<(), GatewayError> {
    let mut attempt: u32 = 0;
    loop {
        let mut pubsub =
            match open_subscription(client, push.channel(), push.mode(), request_timeout).await {
                Ok(pubsub) => pubsub,
                Err(err) => {
                    attempt += 1;
                    let wait = retry.delay(attempt);
                    warn!(
                        attempt,
                        error = %err,
                        backoff_ms = wait.as_millis() as u64,
                        "redis subscribe failed"
                    );
                    if retry.should_abort(attempt) {
                        return Err(GatewayError::SubscribeExhausted {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    sleep(wait).await;
                    continue;
                }
            };
        counter!("gateway_redis_reconnects_total", 1);
        attempt = 0;

        let mut messages = pubsub.on_message();
        loop {
            match messages.next().await {
                Some(msg) => {
                    attempt = 0;
                    let body: String = msg.get_payload().unwrap_or_default();
                    debug!(channel = msg.get_channel_name(), "redis notification");
                    if let Err(err) = push.on_notification(body, sink).await {
                        warn!(error = %err, "failed to push update");
                    }
                }
                None => {
                    attempt += 1;
                    let wait = retry.delay(attempt);
                    warn!(
                        attempt,
                        backoff_ms = wait.as_millis() as u64,
                        "redis stream interrupted"
                    );
                    if retry.should_abort(attempt) {
                        return Err(GatewayError::StreamExhausted {
                            attempts: attempt,
                            source: timeout_error("pubsub stream closed"),
                        });
                    }
                    drop(messages);
                    sleep(wait).await;
                    break;
                }
            }
        }
    }
}

/// Open a dedicated pub/sub session and wait for the subscribe
/// acknowledgement, all bounded by the Redis request timeout.
async fn open_subscription(
    client: &Client,
    channel: &str,
    mode: SubscribeMode,
    request_timeout: Duration,
) -> RedisResult<PubSub> {
    let subscribe = async {
        let mut pubsub = client.get_async_pubsub().await?;
        match mode {
            SubscribeMode::Pattern => pubsub.psubscribe(channel).await?,
            SubscribeMode::Exact => pubsub.subscribe(channel).await?,
        }
        Ok(pubsub)
    };
    match timeout(request_timeout, subscribe).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error("redis subscribe timed out")),
    }
}
