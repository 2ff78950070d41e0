use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{Client, ErrorKind, RedisError};
use thiserror::Error;
use tracing::{info, warn};

use crate::retry::RetryPolicy;

/// Process-wide Redis handles: one client (pub/sub sessions are opened from
/// it per connection) and one auto-reconnecting manager for plain commands.
#[derive(Clone)]
pub struct RedisHandle {
    pub client: Client,
    pub manager: ConnectionManager,
    /// Database number from the connection URL; selects the keyspace
    /// notification channel prefix.
    pub db: i64,
}

#[derive(Debug, Error)]
pub enum BringupError {
    #[error("invalid redis url: {0}")]
    InvalidUrl(#[source] RedisError),
    #[error("redis ping failed: {0}")]
    Ping(#[source] RedisError),
    #[error("redis ping failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: RedisError,
    },
}

/// Bring up the shared Redis handles. A malformed URL fails fast; network
/// failures (DNS, refused, dropped, timeout) are retried on the backoff
/// schedule until `retry` aborts. Anything else is treated as fatal.
pub async fn connect(
    redis_url: &str,
    request_timeout: Duration,
    retry: &RetryPolicy,
) -> Result<RedisHandle, BringupError> {
    let client = Client::open(redis_url).map_err(BringupError::InvalidUrl)?;
    let db = client.get_connection_info().redis.db.max(0);

    let mut attempt: u32 = 0;
    loop {
        match ping(&client, request_timeout).await {
            Ok(manager) => {
                info!(db, "redis connection established");
                return Ok(RedisHandle {
                    client,
                    manager,
                    db,
                });
            }
            Err(err) if is_network_error(&err) => {
                attempt += 1;
                let wait = retry.delay(attempt);
                warn!(
                    attempt,
                    error = %err,
                    backoff_ms = wait.as_millis() as u64,
                    "redis ping failed; retrying"
                );
                if retry.should_abort(attempt) {
                    return Err(BringupError::Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(BringupError::Ping(err)),
        }
    }
}

async fn ping(client: &Client, request_timeout: Duration) -> Result<ConnectionManager, RedisError> {
    let connect = async {
        let mut manager = ConnectionManager::new(client.clone()).await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut manager)
            .await?;
        Ok(manager)
    };
    match tokio::time::timeout(request_timeout, connect).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error("redis ping timed out")),
    }
}

pub(crate) fn timeout_error(message: &'static str) -> RedisError {
    RedisError::from((ErrorKind::IoError, message))
}

/// Network-class failures worth retrying at bring-up: connection-level I/O
/// (covers DNS resolution and premature EOF), timeouts, refusals, drops.
pub fn is_network_error(err: &RedisError) -> bool {
    err.is_io_error() || err.is_timeout() || err.is_connection_refusal() || err.is_connection_dropped()
}

/// Channel carrying keyspace events for a run's hash key.
pub fn keyspace_channel(db: i64, run_id: &str) -> String {
    format!("__keyspace@{db}__:{run_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyspace_channel_includes_the_db_number() {
        assert_eq!(keyspace_channel(2, "abc"), "__keyspace@2__:abc");
        assert_eq!(keyspace_channel(0, "run_1-x"), "__keyspace@0__:run_1-x");
    }

    #[test]
    fn io_errors_are_network_class() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(is_network_error(&io));
        assert!(is_network_error(&timeout_error("timed out")));
    }

    #[test]
    fn protocol_errors_are_not_network_class() {
        let err = RedisError::from((ErrorKind::TypeError, "bad reply"));
        assert!(!is_network_error(&err));
    }

    #[test]
    fn bad_url_fails_fast() {
        assert!(Client::open("not-a-redis-url").is_err());
    }
}
