use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::redis::keyspace_channel;
use gateway_core::router::GatewayFlavor;
use gateway_core::subscribe::{PushStrategy, SubscribeMode};
use gateway_core::{GatewayError, ServerMessage, WsSink};
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use regex::Regex;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::checklist;

static RUN_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Binds each accepted run id to a hash re-read push strategy on the
/// keyspace notification channel for that key.
pub struct PreflightFlavor {
    redis: ConnectionManager,
    db: i64,
    request_timeout: Duration,
}

impl PreflightFlavor {
    pub fn new(redis: ConnectionManager, db: i64, request_timeout: Duration) -> Self {
        Self {
            redis,
            db,
            request_timeout,
        }
    }
}

impl GatewayFlavor for PreflightFlavor {
    type Push = PreflightPush;

    fn name(&self) -> &'static str {
        "preflight"
    }

    fn reject_message(&self) -> &'static str {
        "invalid run id"
    }

    fn bind(&self, path: &str) -> Option<PreflightPush> {
        if !RUN_ID_PATTERN.is_match(path) {
            return None;
        }
        Some(PreflightPush {
            run_id: path.to_string(),
            channel: keyspace_channel(self.db, path),
            redis: self.redis.clone(),
            request_timeout: self.request_timeout,
            last: None,
        })
    }
}

/// Re-reads the whole run hash on every keyspace event and pushes the
/// derived payload when it differs from the last one delivered. Re-reading
/// instead of applying deltas keeps the connection robust against missed
/// events; the change check keeps it quiet.
pub struct PreflightPush {
    run_id: String,
    channel: String,
    redis: ConnectionManager,
    request_timeout: Duration,
    last: Option<ServerMessage>,
}

#[async_trait]
impl PushStrategy for PreflightPush {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn mode(&self) -> SubscribeMode {
        SubscribeMode::Pattern
    }

    async fn initial(&mut self, sink: &WsSink) -> Result<(), GatewayError> {
        self.push_update(sink).await
    }

    async fn on_notification(&mut self, _body: String, sink: &WsSink) -> Result<(), GatewayError> {
        self.push_update(sink).await
    }
}

impl PreflightPush {
    async fn push_update(&mut self, sink: &WsSink) -> Result<(), GatewayError> {
        let fields = self.fetch_fields().await?;
        let (checklist, lock_statuses) = checklist::evaluate(&fields);
        let payload = ServerMessage::Preflight {
            checklist,
            lock_statuses,
        };

        if self.last.as_ref() == Some(&payload) {
            debug!(run_id = %self.run_id, "preflight unchanged");
            return Ok(());
        }

        sink.send_message(&payload).await?;
        info!(
            run_id = %self.run_id,
            last_modified = ?checklist::extract_last_modified(&fields),
            "preflight update"
        );
        // Recorded only after a successful write, so a failed send is
        // retried by the next notification.
        self.last = Some(payload);
        Ok(())
    }

    async fn fetch_fields(&self) -> Result<HashMap<String, String>, GatewayError> {
        let mut conn = self.redis.clone();
        let fetch = conn.hgetall::<_, HashMap<String, String>>(&self.run_id);
        match timeout(self.request_timeout, fetch).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GatewayError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "redis request timed out",
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_pattern_matches_the_allowed_character_class() {
        for ok in ["abc", "Run_1-x", "0"] {
            assert!(RUN_ID_PATTERN.is_match(ok), "{ok}");
        }
        for bad in ["", "bad id", "run/one", "run:chan", "rün"] {
            assert!(!RUN_ID_PATTERN.is_match(bad), "{bad}");
        }
    }
}
