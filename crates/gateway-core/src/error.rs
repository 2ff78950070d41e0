use thiserror::Error;

/// Errors surfaced by the per-connection loops. The first loop to return one
/// tears the whole connection down.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket transport error: {0}")]
    Socket(#[from] axum::Error),

    /// The peer closed the socket. Treated as a clean exit by the supervisor.
    #[error("client closed the websocket")]
    ClientClosed,

    #[error("write timed out")]
    WriteTimeout,

    #[error("pong timeout exceeded")]
    PongTimeout,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis subscribe failed after {attempts} attempts: {source}")]
    SubscribeExhausted {
        attempts: u32,
        #[source]
        source: redis::RedisError,
    },

    #[error("redis stream interrupted after {attempts} attempts: {source}")]
    StreamExhausted {
        attempts: u32,
        #[source]
        source: redis::RedisError,
    },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Exits that should not be logged as connection failures.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, GatewayError::ClientClosed)
    }
}
