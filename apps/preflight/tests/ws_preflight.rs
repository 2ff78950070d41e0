//! End-to-end checks against a running Redis instance. Gated on `REDIS_URL`
//! and ignored by default:
//!
//!   REDIS_URL=redis://127.0.0.1:6379 cargo test -p preflight-gateway -- --ignored

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use gateway_core::redis::{keyspace_channel, RedisHandle};
use gateway_core::router::{self, Gateway};
use gateway_core::{GatewayConfig, OriginAllowList};
use preflight_gateway::push::PreflightFlavor;
use redis::AsyncCommands;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const RUN_ID: &str = "itest-preflight-run";

fn test_config(redis_url: String) -> GatewayConfig {
    GatewayConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        redis_url,
        ping_interval: Duration::from_secs(30),
        pong_timeout: Duration::from_secs(65),
        write_timeout: Duration::from_secs(5),
        redis_request_timeout: Duration::from_secs(5),
        redis_retry_base: Duration::from_secs(1),
        redis_retry_max: Duration::from_secs(5),
        redis_max_retries: 3,
        log_level: "info".into(),
        allowed_origins: vec![],
        metrics_enabled: false,
        max_message_size: 32_768,
    }
}

async fn start_server(config: GatewayConfig) -> (SocketAddr, RedisHandle) {
    let retry = config.retry_policy(false);
    let redis =
        gateway_core::redis::connect(&config.redis_url, config.redis_request_timeout, &retry)
            .await
            .expect("redis bring-up");
    let flavor = PreflightFlavor::new(
        redis.manager.clone(),
        redis.db,
        config.redis_request_timeout,
    );
    let gateway = Arc::new(Gateway {
        retry,
        origins: OriginAllowList::new(vec![]),
        redis: redis.client.clone(),
        flavor,
        metrics: None,
        config,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router::router(gateway))
            .await
            .expect("serve");
    });
    (addr, redis)
}

/// Next non-ping JSON frame, or None when `wait` elapses first.
async fn next_payload(ws: &mut WsStream, wait: Duration) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.checked_duration_since(tokio::time::Instant::now());
        let remaining = match remaining {
            Some(d) if !d.is_zero() => d,
            _ => return None,
        };
        let frame = tokio::time::timeout(remaining, ws.next()).await.ok()??;
        if let Ok(tungstenite::Message::Text(text)) = frame {
            let value: serde_json::Value = serde_json::from_str(&text).ok()?;
            if value["type"] != "ping" {
                return Some(value);
            }
        }
    }
}

/// Simulate a keyspace event for the run's hash; the test environment does
/// not rely on notify-keyspace-events being configured.
async fn publish_keyspace_event(redis: &RedisHandle) {
    let mut conn = redis.manager.clone();
    let channel = keyspace_channel(redis.db, RUN_ID);
    let _: i64 = redis::cmd("PUBLISH")
        .arg(channel)
        .arg("hset")
        .query_async(&mut conn)
        .await
        .expect("publish keyspace event");
}

#[tokio::test]
#[ignore]
async fn initial_push_then_dedup_then_change() {
    let Ok(redis_url) = std::env::var("REDIS_URL") else {
        return;
    };
    let (addr, redis) = start_server(test_config(redis_url)).await;

    let mut conn = redis.manager.clone();
    let _: () = conn.del(RUN_ID).await.expect("reset run hash");
    let _: () = conn
        .hset(RUN_ID, "timestamps:build_channels", "10")
        .await
        .expect("seed");
    let _: () = conn
        .hset(RUN_ID, "timestamps:set_outlet", "5")
        .await
        .expect("seed");
    let _: () = conn
        .hset(RUN_ID, "timestamps:find_outlet", "20")
        .await
        .expect("seed");

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/{RUN_ID}"))
        .await
        .expect("websocket connect");

    // Clients always get the current state before the first notification.
    let first = next_payload(&mut ws, Duration::from_secs(5))
        .await
        .expect("initial preflight payload");
    assert_eq!(first["type"], "preflight");
    assert_eq!(first["checklist"]["channels"], true);
    assert_eq!(first["checklist"]["outlet"], true);
    assert_eq!(first["checklist"]["subcatchments"], false);

    // Let the pub/sub session settle before poking it.
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Events without a hash change must not produce another frame.
    publish_keyspace_event(&redis).await;
    publish_keyspace_event(&redis).await;
    assert_eq!(next_payload(&mut ws, Duration::from_secs(2)).await, None);

    // A real change flows through on the next event.
    let _: () = conn
        .hset(RUN_ID, "timestamps:abstract_watershed", "30")
        .await
        .expect("update");
    publish_keyspace_event(&redis).await;
    let second = next_payload(&mut ws, Duration::from_secs(5))
        .await
        .expect("updated preflight payload");
    assert_eq!(second["checklist"]["subcatchments"], true);

    let _: () = conn.del(RUN_ID).await.expect("cleanup");
}

#[tokio::test]
#[ignore]
async fn rejects_invalid_run_ids() {
    let Ok(redis_url) = std::env::var("REDIS_URL") else {
        return;
    };
    let (addr, _redis) = start_server(test_config(redis_url)).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/bad%20id"))
        .await
        .expect_err("upgrade should be rejected");
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 400),
        other => panic!("unexpected error: {other:?}"),
    }

    let response = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("health request");
    assert_eq!(response.status(), 200);
}
