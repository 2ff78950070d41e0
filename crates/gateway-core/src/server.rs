use std::future::IntoFuture;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// In-flight connections get this long to drain after a shutdown signal
/// before the process exits anyway.
const DRAIN_DEADLINE: Duration = Duration::from_secs(15);

/// Serve until SIGINT/SIGTERM, then drain gracefully with a bounded
/// deadline.
pub async fn serve(listener: TcpListener, router: Router) -> Result<()> {
    let (drain_tx, drain_rx) = watch::channel(false);

    let graceful = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received; draining connections");
            let _ = drain_tx.send(true);
        })
        .into_future();

    tokio::select! {
        result = graceful => result.context("server shutdown with error")?,
        _ = drain_deadline(drain_rx) => {
            warn!(
                deadline_secs = DRAIN_DEADLINE.as_secs(),
                "graceful drain deadline exceeded; exiting"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

async fn drain_deadline(mut drain_rx: watch::Receiver<bool>) {
    while !*drain_rx.borrow() {
        if drain_rx.changed().await.is_err() {
            // Sender gone means the server already finished; never resolve.
            std::future::pending::<()>().await;
        }
    }
    tokio::time::sleep(DRAIN_DEADLINE).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
