//! OS signal handling.
//!
//! SIGTERM/SIGINT trigger shutdown, SIGHUP requests a registry reload.

use tokio::sync::mpsc;

use crate::lifecycle::Shutdown;

/// Wait for Ctrl+C (or SIGTERM on unix), then trigger `shutdown`.
pub async fn shutdown_on_signal(shutdown: Shutdown) {
    terminate().await;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

/// Forward every SIGHUP as a reload request until shutdown.
#[cfg(unix)]
pub async fn forward_reload_signals(tx: mpsc::UnboundedSender<()>, shutdown: Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable");
            return;
        }
    };
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            received = hangup.recv() => {
                if received.is_none() || tx.send(()).is_err() {
                    break;
                }
                tracing::info!("SIGHUP received, reload requested");
            }
        }
    }
}

#[cfg(not(unix))]
pub async fn forward_reload_signals(_tx: mpsc::UnboundedSender<()>, _shutdown: Shutdown) {}
