//! Debounced registry reload loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::registry::ServerRegistry;

/// Reload `registry` whenever `changes` fires, coalescing signals that
/// arrive within `debounce` of each other. Returns on shutdown or when every
/// sender is gone.
pub async fn run_reload_loop(
    registry: Arc<ServerRegistry>,
    mut changes: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            received = changes.recv() => {
                if received.is_none() {
                    break;
                }
            }
        }

        let coalesced = drain(&mut changes, debounce).await;
        tracing::debug!(coalesced, "Reload requested");

        let target = registry.clone();
        match tokio::task::spawn_blocking(move || target.reload()).await {
            Ok(Ok(version)) => tracing::info!(version, "Registry reloaded"),
            Ok(Err(_)) => {}
            Err(e) => tracing::error!(error = %e, "Reload task failed"),
        }
    }
    tracing::debug!("Reload loop stopped");
}

/// Swallow signals until `window` passes without a new one.
async fn drain(changes: &mut mpsc::UnboundedReceiver<()>, window: Duration) -> usize {
    let mut count = 0;
    while let Ok(Some(())) = tokio::time::timeout(window, changes.recv()).await {
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_coalesces_burst() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..5 {
            tx.send(()).unwrap();
        }
        assert_eq!(drain(&mut rx, Duration::from_millis(20)).await, 5);
        assert_eq!(drain(&mut rx, Duration::from_millis(20)).await, 0);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let registry = Arc::new(ServerRegistry::default());
        let (_tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_reload_loop(registry, rx, Duration::from_millis(10), stop_rx));
        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
