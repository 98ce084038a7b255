//! Servers directory watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::is_server_file;

/// Watches the servers directory and signals when a server file changes.
///
/// The watcher only signals; loading happens in the reload loop so that a
/// burst of writes results in one registry rebuild.
pub struct ConfigWatcher {
    dir: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for change signals.
    pub fn new(dir: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                dir: dir.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event) {
                        tracing::debug!(paths = ?event.paths, kind = ?event.kind, "Server file changed");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        tracing::info!(dir = %self.dir.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn is_relevant(event: &Event) -> bool {
    let kind = event.kind;
    (kind.is_create() || kind.is_modify() || kind.is_remove())
        && event.paths.iter().any(|path| is_server_file(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind};

    #[test]
    fn test_relevant_events() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/srv/a.proxy.toml"));
        assert!(is_relevant(&event));

        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/srv/a.proxy.tmp"));
        assert!(!is_relevant(&event));

        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/srv/a.proxy.toml"));
        assert!(!is_relevant(&event));
    }
}
