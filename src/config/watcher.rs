//! Hot reload of the client configuration file.
//!
//! Every modification of the file is re-parsed and re-validated. Only
//! configurations that validate and actually differ from the last accepted
//! one are forwarded.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ClientConfig;

/// Watches one configuration file and publishes reloaded configurations.
pub struct ConfigWatcher {
    path: PathBuf,
    updates: mpsc::UnboundedSender<ClientConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for reloaded configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ClientConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            updates,
        };
        (watcher, rx)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, updates } = self;
        let last = Mutex::new(load_config(&path).ok());
        let watched = path.clone();

        let mut handle = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = ?e, "Config watch error");
                        return;
                    }
                };
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    reload(&watched, &last, &updates);
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        handle.watch(&path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Watching config file");
        Ok(handle)
    }
}

fn reload(path: &Path, last: &Mutex<Option<ClientConfig>>, updates: &mpsc::UnboundedSender<ClientConfig>) {
    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Rejected config change, keeping current configuration");
            return;
        }
    };

    let mut last = last.lock().expect("config watcher mutex poisoned");
    if last.as_ref() == Some(&config) {
        tracing::debug!(path = ?path, "Config file touched without changes");
        return;
    }

    tracing::info!(path = ?path, "Config reloaded");
    *last = Some(config.clone());
    let _ = updates.send(config);
}
