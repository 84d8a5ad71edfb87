//! Reconnect supervision.
//!
//! # Responsibilities
//! - Keep one Connection alive for a selector
//! - Open a brand-new Connection after each loss, with backoff
//! - Stop and close on shutdown

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::time;

use crate::config::ReconnectConfig;
use crate::resilience::backoff::calculate_backoff;
use crate::transport::fallback::FallbackTransport;
use crate::transport::selector::TransportSelector;

pub struct ReconnectSupervisor<F> {
    selector: Arc<TransportSelector<F>>,
    config: ReconnectConfig,
    ready: watch::Sender<bool>,
}

impl<F: FallbackTransport> ReconnectSupervisor<F> {
    pub fn new(selector: Arc<TransportSelector<F>>, config: ReconnectConfig) -> Self {
        let (ready, _) = watch::channel(false);
        Self { selector, config, ready }
    }

    /// Readiness signal: true while the supervised connection is Open.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Connect, then reconnect after every loss until shutdown.
    ///
    /// With reconnects disabled this connects once and returns when that
    /// connection closes.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut attempt: u32 = 0;

        loop {
            let connection = self.selector.connect();

            tokio::select! {
                opened = connection.wait_open() => {
                    if opened {
                        attempt = 0;
                        self.ready.send_replace(true);
                    }
                }
                _ = shutdown.recv() => break,
            }

            tokio::select! {
                _ = connection.closed() => {}
                _ = shutdown.recv() => break,
            }
            self.ready.send_replace(false);

            if !self.config.enabled {
                tracing::info!("Connection closed and reconnect disabled, supervisor exiting");
                return;
            }

            attempt = attempt.saturating_add(1);
            let delay = calculate_backoff(attempt, self.config.base_delay_ms, self.config.max_delay_ms);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Connection lost, reconnecting"
            );

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Reconnect supervisor received shutdown signal, exiting loop");
        self.ready.send_replace(false);
        self.selector.close();
    }
}
