//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics when enabled
//! - Build the selector with the HTTP fallback
//! - Start the reconnect supervisor and config hot-reload applier

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::transport::{HttpFallback, ReconnectSupervisor, TransportSelector};

/// A running client: the selector plus its background tasks.
pub struct Client {
    pub selector: Arc<TransportSelector<HttpFallback>>,
    pub shutdown: Shutdown,
    ready: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Client {
    /// Wait until the socket is Open. Returns false if the supervisor stopped first.
    pub async fn wait_ready(&self) -> bool {
        let mut ready = self.ready.clone();
        let ok = ready.wait_for(|open| *open).await.is_ok();
        ok
    }

    /// Signal shutdown and wait for background tasks to finish.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            let _ = task.await;
        }
        self.selector.close();
        tracing::info!("Client stopped");
    }
}

/// Start a client from a validated configuration.
///
/// `config_updates` carries reloaded configurations; only the `[transport]`
/// section is applied live.
pub fn launch(config: &ClientConfig, config_updates: Option<mpsc::UnboundedReceiver<ClientConfig>>) -> Client {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let fallback = HttpFallback::new(&config.endpoint.http_base_url);
    let selector = Arc::new(TransportSelector::new(config, fallback));
    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    tracing::info!(
        socket_url = %config.endpoint.socket_url,
        http_base_url = %config.endpoint.http_base_url,
        prefer_fallback = config.transport.prefer_fallback,
        "Starting transport client"
    );

    let supervisor = ReconnectSupervisor::new(Arc::clone(&selector), config.reconnect.clone());
    let ready = supervisor.ready();
    tasks.push(tokio::spawn(supervisor.run(shutdown.subscribe())));

    if let Some(mut updates) = config_updates {
        let selector = Arc::clone(&selector);
        let mut stop = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(new_config) => selector.apply_transport_config(new_config.transport),
                        None => break,
                    },
                    _ = stop.recv() => break,
                }
            }
        }));
    }

    Client {
        selector,
        shutdown,
        ready,
        tasks,
    }
}
