//! Media transport client (v1)
//!
//! Command-line front end for the transport layer.
//!
//! # Architecture Overview
//!
//! ```text
//!   get/post/put/delete                      watch <topic>
//!          │                                       │
//!          ▼                                       ▼
//!  ┌───────────────────┐                 ┌──────────────────┐
//!  │ TransportSelector │                 │ChannelMultiplexer│
//!  └──┬─────────────┬──┘                 └────────▲─────────┘
//!     │ socket open │ otherwise                   │ Event
//!     ▼             ▼                             │
//!  ┌────────┐   ┌────────────┐   Response  ┌──────┴─────┐
//!  │ Bridge │   │HttpFallback│◀─ ─ ─ ─ ─ ─ │ dispatcher │
//!  └───┬────┘   └─────┬──────┘             └──────▲─────┘
//!      │ Request      │ HTTP                      │
//!      ▼              ▼                           │
//!  ┌─────────────────────────┐                    │
//!  │ Connection (WebSocket)  │────────────────────┘
//!  └─────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;

use media_transport::config::watcher::ConfigWatcher;
use media_transport::config::{load_config, ClientConfig};
use media_transport::lifecycle::{launch, signals::shutdown_signal};
use media_transport::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "media-transport")]
#[command(about = "Call the media server over its socket or HTTP fallback", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a path
    Get { path: String },
    /// POST a JSON body to a path
    Post { path: String, body: String },
    /// PUT a JSON body to a path
    Put { path: String, body: String },
    /// DELETE a path
    Delete { path: String },
    /// Print server-push events for the given topics until interrupted
    Watch {
        #[arg(required = true)]
        topics: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    init_logging(cli.log_level.as_deref().unwrap_or(&config.observability.log_level));
    tracing::info!("media-transport v0.1.0 starting");

    let (updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(updates), Some(watcher.run()?))
        }
        None => (None, None),
    };

    let client = launch(&config, updates);
    let selector = client.selector.clone();

    // Give the socket a chance before the first call when it is preferred.
    if !config.transport.prefer_fallback {
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        if !matches!(tokio::time::timeout(connect_timeout, client.wait_ready()).await, Ok(true)) {
            tracing::warn!("Socket not open yet, first call goes over HTTP");
        }
    }

    let outcome = match cli.command {
        Commands::Get { path } => selector.get(&path).await,
        Commands::Post { path, body } => selector.post(&path, serde_json::from_str(&body)?).await,
        Commands::Put { path, body } => selector.put(&path, serde_json::from_str(&body)?).await,
        Commands::Delete { path } => selector.delete(&path).await,
        Commands::Watch { topics } => {
            let handles: Vec<_> = topics
                .iter()
                .map(|topic| {
                    let topic_name = topic.clone();
                    selector.subscribe(topic.as_str(), move |payload: &Value| {
                        println!("{} {}", topic_name, payload);
                    })
                })
                .collect();

            shutdown_signal().await;
            for handle in &handles {
                selector.unsubscribe(handle);
            }
            Ok(Value::Null)
        }
    };

    drop(selector);
    client.shutdown().await;

    match outcome {
        Ok(Value::Null) => Ok(()),
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(e) => {
            if let Some(detail) = e.api() {
                eprintln!("Error: {}", detail);
                eprintln!("{}", serde_json::to_string_pretty(&detail.body)?);
            } else {
                eprintln!("Error: {}", e);
            }
            std::process::exit(1);
        }
    }
}
