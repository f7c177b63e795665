// Process bootstrap: tracing, environment and the headless editor client.

use crate::domain::MapCommand;
use crate::frameworks::client::{EditorClient, EditorSettings};
use crate::frameworks::config;
use crate::interface_adapters::HttpPrefabCatalog;
use crate::interface_adapters::protocol::CommandMessage;
use crate::use_cases::{EditorHandle, EditorUpdate};
use std::io::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Loads `.env`, installs the tracing subscriber and the panic hook.
pub fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Runs a headless editor until Ctrl-C.
///
/// Each stdin line is a JSON command message, or one of `undo`, `redo`, `snapshot`.
pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let catalog_url = config::prefab_catalog_url();
    let catalog = HttpPrefabCatalog::new(&catalog_url, config::catalog_timeout())
        .inspect_err(|e| tracing::error!(%catalog_url, error = %e, "invalid catalog settings"))
        .map_err(|e| std::io::Error::other(format!("failed to initialize prefab catalog: {e}")))?;

    let settings = EditorSettings::from_env();
    info!(
        authority = %settings.connection.url,
        room_id = %settings.connection.room_id,
        %catalog_url,
        "starting editor client"
    );
    let client = EditorClient::start(settings, Arc::new(catalog));
    tokio::spawn(log_updates(client.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => run_line(client.handle(), line.trim()).await,
                Ok(None) => {
                    // Keep mirroring the room after input ends.
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
        }
    }

    info!("shutting down editor client");
    client.shutdown().await;
    Ok(())
}

async fn run_line(handle: &EditorHandle, line: &str) {
    let result = match line {
        "" => return,
        "undo" => handle.undo().await.map(|o| format!("{:?}", o.state)),
        "redo" => handle.redo().await.map(|o| format!("{:?}", o.state)),
        "snapshot" => handle.snapshot().await.map(|s| {
            format!(
                "{} prefabs, {} entities, {} blocked cells (generation {})",
                s.prefabs.len(),
                s.entities.len(),
                s.blocked_cells,
                s.collision_generation
            )
        }),
        _ => match serde_json::from_str::<CommandMessage>(line) {
            Ok(message) => match MapCommand::try_from(message) {
                Ok(command) => handle
                    .submit(command)
                    .await
                    .map(|o| format!("{} {:?}", o.command_id, o.state)),
                Err(e) => Err(e),
            },
            Err(e) => {
                warn!(error = %e, "stdin line is not a command message");
                return;
            }
        },
    };
    match result {
        Ok(summary) => info!(input = line, %summary, "done"),
        Err(e) => warn!(input = line, error = %e, "failed"),
    }
}

async fn log_updates(mut updates_rx: broadcast::Receiver<EditorUpdate>) {
    loop {
        match updates_rx.recv().await {
            Ok(EditorUpdate::CommandFailed {
                command_id,
                kind,
                origin,
                error,
            }) => warn!(%command_id, %kind, ?origin, %error, "command failed"),
            Ok(EditorUpdate::CommandWarning { command_id, error }) => {
                warn!(%command_id, %error, "command applied with warning")
            }
            Ok(EditorUpdate::ConnectionChanged { connected }) => info!(connected, "connection"),
            Ok(update) => debug!(?update, "editor update"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "update log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
