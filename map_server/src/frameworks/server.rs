// Framework bootstrap for the map authority runtime.

use crate::frameworks::config;
use crate::interface_adapters::net::{room_info_handler, ws_handler};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{RoomRegistry, RoomSettings};

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state();
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms/{room_id}", get(room_info_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    map_editor::init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Arc<AppState> {
    let settings = RoomSettings {
        event_channel_capacity: config::ROOM_EVENT_CHANNEL_CAPACITY,
        broadcast_capacity: config::ROOM_BROADCAST_CAPACITY,
        history_capacity: config::room_history_capacity(),
        idle_timeout: config::room_idle_timeout(),
        max_rooms: config::max_rooms(),
    };
    tracing::debug!(
        history_capacity = settings.history_capacity,
        idle_timeout_secs = settings.idle_timeout.as_secs(),
        max_rooms = settings.max_rooms,
        "room settings"
    );

    Arc::new(AppState {
        room_registry: Arc::new(RoomRegistry::new(settings)),
    })
}
