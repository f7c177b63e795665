// Wiring of a complete editor client: connection, dispatcher and editor task.

use crate::domain::PrefabCatalog;
use crate::frameworks::config;
use crate::interface_adapters::{ConnectionSettings, WsConnection};
use crate::use_cases::{
    CommandDispatcher, DispatcherSettings, EditorHandle, EditorUpdate, MapState, editor_task,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

#[derive(Debug, Clone)]
pub struct EditorSettings {
    pub connection: ConnectionSettings,
    pub dispatcher: DispatcherSettings,
    pub map_width: u32,
    pub map_height: u32,
    pub ack_sweep_interval: Duration,
}

impl EditorSettings {
    pub fn from_env() -> Self {
        Self {
            connection: ConnectionSettings {
                url: config::authority_ws_url(),
                room_id: config::map_room_id(),
                reconnect_delay: config::RECONNECT_DELAY,
                handshake_timeout: config::HANDSHAKE_TIMEOUT,
                outgoing_capacity: config::OUTGOING_CHANNEL_CAPACITY,
            },
            dispatcher: DispatcherSettings {
                undo_history_limit: config::undo_history_limit(),
                dedup_window: config::command_dedup_window(),
                ack_timeout: config::ack_timeout(),
                offline_policy: config::offline_policy(),
                outbox_capacity: config::OUTBOX_CAPACITY,
            },
            map_width: config::map_width(),
            map_height: config::map_height(),
            ack_sweep_interval: config::ACK_SWEEP_INTERVAL,
        }
    }
}

/// A running editor connected (or reconnecting) to one room.
pub struct EditorClient {
    handle: EditorHandle,
    updates_tx: broadcast::Sender<EditorUpdate>,
    editor_shutdown: Arc<Notify>,
    connection_shutdown: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl EditorClient {
    pub fn start(settings: EditorSettings, catalog: Arc<dyn PrefabCatalog>) -> Self {
        // The connection forwards into the editor, and the dispatcher emits through
        // the connection, so the editor channel has to exist first.
        let (events_tx, events_rx) = mpsc::channel(config::EDITOR_CHANNEL_CAPACITY);
        let handle = EditorHandle::new(events_tx);
        let (updates_tx, _updates_rx) = broadcast::channel(config::UPDATE_BROADCAST_CAPACITY);

        let connection_shutdown = Arc::new(Notify::new());
        let room_id = settings.connection.room_id.clone();
        let (connection, connection_task) = WsConnection::spawn(
            settings.connection,
            handle.clone(),
            connection_shutdown.clone(),
        );

        let dispatcher = CommandDispatcher::new(
            MapState::new(catalog, settings.map_width, settings.map_height),
            Arc::new(connection),
            settings.dispatcher,
            updates_tx.clone(),
        );

        let editor_shutdown = Arc::new(Notify::new());
        let editor = tokio::spawn(
            editor_task(
                dispatcher,
                events_rx,
                settings.ack_sweep_interval,
                editor_shutdown.clone(),
            )
            .instrument(info_span!("editor", %room_id)),
        );

        Self {
            handle,
            updates_tx,
            editor_shutdown,
            connection_shutdown,
            tasks: vec![connection_task, editor],
        }
    }

    pub fn handle(&self) -> &EditorHandle {
        &self.handle
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorUpdate> {
        self.updates_tx.subscribe()
    }

    /// Stops the connection first so nothing new arrives, then the editor.
    pub async fn shutdown(self) {
        self.connection_shutdown.notify_one();
        self.editor_shutdown.notify_one();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
