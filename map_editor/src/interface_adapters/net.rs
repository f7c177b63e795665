// Websocket connection to the map authority.

use crate::domain::{EditorError, MapCommand, MapConnection};
use crate::interface_adapters::protocol::{
    ClientMessage, CommandMessage, JoinPayload, SequencedCommand, ServerMessage,
};
use crate::use_cases::EditorHandle;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, debug, info, info_span, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
enum NetError {
    #[allow(dead_code)]
    Ws(tokio_tungstenite::tungstenite::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    HandshakeTimeout,
    #[allow(dead_code)]
    Rejected(String),
    ServerClosed,
    EditorClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for NetError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        NetError::Ws(e)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub room_id: String,
    pub reconnect_delay: Duration,
    pub handshake_timeout: Duration,
    pub outgoing_capacity: usize,
}

/// `MapConnection` backed by a background websocket task.
///
/// Emission only enqueues the serialized command; the task writes it. While the
/// socket is down every emit fails with `NetworkUnavailable`.
pub struct WsConnection {
    outgoing_tx: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
}

impl WsConnection {
    /// Starts the connection task. It runs until `shutdown` fires.
    pub fn spawn(
        settings: ConnectionSettings,
        editor: EditorHandle,
        shutdown: Arc<Notify>,
    ) -> (Self, JoinHandle<()>) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(settings.outgoing_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(false));
        let span = info_span!("connection", room_id = %settings.room_id);
        let task = tokio::spawn(
            connection_task(settings, editor, outgoing_rx, connected.clone(), shutdown)
                .instrument(span),
        );
        (
            Self {
                outgoing_tx,
                connected,
            },
            task,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl MapConnection for WsConnection {
    fn emit_map_editor_command(&self, command: &MapCommand) -> Result<(), EditorError> {
        if !self.is_connected() {
            return Err(EditorError::NetworkUnavailable(
                "not connected to the authority".to_string(),
            ));
        }
        let message = ClientMessage::MapEditorCommand(CommandMessage::from(command));
        let text = serde_json::to_string(&message)
            .map_err(|e| EditorError::InvalidPayload(e.to_string()))?;
        self.outgoing_tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                EditorError::NetworkUnavailable("outgoing buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                EditorError::NetworkUnavailable("connection task stopped".to_string())
            }
        })
    }
}

async fn connection_task(
    settings: ConnectionSettings,
    editor: EditorHandle,
    mut outgoing_rx: mpsc::Receiver<String>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    // Survives reconnects so the authority only replays what we have not applied.
    let mut last_seq: Option<u64> = None;

    loop {
        let attempt = tokio::select! {
            _ = shutdown.notified() => break,
            attempt = connect_async(settings.url.as_str()) => attempt,
        };

        let stop = match attempt {
            Ok((stream, _response)) => {
                info!(url = %settings.url, "connected to authority");
                let result = run_session(
                    stream,
                    &settings,
                    &editor,
                    &mut outgoing_rx,
                    &connected,
                    &shutdown,
                    &mut last_seq,
                )
                .await;
                mark_disconnected(&connected, &editor).await;
                match result {
                    Ok(SessionEnd::Shutdown) => true,
                    Ok(SessionEnd::Dropped) => false,
                    Err(NetError::EditorClosed) => true,
                    Err(e) => {
                        warn!(error = ?e, "session ended with error");
                        false
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, url = %settings.url, "connect failed");
                false
            }
        };
        if stop {
            break;
        }

        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(settings.reconnect_delay) => {}
        }
    }

    connected.store(false, Ordering::SeqCst);
    info!(?last_seq, "connection task stopped");
}

enum SessionEnd {
    Shutdown,
    Dropped,
}

async fn mark_disconnected(connected: &AtomicBool, editor: &EditorHandle) {
    if connected.swap(false, Ordering::SeqCst) {
        let _ = editor.connection_changed(false).await;
    }
}

async fn run_session(
    stream: WsStream,
    settings: &ConnectionSettings,
    editor: &EditorHandle,
    outgoing_rx: &mut mpsc::Receiver<String>,
    connected: &AtomicBool,
    shutdown: &Notify,
    last_seq: &mut Option<u64>,
) -> Result<SessionEnd, NetError> {
    let (mut write, mut read) = stream.split();

    let join = ClientMessage::Join(JoinPayload {
        room_id: settings.room_id.clone(),
        last_seq: *last_seq,
    });
    let text = serde_json::to_string(&join).map_err(NetError::Serialization)?;
    write.send(Message::Text(text.into())).await?;

    // The welcome must come before anything else.
    let welcome = tokio::time::timeout(settings.handshake_timeout, read.next())
        .await
        .map_err(|_| NetError::HandshakeTimeout)?;
    match welcome.transpose()?.map(|m| decode(&m)) {
        Some(Some(ServerMessage::Welcome {
            client_id,
            head_seq,
            replay_truncated,
        })) => {
            info!(%client_id, head_seq, ?last_seq, "joined room");
            if reset_if_ahead(last_seq, head_seq) {
                warn!(head_seq, "authority history restarted; accepting its sequence from the start");
            }
            if replay_truncated {
                warn!(?last_seq, head_seq, "authority no longer holds every missed command");
            }
        }
        Some(Some(ServerMessage::CommandRejected { reason, .. })) => {
            return Err(NetError::Rejected(reason));
        }
        Some(_) => return Err(NetError::Rejected("unexpected handshake reply".to_string())),
        None => return Err(NetError::ServerClosed),
    }

    connected.store(true, Ordering::SeqCst);
    editor
        .connection_changed(true)
        .await
        .map_err(|_| NetError::EditorClosed)?;

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Shutdown);
            }
            outgoing = outgoing_rx.recv() => {
                let Some(text) = outgoing else {
                    return Ok(SessionEnd::Shutdown);
                };
                write.send(Message::Text(text.into())).await?;
            }
            incoming = read.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(NetError::Ws(e)),
                    None => return Ok(SessionEnd::Dropped),
                };
                if let Message::Close(frame) = &message {
                    info!(?frame, "authority closed the connection");
                    return Ok(SessionEnd::Dropped);
                }
                if let Some(server_message) = decode(&message) {
                    forward(server_message, editor, last_seq).await?;
                }
            }
        }
    }
}

// A last seq beyond the authority's head came from an earlier history of the room.
fn reset_if_ahead(last_seq: &mut Option<u64>, head_seq: u64) -> bool {
    if last_seq.is_some_and(|last| last > head_seq) {
        *last_seq = None;
        true
    } else {
        false
    }
}

fn decode(message: &Message) -> Option<ServerMessage> {
    let Message::Text(text) = message else {
        return None;
    };
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, bytes = text.len(), "failed to parse server message");
            None
        }
    }
}

async fn forward(
    message: ServerMessage,
    editor: &EditorHandle,
    last_seq: &mut Option<u64>,
) -> Result<(), NetError> {
    match message {
        ServerMessage::MapEditorCommand(SequencedCommand { seq, command }) => {
            if last_seq.is_some_and(|last| seq <= last) {
                debug!(seq, "already applied sequence skipped");
                return Ok(());
            }
            *last_seq = Some(seq);
            let command_id = command.command_id().to_string();
            match MapCommand::try_from(command) {
                Ok(command) => editor
                    .deliver_remote(Some(seq), command)
                    .await
                    .map_err(|_| NetError::EditorClosed),
                Err(e) => {
                    warn!(seq, %command_id, error = %e, "invalid command from authority");
                    Ok(())
                }
            }
        }
        ServerMessage::CommandAcknowledged { command_id, seq } => {
            debug!(%command_id, seq, "authority acknowledged resubmission");
            editor
                .acknowledge(command_id.into())
                .await
                .map_err(|_| NetError::EditorClosed)
        }
        ServerMessage::CommandRejected {
            command_id: Some(command_id),
            reason,
        } => editor
            .reject(command_id.into(), reason)
            .await
            .map_err(|_| NetError::EditorClosed),
        ServerMessage::CommandRejected {
            command_id: None,
            reason,
        } => {
            warn!(%reason, "authority rejected a message");
            Ok(())
        }
        ServerMessage::Welcome { .. } => {
            debug!("ignoring repeated welcome");
            Ok(())
        }
    }
}
