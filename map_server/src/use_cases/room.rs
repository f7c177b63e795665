// Room orchestration: one sequencing task per map room.

use crate::domain::{AppendOutcome, CommandLog};
use crate::use_cases::{JoinAccepted, RoomEvent, RoomInfo, SequencedBytes, SubmitOutcome};
use axum::extract::ws::Utf8Bytes;
use map_editor::interface_adapters::protocol::{CommandMessage, SequencedCommand, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Shared configuration for spawning room tasks.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Capacity for inbound room events.
    pub event_channel_capacity: usize,
    /// Capacity for broadcast sequenced commands.
    pub broadcast_capacity: usize,
    /// Sequenced commands retained for replay and dedup.
    pub history_capacity: usize,
    /// A room with no connections closes after this long without events.
    pub idle_timeout: Duration,
    /// Upper bound on concurrently open rooms.
    pub max_rooms: usize,
}

/// Errors returned by room operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    /// The room task is gone.
    Closed,
    /// No more rooms can be opened.
    Full,
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomError::Closed => f.write_str("room task closed"),
            RoomError::Full => f.write_str("room limit reached"),
        }
    }
}

/// Cloneable handle to a running room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    /// Identifier clients use to target this room.
    pub room_id: Arc<str>,
    events_tx: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    /// True once the room task has stopped.
    pub fn is_closed(&self) -> bool {
        self.events_tx.is_closed()
    }

    pub async fn join(&self, last_seq: Option<u64>) -> Result<JoinAccepted, RoomError> {
        self.request(|reply| RoomEvent::Join { last_seq, reply })
            .await
    }

    pub async fn submit(
        &self,
        conn_id: u64,
        command: CommandMessage,
    ) -> Result<SubmitOutcome, RoomError> {
        self.request(|reply| RoomEvent::Submit {
            conn_id,
            command,
            reply,
        })
        .await
    }

    pub async fn replay_after(
        &self,
        seq: u64,
    ) -> Result<crate::domain::Replay<Utf8Bytes>, RoomError> {
        self.request(|reply| RoomEvent::ReplayAfter { seq, reply })
            .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomEvent::Info { reply }).await
    }

    async fn request<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<T>) -> RoomEvent,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events_tx
            .send(event(reply_tx))
            .await
            .map_err(|_| RoomError::Closed)?;
        reply_rx.await.map_err(|_| RoomError::Closed)
    }
}

/// Thread-safe registry for active rooms.
#[derive(Debug)]
pub struct RoomRegistry {
    /// Settings applied to newly created rooms.
    settings: RoomSettings,
    /// Map of room id to active handle.
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            settings,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the room, spawning its task on first use.
    ///
    /// Handles of rooms that closed while idle are pruned before a new room is
    /// counted against `max_rooms`.
    pub async fn get_or_create(&self, room_id: &str) -> Result<RoomHandle, RoomError> {
        if let Some(room) = self.get_room(room_id).await {
            return Ok(room);
        }

        let mut rooms = self.rooms.write().await;
        // Another connection may have created it while we waited for the lock.
        if let Some(room) = rooms.get(room_id).filter(|room| !room.is_closed()) {
            return Ok(room.clone());
        }

        let before = rooms.len();
        rooms.retain(|_, room| !room.is_closed());
        if rooms.len() < before {
            debug!(pruned = before - rooms.len(), "closed rooms pruned");
        }
        if rooms.len() >= self.settings.max_rooms {
            warn!(room_id, open = rooms.len(), "room limit reached");
            return Err(RoomError::Full);
        }

        let (events_tx, events_rx) = mpsc::channel(self.settings.event_channel_capacity);
        let (updates_tx, _updates_rx) = broadcast::channel(self.settings.broadcast_capacity);
        tokio::spawn(
            room_task(
                room_id.to_string(),
                events_rx,
                updates_tx,
                self.settings.history_capacity,
                self.settings.idle_timeout,
            )
            .instrument(info_span!("room", room_id)),
        );

        let room = RoomHandle {
            room_id: Arc::from(room_id),
            events_tx,
        };
        rooms.insert(room_id.to_string(), room.clone());
        info!(room_id, "room created");
        Ok(room)
    }

    pub async fn get_room(&self, room_id: &str) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).filter(|room| !room.is_closed()).cloned()
    }

    /// Open rooms.
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.values().filter(|room| !room.is_closed()).count()
    }
}

/// Sequences commands for one room.
///
/// Stops when every handle is dropped, or when no connection is subscribed and no
/// event arrived for `idle_timeout`.
pub async fn room_task(
    room_id: String,
    mut events_rx: mpsc::Receiver<RoomEvent>,
    updates_tx: broadcast::Sender<SequencedBytes>,
    history_capacity: usize,
    idle_timeout: Duration,
) {
    let mut log: CommandLog<Utf8Bytes> = CommandLog::new(history_capacity);
    let mut idle_check = tokio::time::interval((idle_timeout / 2).max(Duration::from_millis(10)));
    idle_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        let event = tokio::select! {
            event = events_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = idle_check.tick() => {
                // Each connection holds a subscription for its whole lifetime.
                if updates_tx.receiver_count() == 0 && last_activity.elapsed() >= idle_timeout {
                    info!(head_seq = log.head_seq(), "room idle; closing");
                    break;
                }
                continue;
            }
        };
        last_activity = Instant::now();

        match event {
            RoomEvent::Join { last_seq, reply } => {
                // Subscribe before taking the replay so no command falls in between.
                let updates_rx = updates_tx.subscribe();
                let resume_from = log.resume_point(last_seq);
                if last_seq.is_some_and(|seq| seq > log.head_seq()) {
                    warn!(?last_seq, head_seq = log.head_seq(), "client is ahead of the room; replaying from the start");
                }
                let replay = log.since(last_seq);
                debug!(?last_seq, replay = replay.entries.len(), truncated = replay.truncated, "join");
                let _ = reply.send(JoinAccepted {
                    head_seq: log.head_seq(),
                    resume_from,
                    replay,
                    updates_rx,
                });
            }
            RoomEvent::Submit {
                conn_id,
                command,
                reply,
            } => {
                let outcome = sequence(&mut log, &updates_tx, conn_id, command);
                let _ = reply.send(outcome);
            }
            RoomEvent::ReplayAfter { seq, reply } => {
                let _ = reply.send(log.since(Some(seq)));
            }
            RoomEvent::Info { reply } => {
                let _ = reply.send(RoomInfo {
                    room_id: room_id.clone(),
                    head_seq: log.head_seq(),
                    retained: log.len(),
                });
            }
        }
    }

    info!(head_seq = log.head_seq(), "room task stopped");
}

fn sequence(
    log: &mut CommandLog<Utf8Bytes>,
    updates_tx: &broadcast::Sender<SequencedBytes>,
    conn_id: u64,
    command: CommandMessage,
) -> SubmitOutcome {
    let command_id = command.command_id().to_string();
    let kind = command.kind_name();
    if let Some(seq) = log.lookup(&command_id) {
        debug!(conn_id, %command_id, seq, "duplicate submission");
        return SubmitOutcome::Duplicate(seq);
    }

    // Serialize once; every subscriber and every replay shares these bytes.
    let seq = log.head_seq() + 1;
    let message = ServerMessage::MapEditorCommand(SequencedCommand { seq, command });
    let bytes = match serde_json::to_string(&message) {
        Ok(text) => Utf8Bytes::from(text),
        Err(e) => {
            error!(conn_id, %command_id, error = %e, "failed to serialize command");
            return SubmitOutcome::Rejected("command could not be serialized".to_string());
        }
    };

    match log.append(&command_id, bytes.clone()) {
        AppendOutcome::Appended(seq) => {
            info!(conn_id, %command_id, kind, seq, "command sequenced");
            // No subscribers is fine; the log keeps it for replay.
            let _ = updates_tx.send(SequencedBytes {
                seq,
                command_id,
                payload: bytes,
            });
            SubmitOutcome::Sequenced(seq)
        }
        AppendOutcome::Duplicate(seq) => SubmitOutcome::Duplicate(seq),
    }
}
