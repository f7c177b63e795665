// Use-case level inputs/outputs for room tasks.

use crate::domain::{LogEntry, Replay};
use axum::extract::ws::Utf8Bytes;
use map_editor::interface_adapters::protocol::CommandMessage;
use tokio::sync::{broadcast, oneshot};

/// A sequenced command, already serialized as the `MapEditorCommand` server message.
pub type SequencedBytes = LogEntry<Utf8Bytes>;

#[derive(Debug)]
pub enum RoomEvent {
    Join {
        last_seq: Option<u64>,
        reply: oneshot::Sender<JoinAccepted>,
    },
    Submit {
        conn_id: u64,
        command: CommandMessage,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    // Used by connections that fell behind the broadcast channel.
    ReplayAfter {
        seq: u64,
        reply: oneshot::Sender<Replay<Utf8Bytes>>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sequenced(u64),
    /// Already in the log; the original sequence number is returned.
    Duplicate(u64),
    Rejected(String),
}

/// Everything a joining connection needs, captured atomically by the room task.
#[derive(Debug)]
pub struct JoinAccepted {
    pub head_seq: u64,
    /// Highest seq the client is treated as holding; the replay starts after it.
    pub resume_from: u64,
    pub replay: Replay<Utf8Bytes>,
    /// Subscribed before the replay was taken, so nothing falls in between.
    pub updates_rx: broadcast::Receiver<SequencedBytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: String,
    pub head_seq: u64,
    pub retained: usize,
}
