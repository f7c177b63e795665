// Editor task: the single owner of the dispatcher and the map state.

use crate::domain::{CommandId, EditorError, MapCommand, PrefabRef};
use crate::use_cases::{CommandDispatcher, LocalOutcome, MapSnapshot, RemoteOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<T>;

/// Everything the editor task reacts to, in arrival order.
#[derive(Debug)]
pub enum EditorEvent {
    Submit {
        command: MapCommand,
        reply: Reply<Result<LocalOutcome, EditorError>>,
    },
    Undo {
        reply: Reply<Result<LocalOutcome, EditorError>>,
    },
    Redo {
        reply: Reply<Result<LocalOutcome, EditorError>>,
    },
    Remote {
        seq: Option<u64>,
        command: MapCommand,
        reply: Option<Reply<RemoteOutcome>>,
    },
    Acknowledged {
        command_id: CommandId,
    },
    Rejected {
        command_id: CommandId,
        reason: String,
    },
    ConnectionChanged {
        connected: bool,
    },
    RefreshPrefab {
        prefab: PrefabRef,
        reply: Reply<Result<usize, EditorError>>,
    },
    Snapshot {
        reply: Reply<MapSnapshot>,
    },
}

/// Cloneable front door to a running editor task.
///
/// Every method fails with `EditorError::EditorClosed` once the task has stopped.
#[derive(Debug, Clone)]
pub struct EditorHandle {
    tx: mpsc::Sender<EditorEvent>,
}

impl EditorHandle {
    pub fn new(tx: mpsc::Sender<EditorEvent>) -> Self {
        Self { tx }
    }

    /// Submits a local command. Dropping the future before the command is queued
    /// abandons it; once the task has it, it runs to completion.
    pub async fn submit(&self, command: MapCommand) -> Result<LocalOutcome, EditorError> {
        self.request(|reply| EditorEvent::Submit { command, reply })
            .await?
    }

    pub async fn undo(&self) -> Result<LocalOutcome, EditorError> {
        self.request(|reply| EditorEvent::Undo { reply }).await?
    }

    pub async fn redo(&self) -> Result<LocalOutcome, EditorError> {
        self.request(|reply| EditorEvent::Redo { reply }).await?
    }

    /// Hands an authority-sequenced command to the task without waiting for it.
    pub async fn deliver_remote(
        &self,
        seq: Option<u64>,
        command: MapCommand,
    ) -> Result<(), EditorError> {
        self.send(EditorEvent::Remote {
            seq,
            command,
            reply: None,
        })
        .await
    }

    /// Like `deliver_remote`, but waits for the outcome.
    pub async fn apply_remote(
        &self,
        seq: Option<u64>,
        command: MapCommand,
    ) -> Result<RemoteOutcome, EditorError> {
        self.request(|reply| EditorEvent::Remote {
            seq,
            command,
            reply: Some(reply),
        })
        .await
    }

    pub async fn acknowledge(&self, command_id: CommandId) -> Result<(), EditorError> {
        self.send(EditorEvent::Acknowledged { command_id }).await
    }

    pub async fn reject(&self, command_id: CommandId, reason: String) -> Result<(), EditorError> {
        self.send(EditorEvent::Rejected { command_id, reason })
            .await
    }

    pub async fn connection_changed(&self, connected: bool) -> Result<(), EditorError> {
        self.send(EditorEvent::ConnectionChanged { connected })
            .await
    }

    pub async fn refresh_prefab(&self, prefab: PrefabRef) -> Result<usize, EditorError> {
        self.request(|reply| EditorEvent::RefreshPrefab { prefab, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<MapSnapshot, EditorError> {
        self.request(|reply| EditorEvent::Snapshot { reply }).await
    }

    async fn send(&self, event: EditorEvent) -> Result<(), EditorError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| EditorError::EditorClosed)
    }

    async fn request<T>(
        &self,
        event: impl FnOnce(Reply<T>) -> EditorEvent,
    ) -> Result<T, EditorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(event(reply_tx)).await?;
        reply_rx.await.map_err(|_| EditorError::EditorClosed)
    }
}

/// Runs the editor until `shutdown` fires or every handle is dropped.
///
/// Events are handled one at a time and each is awaited to completion, so a
/// command suspended on a prefab fetch still finishes before the next starts.
pub async fn editor_task(
    mut dispatcher: CommandDispatcher,
    mut events_rx: mpsc::Receiver<EditorEvent>,
    sweep_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut sweep = tokio::time::interval(sweep_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("editor task started");

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                break;
            }
            _ = sweep.tick() => {
                let expired = dispatcher.sweep_ack_timeouts(Instant::now());
                if !expired.is_empty() {
                    debug!(expired = expired.len(), "ack sweep");
                }
            }
            event = events_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                handle_event(&mut dispatcher, event).await;
            }
        }
    }

    info!(
        queued = dispatcher.queued(),
        awaiting_ack = dispatcher.awaiting_ack(),
        "editor task stopped"
    );
}

// A caller that gave up on its reply is ignored; the work is already committed.
async fn handle_event(dispatcher: &mut CommandDispatcher, event: EditorEvent) {
    match event {
        EditorEvent::Submit { command, reply } => {
            let _ = reply.send(dispatcher.execute_local(command).await);
        }
        EditorEvent::Undo { reply } => {
            let _ = reply.send(dispatcher.undo().await);
        }
        EditorEvent::Redo { reply } => {
            let _ = reply.send(dispatcher.redo().await);
        }
        EditorEvent::Remote {
            seq,
            command,
            reply,
        } => {
            let outcome = dispatcher.receive_remote(seq, command).await;
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
        }
        EditorEvent::Acknowledged { command_id } => {
            dispatcher.acknowledge(&command_id);
        }
        EditorEvent::Rejected { command_id, reason } => {
            dispatcher.reject(&command_id, &reason);
        }
        EditorEvent::ConnectionChanged { connected } => {
            dispatcher.connection_changed(connected);
        }
        EditorEvent::RefreshPrefab { prefab, reply } => {
            let _ = reply.send(dispatcher.refresh_prefab(&prefab).await);
        }
        EditorEvent::Snapshot { reply } => {
            let _ = reply.send(dispatcher.snapshot());
        }
    }
}
