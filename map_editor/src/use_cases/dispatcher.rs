// Command dispatcher: local execution, emission, remote ingestion and undo.

use crate::domain::{
    CommandId, CommandKind, EditorError, MapCommand, MapConnection, PrefabRef,
};
use crate::use_cases::{ExecutionReport, MapSnapshot, MapState, RecentIds, UndoHistory};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{Instrument, debug, info, info_span, warn};

/// What to do with a locally applied command that cannot be sent right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflinePolicy {
    /// Keep it in the outbox and send it on reconnect.
    Queue,
    /// Report `NetworkUnavailable` to the caller.
    Fail,
}

/// Tunables for the dispatcher's bounded bookkeeping.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Local commands kept for undo.
    pub undo_history_limit: usize,
    /// Command ids remembered for duplicate detection.
    pub dedup_window: usize,
    /// How long an emitted command may wait for the authority's echo.
    pub ack_timeout: Duration,
    pub offline_policy: OfflinePolicy,
    /// Commands held while disconnected under `OfflinePolicy::Queue`.
    pub outbox_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    Local,
    Remote,
    Undo,
    Redo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Created,
    LocallyApplied,
    /// Applied locally, waiting in the outbox for a connection.
    Queued,
    Emitted,
    Acknowledged,
    TimedOut,
    Rejected,
    Received,
    /// Same identity was already applied on this client.
    Duplicate,
}

/// Notifications published to renderers and other observers.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorUpdate {
    CommandState {
        command_id: CommandId,
        kind: CommandKind,
        state: CommandState,
    },
    CommandFailed {
        command_id: CommandId,
        kind: CommandKind,
        origin: CommandOrigin,
        error: EditorError,
    },
    CommandWarning {
        command_id: CommandId,
        error: EditorError,
    },
    CollisionGridRebuilt {
        generation: u64,
    },
    ConnectionChanged {
        connected: bool,
    },
}

/// Result of a locally initiated command.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalOutcome {
    pub command_id: CommandId,
    pub state: CommandState,
    pub report: ExecutionReport,
}

/// Result of a command delivered by the authority.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    Applied(ExecutionReport),
    /// Echo of a command this client emitted.
    Acknowledged,
    Duplicate,
    Failed(EditorError),
}

#[derive(Debug, Clone, Copy)]
struct PendingAck {
    kind: CommandKind,
    emitted_at: Instant,
}

/// Sequences every command touching this client's map state.
///
/// Owned by a single task; every method runs a command to completion before the
/// next one starts, so commands never interleave and arrival order is apply order.
pub struct CommandDispatcher {
    state: MapState,
    connection: Arc<dyn MapConnection>,
    settings: DispatcherSettings,
    seen: RecentIds,
    history: UndoHistory,
    awaiting_ack: HashMap<CommandId, PendingAck>,
    // Timed-out ids kept so a late echo is still recognised; bounded like `seen`.
    timed_out: RecentIds,
    outbox: VecDeque<MapCommand>,
    connected: bool,
    updates_tx: broadcast::Sender<EditorUpdate>,
}

impl CommandDispatcher {
    pub fn new(
        state: MapState,
        connection: Arc<dyn MapConnection>,
        settings: DispatcherSettings,
        updates_tx: broadcast::Sender<EditorUpdate>,
    ) -> Self {
        Self {
            state,
            connection,
            seen: RecentIds::new(settings.dedup_window),
            timed_out: RecentIds::new(settings.dedup_window),
            history: UndoHistory::new(settings.undo_history_limit),
            settings,
            awaiting_ack: HashMap::new(),
            outbox: VecDeque::new(),
            connected: false,
            updates_tx,
        }
    }

    pub fn state(&self) -> &MapState {
        &self.state
    }

    pub fn snapshot(&self) -> MapSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorUpdate> {
        self.updates_tx.subscribe()
    }

    pub fn awaiting_ack(&self) -> usize {
        self.awaiting_ack.len()
    }

    pub fn timed_out(&self) -> usize {
        self.timed_out.len()
    }

    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.undo_len()
    }

    pub fn redo_depth(&self) -> usize {
        self.history.redo_len()
    }

    /// Applies a user command locally, records it for undo and sends it.
    ///
    /// A failed execution is returned to the caller and never emitted. A command that
    /// applied but could not be sent is queued or reported, depending on policy.
    pub async fn execute_local(&mut self, command: MapCommand) -> Result<LocalOutcome, EditorError> {
        if self.seen.contains(command.id()) {
            debug!(command_id = %command.id(), "local command already applied; skipping");
            return Ok(LocalOutcome {
                command_id: command.id().clone(),
                state: CommandState::Duplicate,
                report: ExecutionReport::default(),
            });
        }

        let (command, report) = self.apply_local(command, CommandOrigin::Local).await?;
        self.history.record(command.clone());
        let state = self.emit_or_queue(&command)?;

        Ok(LocalOutcome {
            command_id: command.id().clone(),
            state,
            report,
        })
    }

    /// Applies a command sequenced by the authority.
    ///
    /// Failures are logged and published; they never propagate to the caller.
    pub async fn receive_remote(&mut self, seq: Option<u64>, command: MapCommand) -> RemoteOutcome {
        let command_id = command.id().clone();
        let kind = command.kind();

        if self.acknowledge(&command_id) {
            return RemoteOutcome::Acknowledged;
        }
        if !self.seen.insert(command_id.clone()) {
            debug!(command_id = %command_id, ?seq, "duplicate delivery skipped");
            self.publish(EditorUpdate::CommandState {
                command_id,
                kind,
                state: CommandState::Duplicate,
            });
            return RemoteOutcome::Duplicate;
        }

        self.publish(EditorUpdate::CommandState {
            command_id: command_id.clone(),
            kind,
            state: CommandState::Received,
        });

        let span = info_span!("remote_command", command_id = %command_id, kind = %kind, ?seq);
        let mut command = command;
        match self.execute_with_retry(&mut command).instrument(span).await {
            Ok(report) => {
                self.publish_applied(&command, &report);
                RemoteOutcome::Applied(report)
            }
            Err(error) => {
                warn!(command_id = %command_id, %kind, ?seq, error = %error, "remote command failed");
                self.publish(EditorUpdate::CommandFailed {
                    command_id,
                    kind,
                    origin: CommandOrigin::Remote,
                    error: error.clone(),
                });
                RemoteOutcome::Failed(error)
            }
        }
    }

    /// Marks an emitted command as sequenced by the authority.
    pub fn acknowledge(&mut self, command_id: &CommandId) -> bool {
        let kind = match self.awaiting_ack.remove(command_id) {
            Some(pending) => Some(pending.kind),
            None if self.timed_out.remove(command_id) => None,
            None => return false,
        };
        debug!(command_id = %command_id, late = kind.is_none(), "command acknowledged");
        if let Some(kind) = kind {
            self.publish(EditorUpdate::CommandState {
                command_id: command_id.clone(),
                kind,
                state: CommandState::Acknowledged,
            });
        }
        true
    }

    /// The authority refused an emitted command. Local effects stay in place.
    pub fn reject(&mut self, command_id: &CommandId, reason: &str) -> bool {
        let Some(pending) = self.awaiting_ack.remove(command_id) else {
            return false;
        };
        warn!(command_id = %command_id, kind = %pending.kind, reason, "authority rejected command");
        self.publish(EditorUpdate::CommandState {
            command_id: command_id.clone(),
            kind: pending.kind,
            state: CommandState::Rejected,
        });
        true
    }

    /// Reverts the most recent local command by applying and emitting its inverse.
    ///
    /// Entries that cannot be inverted are dropped from the history. Any other
    /// failure leaves the entry in place so the undo can be tried again.
    pub async fn undo(&mut self) -> Result<LocalOutcome, EditorError> {
        let Some(original) = self.history.pop_undo() else {
            return Err(EditorError::UnsupportedOperation(
                "nothing to undo".to_string(),
            ));
        };
        let inverse = original.undo_command().inspect_err(|e| {
            info!(command_id = %original.id(), kind = %original.kind(), error = %e, "undo entry discarded");
        })?;

        let (applied, report) = match self.apply_local(inverse, CommandOrigin::Undo).await {
            Ok(applied) => applied,
            Err(error @ EditorError::UnsupportedOperation(_)) => return Err(error),
            Err(error) => {
                debug!(command_id = %original.id(), error = %error, "undo failed; entry kept");
                self.history.push_undo(original);
                return Err(error);
            }
        };
        self.history.push_redo(original);
        let state = self.emit_or_queue(&applied)?;

        Ok(LocalOutcome {
            command_id: applied.id().clone(),
            state,
            report,
        })
    }

    /// Re-applies the most recently undone command under a new identity.
    pub async fn redo(&mut self) -> Result<LocalOutcome, EditorError> {
        let Some(original) = self.history.pop_redo() else {
            return Err(EditorError::UnsupportedOperation(
                "nothing to redo".to_string(),
            ));
        };

        let (applied, report) = self
            .apply_local(original.reissue(), CommandOrigin::Redo)
            .await?;
        self.history.push_undo(applied.clone());
        let state = self.emit_or_queue(&applied)?;

        Ok(LocalOutcome {
            command_id: applied.id().clone(),
            state,
            report,
        })
    }

    /// Records connectivity; on reconnect the outbox is sent in order.
    pub fn connection_changed(&mut self, connected: bool) -> usize {
        self.connected = connected;
        info!(connected, queued = self.outbox.len(), "connection state changed");
        self.publish(EditorUpdate::ConnectionChanged { connected });
        if connected { self.flush_outbox() } else { 0 }
    }

    /// Emitted commands without an echo after `ack_timeout` become `TimedOut`.
    pub fn sweep_ack_timeouts(&mut self, now: Instant) -> Vec<CommandId> {
        let timeout = self.settings.ack_timeout;
        let expired: Vec<(CommandId, CommandKind)> = self
            .awaiting_ack
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.emitted_at) >= timeout)
            .map(|(id, pending)| (id.clone(), pending.kind))
            .collect();

        for (command_id, kind) in &expired {
            self.awaiting_ack.remove(command_id);
            self.timed_out.insert(command_id.clone());
            warn!(command_id = %command_id, %kind, "command not acknowledged in time");
            self.publish(EditorUpdate::CommandState {
                command_id: command_id.clone(),
                kind: *kind,
                state: CommandState::TimedOut,
            });
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }

    /// Drops a prefab from the cache, refetches it and realigns every instance.
    pub async fn refresh_prefab(&mut self, key: &PrefabRef) -> Result<usize, EditorError> {
        self.state.registry.invalidate(key);
        let prefab = self
            .state
            .registry
            .get_prefab(&key.collection, &key.id)
            .await?
            .ok_or_else(|| EditorError::apply(key.to_string(), "prefab not found"))?;
        let refreshed = self.state.entities.update_prefab(&prefab);
        self.state
            .entities
            .update_entities_depth(key, prefab.effective_depth());
        self.state.recompute_entities_collision_grid();
        self.publish(EditorUpdate::CollisionGridRebuilt {
            generation: self.state.collision.generation(),
        });
        Ok(refreshed)
    }

    async fn apply_local(
        &mut self,
        mut command: MapCommand,
        origin: CommandOrigin,
    ) -> Result<(MapCommand, ExecutionReport), EditorError> {
        let command_id = command.id().clone();
        let kind = command.kind();
        self.publish(EditorUpdate::CommandState {
            command_id: command_id.clone(),
            kind,
            state: CommandState::Created,
        });

        let span = info_span!("local_command", command_id = %command_id, %kind, ?origin);
        match self.execute_with_retry(&mut command).instrument(span).await {
            Ok(report) => {
                self.seen.insert(command_id);
                self.publish_applied(&command, &report);
                Ok((command, report))
            }
            Err(error) => {
                warn!(command_id = %command_id, %kind, ?origin, error = %error, "local command failed");
                self.publish(EditorUpdate::CommandFailed {
                    command_id,
                    kind,
                    origin,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    // Apply errors get one more attempt after the target's catalog copy is dropped.
    async fn execute_with_retry(
        &mut self,
        command: &mut MapCommand,
    ) -> Result<ExecutionReport, EditorError> {
        match command.execute(&mut self.state).await {
            Err(error) if error.is_apply() => {
                let invalidated = command
                    .payload()
                    .prefab_target()
                    .is_some_and(|key| self.state.registry.invalidate_fetched(&key));
                debug!(error = %error, invalidated, "apply failed; retrying once");
                command.execute(&mut self.state).await
            }
            other => other,
        }
    }

    fn emit_or_queue(&mut self, command: &MapCommand) -> Result<CommandState, EditorError> {
        // Anything already waiting must go out first.
        if !self.outbox.is_empty() {
            return self.offline(command, EditorError::NetworkUnavailable(
                "earlier commands are still queued".to_string(),
            ));
        }

        match self.connection.emit_map_editor_command(command) {
            Ok(()) => {
                self.mark_emitted(command);
                Ok(CommandState::Emitted)
            }
            Err(error) => self.offline(command, error),
        }
    }

    fn offline(&mut self, command: &MapCommand, error: EditorError) -> Result<CommandState, EditorError> {
        match self.settings.offline_policy {
            OfflinePolicy::Queue if self.outbox.len() < self.settings.outbox_capacity => {
                self.outbox.push_back(command.clone());
                debug!(command_id = %command.id(), queued = self.outbox.len(), "command queued");
                self.publish(EditorUpdate::CommandState {
                    command_id: command.id().clone(),
                    kind: command.kind(),
                    state: CommandState::Queued,
                });
                Ok(CommandState::Queued)
            }
            policy => {
                let error = match policy {
                    OfflinePolicy::Queue => EditorError::NetworkUnavailable(
                        "outbox full; command applied locally but not sent".to_string(),
                    ),
                    OfflinePolicy::Fail => error,
                };
                warn!(command_id = %command.id(), error = %error, "command applied locally but not sent");
                self.publish(EditorUpdate::CommandFailed {
                    command_id: command.id().clone(),
                    kind: command.kind(),
                    origin: CommandOrigin::Local,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn flush_outbox(&mut self) -> usize {
        let mut flushed = 0;
        while let Some(command) = self.outbox.front() {
            if let Err(error) = self.connection.emit_map_editor_command(command) {
                debug!(error = %error, remaining = self.outbox.len(), "outbox flush interrupted");
                break;
            }
            if let Some(command) = self.outbox.pop_front() {
                self.mark_emitted(&command);
                flushed += 1;
            }
        }
        if flushed > 0 {
            info!(flushed, "outbox flushed");
        }
        flushed
    }

    fn mark_emitted(&mut self, command: &MapCommand) {
        self.awaiting_ack.insert(
            command.id().clone(),
            PendingAck {
                kind: command.kind(),
                emitted_at: Instant::now(),
            },
        );
        self.publish(EditorUpdate::CommandState {
            command_id: command.id().clone(),
            kind: command.kind(),
            state: CommandState::Emitted,
        });
    }

    fn publish_applied(&self, command: &MapCommand, report: &ExecutionReport) {
        self.publish(EditorUpdate::CommandState {
            command_id: command.id().clone(),
            kind: command.kind(),
            state: CommandState::LocallyApplied,
        });
        if let Some(generation) = report.collision_generation {
            self.publish(EditorUpdate::CollisionGridRebuilt { generation });
        }
        for warning in &report.warnings {
            self.publish(EditorUpdate::CommandWarning {
                command_id: command.id().clone(),
                error: warning.clone(),
            });
        }
    }

    fn publish(&self, update: EditorUpdate) {
        // No subscribers is fine; updates are advisory.
        let _ = self.updates_tx.send(update);
    }
}
