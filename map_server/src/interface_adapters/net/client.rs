use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::next_conn_id;
use crate::use_cases::{JoinAccepted, RoomError, RoomHandle, SequencedBytes, SubmitOutcome};
use map_editor::interface_adapters::protocol::{
    ClientMessage, CommandMessage, JoinPayload, ServerMessage,
};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::broadcast;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    JoinTimeout,
    #[allow(dead_code)]
    InvalidJoin(String),
    #[allow(dead_code)]
    RoomUnavailable(RoomError),
    RoomClosed,
    UpdatesClosed,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_ROOM_ID_LEN: usize = 64;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        // Separate connection id for correlating logs before and after the room is known.
        let conn_id = next_conn_id();
        let span = info_span!("conn", conn_id, room_id = tracing::field::Empty);
        handle_socket(socket, state, conn_id).instrument(span)
    })
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, conn_id: u64) {
    let mut ctx = match bootstrap_connection(&mut socket, &state, conn_id).await {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(error = ?e, "failed to bootstrap connection");
            let reason = match &e {
                NetError::JoinTimeout => "join timed out",
                _ => "join failed",
            };
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: reason.into(),
                })))
                .await;
            let _ = socket.close().await;
            return;
        }
    };

    tracing::Span::current().record("room_id", ctx.room.room_id.as_ref());
    info!(last_sent = ctx.last_sent, "client joined");

    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        lag_recovery_count = ctx.lag_recovery_count,
        "connection stats"
    );
    info!("client disconnected");
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

struct ConnCtx {
    conn_id: u64,
    room: RoomHandle,
    updates_rx: broadcast::Receiver<SequencedBytes>,
    // Highest seq this client has been sent (or reported on join).
    last_sent: u64,
    lag_recovery_count: u64,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,

    last_invalid_input_log: Instant,
    last_lag_log: Instant,

    close_frame: Option<CloseFrame>,
}

impl ConnCtx {
    async fn send(&mut self, socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), NetError> {
        let bytes = send_message(socket, msg).await?;
        self.msgs_out += 1;
        self.bytes_out += bytes as u64;
        Ok(())
    }

    // Forwards a sequenced command unless the client already has it.
    async fn forward(&mut self, socket: &mut WebSocket, entry: SequencedBytes) -> Result<(), NetError> {
        if entry.seq <= self.last_sent {
            return Ok(());
        }
        let bytes_len = entry.payload.len();
        socket.send(Message::Text(entry.payload)).await?;
        self.last_sent = entry.seq;
        self.msgs_out += 1;
        self.bytes_out += bytes_len as u64;
        Ok(())
    }
}

fn validate_join(join: JoinPayload) -> Result<(String, Option<u64>), NetError> {
    let room_id = join.room_id.trim();
    if room_id.is_empty() || room_id.len() > MAX_ROOM_ID_LEN {
        return Err(NetError::InvalidJoin(format!(
            "roomId must be 1..={MAX_ROOM_ID_LEN} bytes"
        )));
    }
    Ok((room_id.to_string(), join.last_seq))
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    state: &AppState,
    conn_id: u64,
) -> Result<ConnCtx, NetError> {
    // The first text frame must be a Join.
    let first = tokio::time::timeout(JOIN_TIMEOUT, socket.recv())
        .await
        .map_err(|_| NetError::JoinTimeout)?;
    let join = match first {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Join(join)) => join,
            Ok(_) => return Err(NetError::InvalidJoin("expected Join first".to_string())),
            Err(e) => return Err(NetError::InvalidJoin(e.to_string())),
        },
        Some(Ok(_)) => return Err(NetError::InvalidJoin("expected a text frame".to_string())),
        Some(Err(e)) => return Err(NetError::Ws(e)),
        None => return Err(NetError::InvalidJoin("closed before join".to_string())),
    };

    let (room_id, last_seq) = match validate_join(join) {
        Ok(valid) => valid,
        Err(NetError::InvalidJoin(reason)) => {
            reject_join(socket, reason.clone()).await;
            return Err(NetError::InvalidJoin(reason));
        }
        Err(e) => return Err(e),
    };

    let (room, joined) = match join_room(state, &room_id, last_seq).await {
        Ok(joined) => joined,
        Err(e) => {
            reject_join(socket, e.to_string()).await;
            return Err(NetError::RoomUnavailable(e));
        }
    };

    let now = Instant::now() - LOG_THROTTLE;
    let mut ctx = ConnCtx {
        conn_id,
        room,
        updates_rx: joined.updates_rx,
        // Clamped by the room: a stale lastSeq must not hide new sequence numbers.
        last_sent: joined.resume_from,
        lag_recovery_count: 0,
        msgs_in: 1,
        msgs_out: 0,
        bytes_in: 0,
        bytes_out: 0,
        invalid_json: 0,
        last_invalid_input_log: now,
        last_lag_log: now,
        close_frame: None,
    };

    ctx.send(
        socket,
        &ServerMessage::Welcome {
            client_id: conn_id.to_string(),
            head_seq: joined.head_seq,
            replay_truncated: joined.replay.truncated,
        },
    )
    .await?;
    if joined.replay.truncated {
        warn!(?last_seq, head_seq = joined.head_seq, "replay truncated for joining client");
    }

    let replayed = joined.replay.entries.len();
    for entry in joined.replay.entries {
        ctx.forward(socket, entry).await?;
    }
    if replayed > 0 {
        debug!(replayed, "replayed missed commands");
    }

    Ok(ctx)
}

async fn reject_join(socket: &mut WebSocket, reason: String) {
    let _ = send_message(
        socket,
        &ServerMessage::CommandRejected {
            command_id: None,
            reason,
        },
    )
    .await;
}

// A room can close while idle between lookup and join; the second lookup opens a fresh one.
async fn join_room(
    state: &AppState,
    room_id: &str,
    last_seq: Option<u64>,
) -> Result<(RoomHandle, JoinAccepted), RoomError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let room = state.room_registry.get_or_create(room_id).await?;
        match room.join(last_seq).await {
            Ok(joined) => return Ok((room, joined)),
            Err(RoomError::Closed) if attempts < 2 => {
                debug!(room_id, "room closed before join; reopening");
            }
            Err(e) => return Err(e),
        }
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let control = tokio::select! {
            incoming = socket.recv() => handle_incoming_ws(socket, ctx, incoming).await,
            update = ctx.updates_rx.recv() => match update {
                Ok(entry) => ctx.forward(socket, entry).await.map(|()| LoopControl::Continue),
                Err(broadcast::error::RecvError::Lagged(n)) => recover_from_lag(socket, ctx, n).await,
                Err(broadcast::error::RecvError::Closed) => Err(NetError::UpdatesClosed),
            },
        };

        let disconnect = match control {
            Ok(LoopControl::Continue) => false,
            Ok(LoopControl::Disconnect) => true,
            Err(e) => {
                fatal = Some(e);
                true
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// Resync strategy: the log is the source of truth, so replay what the broadcast dropped.
async fn recover_from_lag(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    missed: u64,
) -> Result<LoopControl, NetError> {
    if should_log(&mut ctx.last_lag_log) {
        warn!(missed, last_sent = ctx.last_sent, "updates lagged; replaying from log");
    }
    let replay = ctx
        .room
        .replay_after(ctx.last_sent)
        .await
        .map_err(|_| NetError::RoomClosed)?;

    if replay.truncated {
        // The client has to rejoin and learn it lost history.
        ctx.close_frame = Some(CloseFrame {
            code: close_code::AGAIN,
            reason: "fell behind retained history".into(),
        });
        return Ok(LoopControl::Disconnect);
    }

    ctx.lag_recovery_count += 1;
    for entry in replay.entries {
        ctx.forward(socket, entry).await?;
    }
    Ok(LoopControl::Continue)
}

async fn handle_incoming_ws(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    incoming: Option<Result<Message, Error>>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                ctx.msgs_in += 1;
                ctx.bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::MapEditorCommand(command)) => {
                        submit_command(socket, ctx, command).await
                    }
                    Ok(ClientMessage::Join(_)) => {
                        if should_log(&mut ctx.last_invalid_input_log) {
                            warn!("repeated join ignored");
                        }
                        Ok(LoopControl::Continue)
                    }
                    Err(parse_err) => {
                        ctx.invalid_json += 1;
                        if should_log(&mut ctx.last_invalid_input_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if ctx.invalid_json > MAX_INVALID_JSON {
                            ctx.close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn submit_command(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    command: CommandMessage,
) -> Result<LoopControl, NetError> {
    let command_id = command.command_id().to_string();

    if let Err(e) = command.validate() {
        if should_log(&mut ctx.last_invalid_input_log) {
            warn!(%command_id, error = %e, "invalid command rejected");
        }
        ctx.send(
            socket,
            &ServerMessage::CommandRejected {
                command_id: Some(command_id),
                reason: e.to_string(),
            },
        )
        .await?;
        return Ok(LoopControl::Continue);
    }

    let outcome = ctx
        .room
        .submit(ctx.conn_id, command)
        .await
        .map_err(|_| NetError::RoomClosed)?;

    match outcome {
        // The echo arrives through the room broadcast like everyone else's.
        SubmitOutcome::Sequenced(_) => {}
        SubmitOutcome::Duplicate(seq) => {
            ctx.send(socket, &ServerMessage::CommandAcknowledged { command_id, seq })
                .await?;
        }
        SubmitOutcome::Rejected(reason) => {
            error!(%command_id, %reason, "room rejected command");
            ctx.send(
                socket,
                &ServerMessage::CommandRejected {
                    command_id: Some(command_id),
                    reason,
                },
            )
            .await?;
        }
    }
    Ok(LoopControl::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_room_id_is_blank_then_join_is_invalid() {
        let result = validate_join(JoinPayload {
            room_id: "   ".to_string(),
            last_seq: None,
        });

        assert!(matches!(result, Err(NetError::InvalidJoin(_))));
    }

    #[test]
    fn when_room_id_has_padding_then_it_is_trimmed() {
        let (room_id, last_seq) = validate_join(JoinPayload {
            room_id: " north ".to_string(),
            last_seq: Some(4),
        })
        .expect("valid join");

        assert_eq!(room_id, "north");
        assert_eq!(last_seq, Some(4));
    }
}
