use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::state::AppState;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomInfoResponse {
    room_id: String,
    // Highest sequence number handed out in the room.
    head_seq: u64,
    // Commands still available for replay.
    retained: usize,
}

pub async fn room_info_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let Some(room) = state.room_registry.get_room(&room_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "room not found".to_string(),
            }),
        )
            .into_response();
    };

    match room.info().await {
        Ok(info) => Json(RoomInfoResponse {
            room_id: info.room_id,
            head_seq: info.head_seq,
            retained: info.retained,
        })
        .into_response(),
        Err(e) => {
            warn!(%room_id, error = %e, "room info unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
