use crate::use_cases::RoomRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Rooms keyed by id; each owns its sequencing task.
    pub room_registry: Arc<RoomRegistry>,
}
