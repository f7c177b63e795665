// Use cases layer: room sequencing for the map authority.

pub mod room;
pub mod types;

pub use room::{RoomError, RoomHandle, RoomRegistry, RoomSettings, room_task};
pub use types::{JoinAccepted, RoomEvent, RoomInfo, SequencedBytes, SubmitOutcome};
