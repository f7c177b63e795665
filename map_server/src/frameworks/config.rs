use std::env;
use std::time::Duration;

// Runtime settings for the map authority.

pub fn http_port() -> u16 {
    env::var("MAP_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3010)
}

pub fn room_history_capacity() -> usize {
    env::var("ROOM_HISTORY_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|capacity: &usize| *capacity > 0)
        .unwrap_or(10_000)
}

pub fn room_idle_timeout() -> Duration {
    let secs = env::var("ROOM_IDLE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);
    Duration::from_secs(secs)
}

pub fn max_rooms() -> usize {
    env::var("MAX_ROOMS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|max: &usize| *max > 0)
        .unwrap_or(1024)
}

pub const ROOM_EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const ROOM_BROADCAST_CAPACITY: usize = 256;
