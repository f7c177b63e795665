use crate::use_cases::OfflinePolicy;
use std::{env, time::Duration};

// Runtime settings for the editor client.

pub fn authority_ws_url() -> String {
    env::var("AUTHORITY_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:3010/ws".to_string())
}

pub fn map_room_id() -> String {
    env::var("MAP_ROOM_ID")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "default".to_string())
}

pub fn prefab_catalog_url() -> String {
    env::var("PREFAB_CATALOG_URL").unwrap_or_else(|_| "http://127.0.0.1:3011".to_string())
}

pub fn catalog_timeout() -> Duration {
    let millis = env::var("CATALOG_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(3000);
    Duration::from_millis(millis)
}

pub fn undo_history_limit() -> usize {
    env::var("UNDO_HISTORY_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100)
}

pub fn command_dedup_window() -> usize {
    env::var("COMMAND_DEDUP_WINDOW")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4096)
}

pub fn ack_timeout() -> Duration {
    let millis = env::var("ACK_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(5000);
    Duration::from_millis(millis)
}

pub fn offline_policy() -> OfflinePolicy {
    parse_offline_policy(env::var("OFFLINE_POLICY").ok().as_deref())
}

fn parse_offline_policy(value: Option<&str>) -> OfflinePolicy {
    match value.map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("fail") => OfflinePolicy::Fail,
        _ => OfflinePolicy::Queue,
    }
}

pub fn map_width() -> u32 {
    env::var("MAP_WIDTH")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(64)
}

pub fn map_height() -> u32 {
    env::var("MAP_HEIGHT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(64)
}

pub const EDITOR_CHANNEL_CAPACITY: usize = 256;
pub const UPDATE_BROADCAST_CAPACITY: usize = 256;
pub const OUTGOING_CHANNEL_CAPACITY: usize = 256;
// Locally applied commands held while the authority is unreachable.
pub const OUTBOX_CAPACITY: usize = 512;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
pub const ACK_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_offline_policy_is_fail_in_any_case_then_fail_is_chosen() {
        assert_eq!(parse_offline_policy(Some(" FAIL ")), OfflinePolicy::Fail);
    }

    #[test]
    fn when_offline_policy_is_missing_or_unknown_then_queue_is_chosen() {
        assert_eq!(parse_offline_policy(None), OfflinePolicy::Queue);
        assert_eq!(parse_offline_policy(Some("retry")), OfflinePolicy::Queue);
    }
}
