//! Structured logging for Coordinator events, via `tracing`.
//!
//! One function per event kind so call sites in `coordinator.rs` read as
//! "what happened" rather than a pile of fields assembled inline.

use uuid::Uuid;

use crate::codec::CodecError;
use crate::room::{RoomCode, SessionState};

const RELAY_LOG_PREFIX_LEN: usize = 64;
const MALFORMED_LOG_PREFIX_LEN: usize = 120;

pub fn session_opened(session_id: Uuid) {
    tracing::info!(%session_id, event = "session_opened", "peer connected");
}

pub fn session_closed(session_id: Uuid) {
    tracing::info!(%session_id, event = "session_closed", "peer disconnected");
}

pub fn malformed(session_id: Uuid, raw: &str, error: &CodecError) {
    tracing::warn!(
        %session_id,
        event = "malformed",
        raw = %truncate(raw, MALFORMED_LOG_PREFIX_LEN),
        %error,
        "dropping malformed message"
    );
}

pub fn protocol_violation(session_id: Uuid, reason: &str) {
    tracing::warn!(%session_id, event = "protocol_violation", reason, "ignoring out-of-protocol message");
}

pub fn admission_accepted(code: &RoomCode, session_id: Uuid) {
    tracing::info!(room = %code, %session_id, event = "admission_accepted", "peer admitted to room");
}

pub fn admission_rejected(code: &RoomCode, session_id: Uuid) {
    tracing::info!(room = %code, %session_id, event = "admission_rejected", "room already has two members");
}

pub fn transition(code: &RoomCode, from: SessionState, to: SessionState) {
    tracing::info!(room = %code, event = "state_transition", from = %from, to = %to, "room state changed");
}

pub fn relayed(code: &RoomCode, sender: Uuid, line: &str) {
    tracing::debug!(
        room = %code,
        %sender,
        event = "relayed",
        payload = %truncate(line, RELAY_LOG_PREFIX_LEN),
        "relayed message to other room member"
    );
}

pub fn room_gc(code: &RoomCode) {
    tracing::debug!(room = %code, event = "room_gc", "removed empty room after grace period");
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_shortens_long_strings() {
        let truncated = truncate(&"a".repeat(200), 5);
        assert_eq!(truncated.chars().count(), 6);
        assert!(truncated.ends_with('…'));
    }
}
