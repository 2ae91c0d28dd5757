//! Room membership and the per-room session state machine.

use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;
use uuid::Uuid;

/// Alphabet room codes are drawn from: uppercase letters and digits with
/// the visually ambiguous characters (`I`, `O`, `0`, `1`) removed.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Fixed length of a generated room code.
pub const CODE_LEN: usize = 6;

/// A room code. Codes the server generates always match [`ALPHABET`] and
/// [`CODE_LEN`]; codes a peer supplies in `CONNECTION <code>` are taken
/// as-is and only ever compared for equality against generated codes, so
/// this type does not itself enforce the alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(SmolStr);

impl RoomCode {
    pub fn new(raw: &str) -> Self {
        Self(SmolStr::new(raw))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-room call state, mirrored 1:1 on `STATE` broadcasts to both peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Fewer than two members; no call is possible yet.
    Impossible,
    /// Two members present, no offer sent yet.
    Ready,
    /// An offer has been relayed, awaiting answer.
    Creating,
    /// Offer/answer exchange complete (or `START_CALL` fired).
    Active,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Impossible => "Impossible",
            Self::Ready => "Ready",
            Self::Creating => "Creating",
            Self::Active => "Active",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("room already has two members")]
pub struct RoomFullError;

/// A single room: at most two members, plus the state machine describing
/// how far along the call between them is.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    members: Vec<Uuid>,
    pub state: SessionState,
    /// Bumped on every membership change. Used by the registry to tell a
    /// stale scheduled GC sweep (captured when the room last went empty)
    /// apart from a room that has since refilled.
    epoch: u64,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            members: Vec::with_capacity(2),
            state: SessionState::Impossible,
            epoch: 0,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn members(&self) -> &[Uuid] {
        &self.members
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= 2
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn add_member(&mut self, session_id: Uuid) -> Result<(), RoomFullError> {
        if self.is_full() {
            return Err(RoomFullError);
        }
        self.members.push(session_id);
        self.epoch += 1;
        if self.members.len() == 2 {
            self.state = SessionState::Ready;
        }
        Ok(())
    }

    /// Remove a member. Returns `true` if the session was actually present.
    pub fn remove_member(&mut self, session_id: Uuid) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != session_id);
        let removed = self.members.len() != before;
        if removed {
            self.epoch += 1;
            self.state = SessionState::Impossible;
        }
        removed
    }

    pub fn other_member(&self, session_id: Uuid) -> Option<Uuid> {
        self.members.iter().copied().find(|m| *m != session_id)
    }

    /// `START_CALL`: unconditionally moves to `Active` once two members are
    /// present, regardless of the prior state. Returns whether the state
    /// actually changed.
    pub fn on_start_call(&mut self) -> bool {
        if self.state == SessionState::Active {
            return false;
        }
        self.state = SessionState::Active;
        true
    }

    /// `OFFER`: `Ready` -> `Creating`. No-op (returns `false`) outside `Ready`.
    pub fn try_offer(&mut self) -> bool {
        if self.state != SessionState::Ready {
            return false;
        }
        self.state = SessionState::Creating;
        true
    }

    /// `ANSWER`: `Creating` -> `Active`. No-op (returns `false`) outside `Creating`.
    pub fn try_answer(&mut self) -> bool {
        if self.state != SessionState::Creating {
            return false;
        }
        self.state = SessionState::Active;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(n: u8) -> Uuid {
        Uuid::from_bytes([n; 16])
    }

    #[test]
    fn two_joins_move_to_ready() {
        let mut room = Room::new(RoomCode::new("ABCDEF"));
        room.add_member(uuid(1)).unwrap();
        assert_eq!(room.state, SessionState::Impossible);
        room.add_member(uuid(2)).unwrap();
        assert_eq!(room.state, SessionState::Ready);
        assert!(room.is_full());
    }

    #[test]
    fn third_join_is_rejected() {
        let mut room = Room::new(RoomCode::new("ABCDEF"));
        room.add_member(uuid(1)).unwrap();
        room.add_member(uuid(2)).unwrap();
        assert!(matches!(room.add_member(uuid(3)), Err(RoomFullError)));
    }

    #[test]
    fn leaving_drops_state_to_impossible() {
        let mut room = Room::new(RoomCode::new("ABCDEF"));
        room.add_member(uuid(1)).unwrap();
        room.add_member(uuid(2)).unwrap();
        room.try_offer();
        assert_eq!(room.state, SessionState::Creating);
        room.remove_member(uuid(1));
        assert_eq!(room.state, SessionState::Impossible);
        assert_eq!(room.members(), &[uuid(2)]);
    }

    #[test]
    fn offer_then_answer_walks_ready_creating_active() {
        let mut room = Room::new(RoomCode::new("ABCDEF"));
        room.add_member(uuid(1)).unwrap();
        room.add_member(uuid(2)).unwrap();
        assert!(room.try_offer());
        assert_eq!(room.state, SessionState::Creating);
        assert!(room.try_answer());
        assert_eq!(room.state, SessionState::Active);
    }

    #[test]
    fn offer_outside_ready_is_noop() {
        let mut room = Room::new(RoomCode::new("ABCDEF"));
        room.add_member(uuid(1)).unwrap();
        room.add_member(uuid(2)).unwrap();
        assert!(room.try_offer());
        assert!(!room.try_offer());
        assert_eq!(room.state, SessionState::Creating);
    }

    #[test]
    fn start_call_sets_active_even_from_ready() {
        let mut room = Room::new(RoomCode::new("ABCDEF"));
        room.add_member(uuid(1)).unwrap();
        room.add_member(uuid(2)).unwrap();
        assert_eq!(room.state, SessionState::Ready);
        assert!(room.on_start_call());
        assert_eq!(room.state, SessionState::Active);
    }

    #[test]
    fn start_call_is_noop_when_already_active() {
        let mut room = Room::new(RoomCode::new("ABCDEF"));
        room.add_member(uuid(1)).unwrap();
        room.add_member(uuid(2)).unwrap();
        room.on_start_call();
        assert!(!room.on_start_call());
    }

    #[test]
    fn epoch_advances_on_membership_change() {
        let mut room = Room::new(RoomCode::new("ABCDEF"));
        let e0 = room.epoch();
        room.add_member(uuid(1)).unwrap();
        assert!(room.epoch() > e0);
        let e1 = room.epoch();
        room.remove_member(uuid(1));
        assert!(room.epoch() > e1);
    }
}
