//! The Coordinator: sole mutator of room/session state, and the dispatch
//! target for every verb a peer sends.
//!
//! A single synchronous `std::sync::Mutex` guards the whole
//! `CoordinatorState`. Handlers never hold it across an `.await` — every
//! outbound send is a non-blocking `try_send` against a bounded per-peer
//! outbox — so one coarse lock is enough; see `SPEC_FULL.md` §5.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::codec::{self, CodecError, Outbound, Verb};
use crate::config::Config;
use crate::observability;
use crate::registry::{RegistryError, RoomRegistry};
use crate::room::{RoomCode, SessionState};
use crate::session::PeerHandle;

struct CoordinatorState {
    sessions: HashMap<Uuid, PeerHandle>,
    session_room: HashMap<Uuid, RoomCode>,
    registry: RoomRegistry,
}

/// Sole owner of every room and every connected peer's handle.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    config: Arc<Config>,
}

impl Coordinator {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let registry = RoomRegistry::new(config.max_rooms, config.code_gen_max_attempts);
        Arc::new(Self {
            state: Mutex::new(CoordinatorState {
                sessions: HashMap::new(),
                session_room: HashMap::new(),
                registry,
            }),
            config,
        })
    }

    /// Register a newly connected peer and send the opening greeting.
    pub fn on_open(self: &Arc<Self>, session_id: Uuid, handle: PeerHandle) {
        let mut st = self.state.lock().unwrap();
        handle.send(Outbound::WaitingForConnectionCode.render());
        st.sessions.insert(session_id, handle);
        observability::session_opened(session_id);
    }

    /// Dispatch one inbound wire line from a peer.
    pub fn on_message(self: &Arc<Self>, session_id: Uuid, raw: &str) {
        let msg = match codec::parse(raw) {
            Ok(msg) => msg,
            Err(err) => {
                observability::malformed(session_id, raw, &err);
                return;
            }
        };
        match msg.verb {
            Verb::State => self.handle_state(session_id),
            Verb::Connection => self.handle_connection(session_id, &msg.payload),
            Verb::StartCall => self.handle_start_call(session_id),
            Verb::Offer => self.handle_offer(session_id, &msg.payload),
            Verb::Answer => self.handle_answer(session_id, &msg.payload),
            Verb::Ice => self.handle_ice(session_id, &msg.payload),
            Verb::WaitingForConnectionCode | Verb::ConnectionResponse => {
                observability::protocol_violation(session_id, "received a server-only verb from a peer");
            }
        }
    }

    /// Tear down a peer's session: remove it, drop it from its room (if
    /// any), broadcast the room's new state, and schedule GC if the room
    /// emptied out. Idempotent: a session already removed is a no-op.
    pub fn on_close(self: &Arc<Self>, session_id: Uuid) {
        let mut st = self.state.lock().unwrap();
        self.remove_session_locked(&mut st, session_id);
    }

    /// Generate a fresh room code for the admin `/generate-code` endpoint.
    pub fn generate_code(&self) -> Result<RoomCode, RegistryError> {
        let mut st = self.state.lock().unwrap();
        let mut rng = rand::thread_rng();
        st.registry.generate(&mut rng)
    }

    fn handle_state(self: &Arc<Self>, session_id: Uuid) {
        let st = self.state.lock().unwrap();
        let Some(handle) = st.sessions.get(&session_id) else {
            return;
        };
        let state = st
            .session_room
            .get(&session_id)
            .and_then(|code| st.registry.lookup(code))
            .map(|room| room.state)
            .unwrap_or(SessionState::Impossible);
        handle.send(Outbound::State(state).render());
    }

    fn handle_connection(self: &Arc<Self>, session_id: Uuid, payload: &str) {
        let code = RoomCode::new(payload.trim());
        if code.is_empty() {
            observability::protocol_violation(session_id, "CONNECTION with empty code");
            return;
        }

        let mut st = self.state.lock().unwrap();

        // A session already torn down (outbox overflow, room-full rejection,
        // or a close that raced this message) must never be able to create
        // or join a room — it has no live outbox to reach it through.
        if !st.sessions.contains_key(&session_id) {
            return;
        }

        if let Some(current) = st.session_room.get(&session_id).cloned() {
            if current == code {
                if let Some(handle) = st.sessions.get(&session_id) {
                    handle.send(Outbound::Connected(code).render());
                }
            } else {
                self.reject_room_full(&mut st, session_id);
            }
            return;
        }

        let before;
        let after;
        let is_full;
        {
            let room = st.registry.get_or_create_mut(code.clone());
            is_full = room.is_full();
            before = room.state;
            if !is_full {
                room.add_member(session_id).expect("checked is_full above");
            }
            after = room.state;
        }

        if is_full {
            self.reject_room_full(&mut st, session_id);
            observability::admission_rejected(&code, session_id);
            return;
        }

        st.session_room.insert(session_id, code.clone());
        if let Some(handle) = st.sessions.get(&session_id) {
            handle.send(Outbound::Connected(code.clone()).render());
        }
        observability::admission_accepted(&code, session_id);
        if before != after {
            observability::transition(&code, before, after);
        }
        self.broadcast_state(&mut st, &code);
    }

    fn handle_start_call(self: &Arc<Self>, session_id: Uuid) {
        let mut st = self.state.lock().unwrap();
        let Some(code) = st.session_room.get(&session_id).cloned() else {
            observability::protocol_violation(session_id, "START_CALL outside any room");
            return;
        };
        let Some(room) = st.registry.lookup_mut(&code) else {
            return;
        };
        if !room.is_full() {
            observability::protocol_violation(session_id, "START_CALL before room has two members");
            return;
        }
        let before = room.state;
        let changed = room.on_start_call();
        let after = room.state;

        self.relay_to_others(&mut st, &code, session_id, Outbound::StartCall.render());
        if changed {
            observability::transition(&code, before, after);
            self.broadcast_state(&mut st, &code);
        }
    }

    fn handle_offer(self: &Arc<Self>, session_id: Uuid, sdp: &str) {
        let mut st = self.state.lock().unwrap();
        let Some(code) = st.session_room.get(&session_id).cloned() else {
            observability::protocol_violation(session_id, "OFFER outside any room");
            return;
        };
        let Some(room) = st.registry.lookup_mut(&code) else {
            return;
        };
        if room.state != SessionState::Ready {
            observability::protocol_violation(session_id, "OFFER outside Ready state");
            return;
        }
        let before = room.state;
        room.try_offer();
        let after = room.state;

        self.relay_to_others(&mut st, &code, session_id, Outbound::Offer(sdp.to_string()).render());
        observability::transition(&code, before, after);
        self.broadcast_state(&mut st, &code);
    }

    fn handle_answer(self: &Arc<Self>, session_id: Uuid, sdp: &str) {
        let mut st = self.state.lock().unwrap();
        let Some(code) = st.session_room.get(&session_id).cloned() else {
            observability::protocol_violation(session_id, "ANSWER outside any room");
            return;
        };
        let Some(room) = st.registry.lookup_mut(&code) else {
            return;
        };
        if room.state != SessionState::Creating {
            observability::protocol_violation(session_id, "ANSWER outside Creating state");
            return;
        }
        let before = room.state;
        room.try_answer();
        let after = room.state;

        self.relay_to_others(&mut st, &code, session_id, Outbound::Answer(sdp.to_string()).render());
        observability::transition(&code, before, after);
        self.broadcast_state(&mut st, &code);
    }

    fn handle_ice(self: &Arc<Self>, session_id: Uuid, candidate: &str) {
        let mut st = self.state.lock().unwrap();
        let Some(code) = st.session_room.get(&session_id).cloned() else {
            observability::protocol_violation(session_id, "ICE outside any room");
            return;
        };
        let has_two = st
            .registry
            .lookup(&code)
            .map(|room| room.is_full())
            .unwrap_or(false);
        if !has_two {
            observability::protocol_violation(session_id, "ICE before room has two members");
            return;
        }
        self.relay_to_others(&mut st, &code, session_id, Outbound::Ice(candidate.to_string()).render());
    }

    /// Send the synchronous rejection, then tear the session down the same
    /// way `on_close` would — never merely cancel the socket and leave the
    /// session's bookkeeping (and any room it already belonged to) dangling.
    fn reject_room_full(self: &Arc<Self>, st: &mut CoordinatorState, session_id: Uuid) {
        if let Some(handle) = st.sessions.get(&session_id) {
            handle.send(Outbound::RoomFull.render());
        }
        self.remove_session_locked(st, session_id);
    }

    /// Relay `line` to the other member of `code`, if there is one. A peer
    /// whose outbox overflows is torn down through the same path `on_close`
    /// uses, rather than re-entrantly dropping the lock.
    fn relay_to_others(self: &Arc<Self>, st: &mut CoordinatorState, code: &RoomCode, sender: Uuid, line: String) {
        let Some(recipient) = st.registry.lookup(code).and_then(|room| room.other_member(sender)) else {
            return;
        };
        let sent = st
            .sessions
            .get(&recipient)
            .map(|handle| handle.send(line.clone()))
            .unwrap_or(true);
        if !sent {
            self.remove_session_locked(st, recipient);
        }
        observability::relayed(code, sender, &line);
    }

    /// Broadcast the room's current state to every member.
    fn broadcast_state(self: &Arc<Self>, st: &mut CoordinatorState, code: &RoomCode) {
        let Some(room) = st.registry.lookup(code) else {
            return;
        };
        let state = room.state;
        let members: Vec<Uuid> = room.members().to_vec();
        let line = Outbound::State(state).render();
        for member in members {
            let sent = st
                .sessions
                .get(&member)
                .map(|handle| handle.send(line.clone()))
                .unwrap_or(true);
            if !sent {
                self.remove_session_locked(st, member);
            }
        }
    }

    /// Remove a session's bookkeeping. Safe to call both from the normal
    /// `on_close` path and from an outbox-overflow path mid-dispatch;
    /// removing an already-absent session is a no-op.
    fn remove_session_locked(self: &Arc<Self>, st: &mut CoordinatorState, session_id: Uuid) {
        let Some(handle) = st.sessions.remove(&session_id) else {
            return;
        };
        // Guarantees Transport actually tears the socket down on every path
        // that reaches here (outbox overflow, not just a real on_close), so
        // a dropped peer can never linger as a ghost room member.
        handle.force_disconnect();
        observability::session_closed(session_id);

        let Some(code) = st.session_room.remove(&session_id) else {
            return;
        };
        let Some(room) = st.registry.lookup_mut(&code) else {
            return;
        };
        if !room.remove_member(session_id) {
            return;
        }
        let now_empty = room.is_empty();
        let epoch = room.epoch();

        self.broadcast_state(st, &code);
        if now_empty {
            self.schedule_gc(code, epoch);
        }
    }

    fn schedule_gc(self: &Arc<Self>, code: RoomCode, epoch: u64) {
        let this = Arc::clone(self);
        let grace = Duration::from_secs(self.config.room_gc_grace_secs);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            this.gc_sweep(&code, epoch);
        });
    }

    fn gc_sweep(&self, code: &RoomCode, epoch: u64) {
        let mut st = self.state.lock().unwrap();
        if let Some(room) = st.registry.lookup(code) {
            if room.is_empty() && room.epoch() == epoch {
                st.registry.remove(code);
                observability::room_gc(code);
            }
        }
    }

    #[cfg(test)]
    fn room_exists(&self, code: &RoomCode) -> bool {
        self.state.lock().unwrap().registry.lookup(code).is_some()
    }
}
