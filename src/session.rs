//! A handle the Coordinator holds per connected peer.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything the Coordinator needs to talk back to one connected peer,
/// without knowing anything about sockets.
///
/// The outbox is a bounded channel; Transport drains it and writes frames.
/// `disconnect` lets the Coordinator force a forced teardown (e.g. room
/// full, outbox overflow) without reaching into Transport's read loop.
#[derive(Clone)]
pub struct PeerHandle {
    outbox: mpsc::Sender<String>,
    disconnect: CancellationToken,
}

impl PeerHandle {
    pub fn new(outbox: mpsc::Sender<String>, disconnect: CancellationToken) -> Self {
        Self { outbox, disconnect }
    }

    /// Enqueue a line for delivery. Never blocks: if the peer's outbox is
    /// full, the line is dropped and `false` is returned so the caller can
    /// treat the peer as overflowed (spec's outbox-overflow handling).
    pub fn send(&self, line: String) -> bool {
        self.outbox.try_send(line).is_ok()
    }

    /// Signal Transport to tear this connection down.
    pub fn force_disconnect(&self) {
        self.disconnect.cancel();
    }
}
