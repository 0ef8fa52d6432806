//! Two-party call sessions and signaling relay
//!
//! A call is keyed by the id of the chat room it belongs to. Sessions are
//! created by the first join and removed the moment the last peer leaves.
//! Envelopes are forwarded verbatim; their payload is never inspected.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::constants::CALL_CAPACITY;
use crate::core::error::{Error, Result};
use crate::core::types::RoomId;
use crate::protocol::SignalEnvelope;
use crate::rooms::RoomStore;
use crate::system::metrics::Metrics;

struct CallPeer {
    conn: ConnectionHandle,
    name: String,
}

struct CallSession {
    peers: Vec<CallPeer>,
    /// Set when the last peer leaves, just before the session is unlinked
    closed: bool,
}

impl CallSession {
    fn send_to_others(&self, call_id: &RoomId, sender: &ConnectionHandle, frame: &str) -> usize {
        let mut delivered = 0;
        for peer in self.peers.iter().filter(|peer| peer.conn.id() != sender.id()) {
            match peer.conn.send_text(frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    Metrics::global().connections.send_failures.inc();
                    warn!("Signal to {} in call {} failed: {}", peer.name, call_id, e);
                }
            }
        }
        delivered
    }
}

/// Owns all live call sessions
pub struct CallStore {
    calls: DashMap<RoomId, Arc<Mutex<CallSession>>>,
    rooms: Arc<RoomStore>,
}

impl CallStore {
    /// Create a store whose calls must belong to rooms in `rooms`
    pub fn new(rooms: Arc<RoomStore>) -> Self {
        Self {
            calls: DashMap::new(),
            rooms,
        }
    }

    /// Add `conn` to the call for `call_id`, creating the session if needed
    ///
    /// The other peer, if any, is told about the newcomer with a `join`
    /// envelope. Fails with `CallFull` once two peers are present; the caller
    /// is expected to close the rejected connection.
    pub fn join(&self, call_id: &RoomId, conn: &ConnectionHandle, name: &str) -> Result<()> {
        if !self.rooms.contains(call_id) {
            return Err(Error::RoomNotFound);
        }

        loop {
            let session = match self.calls.entry(call_id.clone()) {
                Entry::Occupied(entry) => Arc::clone(entry.get()),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(Mutex::new(CallSession {
                        peers: vec![CallPeer {
                            conn: conn.clone(),
                            name: name.to_string(),
                        }],
                        closed: false,
                    })));
                    Metrics::global().calls.active.inc();
                    info!("Call {} started by {}", call_id, name);
                    return Ok(());
                }
            };

            let mut state = session.lock();
            if state.closed {
                // Torn down while we waited; it is already unlinked, so retry
                continue;
            }
            if state.peers.len() >= CALL_CAPACITY {
                Metrics::global().calls.rejected_full.inc();
                info!("Call {} is full; rejecting {}", call_id, name);
                return Err(Error::CallFull);
            }

            let announcement = serde_json::to_string(&SignalEnvelope::join(conn.id(), name))?;
            state.send_to_others(call_id, conn, &announcement);
            state.peers.push(CallPeer {
                conn: conn.clone(),
                name: name.to_string(),
            });
            info!("{} joined call {} ({} peers)", name, call_id, state.peers.len());
            return Ok(());
        }
    }

    /// Forward `envelope` from `conn` to the other peer
    ///
    /// A sender that is not a member of the session is disconnected instead.
    /// Returns the number of deliveries.
    pub fn relay(&self, call_id: &RoomId, conn: &ConnectionHandle, envelope: &SignalEnvelope) -> usize {
        let session = self.session(call_id);
        let state = session.as_ref().map(|session| session.lock());

        let Some(state) = state.filter(|state| {
            state.peers.iter().any(|peer| peer.conn.id() == conn.id())
        }) else {
            warn!("Closing {}: not a peer of call {}", conn.id(), call_id);
            conn.close();
            return 0;
        };

        let frame = match serde_json::to_string(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode signal for call {}: {}", call_id, e);
                return 0;
            }
        };

        let delivered = state.send_to_others(call_id, conn, &frame);
        Metrics::global().calls.relayed.inc_by(delivered as u64);
        debug!("Relayed {:?} in call {} to {} peer(s)", envelope.kind, call_id, delivered);
        delivered
    }

    /// Remove `conn` from the call; drops the session when it empties
    ///
    /// The remaining peer receives a `leave` envelope carrying the departed
    /// connection id. Returns whether the connection was a peer.
    pub fn leave(&self, call_id: &RoomId, conn: &ConnectionHandle) -> bool {
        let Some(session) = self.session(call_id) else {
            return false;
        };
        let mut state = session.lock();

        let Some(index) = state.peers.iter().position(|peer| peer.conn.id() == conn.id()) else {
            return false;
        };
        let peer = state.peers.remove(index);
        info!("{} left call {} ({} peers)", peer.name, call_id, state.peers.len());

        if state.peers.is_empty() {
            state.closed = true;
            // Unlinked under the session lock so no join can slip into a dead session
            self.calls.remove_if(call_id, |_, current| Arc::ptr_eq(current, &session));
            Metrics::global().calls.active.dec();
            info!("Call {} ended", call_id);
        } else {
            match serde_json::to_string(&SignalEnvelope::leave(conn.id())) {
                Ok(notice) => {
                    state.send_to_others(call_id, conn, &notice);
                }
                Err(e) => warn!("Failed to encode leave notice for call {}: {}", call_id, e),
            }
        }
        true
    }

    /// Whether a session exists for `call_id`
    pub fn contains(&self, call_id: &RoomId) -> bool {
        self.calls.contains_key(call_id)
    }

    /// Number of peers in the session, zero when it does not exist
    pub fn peer_count(&self, call_id: &RoomId) -> usize {
        match self.session(call_id) {
            Some(session) => {
                let count = session.lock().peers.len();
                count
            }
            None => 0,
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no sessions are live
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn session(&self, call_id: &RoomId) -> Option<Arc<Mutex<CallSession>>> {
        self.calls.get(call_id).map(|entry| Arc::clone(entry.value()))
    }
}
