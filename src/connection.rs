//! Transport-agnostic connection handles
//!
//! Stores never touch a socket. They hold a [`ConnectionHandle`] whose
//! [`Peer`] implementation decides how frames reach the remote side. The
//! WebSocket adapter uses [`ChannelPeer`], which queues frames on an unbounded
//! channel drained by the socket task, so sends never block a store lock.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::error::{Error, Result};
use crate::core::types::ConnectionId;

/// Sending half of a live connection
pub trait Peer: Send + Sync {
    /// Queue a text frame for the remote side
    fn send_text(&self, text: &str) -> Result<()>;

    /// Ask the transport to close the connection
    fn close(&self);
}

/// Frame queued for the socket writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame
    Text(String),
    /// Close the connection after flushing earlier frames
    Close,
}

/// [`Peer`] backed by an unbounded tokio channel
pub struct ChannelPeer {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelPeer {
    /// Create a peer and the receiver the transport task drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Peer for ChannelPeer {
    fn send_text(&self, text: &str) -> Result<()> {
        self.tx
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| Error::send_failure("connection already closed"))
    }

    fn close(&self) {
        // Receiver gone means the socket is already down
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Cheaply clonable handle to one connection
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: Arc<dyn Peer>,
}

impl ConnectionHandle {
    /// Wrap a peer under a fresh connection id
    pub fn new(peer: Arc<dyn Peer>) -> Self {
        Self {
            id: ConnectionId::random(),
            peer,
        }
    }

    /// Convenience constructor for a channel-backed connection
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (peer, rx) = ChannelPeer::new();
        (Self::new(Arc::new(peer)), rx)
    }

    /// Connection identity
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Send a text frame
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.peer.send_text(text)
    }

    /// Close the connection
    pub fn close(&self) {
        self.peer.close()
    }

    /// Send a rejection reason and close
    pub fn reject(&self, reason: &str) {
        let _ = self.peer.send_text(reason);
        self.peer.close();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle").field("id", &self.id).finish()
    }
}
