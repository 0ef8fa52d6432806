//! Connection event dispatch
//!
//! Every socket is bound to exactly one [`Scope`] when it is accepted. The
//! [`SignalingRouter`] forwards its open, message and close events to the
//! store owning that scope through the [`ScopeHandler`] trait.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::calls::CallStore;
use crate::connection::ConnectionHandle;
use crate::core::error::Result;
use crate::core::types::RoomId;
use crate::lobby::ConnectionRegistry;
use crate::protocol::SignalEnvelope;
use crate::rooms::RoomStore;

/// Room membership requested by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomScope {
    /// Target room
    pub room_id: RoomId,
    /// Display name; may be empty, which the room rejects
    pub name: String,
}

/// Call membership requested by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallScope {
    /// Room the call belongs to
    pub call_id: RoomId,
    /// Display name announced to the other peer
    pub name: String,
}

/// What a connection is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Room list listener
    Lobby,
    /// Chat room member
    Room(RoomScope),
    /// Call peer
    Call(CallScope),
}

impl Scope {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Scope::Lobby => "lobby",
            Scope::Room(_) => "room",
            Scope::Call(_) => "call",
        }
    }
}

/// Lifecycle hooks a store exposes for the connections it owns
pub trait ScopeHandler {
    /// Scope data the store needs to locate the connection
    type Context;

    /// Admit `conn`; an error means the connection must be rejected
    fn on_open(&self, ctx: &Self::Context, conn: &ConnectionHandle) -> Result<()>;

    /// Handle one inbound text frame
    fn on_message(&self, ctx: &Self::Context, conn: &ConnectionHandle, text: &str);

    /// Release everything held for `conn`
    fn on_close(&self, ctx: &Self::Context, conn: &ConnectionHandle);
}

impl ScopeHandler for ConnectionRegistry {
    type Context = ();

    fn on_open(&self, _: &(), conn: &ConnectionHandle) -> Result<()> {
        self.register(conn.clone())
    }

    fn on_message(&self, _: &(), conn: &ConnectionHandle, _text: &str) {
        debug!("Ignoring frame from lobby connection {}", conn.id());
    }

    fn on_close(&self, _: &(), conn: &ConnectionHandle) {
        self.deregister(conn.id());
    }
}

impl ScopeHandler for RoomStore {
    type Context = RoomScope;

    fn on_open(&self, ctx: &RoomScope, conn: &ConnectionHandle) -> Result<()> {
        self.join(&ctx.room_id, conn, &ctx.name)
    }

    fn on_message(&self, ctx: &RoomScope, conn: &ConnectionHandle, text: &str) {
        self.send_message(&ctx.room_id, conn, text);
    }

    fn on_close(&self, ctx: &RoomScope, conn: &ConnectionHandle) {
        self.leave(&ctx.room_id, conn);
    }
}

impl ScopeHandler for CallStore {
    type Context = CallScope;

    fn on_open(&self, ctx: &CallScope, conn: &ConnectionHandle) -> Result<()> {
        self.join(&ctx.call_id, conn, &ctx.name)
    }

    fn on_message(&self, ctx: &CallScope, conn: &ConnectionHandle, text: &str) {
        match SignalEnvelope::parse(text) {
            Ok(envelope) => {
                self.relay(&ctx.call_id, conn, &envelope);
            }
            Err(e) => warn!("Dropping frame from {} in call {}: {}", conn.id(), ctx.call_id, e),
        }
    }

    fn on_close(&self, ctx: &CallScope, conn: &ConnectionHandle) {
        self.leave(&ctx.call_id, conn);
    }
}

/// Routes connection events to the lobby, room or call store
#[derive(Clone)]
pub struct SignalingRouter {
    lobby: Arc<ConnectionRegistry>,
    rooms: Arc<RoomStore>,
    calls: Arc<CallStore>,
}

impl SignalingRouter {
    /// Create a router over the given stores
    pub fn new(lobby: Arc<ConnectionRegistry>, rooms: Arc<RoomStore>, calls: Arc<CallStore>) -> Self {
        Self { lobby, rooms, calls }
    }

    /// Admit `conn` into `scope`
    ///
    /// On failure the connection receives the error text and is closed; the
    /// return value tells the transport whether to keep reading.
    pub fn open(&self, scope: &Scope, conn: &ConnectionHandle) -> bool {
        let outcome = match scope {
            Scope::Lobby => self.lobby.on_open(&(), conn),
            Scope::Room(ctx) => self.rooms.on_open(ctx, conn),
            Scope::Call(ctx) => self.calls.on_open(ctx, conn),
        };

        match outcome {
            Ok(()) => true,
            Err(e) => {
                info!("Rejecting {} connection {}: {}", scope.kind(), conn.id(), e);
                conn.reject(&e.to_string());
                false
            }
        }
    }

    /// Deliver one inbound text frame
    pub fn message(&self, scope: &Scope, conn: &ConnectionHandle, text: &str) {
        match scope {
            Scope::Lobby => self.lobby.on_message(&(), conn, text),
            Scope::Room(ctx) => self.rooms.on_message(ctx, conn, text),
            Scope::Call(ctx) => self.calls.on_message(ctx, conn, text),
        }
    }

    /// Tear down `conn`; only called for connections that were admitted
    pub fn close(&self, scope: &Scope, conn: &ConnectionHandle) {
        match scope {
            Scope::Lobby => self.lobby.on_close(&(), conn),
            Scope::Room(ctx) => self.rooms.on_close(ctx, conn),
            Scope::Call(ctx) => self.calls.on_close(ctx, conn),
        }
    }
}
