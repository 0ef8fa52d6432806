//! Wire messages exchanged with HTTP and WebSocket clients
//!
//! Everything here is JSON. Chat frames use a fixed schema, lobby pushes carry
//! a room reference plus a lifecycle verb, and call frames are signaling
//! envelopes whose `data` is relayed without inspection.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::SYSTEM_USER;
use crate::core::error::{Error, Result};
use crate::core::types::{ConnectionId, RoomId};

/// Public room descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    /// Room identifier
    pub id: RoomId,
    /// Unique room title
    pub title: String,
}

/// Body of `POST /rooms`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    /// Requested title
    pub title: String,
}

/// Response to a successful room creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    /// Always "Room created"
    pub message: String,
    /// The new room
    pub room: RoomSummary,
}

/// Plain `{message}` body used for HTTP errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable message
    pub message: String,
}

/// One chat line broadcast to room members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// ISO-8601 UTC timestamp assigned by the server
    pub timestamp: String,
    /// Sender display name, or "System"
    pub user: String,
    /// Message text
    pub message: String,
}

impl ChatMessage {
    /// Message authored by a room member
    pub fn from_user(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_timestamp(),
            user: user.into(),
            message: message.into(),
        }
    }

    /// Server-generated announcement
    pub fn system(message: impl Into<String>) -> Self {
        Self::from_user(SYSTEM_USER, message)
    }
}

/// Room lifecycle verb pushed to lobby connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyAction {
    /// A room was created
    Created,
    /// A room expired
    Deleted,
}

/// Room reference inside a lobby push; deletions omit the title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyRoom {
    /// Room identifier
    pub id: RoomId,
    /// Title, present on creation only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Push sent to every lobby connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyEvent {
    /// Affected room
    pub room: LobbyRoom,
    /// What happened to it
    pub message: LobbyAction,
}

impl LobbyEvent {
    /// Room creation notice
    pub fn created(room: &RoomSummary) -> Self {
        Self {
            room: LobbyRoom {
                id: room.id.clone(),
                title: Some(room.title.clone()),
            },
            message: LobbyAction::Created,
        }
    }

    /// Room deletion notice
    pub fn deleted(id: &RoomId) -> Self {
        Self {
            room: LobbyRoom { id: id.clone(), title: None },
            message: LobbyAction::Deleted,
        }
    }
}

/// Signaling message kinds understood by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Peer announcement
    Join,
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
    /// ICE candidate
    Candidate,
    /// Peer hang-up
    Leave,
}

/// `{type, data}` frame relayed between call peers
///
/// `data` is opaque: the relay never looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Opaque payload
    #[serde(default)]
    pub data: Value,
}

impl SignalEnvelope {
    /// Parse an inbound frame, rejecting unknown kinds
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::invalid_envelope(e.to_string()))
    }

    /// Announcement that a peer joined the call
    pub fn join(id: ConnectionId, name: &str) -> Self {
        Self {
            kind: SignalKind::Join,
            data: serde_json::json!({ "id": id, "name": name }),
        }
    }

    /// Notice that a peer left the call
    pub fn leave(id: ConnectionId) -> Self {
        Self {
            kind: SignalKind::Leave,
            data: serde_json::json!({ "id": id }),
        }
    }
}

/// Server timestamp in the `2024-01-01T00:00:00.000Z` form browsers produce
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
