//! HTTP request handlers for the chat API

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::socket::serve_socket;
use crate::core::error::Error;
use crate::core::types::RoomId;
use crate::core::AppState;
use crate::protocol::{ChatMessage, CreateRoomRequest, CreateRoomResponse, MessageResponse};
use crate::router::{CallScope, RoomScope, Scope};
use crate::system::metrics::collect_metrics;

/// `?name=` on socket routes; a missing name is treated as empty
#[derive(Debug, Default, Deserialize)]
pub struct NameQuery {
    /// Display name
    #[serde(default)]
    pub name: String,
}

/// Body of `GET /health`
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests
    pub status: String,
    /// Crate version
    pub version: String,
    /// Open rooms
    pub rooms: usize,
    /// Live call sessions
    pub calls: usize,
    /// Registered lobby connections
    pub lobby_connections: usize,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::RoomNotFound => StatusCode::NOT_FOUND,
            Error::CallFull => StatusCode::CONFLICT,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            e => {
                error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = MessageResponse {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// `GET /chat/rooms`: room list, or a lobby socket when the request upgrades
pub async fn rooms_index(State(state): State<AppState>, ws: Option<WebSocketUpgrade>) -> Response {
    match ws {
        Some(ws) => {
            let router = state.router.clone();
            ws.on_upgrade(move |socket| serve_socket(socket, router, Scope::Lobby))
        }
        None => Json(state.rooms.list_rooms()).into_response(),
    }
}

/// Create a room with a unique title
pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), Error> {
    let room = state.rooms.create_room(&request.title)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            message: "Room created".to_string(),
            room,
        }),
    ))
}

/// Recent chat lines of an open room
pub async fn room_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, Error> {
    Ok(Json(state.rooms.history(&RoomId::from(id))?))
}

/// Upgrade into a chat room member socket
pub async fn room_socket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NameQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("Room socket requested for {} by {:?}", id, query.name);
    let scope = Scope::Room(RoomScope {
        room_id: RoomId::from(id),
        name: query.name,
    });
    let router = state.router.clone();
    ws.on_upgrade(move |socket| serve_socket(socket, router, scope))
}

/// Upgrade into a call peer socket
pub async fn call_socket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NameQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("Call socket requested for {} by {:?}", id, query.name);
    let scope = Scope::Call(CallScope {
        call_id: RoomId::from(id),
        name: query.name,
    });
    let router = state.router.clone();
    ws.on_upgrade(move |socket| serve_socket(socket, router, scope))
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        rooms: state.rooms.len(),
        calls: state.calls.len(),
        lobby_connections: state.lobby.len(),
    })
}

/// Prometheus text exposition
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        collect_metrics(),
    )
}
