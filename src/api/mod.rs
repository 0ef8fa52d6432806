//! # API Module
//!
//! HTTP and WebSocket surface of the relay. Everything lives under `/chat`
//! apart from the operational endpoints.
//!
//! ## Endpoints Overview
//!
//! ### Rooms
//! - `GET /chat/rooms` - List rooms, or open a lobby socket when upgraded
//! - `POST /chat/rooms` - Create a room
//! - `GET /chat/rooms/{id}/messages` - Recent chat lines of a room
//!
//! ### Sockets
//! - `WebSocket /chat/rooms/{id}?name=` - Join a chat room
//! - `WebSocket /chat/calls/{id}?name=` - Join the call of a room
//!
//! ### System Essentials
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

pub mod handlers;
pub mod server;
pub mod socket;

// Re-export commonly used items
pub use server::{create_app, serve, start_server};
