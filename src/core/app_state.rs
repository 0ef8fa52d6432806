//! Application State Management
//!
//! `AppState` owns every registry for one server instance. Several instances
//! can live side by side in one process; nothing here is global apart from
//! metrics.

use std::sync::Arc;

use crate::calls::CallStore;
use crate::core::config::Config;
use crate::lobby::ConnectionRegistry;
use crate::rooms::RoomStore;
use crate::router::SignalingRouter;

/// Central application state holding all registries
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Lobby connections receiving room lifecycle pushes
    pub lobby: Arc<ConnectionRegistry>,

    /// Chat rooms
    pub rooms: Arc<RoomStore>,

    /// Call sessions
    pub calls: Arc<CallStore>,

    /// Dispatches socket events to the store owning their scope
    pub router: SignalingRouter,
}

impl AppState {
    /// Build fresh, empty registries from `config`
    pub fn new(config: Config) -> Self {
        let lobby = Arc::new(ConnectionRegistry::new());
        let rooms = RoomStore::new(config.rooms.clone(), Arc::clone(&lobby));
        let calls = Arc::new(CallStore::new(Arc::clone(&rooms)));
        let router = SignalingRouter::new(Arc::clone(&lobby), Arc::clone(&rooms), Arc::clone(&calls));

        Self {
            config: Arc::new(config),
            lobby,
            rooms,
            calls,
            router,
        }
    }
}
