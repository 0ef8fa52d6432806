//! HTTP server implementation for the chat API

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use crate::core::error::Result;
use crate::core::AppState;

/// Creates the main application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let cors = if state.config.server.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE])
    };

    let mut app = Router::new()
        // Room routes
        .route(
            "/chat/rooms",
            get(handlers::rooms_index).post(handlers::create_room),
        )
        .route("/chat/rooms/:id", get(handlers::room_socket))
        .route("/chat/rooms/:id/messages", get(handlers::room_history))
        // Call routes
        .route("/chat/calls/:id", get(handlers::call_socket))
        // System routes
        .route("/health", get(handlers::health_check));

    if state.config.metrics.enabled {
        app = app.route("/metrics", get(handlers::metrics_handler));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
    .with_state(state)
}

/// Serve the app on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn start_server<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Starting Huddle server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    tracing::info!("Rooms available at http://{}/chat/rooms", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    serve(listener, state, shutdown).await
}
