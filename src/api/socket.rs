//! WebSocket pump
//!
//! Bridges one axum [`WebSocket`] to the router. Outbound frames arrive on the
//! connection's channel and are written in order; inbound text frames are
//! handed to the scope's store. The connection is released exactly once,
//! whichever side hangs up first.

use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::connection::{ChannelPeer, ConnectionHandle, Outbound};
use crate::router::{Scope, SignalingRouter};

/// Drive `socket` as a member of `scope` until either side closes
pub async fn serve_socket(mut socket: WebSocket, router: SignalingRouter, scope: Scope) {
    let (peer, mut outbound) = ChannelPeer::new();
    let conn = ConnectionHandle::new(Arc::new(peer));

    if !router.open(&scope, &conn) {
        flush_rejection(&mut socket, &mut outbound).await;
        return;
    }
    debug!("{} connection {} open", scope.kind(), conn.id());

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => router.message(&scope, &conn, &text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Binary, ping and pong frames carry nothing for the relay
                Some(Ok(_)) => {}
            },
        }
    }

    router.close(&scope, &conn);
    debug!("{} connection {} closed", scope.kind(), conn.id());
}

/// Write the queued rejection reason, then close the socket
async fn flush_rejection(socket: &mut WebSocket, outbound: &mut UnboundedReceiver<Outbound>) {
    while let Ok(frame) = outbound.try_recv() {
        match frame {
            Outbound::Text(text) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}
