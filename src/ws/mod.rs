//! The WebSocket subsystem: connections, the per-route registry, rooms and
//! fan-out.

pub mod connection;
pub mod manager;
pub mod notifier;
pub(crate) mod upgrade;

use std::sync::Arc;

use futures_util::{Sink, StreamExt};
use hyper::upgrade::OnUpgrade;
use log::{debug, error};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub use self::connection::WsConnection;
pub use self::manager::SocketManager;
pub use self::notifier::EventFuture;

use crate::handler::WsCallback;

pub(crate) type WsError = tokio_tungstenite::tungstenite::Error;

/// The type-erased write half of a WebSocket transport.
pub(crate) type BoxedSink = Box<dyn Sink<Message, Error = WsError> + Send + Unpin>;

/// Drives one WebSocket session from upgrade to disconnect.
///
/// Waits for the protocol switch, registers the connection with the route's
/// manager, runs the route's WS callback so it can subscribe, then delivers
/// inbound frames until the transport winds down. Cleanup removes the
/// connection from the manager (dropping its room memberships) and disposes
/// it, firing the close callbacks exactly once.
pub(crate) async fn run_session(
    on_upgrade: OnUpgrade,
    manager: Arc<SocketManager>,
    callback: WsCallback,
) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(err) => {
            error!(target: "nanoserve::ws", " upgrade failed: {}", err);
            return;
        }
    };

    let stream = WebSocketStream::from_raw_socket(upgraded, Role::Server, None).await;
    let (sink, mut stream) = stream.split();
    let conn = WsConnection::register(Box::new(sink), &manager);
    debug!(target: "nanoserve::ws", " socket {} connected", conn.id());

    if let Err(err) = callback(conn.clone()).await {
        error!(
            target: "nanoserve::ws",
            " websocket handler failed for socket {}: {}",
            conn.id(),
            err
        );
    }
    connection::notify_open(&conn).await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(message @ Message::Text(_)) | Ok(message @ Message::Binary(_)) => {
                connection::notify_message(&conn, message).await;
            }
            // Pings are answered by the protocol layer on the next read.
            Ok(_) => {}
            Err(err) => {
                connection::notify_error(&conn, &err.to_string()).await;
                break;
            }
        }
    }

    manager.on_disconnect(&conn);
    connection::dispose(&conn).await;
    debug!(target: "nanoserve::ws", " socket {} disconnected", conn.id());
}
