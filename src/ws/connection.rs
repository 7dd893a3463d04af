//! Defines `WsConnection`, a single live WebSocket session.
//!
//! A connection exclusively owns the write half of its transport; the read
//! half is driven by the session loop in `ws::run_session`. The connection
//! holds only a non-owning reference to its `SocketManager`. The manager is
//! the sole owner of connections, which is what breaks the ownership cycle on
//! disconnect.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_util::SinkExt;
use log::trace;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SocketError;
use crate::ws::manager::SocketManager;
use crate::ws::notifier::{self, EventFuture, SocketNotifier};
use crate::ws::{BoxedSink, WsError};

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Builds the typed-event envelope frame.
pub(crate) fn envelope(event: &str, data: Value) -> Message {
    Message::Text(json!({ "type": event, "data": data }).to_string())
}

/// A live WebSocket session.
///
/// All outbound operations fail with [`SocketError::Closed`] once the
/// connection has been disposed.
pub struct WsConnection {
    id: u64,
    sink: tokio::sync::Mutex<BoxedSink>,
    manager: Weak<SocketManager>,
    notifier: Mutex<SocketNotifier>,
    attributes: Mutex<HashMap<String, Value>>,
    disposed: AtomicBool,
}

impl WsConnection {
    /// Creates a connection around the transport's write half and registers
    /// it with the manager.
    pub(crate) fn register(sink: BoxedSink, manager: &Arc<SocketManager>) -> Arc<WsConnection> {
        let conn = Arc::new(WsConnection {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            sink: tokio::sync::Mutex::new(sink),
            manager: Arc::downgrade(manager),
            notifier: Mutex::new(SocketNotifier::new()),
            attributes: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        });
        manager.add(conn.clone());
        conn
    }

    /// The connection's process-unique id, from a monotonic counter.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the connection has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stores a user attribute on the connection.
    pub fn set_attribute(&self, key: &str, value: Value) {
        self.attributes
            .lock()
            .expect("attribute mutex poisoned")
            .insert(key.to_owned(), value);
    }

    /// Reads back a user attribute.
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes
            .lock()
            .expect("attribute mutex poisoned")
            .get(key)
            .cloned()
    }

    fn live_manager(&self) -> Result<Arc<SocketManager>, SocketError> {
        if self.is_disposed() {
            return Err(SocketError::Closed);
        }
        self.manager.upgrade().ok_or(SocketError::Closed)
    }

    /// Sends a raw frame to this peer.
    pub async fn send<M: Into<Message>>(&self, message: M) -> Result<(), SocketError> {
        if self.is_disposed() {
            return Err(SocketError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(message.into()).await.map_err(SocketError::from)
    }

    /// Sends the typed-event envelope `{type, data}` to this peer.
    pub async fn emit(&self, event: &str, data: Value) -> Result<(), SocketError> {
        self.send(envelope(event, data)).await
    }

    /// Joins a room; returns `true` iff the membership is new.
    pub fn join(&self, room: &str) -> Result<bool, SocketError> {
        Ok(self.live_manager()?.join(self.id, room))
    }

    /// Leaves a room; returns `true` iff the membership existed.
    pub fn leave(&self, room: &str) -> Result<bool, SocketError> {
        Ok(self.live_manager()?.leave(self.id, room))
    }

    /// Sends a raw frame to every live peer except this one.
    pub async fn broadcast<M: Into<Message>>(&self, message: M) -> Result<(), SocketError> {
        let manager = self.live_manager()?;
        manager.broadcast(self.id, message.into()).await;
        Ok(())
    }

    /// Sends a typed event to every live peer except this one.
    pub async fn broadcast_event(&self, event: &str, data: Value) -> Result<(), SocketError> {
        let manager = self.live_manager()?;
        manager.broadcast(self.id, envelope(event, data)).await;
        Ok(())
    }

    /// Sends a raw frame to every live peer, this one included.
    pub async fn send_to_all<M: Into<Message>>(&self, message: M) -> Result<(), SocketError> {
        let manager = self.live_manager()?;
        manager.send_to_all(message.into()).await;
        Ok(())
    }

    /// Sends a typed event to every live peer, this one included.
    pub async fn emit_to_all(&self, event: &str, data: Value) -> Result<(), SocketError> {
        let manager = self.live_manager()?;
        manager.send_to_all(envelope(event, data)).await;
        Ok(())
    }

    /// Sends a raw frame to every member of `room`. The sender need not be a
    /// member; if it is, it receives the frame too.
    pub async fn send_to_room<M: Into<Message>>(
        &self,
        room: &str,
        message: M,
    ) -> Result<(), SocketError> {
        let manager = self.live_manager()?;
        manager.send_to_room(room, message.into()).await;
        Ok(())
    }

    /// Sends a typed event to every member of `room`.
    pub async fn emit_to_room(&self, event: &str, room: &str, data: Value) -> Result<(), SocketError> {
        let manager = self.live_manager()?;
        manager.send_to_room(room, envelope(event, data)).await;
        Ok(())
    }

    /// Sends a raw frame to every member of `room` except this connection.
    pub async fn broadcast_to_room<M: Into<Message>>(
        &self,
        room: &str,
        message: M,
    ) -> Result<(), SocketError> {
        let manager = self.live_manager()?;
        manager.broadcast_to_room(room, self.id, message.into()).await;
        Ok(())
    }

    /// Sends a typed event to every member of `room` except this connection.
    pub async fn broadcast_event_to_room(
        &self,
        event: &str,
        room: &str,
        data: Value,
    ) -> Result<(), SocketError> {
        let manager = self.live_manager()?;
        manager
            .broadcast_to_room(room, self.id, envelope(event, data))
            .await;
        Ok(())
    }

    /// Subscribes to a named typed event.
    pub fn on<F, Fut>(&self, event: &str, callback: F) -> Result<(), SocketError>
    where
        F: Fn(Arc<WsConnection>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lock_notifier().on_event(
            event,
            Arc::new(move |conn, data| -> EventFuture { Box::pin(callback(conn, data)) }),
        )
    }

    /// Subscribes to every data frame, regardless of shape.
    pub fn on_message<F, Fut>(&self, callback: F) -> Result<(), SocketError>
    where
        F: Fn(Arc<WsConnection>, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lock_notifier().on_message(Arc::new(
            move |conn, message| -> EventFuture { Box::pin(callback(conn, message)) },
        ))
    }

    /// Subscribes to the open notification.
    pub fn on_open<F, Fut>(&self, callback: F) -> Result<(), SocketError>
    where
        F: Fn(Arc<WsConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lock_notifier()
            .on_open(Arc::new(move |conn| -> EventFuture { Box::pin(callback(conn)) }))
    }

    /// Subscribes to the close notification.
    pub fn on_close<F, Fut>(&self, callback: F) -> Result<(), SocketError>
    where
        F: Fn(Arc<WsConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lock_notifier()
            .on_close(Arc::new(move |conn| -> EventFuture { Box::pin(callback(conn)) }))
    }

    /// Subscribes to transport errors.
    pub fn on_error<F, Fut>(&self, callback: F) -> Result<(), SocketError>
    where
        F: Fn(Arc<WsConnection>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lock_notifier().on_error(Arc::new(
            move |conn, error| -> EventFuture { Box::pin(callback(conn, error)) },
        ))
    }

    /// Closes the transport, optionally with a close code and reason.
    ///
    /// Disposal completes once the transport winds down and the session loop
    /// runs its cleanup, which fires the close callbacks.
    pub async fn close(&self, frame: Option<(u16, String)>) -> Result<(), SocketError> {
        if self.is_disposed() {
            return Err(SocketError::Closed);
        }

        let message = Message::Close(frame.map(|(code, reason)| CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        }));

        let mut sink = self.sink.lock().await;
        match sink.send(message).await {
            // This error indicates a connection that already closed cleanly.
            Ok(()) | Err(WsError::ConnectionClosed) => Ok(()),
            Err(err) => Err(SocketError::from(err)),
        }
    }

    fn lock_notifier(&self) -> std::sync::MutexGuard<'_, SocketNotifier> {
        self.notifier.lock().expect("notifier mutex poisoned")
    }
}

/// Fires the open callbacks registered so far.
pub(crate) async fn notify_open(conn: &Arc<WsConnection>) {
    let callbacks = conn.lock_notifier().open_callbacks();
    for callback in callbacks {
        callback(conn.clone()).await;
    }
}

/// Delivers a data frame: raw message callbacks first, then, when the frame
/// decodes as the typed-event envelope, the callbacks for that event name.
pub(crate) async fn notify_message(conn: &Arc<WsConnection>, message: Message) {
    let callbacks = conn.lock_notifier().message_callbacks();
    for callback in callbacks {
        callback(conn.clone(), message.clone()).await;
    }

    if let Some((event, data)) = notifier::decode_event(&message) {
        let callbacks = conn.lock_notifier().event_callbacks(&event);
        trace!(
            target: "nanoserve::ws",
            " socket {} event `{}` has {} handler(s)",
            conn.id(),
            event,
            callbacks.len()
        );
        for callback in callbacks {
            callback(conn.clone(), data.clone()).await;
        }
    }
}

/// Fires the error callbacks with the transport error's message.
pub(crate) async fn notify_error(conn: &Arc<WsConnection>, error: &str) {
    let callbacks = conn.lock_notifier().error_callbacks();
    for callback in callbacks {
        callback(conn.clone(), error.to_owned()).await;
    }
}

/// Marks the connection disposed and fires its close callbacks exactly once.
pub(crate) async fn dispose(conn: &Arc<WsConnection>) {
    if conn.disposed.swap(true, Ordering::SeqCst) {
        return;
    }

    let callbacks = conn.lock_notifier().dispose();
    for callback in callbacks {
        callback(conn.clone()).await;
    }
}
