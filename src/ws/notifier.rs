//! Defines `SocketNotifier`, the per-connection event registry.
//!
//! The notifier owns the callback lists for a single connection: raw message
//! callbacks (fired for every data frame), open/close/error lifecycle
//! callbacks, and named-event callbacks fired when a text frame decodes as
//! the typed-event envelope `{"type": <string>, "data": <any>}`.
//!
//! Delivery itself happens in `connection`, against snapshots of these lists,
//! so a callback may register further callbacks without deadlocking.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SocketError;
use crate::ws::WsConnection;

/// The boxed future returned by every socket callback.
pub type EventFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub(crate) type MessageCallback = Arc<dyn Fn(Arc<WsConnection>, Message) -> EventFuture + Send + Sync>;
pub(crate) type EventCallback = Arc<dyn Fn(Arc<WsConnection>, Value) -> EventFuture + Send + Sync>;
pub(crate) type LifecycleCallback = Arc<dyn Fn(Arc<WsConnection>) -> EventFuture + Send + Sync>;
pub(crate) type ErrorCallback = Arc<dyn Fn(Arc<WsConnection>, String) -> EventFuture + Send + Sync>;

/// Per-connection event registry.
pub struct SocketNotifier {
    message: Vec<MessageCallback>,
    open: Vec<LifecycleCallback>,
    close: Vec<LifecycleCallback>,
    error: Vec<ErrorCallback>,
    events: HashMap<String, Vec<EventCallback>>,
    disposed: bool,
}

impl SocketNotifier {
    pub(crate) fn new() -> SocketNotifier {
        SocketNotifier {
            message: Vec::new(),
            open: Vec::new(),
            close: Vec::new(),
            error: Vec::new(),
            events: HashMap::new(),
            disposed: false,
        }
    }

    fn ensure_live(&self) -> Result<(), SocketError> {
        if self.disposed {
            Err(SocketError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn on_message(&mut self, callback: MessageCallback) -> Result<(), SocketError> {
        self.ensure_live()?;
        self.message.push(callback);
        Ok(())
    }

    pub(crate) fn on_open(&mut self, callback: LifecycleCallback) -> Result<(), SocketError> {
        self.ensure_live()?;
        self.open.push(callback);
        Ok(())
    }

    pub(crate) fn on_close(&mut self, callback: LifecycleCallback) -> Result<(), SocketError> {
        self.ensure_live()?;
        self.close.push(callback);
        Ok(())
    }

    pub(crate) fn on_error(&mut self, callback: ErrorCallback) -> Result<(), SocketError> {
        self.ensure_live()?;
        self.error.push(callback);
        Ok(())
    }

    pub(crate) fn on_event(&mut self, event: &str, callback: EventCallback) -> Result<(), SocketError> {
        self.ensure_live()?;
        self.events
            .entry(event.to_owned())
            .or_insert_with(Vec::new)
            .push(callback);
        Ok(())
    }

    pub(crate) fn message_callbacks(&self) -> Vec<MessageCallback> {
        self.message.clone()
    }

    pub(crate) fn open_callbacks(&self) -> Vec<LifecycleCallback> {
        self.open.clone()
    }

    pub(crate) fn error_callbacks(&self) -> Vec<ErrorCallback> {
        self.error.clone()
    }

    pub(crate) fn event_callbacks(&self, event: &str) -> Vec<EventCallback> {
        self.events.get(event).cloned().unwrap_or_default()
    }

    /// Marks the notifier disposed, clears every list and hands back the
    /// close callbacks so they can be fired exactly once. A second call
    /// returns an empty list.
    pub(crate) fn dispose(&mut self) -> Vec<LifecycleCallback> {
        self.disposed = true;
        self.message.clear();
        self.open.clear();
        self.error.clear();
        self.events.clear();
        std::mem::take(&mut self.close)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Decodes the typed-event envelope out of a text frame.
///
/// The envelope is a JSON object with exactly the keys `type` (a string) and
/// `data` (any JSON value). Anything else (non-text frames, invalid JSON,
/// extra or missing keys) is not a typed event; the failure is swallowed and
/// only the raw message callbacks see the frame.
pub(crate) fn decode_event(message: &Message) -> Option<(String, Value)> {
    let text = match message {
        Message::Text(text) => text,
        _ => return None,
    };

    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    if object.len() != 2 {
        return None;
    }

    let event = object.get("type")?.as_str()?.to_owned();
    let data = object.get("data")?.clone();
    Some((event, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_typed_event_envelope() {
        let message = Message::from(r#"{"type":"greet","data":"hi"}"#);
        let (event, data) = decode_event(&message).unwrap();
        assert_eq!(event, "greet");
        assert_eq!(data, Value::from("hi"));
    }

    #[test]
    fn rejects_frames_that_are_not_the_envelope() {
        assert!(decode_event(&Message::from("plain text")).is_none());
        assert!(decode_event(&Message::from(r#"{"type":"greet"}"#)).is_none());
        assert!(decode_event(&Message::from(r#"{"type":1,"data":2}"#)).is_none());
        assert!(decode_event(&Message::from(r#"{"type":"a","data":1,"x":2}"#)).is_none());
        assert!(decode_event(&Message::Binary(vec![1, 2, 3])).is_none());
    }

    #[test]
    fn registrations_fail_after_dispose() {
        let mut notifier = SocketNotifier::new();
        notifier
            .on_event("greet", Arc::new(|_, _| Box::pin(async {})))
            .unwrap();

        let close_callbacks = notifier.dispose();
        assert!(close_callbacks.is_empty());
        assert!(notifier.is_disposed());
        assert!(notifier.event_callbacks("greet").is_empty());

        let result = notifier.on_message(Arc::new(|_, _| Box::pin(async {})));
        assert!(matches!(result, Err(SocketError::Closed)));
    }

    #[test]
    fn dispose_hands_out_close_callbacks_once() {
        let mut notifier = SocketNotifier::new();
        notifier
            .on_close(Arc::new(|_| Box::pin(async {})))
            .unwrap();

        assert_eq!(notifier.dispose().len(), 1);
        assert!(notifier.dispose().is_empty());
    }
}
