//! Error types surfaced by the framework.
//!
//! Startup problems (bad configuration, bind failures, TLS material that
//! cannot be loaded) abort `listen` before any worker is spawned. Per-request
//! and per-connection failures are confined to the request or connection that
//! produced them and never tear down a worker.

use thiserror::Error;

/// Errors surfaced synchronously from `Server::listen`; the server does not
/// start when any of these occur.
#[derive(Debug, Error)]
pub enum StartError {
    /// Performance mode requires the WebSocket port to differ from the HTTP
    /// port, because each port is bound by its own set of workers.
    #[error("HTTP port and WebSocket port are both {0}; performance mode requires distinct ports")]
    SamePort(u16),

    /// A WebSocket route was registered, but performance mode has no port to
    /// bind the WebSocket listener on.
    #[error("a WebSocket route is registered but no wsPort is configured")]
    WsPortRequired,

    /// Binding a listening socket failed.
    #[error("unable to bind listener: {0}")]
    Bind(#[from] std::io::Error),

    /// TLS material could not be loaded into a server configuration.
    #[error("TLS configuration rejected: {0}")]
    Tls(String),
}

/// Errors produced by operations on a WebSocket connection.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The connection has been disposed; no further events or frames can be
    /// attached to it.
    #[error("cannot add events to closed Socket")]
    Closed,

    /// The underlying transport rejected a frame.
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

/// An opaque error returned by HTTP and WebSocket handler callbacks.
///
/// Anything convertible into `anyhow::Error` converts into a `HandlerError`
/// with `?`. A handler that resolves to an error has its response force-closed
/// with `500 Internal Server Error` if the handler did not already close it.
#[derive(Debug)]
pub struct HandlerError {
    inner: anyhow::Error,
}

impl HandlerError {
    /// Borrow the underlying cause.
    pub fn cause(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

impl<E> From<E> for HandlerError
where
    E: Into<anyhow::Error>,
{
    fn from(error: E) -> Self {
        HandlerError {
            inner: error.into(),
        }
    }
}

/// The result type handler callbacks resolve to.
pub type HandlerResult = Result<(), HandlerError>;
