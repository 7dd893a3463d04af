//! Nanoserve &ndash; a lightweight HTTP + WebSocket serving framework.
//!
//! Applications register HTTP route handlers and WebSocket handlers against
//! URL path patterns (`/user/:id`, `/files/*`), optionally install
//! middlewares, and start a listener that serves requests across multiple
//! workers sharing the same listening socket.
//!
//! ```no_run
//! use nanoserve::prelude::*;
//!
//! let mut app = Server::new();
//!
//! app.get("/user/:id", |req, mut res| async move {
//!     let id = req.param("id").unwrap_or("?").to_owned();
//!     res.send(&format!("u:{}", id));
//!     Ok(())
//! });
//!
//! app.ws("/chat", |conn| async move {
//!     conn.on("greet", |conn, data| async move {
//!         conn.emit_to_room("greet", "lobby", data).await.ok();
//!     })?;
//!     conn.join("lobby")?;
//!     Ok(())
//! });
//!
//! app.listen(ServerConfig::new().with_mode(ServerMode::Compatibility))
//!     .expect("server failed to start");
//! ```
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod relation;
pub mod router;
pub mod server;
pub mod ws;

mod tls;

pub use cookie;
pub use hyper;
pub use mime;
pub use serde_json;

/// A collection of crate commonly used types and traits.
pub mod prelude {
    pub use crate::context::{Payload, RequestCtx, ResponseCtx};
    pub use crate::error::{HandlerError, HandlerResult, SocketError, StartError};
    pub use crate::handler::static_files::StaticFiles;
    pub use crate::middleware::{CorsMiddleware, Middleware, SecurityMiddleware};
    pub use crate::server::{Server, ServerConfig, ServerMode};
    pub use crate::ws::{SocketManager, WsConnection};
    pub use cookie::Cookie;
    pub use hyper::StatusCode;
    pub use tokio_tungstenite::tungstenite::Message;
}
