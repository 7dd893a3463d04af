//! Listener configuration and its bind-time validation.

use std::path::{Path, PathBuf};

use crate::error::StartError;

/// How the listener arranges HTTP and WebSocket traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerMode {
    /// HTTP and WS on separate ports, multiple workers sharing each socket.
    Performance,
    /// One listener on one port handling both.
    Compatibility,
}

/// Options recognised by `Server::listen`.
///
/// ```rust
/// use nanoserve::server::{ServerConfig, ServerMode};
///
/// let config = ServerConfig::new()
///     .with_host("127.0.0.1")
///     .with_port(3000)
///     .with_ws_port(3001)
///     .with_mode(ServerMode::Performance);
/// assert_eq!(config.port(), 3000);
/// ```
#[derive(Clone, Debug)]
pub struct ServerConfig {
    host: String,
    port: u16,
    ws_port: Option<u16>,
    certificate_chain: Option<PathBuf>,
    private_key: Option<PathBuf>,
    password: Option<String>,
    server_mode: ServerMode,
    use_websocket_in_main_thread: bool,
}

impl ServerConfig {
    /// Creates a configuration with the defaults: bind `0.0.0.0:8080`,
    /// performance mode, plaintext.
    pub fn new() -> ServerConfig {
        ServerConfig {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            ws_port: None,
            certificate_chain: None,
            private_key: None,
            password: None,
            server_mode: ServerMode::Performance,
            use_websocket_in_main_thread: false,
        }
    }

    /// Replaces the bind address.
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_owned();
        self
    }

    /// Replaces the HTTP listening port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the WebSocket listening port used by performance mode.
    pub fn with_ws_port(mut self, port: u16) -> Self {
        self.ws_port = Some(port);
        self
    }

    /// Sets the TLS material. Presence of a private key switches the
    /// listeners to TLS.
    pub fn with_tls<P: Into<PathBuf>>(mut self, certificate_chain: P, private_key: P) -> Self {
        self.certificate_chain = Some(certificate_chain.into());
        self.private_key = Some(private_key.into());
        self
    }

    /// Sets the passphrase for the private key.
    pub fn with_key_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_owned());
        self
    }

    /// Selects the serving mode.
    pub fn with_mode(mut self, mode: ServerMode) -> Self {
        self.server_mode = mode;
        self
    }

    /// Runs the WebSocket listener on the calling context instead of a
    /// dedicated worker.
    pub fn with_websocket_in_main_thread(mut self, enabled: bool) -> Self {
        self.use_websocket_in_main_thread = enabled;
        self
    }

    /// The bind address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The HTTP listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The WebSocket listening port, when configured.
    pub fn ws_port(&self) -> Option<u16> {
        self.ws_port
    }

    /// The TLS certificate chain path, when configured.
    pub fn certificate_chain(&self) -> Option<&Path> {
        self.certificate_chain.as_deref()
    }

    /// The TLS private key path, when configured.
    pub fn private_key(&self) -> Option<&Path> {
        self.private_key.as_deref()
    }

    /// The private key passphrase, when configured.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// The serving mode.
    pub fn server_mode(&self) -> ServerMode {
        self.server_mode
    }

    /// Whether the WS listener runs on the calling context.
    pub fn use_websocket_in_main_thread(&self) -> bool {
        self.use_websocket_in_main_thread
    }

    /// Bind-time validation, run before any socket is opened.
    pub(crate) fn validate(&self, has_ws_routes: bool) -> Result<(), StartError> {
        if self.server_mode == ServerMode::Performance {
            if self.ws_port == Some(self.port) {
                return Err(StartError::SamePort(self.port));
            }
            if has_ws_routes && self.ws_port.is_none() {
                return Err(StartError::WsPortRequired);
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance_mode_rejects_equal_ports() {
        let config = ServerConfig::new().with_port(8080).with_ws_port(8080);
        assert!(matches!(
            config.validate(false),
            Err(StartError::SamePort(8080))
        ));
    }

    #[test]
    fn performance_mode_requires_a_ws_port_for_ws_routes() {
        let config = ServerConfig::new().with_port(8080);
        assert!(matches!(
            config.validate(true),
            Err(StartError::WsPortRequired)
        ));
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn compatibility_mode_needs_no_ws_port() {
        let config = ServerConfig::new().with_mode(ServerMode::Compatibility);
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn distinct_ports_pass_validation() {
        let config = ServerConfig::new().with_port(8080).with_ws_port(8081);
        assert!(config.validate(true).is_ok());
    }
}
