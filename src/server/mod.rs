//! Defines `Server`: route registration, middleware installation and the
//! listener.

pub mod config;
pub(crate) mod worker;

use std::future::Future;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;

use log::info;

use crate::context::{RequestCtx, ResponseCtx};
use crate::error::{HandlerResult, StartError};
use crate::handler::static_files::StaticFiles;
use crate::handler::{HandlerFuture, HttpCallback, RouteMethod, WsCallback};
use crate::middleware::Middleware;
use crate::tls;
use crate::ws::WsConnection;

pub use self::config::{ServerConfig, ServerMode};

use self::worker::{CallbackSpec, Registration, RouteSpec, WorkerApp};

/// An application: routes, middlewares and an optional static root, started
/// with [`Server::listen`].
///
/// ```no_run
/// use nanoserve::server::{Server, ServerConfig, ServerMode};
///
/// let mut app = Server::new();
/// app.get("/", |_req, mut res| async move {
///     res.send("Hello World!");
///     Ok(())
/// });
///
/// app.listen(ServerConfig::new().with_mode(ServerMode::Compatibility))
///     .expect("server failed to start");
/// ```
pub struct Server {
    routes: Vec<RouteSpec>,
    middlewares: Vec<Arc<dyn Middleware>>,
    static_files: Option<StaticFiles>,
}

impl Server {
    /// Creates an application with no routes.
    pub fn new() -> Server {
        Server {
            routes: Vec::new(),
            middlewares: Vec::new(),
            static_files: None,
        }
    }

    fn http_route<H, Fut>(&mut self, method: RouteMethod, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let callback: HttpCallback =
            Arc::new(move |req, res| -> HandlerFuture { Box::pin(handler(req, res)) });
        self.routes.push(RouteSpec {
            method,
            pattern: pattern.to_owned(),
            callback: CallbackSpec::Http(callback),
        });
        self
    }

    /// Registers a `GET` route.
    pub fn get<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Get, pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Post, pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Put, pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Delete, pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Patch, pattern, handler)
    }

    /// Registers an `OPTIONS` route.
    pub fn options<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Options, pattern, handler)
    }

    /// Registers a `HEAD` route.
    pub fn head<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Head, pattern, handler)
    }

    /// Registers a `CONNECT` route.
    pub fn connect<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Connect, pattern, handler)
    }

    /// Registers a `TRACE` route.
    pub fn trace<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestCtx, ResponseCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.http_route(RouteMethod::Trace, pattern, handler)
    }

    /// Registers a WebSocket route. The handler runs once per accepted
    /// connection, before any frame is delivered, and is where the
    /// connection's event callbacks get registered.
    pub fn ws<H, Fut>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Fn(Arc<WsConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let callback: WsCallback =
            Arc::new(move |conn| -> HandlerFuture { Box::pin(handler(conn)) });
        self.routes.push(RouteSpec {
            method: RouteMethod::Ws,
            pattern: pattern.to_owned(),
            callback: CallbackSpec::Ws(callback),
        });
        self
    }

    /// Appends a middleware; middlewares run in installation order.
    pub fn middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Installs a static-file root used when no route matches.
    pub fn static_files(&mut self, files: StaticFiles) -> &mut Self {
        self.static_files = Some(files);
        self
    }

    /// Validates the configuration, binds the listeners and serves until the
    /// process ends. Configuration and bind errors return before any worker
    /// is spawned.
    pub fn listen(&self, config: ServerConfig) -> Result<(), StartError> {
        let has_ws_routes = self
            .routes
            .iter()
            .any(|r| matches!(r.callback, CallbackSpec::Ws(_)));
        config.validate(has_ws_routes)?;

        let acceptor = tls::build_acceptor(&config)?;
        let scheme = if acceptor.is_some() { "https" } else { "http" };
        let registration = Arc::new(Registration {
            routes: self.routes.clone(),
            middlewares: self.middlewares.clone(),
            static_files: self.static_files.clone(),
        });

        match config.server_mode() {
            ServerMode::Compatibility => {
                let listener = bind(config.host(), config.port())?;
                info! {
                    target: "nanoserve::start",
                    " nanoserve listening on {}://{}:{} (compatibility mode)",
                    scheme, config.host(), config.port()
                }

                let app = WorkerApp::assemble(&registration, true, false);
                new_runtime()?.block_on(worker::accept_loop(listener, app, acceptor))
            }
            ServerMode::Performance => {
                let listener = bind(config.host(), config.port())?;
                let plan = worker::worker_plan(num_cpus::get(), has_ws_routes);

                for index in 0..plan.regular {
                    worker::spawn_worker(
                        &format!("nanoserve-worker-{}", index),
                        listener.try_clone()?,
                        WorkerApp::assemble(&registration, false, false),
                        acceptor.clone(),
                    );
                }

                let mut main_ws_listener = None;
                if plan.ws {
                    if let Some(ws_port) = config.ws_port() {
                        let ws_listener = bind(config.host(), ws_port)?;
                        info! {
                            target: "nanoserve::start",
                            " websocket listener on {}://{}:{}",
                            scheme, config.host(), ws_port
                        }

                        if config.use_websocket_in_main_thread() {
                            main_ws_listener = Some(ws_listener);
                        } else {
                            worker::spawn_worker(
                                "nanoserve-ws-worker",
                                ws_listener,
                                WorkerApp::assemble(&registration, true, true),
                                acceptor.clone(),
                            );
                        }
                    }
                }

                info! {
                    target: "nanoserve::start",
                    " nanoserve listening on {}://{}:{} with {} worker(s) (performance mode)",
                    scheme, config.host(), config.port(), plan.regular + 1
                }

                let app = WorkerApp::assemble(&registration, false, false);
                let runtime = new_runtime()?;
                match main_ws_listener {
                    Some(ws_listener) => {
                        let ws_app = WorkerApp::assemble(&registration, true, true);
                        runtime.block_on(async move {
                            tokio::try_join!(
                                worker::accept_loop(listener, app, acceptor.clone()),
                                worker::accept_loop(ws_listener, ws_app, acceptor),
                            )?;
                            Ok(())
                        })
                    }
                    None => runtime.block_on(worker::accept_loop(listener, app, acceptor)),
                }
            }
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Server::new()
    }
}

fn bind(host: &str, port: u16) -> Result<StdTcpListener, StartError> {
    Ok(StdTcpListener::bind((host, port))?)
}

fn new_runtime() -> Result<tokio::runtime::Runtime, StartError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_rejects_equal_ports_before_binding() {
        let mut app = Server::new();
        app.get("/", |_req, mut res| async move {
            res.send("hi");
            Ok(())
        });

        let result = app.listen(ServerConfig::new().with_port(8080).with_ws_port(8080));
        assert!(matches!(result, Err(StartError::SamePort(8080))));
    }

    #[test]
    fn listen_requires_a_ws_port_for_ws_routes() {
        let mut app = Server::new();
        app.ws("/chat", |_conn| async { Ok(()) });

        let result = app.listen(ServerConfig::new().with_port(8080));
        assert!(matches!(result, Err(StartError::WsPortRequired)));
    }
}
