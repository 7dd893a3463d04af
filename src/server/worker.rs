//! Workers: independent execution contexts sharing a listening socket.
//!
//! Each worker is an OS thread running its own single-threaded runtime over a
//! clone of the shared listener, so the kernel distributes `accept` across
//! workers. Workers share no mutable state: every worker assembles its own
//! `RouteTree` (and with it, its own `SocketManager` per route) from the
//! registration list. Cross-worker fan-out of WebSocket messages is therefore
//! not a thing this design provides.

use std::convert::Infallible;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::thread;

use hyper::header::CONNECTION;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request, Response};
use log::{debug, error, trace};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::error::StartError;
use crate::handler::static_files::StaticFiles;
use crate::handler::{bad_request, not_found, HttpCallback, RouteHandler, RouteMethod, WsCallback};
use crate::middleware::Middleware;
use crate::router::RouteTree;

/// One registered route, kept in registration order so every worker builds
/// an identical tree.
#[derive(Clone)]
pub(crate) struct RouteSpec {
    pub(crate) method: RouteMethod,
    pub(crate) pattern: String,
    pub(crate) callback: CallbackSpec,
}

#[derive(Clone)]
pub(crate) enum CallbackSpec {
    Http(HttpCallback),
    Ws(WsCallback),
}

/// Everything registered against the server, shared read-only with workers.
pub(crate) struct Registration {
    pub(crate) routes: Vec<RouteSpec>,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    pub(crate) static_files: Option<StaticFiles>,
}

/// How many workers a performance-mode listener runs.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct WorkerPlan {
    /// Regular workers spawned as threads; the calling context runs one more.
    pub(crate) regular: usize,
    /// Whether a dedicated WS worker is reserved.
    pub(crate) ws: bool,
}

/// Half the cores serve; one worker is reserved for WS when WS routes exist.
pub(crate) fn worker_plan(cores: usize, has_ws_routes: bool) -> WorkerPlan {
    let budget = std::cmp::max(cores / 2, 1);
    let regular = if has_ws_routes {
        budget.saturating_sub(1)
    } else {
        budget
    };
    WorkerPlan {
        regular,
        ws: has_ws_routes,
    }
}

/// A worker's private view of the application: its own route tree and socket
/// managers, plus its role flags.
pub(crate) struct WorkerApp {
    tree: RouteTree,
    middlewares: Vec<Arc<dyn Middleware>>,
    static_files: Option<StaticFiles>,
    is_ws_listener: bool,
    ws_only: bool,
}

impl WorkerApp {
    /// Builds a fresh instance from the shared registration list.
    pub(crate) fn assemble(
        registration: &Registration,
        is_ws_listener: bool,
        ws_only: bool,
    ) -> Arc<WorkerApp> {
        let mut tree = RouteTree::new();
        for spec in &registration.routes {
            let handler = match &spec.callback {
                CallbackSpec::Http(callback) => RouteHandler::http(spec.method, callback.clone()),
                CallbackSpec::Ws(callback) => RouteHandler::ws(callback.clone()),
            };
            tree.insert(&spec.pattern, handler);
        }

        Arc::new(WorkerApp {
            tree,
            middlewares: registration.middlewares.clone(),
            static_files: registration.static_files.clone(),
            is_ws_listener,
            ws_only,
        })
    }

    /// Routes one request: trie match → dispatch, with the static-file
    /// fallback (or the WS-only refusals) on a miss.
    pub(crate) async fn handle(&self, req: Request<Body>) -> Response<Body> {
        match self.tree.lookup(req.uri().path()) {
            Some((handler, matched)) => {
                handler
                    .dispatch(
                        req,
                        matched.params,
                        &self.middlewares,
                        self.is_ws_listener,
                        self.ws_only,
                    )
                    .await
            }
            None => {
                if self.ws_only {
                    let is_upgrade = req
                        .headers()
                        .get(CONNECTION)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.eq_ignore_ascii_case("upgrade"))
                        .unwrap_or(false);
                    return if is_upgrade { not_found() } else { bad_request() };
                }

                match &self.static_files {
                    Some(files) => files.serve(req.uri().path()).await,
                    None => not_found(),
                }
            }
        }
    }
}

/// Serves connections from (a clone of) the shared listener until the process
/// ends. Per-connection failures are logged and never stop the loop.
pub(crate) async fn accept_loop(
    listener: StdTcpListener,
    app: Arc<WorkerApp>,
    tls: Option<TlsAcceptor>,
) -> Result<(), StartError> {
    listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(listener)?;
    let protocol = Http::new();

    loop {
        let (socket, client_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!(target: "nanoserve::start", " accept failed: {}", err);
                continue;
            }
        };
        trace!(target: "nanoserve::start", " accepted connection from {}", client_addr);

        let app = app.clone();
        let protocol = protocol.clone();
        let tls = tls.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let app = app.clone();
                async move { Ok::<_, Infallible>(app.handle(req).await) }
            });

            let served = match tls {
                Some(acceptor) => match acceptor.accept(socket).await {
                    Ok(stream) => {
                        protocol
                            .serve_connection(stream, service)
                            .with_upgrades()
                            .await
                    }
                    Err(err) => {
                        error!(target: "nanoserve::start", " TLS handshake error: {:?}", err);
                        return;
                    }
                },
                None => {
                    protocol
                        .serve_connection(socket, service)
                        .with_upgrades()
                        .await
                }
            };

            if let Err(err) = served {
                debug!(target: "nanoserve::start", " connection error: {}", err);
            }
        });
    }
}

/// Spawns a worker thread running its own single-threaded runtime over the
/// given listener clone.
pub(crate) fn spawn_worker(
    name: &str,
    listener: StdTcpListener,
    app: Arc<WorkerApp>,
    tls: Option<TlsAcceptor>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!(target: "nanoserve::start", " unable to build worker runtime: {}", err);
                    return;
                }
            };

            if let Err(err) = runtime.block_on(accept_loop(listener, app, tls)) {
                error!(target: "nanoserve::start", " worker terminated: {}", err);
            }
        })
        .expect("unable to spawn worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_plan_halves_the_cores() {
        assert_eq!(
            worker_plan(8, false),
            WorkerPlan {
                regular: 4,
                ws: false
            }
        );
    }

    #[test]
    fn worker_plan_reserves_one_worker_for_ws() {
        assert_eq!(
            worker_plan(8, true),
            WorkerPlan {
                regular: 3,
                ws: true
            }
        );
    }

    #[test]
    fn worker_plan_never_goes_below_one_budget_slot() {
        assert_eq!(
            worker_plan(1, false),
            WorkerPlan {
                regular: 1,
                ws: false
            }
        );
        // The calling context still runs a regular listener when the budget
        // is consumed by the WS worker.
        assert_eq!(
            worker_plan(1, true),
            WorkerPlan {
                regular: 0,
                ws: true
            }
        );
    }

    #[tokio::test]
    async fn route_misses_fall_back_to_404() {
        let registration = Registration {
            routes: Vec::new(),
            middlewares: Vec::new(),
            static_files: None,
        };
        let app = WorkerApp::assemble(&registration, false, false);

        let req = Request::builder()
            .uri("/nothing")
            .body(Body::empty())
            .unwrap();
        let response = app.handle(req).await;
        assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_only_workers_refuse_plain_http_misses() {
        let registration = Registration {
            routes: Vec::new(),
            middlewares: Vec::new(),
            static_files: None,
        };
        let app = WorkerApp::assemble(&registration, true, true);

        let req = Request::builder()
            .uri("/nothing")
            .body(Body::empty())
            .unwrap();
        let response = app.handle(req).await;
        assert_eq!(response.status(), hyper::StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .uri("/nothing")
            .header("connection", "upgrade")
            .body(Body::empty())
            .unwrap();
        let response = app.handle(req).await;
        assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
    }
}
