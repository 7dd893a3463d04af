//! Defines route handlers: the binding of a method to an HTTP or WebSocket
//! callback, and the dispatch pipeline that runs for every matched route.

pub mod static_files;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hyper::upgrade::OnUpgrade;
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{debug, error, trace};

use crate::context::response::ResponseReceiver;
use crate::context::{RequestCtx, ResponseCtx};
use crate::error::HandlerResult;
use crate::middleware::{self, Middleware};
use crate::ws::{self, SocketManager, WsConnection};

/// The boxed future returned by handler callbacks.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// An HTTP handler callback.
pub type HttpCallback = Arc<dyn Fn(RequestCtx, ResponseCtx) -> HandlerFuture + Send + Sync>;

/// A WebSocket handler callback, invoked once per accepted connection.
pub type WsCallback = Arc<dyn Fn(Arc<WsConnection>) -> HandlerFuture + Send + Sync>;

/// The method a route is bound to. `Ws` is the effective method of any
/// request asking for a protocol upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    Connect,
    Trace,
    /// The effective method of upgrade requests.
    Ws,
}

impl RouteMethod {
    pub(crate) fn from_http(method: &Method) -> Option<RouteMethod> {
        match *method {
            Method::GET => Some(RouteMethod::Get),
            Method::POST => Some(RouteMethod::Post),
            Method::PUT => Some(RouteMethod::Put),
            Method::DELETE => Some(RouteMethod::Delete),
            Method::PATCH => Some(RouteMethod::Patch),
            Method::OPTIONS => Some(RouteMethod::Options),
            Method::HEAD => Some(RouteMethod::Head),
            Method::CONNECT => Some(RouteMethod::Connect),
            Method::TRACE => Some(RouteMethod::Trace),
            _ => None,
        }
    }
}

pub(crate) enum RouteCallback {
    Http(HttpCallback),
    Ws(WsCallback),
}

/// Binds a method and a callback; owns the `SocketManager` for its route,
/// which gives WebSocket routes at different paths disjoint room namespaces.
pub struct RouteHandler {
    method: RouteMethod,
    callback: RouteCallback,
    manager: Arc<SocketManager>,
}

impl RouteHandler {
    /// Creates an HTTP binding.
    pub fn http(method: RouteMethod, callback: HttpCallback) -> RouteHandler {
        debug_assert!(method != RouteMethod::Ws, "use RouteHandler::ws for WS bindings");
        RouteHandler {
            method,
            callback: RouteCallback::Http(callback),
            manager: Arc::new(SocketManager::new()),
        }
    }

    /// Creates a WebSocket binding.
    pub fn ws(callback: WsCallback) -> RouteHandler {
        RouteHandler {
            method: RouteMethod::Ws,
            callback: RouteCallback::Ws(callback),
            manager: Arc::new(SocketManager::new()),
        }
    }

    /// The bound method.
    pub fn method(&self) -> RouteMethod {
        self.method
    }

    /// The route's socket registry.
    pub fn manager(&self) -> &Arc<SocketManager> {
        &self.manager
    }

    /// Runs the request pipeline for a matched route.
    ///
    /// Builds the request/response contexts, runs the middleware chain (a
    /// `false` stops everything; the middleware owns the response), resolves
    /// the effective method (`Ws` when the `Connection` header equals
    /// `upgrade`), and then either performs the upgrade, invokes the HTTP
    /// callback, or refuses the request.
    pub async fn dispatch(
        &self,
        req: Request<Body>,
        params: HashMap<String, String>,
        middlewares: &[Arc<dyn Middleware>],
        is_ws_listener: bool,
        ws_only: bool,
    ) -> Response<Body> {
        let (mut parts, body) = req.into_parts();
        let on_upgrade = parts.extensions.remove::<OnUpgrade>();
        let mut req_ctx = RequestCtx::new(parts, body, params);
        let (mut res_ctx, rx) = ResponseCtx::channel();

        if !middleware::run_chain(middlewares, &mut req_ctx, &mut res_ctx).await {
            drop(res_ctx);
            return finish(rx).await;
        }

        let effective = if req_ctx.is_upgrade_request() {
            RouteMethod::Ws
        } else {
            match RouteMethod::from_http(req_ctx.method()) {
                Some(method) => method,
                None => return not_found(),
            }
        };

        if effective != self.method {
            trace!(
                target: "nanoserve::request",
                " effective method {:?} does not match binding {:?}",
                effective,
                self.method
            );
            return not_found();
        }

        match &self.callback {
            RouteCallback::Ws(callback) => {
                if !is_ws_listener {
                    // This worker does not serve the WS role.
                    return not_found();
                }

                let on_upgrade = match on_upgrade {
                    Some(on_upgrade) => on_upgrade,
                    None => return bad_request(),
                };

                match ws::upgrade::accept_response(req_ctx.headers()) {
                    Some(response) => {
                        tokio::spawn(ws::run_session(
                            on_upgrade,
                            self.manager.clone(),
                            callback.clone(),
                        ));
                        response
                    }
                    None => bad_request(),
                }
            }
            RouteCallback::Http(callback) => {
                if ws_only {
                    return bad_request();
                }

                let closer = res_ctx.closer();
                let handler = callback(req_ctx, res_ctx);
                tokio::spawn(async move {
                    if let Err(err) = handler.await {
                        error!(target: "nanoserve::request", " handler failed: {}", err);
                        closer.close_with(internal_server_error());
                    }
                });

                finish(rx).await
            }
        }
    }
}

async fn finish(rx: ResponseReceiver) -> Response<Body> {
    match rx.await {
        Ok(response) => response,
        Err(_) => {
            debug!(target: "nanoserve::request", " response context dropped without close");
            internal_server_error()
        }
    }
}

pub(crate) fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::empty())
        .unwrap()
}

pub(crate) fn bad_request() -> Response<Body> {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .body(Body::empty())
        .unwrap()
}

pub(crate) fn internal_server_error() -> Response<Body> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::empty())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_handler() -> RouteHandler {
        RouteHandler::http(
            RouteMethod::Get,
            Arc::new(|_req, mut res| {
                Box::pin(async move {
                    res.send("hello");
                    Ok(())
                })
            }),
        )
    }

    fn request(method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/hello")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn invokes_the_http_callback() {
        let handler = hello_handler();
        let response = handler
            .dispatch(request(Method::GET), HashMap::new(), &[], false, false)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn method_mismatch_is_404() {
        let handler = hello_handler();
        let response = handler
            .dispatch(request(Method::POST), HashMap::new(), &[], false, false)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upgrade_request_to_an_http_binding_is_404() {
        let handler = hello_handler();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/hello")
            .header("connection", "Upgrade")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();

        let response = handler
            .dispatch(req, HashMap::new(), &[], true, false)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn plain_request_to_a_ws_binding_is_404() {
        let handler = RouteHandler::ws(Arc::new(|_conn| Box::pin(async { Ok(()) })));
        let response = handler
            .dispatch(request(Method::GET), HashMap::new(), &[], true, true)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_request_on_a_non_ws_worker_is_404() {
        let handler = RouteHandler::ws(Arc::new(|_conn| Box::pin(async { Ok(()) })));
        let req = Request::builder()
            .method(Method::GET)
            .uri("/chat")
            .header("connection", "upgrade")
            .header("sec-websocket-key", "QmF0bWFu")
            .body(Body::empty())
            .unwrap();

        let response = handler
            .dispatch(req, HashMap::new(), &[], false, false)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn http_request_on_a_ws_only_worker_is_400() {
        let handler = hello_handler();
        let response = handler
            .dispatch(request(Method::GET), HashMap::new(), &[], true, true)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn handler_errors_force_close_with_500() {
        let handler = RouteHandler::http(
            RouteMethod::Get,
            Arc::new(|_req, _res| {
                Box::pin(async move {
                    Err(anyhow::anyhow!("boom"))?;
                    Ok(())
                })
            }),
        );

        let response = handler
            .dispatch(request(Method::GET), HashMap::new(), &[], false, false)
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn middleware_stop_returns_the_middleware_response() {
        let deny: Arc<dyn Middleware> = Arc::new(|_: &mut RequestCtx, res: &mut ResponseCtx| {
            res.status(StatusCode::FORBIDDEN);
            res.close();
            false
        });

        let handler = hello_handler();
        let response = handler
            .dispatch(
                request(Method::GET),
                HashMap::new(),
                &[deny],
                false,
                false,
            )
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
