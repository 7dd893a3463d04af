//! Defines `Middleware`, a request-stage unit run before the route handler.
//!
//! Middlewares execute in registration order. Each one inspects (and may
//! mutate) the request and response contexts, then decides whether processing
//! continues: returning `false` halts the chain and the handler is never
//! invoked, in which case the middleware is responsible for having written a
//! response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::trace;

use crate::context::{RequestCtx, ResponseCtx};

pub mod cors;
pub mod security;

pub use self::cors::CorsMiddleware;
pub use self::security::SecurityMiddleware;

/// A request-stage function returning continue (`true`) or stop (`false`).
///
/// Closures of the shape `Fn(&mut RequestCtx, &mut ResponseCtx) -> bool`
/// implement this trait directly; implement it by hand when the decision
/// needs to await.
pub trait Middleware: Send + Sync {
    /// Runs the middleware against the current request.
    fn call<'a>(
        &'a self,
        req: &'a mut RequestCtx,
        res: &'a mut ResponseCtx,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

impl<F> Middleware for F
where
    F: Fn(&mut RequestCtx, &mut ResponseCtx) -> bool + Send + Sync,
{
    fn call<'a>(
        &'a self,
        req: &'a mut RequestCtx,
        res: &'a mut ResponseCtx,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        let decision = self(req, res);
        Box::pin(std::future::ready(decision))
    }
}

/// Runs the chain in order; `false` from any middleware short-circuits.
pub(crate) async fn run_chain(
    middlewares: &[Arc<dyn Middleware>],
    req: &mut RequestCtx,
    res: &mut ResponseCtx,
) -> bool {
    for (index, middleware) in middlewares.iter().enumerate() {
        if !middleware.call(req, res).await {
            trace!(target: "nanoserve::request", " middleware {} halted the chain", index);
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hyper::{Body, Request};

    fn contexts() -> (RequestCtx, ResponseCtx) {
        let (parts, body) = Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let (res, _rx) = ResponseCtx::channel();
        (RequestCtx::new(parts, body, HashMap::new()), res)
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order_until_a_stop() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let middlewares: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(|_: &mut RequestCtx, _: &mut ResponseCtx| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                true
            }),
            Arc::new(|_: &mut RequestCtx, _: &mut ResponseCtx| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                false
            }),
            Arc::new(|_: &mut RequestCtx, _: &mut ResponseCtx| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                true
            }),
        ];

        let (mut req, mut res) = contexts();
        assert!(!run_chain(&middlewares, &mut req, &mut res).await);
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_chain_continues() {
        let (mut req, mut res) = contexts();
        assert!(run_chain(&[], &mut req, &mut res).await);
    }
}
