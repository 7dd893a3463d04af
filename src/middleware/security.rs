//! Security based middleware to handle security based sanitizations.
//!
//! Attach at startup to stamp a conservative set of security headers onto
//! every response passing through the chain:
//!
//! - X-XSS-Protection: "1; mode=block"
//! - X-Content-Type-Options: "nosniff"
//! - X-Frame-Options: "SAMEORIGIN"
//! - Referrer-Policy: "same-origin"
//! - Content-Security-Policy: "default-src 'self'"

use std::future::Future;
use std::pin::Pin;

use hyper::header::{
    HeaderValue, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS, X_XSS_PROTECTION,
};

use crate::context::{RequestCtx, ResponseCtx};
use crate::middleware::Middleware;

// constant strings to be used as header values
const XXP_VALUE: &str = "1; mode=block";
const XCTO_VALUE: &str = "nosniff";
const XFO_VALUE: &str = "SAMEORIGIN";
const RP_VALUE: &str = "same-origin";
const CSP_VALUE: &str = "default-src 'self'";

/// Middleware stamping the security headers listed in the module docs.
#[derive(Clone, Default)]
pub struct SecurityMiddleware;

impl Middleware for SecurityMiddleware {
    fn call<'a>(
        &'a self,
        _req: &'a mut RequestCtx,
        res: &'a mut ResponseCtx,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        res.header(X_XSS_PROTECTION, HeaderValue::from_static(XXP_VALUE));
        res.header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static(XCTO_VALUE));
        res.header(X_FRAME_OPTIONS, HeaderValue::from_static(XFO_VALUE));
        res.header(REFERRER_POLICY, HeaderValue::from_static(RP_VALUE));
        res.header(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP_VALUE));

        Box::pin(std::future::ready(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use hyper::{Body, Request, StatusCode};

    #[tokio::test]
    async fn stamps_headers_and_continues() {
        let (parts, body) = Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let mut req = RequestCtx::new(parts, body, HashMap::new());
        let (mut res, rx) = ResponseCtx::channel();

        assert!(SecurityMiddleware.call(&mut req, &mut res).await);

        res.close();
        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(X_FRAME_OPTIONS).unwrap(), XFO_VALUE);
        assert_eq!(response.headers().get(X_XSS_PROTECTION).unwrap(), XXP_VALUE);
        assert_eq!(
            response.headers().get(CONTENT_SECURITY_POLICY).unwrap(),
            CSP_VALUE
        );
    }
}
