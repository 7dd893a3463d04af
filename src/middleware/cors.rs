//! Cross-origin resource sharing middleware.
//!
//! Stamps the `Access-Control-Allow-*` headers from its configuration onto
//! every response, and answers CORS preflight (`OPTIONS`) requests directly
//! with `204 No Content`, halting the chain.

use std::future::Future;
use std::pin::Pin;

use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::{Method, StatusCode};

use crate::context::{RequestCtx, ResponseCtx};
use crate::middleware::Middleware;

/// Middleware configuring cross-origin access.
#[derive(Clone)]
pub struct CorsMiddleware {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
    allow_credentials: bool,
}

impl CorsMiddleware {
    /// Creates the middleware with its default allowances: any origin, the
    /// common verb set, and the common request headers.
    pub fn new() -> CorsMiddleware {
        CorsMiddleware {
            allow_origin: "*".to_owned(),
            allow_methods: "GET, POST, PUT, DELETE, OPTIONS".to_owned(),
            allow_headers: "Origin, X-Requested-With, Content-Type, Accept".to_owned(),
            allow_credentials: true,
        }
    }

    /// Replaces the allowed origin.
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.allow_origin = origin.to_owned();
        self
    }

    /// Replaces the allowed method list.
    pub fn with_methods(mut self, methods: &str) -> Self {
        self.allow_methods = methods.to_owned();
        self
    }

    /// Replaces the allowed header list.
    pub fn with_headers(mut self, headers: &str) -> Self {
        self.allow_headers = headers.to_owned();
        self
    }

    /// Controls the `Access-Control-Allow-Credentials` header.
    pub fn with_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    fn stamp(&self, res: &mut ResponseCtx) {
        if let Ok(value) = HeaderValue::from_str(&self.allow_origin) {
            res.header(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.allow_methods) {
            res.header(ACCESS_CONTROL_ALLOW_METHODS, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.allow_headers) {
            res.header(ACCESS_CONTROL_ALLOW_HEADERS, value);
        }
        if self.allow_credentials {
            res.header(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        CorsMiddleware::new()
    }
}

impl Middleware for CorsMiddleware {
    fn call<'a>(
        &'a self,
        req: &'a mut RequestCtx,
        res: &'a mut ResponseCtx,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        self.stamp(res);

        if req.method() == Method::OPTIONS {
            res.status(StatusCode::NO_CONTENT);
            res.close();
            return Box::pin(std::future::ready(false));
        }

        Box::pin(std::future::ready(true))
    }
}
