//! Defines `ResponseCtx`, the response builder owned by the request pipeline.
//!
//! The context stays mutable until `close` is called. Only the first `close`
//! flushes the accumulated status, headers, cookies and body to the waiting
//! transport; later calls are no-ops.

use std::mem;
use std::path::Path;
use std::sync::{Arc, Mutex};

use cookie::Cookie;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED, LOCATION,
    SET_COOKIE,
};
use hyper::{Body, Response, StatusCode};
use log::debug;
use serde::Serialize;
use tokio::fs::File;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use crate::error::HandlerError;

/// Receives the finished response once the context is closed.
pub(crate) type ResponseReceiver = oneshot::Receiver<Response<Body>>;

struct Shared {
    tx: Mutex<Option<oneshot::Sender<Response<Body>>>>,
}

/// A detached handle that can flush a response for a context that has been
/// moved elsewhere. Used to force-close with `500` when a handler fails.
#[derive(Clone)]
pub(crate) struct ResponseCloser {
    shared: Arc<Shared>,
}

impl ResponseCloser {
    /// Sends `response` if the context has not been closed yet. Returns
    /// `true` iff this call performed the flush.
    pub(crate) fn close_with(&self, response: Response<Body>) -> bool {
        let tx = self
            .shared
            .tx
            .lock()
            .expect("response channel mutex poisoned")
            .take();

        match tx {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }
}

/// The response context: status, headers, cookies and body, flushed once by
/// `close`.
pub struct ResponseCtx {
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    body: Option<Body>,
    shared: Arc<Shared>,
}

impl ResponseCtx {
    /// Creates a context and the receiver resolved by its first `close`.
    pub(crate) fn channel() -> (ResponseCtx, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        let ctx = ResponseCtx {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: None,
            shared: Arc::new(Shared {
                tx: Mutex::new(Some(tx)),
            }),
        };
        (ctx, rx)
    }

    pub(crate) fn closer(&self) -> ResponseCloser {
        ResponseCloser {
            shared: self.shared.clone(),
        }
    }

    /// Sets the response status.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets a response header, replacing any previous value.
    pub fn header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a `Set-Cookie` entry to the response.
    pub fn cookie(&mut self, cookie: Cookie<'static>) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    /// Sets the response body without closing the context.
    pub fn body<B: Into<Body>>(&mut self, body: B) -> &mut Self {
        self.body = Some(body.into());
        self
    }

    /// True once the first `close` has flushed the response.
    pub fn is_closed(&self) -> bool {
        self.shared
            .tx
            .lock()
            .expect("response channel mutex poisoned")
            .is_none()
    }

    /// Sends a plain-text body and closes the context.
    pub fn send(&mut self, text: &str) {
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = Some(Body::from(text.to_owned()));
        self.close();
    }

    /// Sends an HTML body and closes the context.
    pub fn send_html(&mut self, html: &str) {
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        self.body = Some(Body::from(html.to_owned()));
        self.close();
    }

    /// Serializes `value` as a JSON body and closes the context.
    pub fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), HandlerError> {
        let body = serde_json::to_string(value).map_err(anyhow::Error::from)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Body::from(body));
        self.close();
        Ok(())
    }

    /// Responds with a `302 Found` redirect to `location`.
    pub fn redirect(&mut self, location: &str) {
        self.status = StatusCode::FOUND;
        if let Ok(value) = HeaderValue::from_str(location) {
            self.headers.insert(LOCATION, value);
        }
        self.close();
    }

    /// Streams a file from disk and closes the context. A file that cannot be
    /// opened yields `404 Not Found`.
    pub async fn send_file<P: AsRef<Path>>(&mut self, path: P) {
        let path = path.as_ref();

        let file = match File::open(path).await {
            Ok(file) => file,
            Err(err) => {
                debug!(target: "nanoserve::static", " unable to open {}: {}", path.display(), err);
                self.status = StatusCode::NOT_FOUND;
                self.close();
                return;
            }
        };

        if let Ok(meta) = file.metadata().await {
            self.headers.insert(CONTENT_LENGTH, HeaderValue::from(meta.len()));
            if let Ok(modified) = meta.modified() {
                if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
                    self.headers.insert(LAST_MODIFIED, value);
                }
            }
        }

        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let content_type = HeaderValue::from_str(mime.as_ref())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        self.headers.insert(CONTENT_TYPE, content_type);

        self.body = Some(Body::wrap_stream(ReaderStream::new(file)));
        self.close();
    }

    /// Flushes the response. Idempotent: only the first call sends anything.
    pub fn close(&mut self) {
        let tx = self
            .shared
            .tx
            .lock()
            .expect("response channel mutex poisoned")
            .take();

        let tx = match tx {
            Some(tx) => tx,
            None => return,
        };

        let body = self.body.take().unwrap_or_else(Body::empty);
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = mem::take(&mut self.headers);

        for cookie in self.cookies.drain(..) {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }

        let _ = tx.send(response);
    }
}
