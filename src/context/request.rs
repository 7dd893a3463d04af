//! Defines `RequestCtx`, the request-side context handed to middlewares and
//! handlers.

use std::collections::HashMap;

use bytes::Bytes;
use cookie::Cookie;
use hyper::header::{HeaderMap, CONNECTION, CONTENT_TYPE, COOKIE};
use hyper::http::request::Parts;
use hyper::{Body, Method, Uri};
use mime::Mime;
use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::error::HandlerError;

/// A parsed request body, dispatched on the request's `Content-Type`.
#[derive(Debug)]
pub enum Payload {
    /// `application/x-www-form-urlencoded` fields.
    UrlEncoded(HashMap<String, String>),
    /// `multipart/form-data` parts, keyed by field name.
    Multipart(HashMap<String, MultipartEntry>),
    /// An `application/json` document.
    Json(Value),
}

/// A single `multipart/form-data` part.
#[derive(Debug)]
pub enum MultipartEntry {
    /// A plain form field.
    Bytes(Bytes),
    /// An uploaded file.
    File(FileUpload),
}

/// An uploaded file from a multipart body.
#[derive(Debug)]
pub struct FileUpload {
    /// The client-supplied file name.
    pub name: String,
    /// The part's declared MIME type.
    pub mime_type: String,
    /// The part's `Content-Transfer-Encoding`, when present.
    pub transfer_encoding: Option<String>,
    /// The file contents.
    pub bytes: Bytes,
}

/// The request context: method, path, headers, captured path parameters and a
/// lazily parsed body.
pub struct RequestCtx {
    parts: Parts,
    params: HashMap<String, String>,
    body: Option<Body>,
}

impl RequestCtx {
    pub(crate) fn new(parts: Parts, body: Body, params: HashMap<String, String>) -> RequestCtx {
        RequestCtx {
            parts,
            params,
            body: Some(body),
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// The request path, undecoded.
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// A single header value, when present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The path parameters captured by the matched route pattern.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// A single captured path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The query string split into pairs. Keys appearing more than once keep
    /// every supplied value; pairs without `=` are skipped.
    pub fn query(&self) -> HashMap<String, Vec<String>> {
        let mut mapping: HashMap<String, Vec<String>> = HashMap::new();

        if let Some(query) = self.parts.uri.query() {
            let pairs = query
                .split(|c| c == '&' || c == ';')
                .filter(|pair| pair.contains('='));

            for pair in pairs {
                let mut sp = pair.splitn(2, '=');
                let (k, v) = (sp.next().unwrap(), sp.next().unwrap());

                if let (Some(k), Some(v)) = (form_url_decode(k), form_url_decode(v)) {
                    mapping.entry(k).or_insert_with(Vec::new).push(v);
                }
            }
        }

        mapping
    }

    /// The cookies supplied with the request.
    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        match self.header_str(COOKIE.as_str()) {
            Some(raw) => raw
                .split(';')
                .filter_map(|part| Cookie::parse(part.trim().to_owned()).ok())
                .collect(),
            None => Vec::new(),
        }
    }

    /// The parsed `Content-Type`, when present and well-formed.
    pub fn content_type(&self) -> Option<Mime> {
        self.header_str(CONTENT_TYPE.as_str())
            .and_then(|v| v.parse().ok())
    }

    /// True iff the request declares a JSON body.
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|m| m.type_() == mime::APPLICATION && m.subtype() == mime::JSON)
            .unwrap_or(false)
    }

    /// True iff the request declares a form-urlencoded body.
    pub fn is_form(&self) -> bool {
        self.content_type()
            .map(|m| m.type_() == mime::APPLICATION && m.subtype() == mime::WWW_FORM_URLENCODED)
            .unwrap_or(false)
    }

    /// True iff the request declares a multipart body.
    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .map(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA)
            .unwrap_or(false)
    }

    /// True iff the request asks for a protocol upgrade, which makes its
    /// effective method WS.
    pub fn is_upgrade_request(&self) -> bool {
        self.header_str(CONNECTION.as_str())
            .map(|v| v.eq_ignore_ascii_case("upgrade"))
            .unwrap_or(false)
    }

    /// Reads and parses the request body according to its `Content-Type`.
    ///
    /// Returns `Ok(None)` for content types the framework does not parse. The
    /// body is consumed by the first call; parse failures surface as handler
    /// errors.
    pub async fn payload(&mut self) -> Result<Option<Payload>, HandlerError> {
        if self.is_multipart() {
            return self.multipart_payload().await.map(Some);
        }

        if self.is_form() {
            let bytes = self.read_body().await?;
            let text = std::str::from_utf8(&bytes).map_err(anyhow::Error::from)?;
            return Ok(Some(Payload::UrlEncoded(parse_form_urlencoded(text))));
        }

        if self.is_json() {
            let bytes = self.read_body().await?;
            let value = serde_json::from_slice(&bytes).map_err(anyhow::Error::from)?;
            return Ok(Some(Payload::Json(value)));
        }

        Ok(None)
    }

    async fn multipart_payload(&mut self) -> Result<Payload, HandlerError> {
        let content_type = self
            .header_str(CONTENT_TYPE.as_str())
            .map(str::to_owned)
            .unwrap_or_default();
        let boundary = multer::parse_boundary(&content_type)?;
        let body = self.take_body()?;

        let mut multipart = multer::Multipart::new(body, boundary);
        let mut entries = HashMap::new();

        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().map(str::to_owned).unwrap_or_default();
            let file_name = field.file_name().map(str::to_owned);
            let mime_type = field.content_type().map(|m| m.to_string());
            let transfer_encoding = field
                .headers()
                .get("content-transfer-encoding")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let bytes = field.bytes().await?;

            let entry = match file_name {
                Some(name) => MultipartEntry::File(FileUpload {
                    name,
                    mime_type: mime_type
                        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string()),
                    transfer_encoding,
                    bytes,
                }),
                None => MultipartEntry::Bytes(bytes),
            };

            entries.insert(field_name, entry);
        }

        Ok(Payload::Multipart(entries))
    }

    async fn read_body(&mut self) -> Result<Bytes, HandlerError> {
        let body = self.take_body()?;
        hyper::body::to_bytes(body)
            .await
            .map_err(|e| HandlerError::from(anyhow::Error::from(e)))
    }

    fn take_body(&mut self) -> Result<Body, HandlerError> {
        self.body
            .take()
            .ok_or_else(|| HandlerError::from(anyhow::anyhow!("request body already consumed")))
    }

    fn header_str(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Decodes a form-urlencoded token: `+` means space, then percent-decoding.
fn form_url_decode(raw: &str) -> Option<String> {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn parse_form_urlencoded(text: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();

    for pair in text
        .split(|c| c == '&' || c == ';')
        .filter(|pair| pair.contains('='))
    {
        let mut sp = pair.splitn(2, '=');
        let (k, v) = (sp.next().unwrap(), sp.next().unwrap());

        if let (Some(k), Some(v)) = (form_url_decode(k), form_url_decode(v)) {
            fields.insert(k, v);
        }
    }

    fields
}
