//! The RFC 6455 accept handshake.
//!
//! Builds the `101 Switching Protocols` response for an upgrade request; the
//! actual protocol switch happens later, when hyper resolves the connection's
//! `OnUpgrade` future and the session loop wraps the raw stream.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hyper::header::{HeaderMap, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::{Body, Response, StatusCode};
use sha1::{Digest, Sha1};

const PROTO_WEBSOCKET: &str = "websocket";
const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Builds the `101` response accepting an upgrade, or `None` when the request
/// carries no `Sec-WebSocket-Key`.
pub(crate) fn accept_response(headers: &HeaderMap) -> Option<Response<Body>> {
    let key = headers.get(SEC_WEBSOCKET_KEY)?;

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(UPGRADE, PROTO_WEBSOCKET)
        .header(CONNECTION, "upgrade")
        .header(SEC_WEBSOCKET_ACCEPT, accept_key(key.as_bytes()))
        .body(Body::empty())
        .ok()
}

fn accept_key(key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(WS_GUID);
    STANDARD.encode(sha1.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_the_rfc_example() {
        // RFC 6455 §1.3 handshake example.
        assert_eq!(
            accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn responds_101_with_upgrade_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(SEC_WEBSOCKET_KEY, "QmF0bWFu".parse().unwrap());

        let response = accept_response(&headers).unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers().get(UPGRADE).unwrap(), PROTO_WEBSOCKET);
        assert!(response.headers().get(SEC_WEBSOCKET_ACCEPT).is_some());
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(accept_response(&HeaderMap::new()).is_none());
    }
}
