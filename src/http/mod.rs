//! HTTP front end
//!
//! Two routes, matching the wire contract of the original service:
//! - `GET /{id}` streams the relayed audio for a registered id
//! - `POST /add` registers a new upstream URL under a generated short id

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use crate::relay::RelayManager;
use crate::store::StreamStore;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay manager, one buffer per registered id
    pub manager: Arc<RelayManager>,
    /// Persistent id → URL store and connection log
    pub store: Arc<dyn StreamStore>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/add", post(handlers::add_stream))
        .route("/{id}", get(handlers::stream_audio))
        .with_state(state)
}

/// Resolve the client IP, honoring reverse-proxy headers
///
/// Order: first `X-Forwarded-For` entry, then `X-Real-IP`, then the peer
/// address.
pub(crate) fn real_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real.is_empty() {
            return real.to_string();
        }
    }

    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn peer() -> SocketAddr {
        "192.0.2.7:51234".parse().unwrap()
    }

    #[test]
    fn test_real_ip_from_peer() {
        let headers = HeaderMap::new();
        assert_eq!(real_ip(&headers, peer()), "192.0.2.7");
    }

    #[test]
    fn test_real_ip_forwarded_for_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.4, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(real_ip(&headers, peer()), "203.0.113.4");
    }

    #[test]
    fn test_real_ip_falls_back_to_real_ip_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));

        assert_eq!(real_ip(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn test_real_ip_ignores_empty_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));

        assert_eq!(real_ip(&headers, peer()), "192.0.2.7");
    }
}
