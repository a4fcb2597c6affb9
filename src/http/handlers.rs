//! Request handlers

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Form, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::id;
use crate::relay::SessionGuard;
use crate::store::StreamStore;

use super::{real_ip, AppState};

/// Form body for `POST /add`
#[derive(Debug, Deserialize)]
pub struct AddForm {
    #[serde(default)]
    url: Option<String>,
}

/// `GET /{id}` - relay the registered stream to this client
///
/// Looks the id up in the store, attaches a consumer session to the relay
/// buffer (creating it, and with it the single upstream fetch, on first
/// request) and streams chunks until the client disconnects.
pub async fn stream_audio(
    Path(stream_id): Path<String>,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let record = {
        let store = Arc::clone(&state.store);
        let lookup_id = stream_id.clone();
        tokio::task::spawn_blocking(move || store.lookup(&lookup_id)).await
    };

    let record = match record {
        Ok(Ok(Some(record))) => record,
        Ok(Ok(None)) => {
            return (StatusCode::NOT_FOUND, "Stream not found\n").into_response();
        }
        Ok(Err(e)) => {
            tracing::error!(stream = %stream_id, error = %e, "Stream lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error\n").into_response();
        }
        Err(e) => {
            tracing::error!(stream = %stream_id, error = %e, "Store task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error\n").into_response();
        }
    };

    let ip = real_ip(&headers, peer);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    tracing::info!(
        stream = %stream_id,
        ip = %ip,
        user_agent = %user_agent,
        url = %record.url,
        "New listener"
    );

    record_connection(&state.store, &stream_id, &ip, &user_agent);

    let buffer = state.manager.get_or_create(&stream_id, &record.url).await;
    let (rx, catchup, guard) = buffer.subscribe().await;

    let queue = state.manager.config().session_queue;
    let (body_tx, body_rx) = mpsc::channel::<Result<Bytes, Infallible>>(queue);

    tokio::spawn(run_session(stream_id, ip, rx, catchup, guard, body_tx));

    (
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(ReceiverStream::new(body_rx)),
    )
        .into_response()
}

/// Consumer session: replay catchup, then forward live chunks
///
/// A failed send into the response body means the client went away; the
/// session ends and its guard releases the subscription. Retirement of the
/// buffer cancels its shutdown token; the session drops the body sender and
/// the client sees end-of-stream. The session cannot wait for the broadcast
/// sender to close instead: its own guard keeps the buffer, and with it the
/// sender, alive.
async fn run_session(
    stream_id: String,
    ip: String,
    mut rx: broadcast::Receiver<Bytes>,
    catchup: Vec<Bytes>,
    guard: SessionGuard,
    body_tx: mpsc::Sender<Result<Bytes, Infallible>>,
) {
    let retired = guard.buffer().shutdown_token();
    let _guard = guard;

    for chunk in catchup {
        if body_tx.send(Ok(chunk)).await.is_err() {
            tracing::debug!(stream = %stream_id, ip = %ip, "Listener disconnected during catchup");
            return;
        }
    }

    loop {
        let received = tokio::select! {
            _ = retired.cancelled() => {
                tracing::debug!(stream = %stream_id, ip = %ip, "Relay buffer retired, ending session");
                return;
            }
            received = rx.recv() => received,
        };

        match received {
            Ok(chunk) => {
                if body_tx.send(Ok(chunk)).await.is_err() {
                    tracing::info!(stream = %stream_id, ip = %ip, "Listener disconnected");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    stream = %stream_id,
                    ip = %ip,
                    skipped = skipped,
                    "Slow listener, dropped oldest chunks"
                );
            }
            Err(broadcast::error::RecvError::Closed) => {
                return;
            }
        }
    }
}

/// Append a connection audit record, best-effort
fn record_connection(store: &Arc<dyn StreamStore>, stream_id: &str, ip: &str, user_agent: &str) {
    let store = Arc::clone(store);
    let stream_id = stream_id.to_string();
    let ip = ip.to_string();
    let user_agent = user_agent.to_string();

    tokio::task::spawn_blocking(move || {
        if let Err(e) = store.record_connection(&stream_id, &ip, &user_agent) {
            tracing::warn!(stream = %stream_id, error = %e, "Failed to record connection");
        }
    });
}

/// `POST /add` - register a new upstream URL under a generated short id
pub async fn add_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AddForm>,
) -> Response {
    let url = match form.url.filter(|u| !u.is_empty()) {
        Some(url) => url,
        None => return (StatusCode::BAD_REQUEST, "Missing URL\n").into_response(),
    };

    let stream_id = id::generate();

    let inserted = {
        let store = Arc::clone(&state.store);
        let insert_id = stream_id.clone();
        let insert_url = url.clone();
        tokio::task::spawn_blocking(move || store.insert_stream(&insert_id, &insert_url)).await
    };

    match inserted {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(stream = %stream_id, error = %e, "Failed to register stream");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error\n").into_response();
        }
        Err(e) => {
            tracing::error!(stream = %stream_id, error = %e, "Store task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error\n").into_response();
        }
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    tracing::info!(stream = %stream_id, url = %url, "Stream registered");

    (StatusCode::OK, format!("http://{host}/{stream_id}\n")).into_response()
}
