//! Upstream fetch loop
//!
//! One producer task runs per relay buffer. It cycles between connecting to
//! the upstream URL and streaming its body into the buffer, retrying forever
//! on failure. Upstream problems are logged, never surfaced to listeners —
//! they just hear silence until the source recovers.
//!
//! The loop checks its cancellation token at every suspension point (connect,
//! read, reconnect delay), so `RelayManager::retire` stops it promptly.

use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;

use super::buffer::{ProducerState, RelayBuffer};
use super::config::RelayConfig;

/// Run the fetch loop for one buffer until cancelled
pub(crate) async fn run(
    buffer: Arc<RelayBuffer>,
    client: reqwest::Client,
    config: RelayConfig,
    cancel: CancellationToken,
) {
    loop {
        buffer.set_state(ProducerState::Connecting);

        let response = tokio::select! {
            _ = cancel.cancelled() => return,
            response = client.get(buffer.url()).send() => response,
        };

        let response = match response {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(
                    stream = %buffer.id(),
                    status = %resp.status(),
                    "Upstream returned non-success status"
                );
                if !wait_reconnect(&config, &cancel).await {
                    return;
                }
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    stream = %buffer.id(),
                    error = %e,
                    "Failed to connect to upstream"
                );
                if !wait_reconnect(&config, &cancel).await {
                    return;
                }
                continue;
            }
        };

        buffer.set_state(ProducerState::Streaming);
        tracing::info!(stream = %buffer.id(), url = %buffer.url(), "Buffering started");

        if !stream_body(&buffer, response, &config, &cancel).await {
            return;
        }

        // Read error or upstream end: reconnect immediately, no delay
    }
}

/// Stream the response body into the buffer
///
/// Upstream chunks arrive in arbitrary sizes, so they are re-chunked into
/// fixed `chunk_size` slices before publishing. Returns `false` if the
/// producer was cancelled, `true` to reconnect.
async fn stream_body(
    buffer: &Arc<RelayBuffer>,
    mut response: reqwest::Response,
    config: &RelayConfig,
    cancel: &CancellationToken,
) -> bool {
    let mut pending = BytesMut::new();

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return false,
            read = response.chunk() => read,
        };

        match read {
            Ok(Some(data)) => {
                pending.extend_from_slice(&data);

                while pending.len() >= config.chunk_size {
                    let chunk = pending.split_to(config.chunk_size).freeze();
                    buffer.publish(chunk).await;
                }
            }
            Ok(None) => {
                if !pending.is_empty() {
                    buffer.publish(pending.split().freeze()).await;
                }
                tracing::info!(stream = %buffer.id(), "Upstream stream ended");
                return true;
            }
            Err(e) => {
                if !pending.is_empty() {
                    buffer.publish(pending.split().freeze()).await;
                }
                tracing::warn!(stream = %buffer.id(), error = %e, "Buffering stopped");
                return true;
            }
        }
    }
}

/// Wait out the reconnect delay; returns `false` if cancelled meanwhile
async fn wait_reconnect(config: &RelayConfig, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(config.reconnect_delay) => true,
    }
}
