//! HTTP transport used for the geo lookup and both measurement directions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{redirect, Body, Client, Response};
use thiserror::Error;
use tracing::debug;

use crate::config::TransferConfig;

const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// What the transport observed for one completed transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    /// Body bytes received (download) or sent (upload).
    pub bytes: u64,
    pub elapsed: Duration,
    pub status: u16,
}

/// Black-box HTTP client.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and return the whole body. Non-2xx statuses are errors.
    async fn fetch(&self, url: &str) -> Result<Bytes, TransportError>;

    /// GET `url`, counting and discarding the body.
    async fn download(&self, url: &str) -> Result<TransferStats, TransportError>;

    /// POST `payload` to `url`, discarding the response body.
    async fn upload(&self, url: &str, payload: Bytes) -> Result<TransferStats, TransportError> {
        let url = with_scheme(url);
        let len = payload.len();
        let sent = Arc::new(AtomicU64::new(0));
        let start = Instant::now();

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_LENGTH, len)
            .body(counting_body(payload, sent.clone()))
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;
        // A server may answer before reading the whole body; only what the
        // connection pulled before the response counts as sent.
        let bytes = sent.load(Ordering::Relaxed);
        let status = resp.status().as_u16();
        drain(&url, resp).await?;

        let elapsed = start.elapsed();
        if bytes < len as u64 {
            debug!(%url, bytes, payload = len, status, "server answered before the upload finished");
        }
        debug!(%url, bytes, ?elapsed, "upload complete");
        Ok(TransferStats {
            bytes,
            elapsed,
            status,
        })
    }
}

/// Stream `payload` in [`UPLOAD_CHUNK`] slices, adding each slice to `sent`
/// as the connection pulls it.
fn counting_body(payload: Bytes, sent: Arc<AtomicU64>) -> Body {
    let stream = stream::iter(upload_chunks(&payload)).map(move |chunk| {
        sent.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        Ok::<_, std::io::Error>(chunk)
    });
    Body::wrap_stream(stream)
}

fn upload_chunks(payload: &Bytes) -> Vec<Bytes> {
    (0..payload.len())
        .step_by(UPLOAD_CHUNK)
        .map(|at| payload.slice(at..payload.len().min(at + UPLOAD_CHUNK)))
        .collect()
}
