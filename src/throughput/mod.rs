//! Throughput measurement: one single-shot HTTP download or upload per call.

pub mod report;
pub mod transport;

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TransferConfig;
use transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum ThroughputError {
    #[error("no data {}", past_tense(.direction))]
    EmptyTransfer { direction: Direction },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => write!(f, "download"),
            Direction::Upload => write!(f, "upload"),
        }
    }
}

fn past_tense(direction: &Direction) -> &'static str {
    match direction {
        Direction::Download => "downloaded",
        Direction::Upload => "uploaded",
    }
}

/// Outcome of one measurement.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementResult {
    pub direction: Direction,
    pub bytes_transferred: u64,
    pub elapsed_secs: f64,
    /// Average speed in decimal megabits per second.
    pub speed_mbps: f64,
    pub url: String,
    pub server_id: Option<i64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Decimal (SI) megabits for a byte count: `bytes * 8 / 1_000_000`.
pub fn bytes_to_mbps(bytes: f64) -> f64 {
    bytes * 8.0 / 1_000_000.0
}

/// `host` followed directly by `path`; no separator or scheme is added.
pub fn build_url(host: &str, path: &str) -> String {
    format!("{}{}", host, path)
}

/// Synthetic upload body: `size` copies of `fill`.
pub fn upload_payload(size: usize, fill: u8) -> Bytes {
    Bytes::from(vec![fill; size])
}

/// Run one transfer in `direction` against `url` and turn it into a speed.
///
/// Transport failures and zero-byte transfers both fail the measurement;
/// nothing is retried.
pub async fn measure(
    transport: &dyn Transport,
    cfg: &TransferConfig,
    direction: Direction,
    url: &str,
) -> Result<MeasurementResult, ThroughputError> {
    info!(%direction, %url, "starting measurement");

    let stats = match direction {
        Direction::Download => transport.download(url).await,
        Direction::Upload => {
            let payload = upload_payload(cfg.upload_payload_bytes, cfg.upload_fill_byte);
            transport.upload(url, payload).await
        }
    }
    .map_err(|e| {
        warn!(%direction, %url, error = %e, "transfer failed");
        e
    })?;

    info!(%direction, status = stats.status, "returned code");

    if stats.bytes == 0 {
        warn!(%direction, %url, "transfer moved no data");
        return Err(ThroughputError::EmptyTransfer { direction });
    }

    let elapsed_secs = stats.elapsed.as_secs_f64();
    let bytes_per_sec = if elapsed_secs > 0.0 {
        stats.bytes as f64 / elapsed_secs
    } else {
        stats.bytes as f64
    };

    Ok(MeasurementResult {
        direction,
        bytes_transferred: stats.bytes,
        elapsed_secs,
        speed_mbps: bytes_to_mbps(bytes_per_sec),
        url: url.to_string(),
        server_id: None,
        timestamp: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use transport::TransferStats;

    /// Replays one canned outcome and records what it was asked to do.
    struct Canned {
        outcome: Result<TransferStats, u16>,
        uploaded: Mutex<Option<(usize, Option<u8>)>>,
    }

    impl Canned {
        fn ok(bytes: u64, secs: u64) -> Self {
            Self {
                outcome: Ok(TransferStats {
                    bytes,
                    elapsed: Duration::from_secs(secs),
                    status: 200,
                }),
                uploaded: Mutex::new(None),
            }
        }

        fn result(&self, url: &str) -> Result<TransferStats, TransportError> {
            self.outcome.map_err(|status| TransportError::Status {
                url: url.to_string(),
                status,
            })
        }
    }

    #[async_trait::async_trait]
    impl Transport for Canned {
        async fn fetch(&self, _url: &str) -> Result<Bytes, TransportError> {
            Ok(Bytes::new())
        }

        async fn download(&self, url: &str) -> Result<TransferStats, TransportError> {
            self.result(url)
        }

        async fn upload(&self, url: &str, payload: Bytes) -> Result<TransferStats, TransportError> {
            *self.uploaded.lock().unwrap() = Some((payload.len(), payload.first().copied()));
            self.result(url)
        }
    }

    fn small_cfg() -> TransferConfig {
        TransferConfig {
            upload_payload_bytes: 64,
            ..TransferConfig::default()
        }
    }

    #[test]
    fn test_mbps_is_decimal() {
        assert_eq!(bytes_to_mbps(1_000_000.0), 8.0);
        assert_eq!(bytes_to_mbps(0.0), 0.0);
    }

    #[test]
    fn test_build_url_concatenates() {
        assert_eq!(
            build_url("example.com:8080", "/speedtest/random4000x4000.jpg"),
            "example.com:8080/speedtest/random4000x4000.jpg"
        );
        assert_eq!(build_url("host/", "/x"), "host//x");
    }

    #[test]
    fn test_upload_payload_fill() {
        let p = upload_payload(1024, b'A');
        assert_eq!(p.len(), 1024);
        assert!(p.iter().all(|&b| b == b'A'));
    }

    #[tokio::test]
    async fn test_download_speed() {
        let t = Canned::ok(1_000_000, 1);
        let res = measure(&t, &small_cfg(), Direction::Download, "h/dl").await.unwrap();
        assert_eq!(res.direction, Direction::Download);
        assert_eq!(res.bytes_transferred, 1_000_000);
        assert_eq!(res.speed_mbps, 8.0);
        assert_eq!(res.url, "h/dl");
    }

    #[tokio::test]
    async fn test_speed_averages_over_elapsed() {
        let t = Canned::ok(10_000_000, 2);
        let res = measure(&t, &small_cfg(), Direction::Download, "h/dl").await.unwrap();
        assert_eq!(res.speed_mbps, 40.0);
    }

    #[tokio::test]
    async fn test_upload_sends_configured_payload() {
        let t = Canned::ok(64, 1);
        let res = measure(&t, &small_cfg(), Direction::Upload, "h/ul").await.unwrap();
        assert_eq!(res.direction, Direction::Upload);
        assert_eq!(*t.uploaded.lock().unwrap(), Some((64, Some(b'A'))));
    }

    #[tokio::test]
    async fn test_zero_bytes_is_empty_transfer_both_directions() {
        for direction in [Direction::Download, Direction::Upload] {
            let t = Canned::ok(0, 1);
            let err = measure(&t, &small_cfg(), direction, "h/x").await.unwrap_err();
            assert!(
                matches!(err, ThroughputError::EmptyTransfer { direction: d } if d == direction)
            );
        }
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let t = Canned {
            outcome: Err(503),
            uploaded: Mutex::new(None),
        };
        let err = measure(&t, &small_cfg(), Direction::Download, "h/dl").await.unwrap_err();
        assert!(matches!(
            err,
            ThroughputError::Transport(TransportError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn test_empty_transfer_message() {
        let err = ThroughputError::EmptyTransfer {
            direction: Direction::Upload,
        };
        assert_eq!(err.to_string(), "no data uploaded");
    }
}
