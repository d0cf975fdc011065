//! Geo-IP location lookup.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::throughput::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("geo lookup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("geo lookup returned an unreadable body: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Approximate caller location. `None` means the service did not know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl Location {
    pub fn is_unknown(&self) -> bool {
        self.country.is_none() && self.city.is_none()
    }
}

/// Query `endpoint` once and read `country`/`city` from its JSON body.
///
/// Every call goes to the network.
pub async fn resolve(transport: &dyn Transport, endpoint: &str) -> Result<Location, ResolutionError> {
    info!(%endpoint, "resolving location");

    let body = transport.fetch(endpoint).await.map_err(|e| {
        warn!(%endpoint, error = %e, "geo lookup request failed");
        e
    })?;
    let location: Location = serde_json::from_slice(&body)?;

    if location.is_unknown() {
        warn!("geo lookup returned neither country nor city");
    }
    info!(country = ?location.country, city = ?location.city, "location resolved");
    Ok(location)
}
