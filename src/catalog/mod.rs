//! Speed test server catalog: loading and id lookup.

pub mod select;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use select::select;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("server catalog not found at {path}")]
    Missing { path: String },

    #[error("failed to read server catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server catalog is empty")]
    Empty,

    #[error("server catalog is not a valid JSON array of servers: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single candidate measurement server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    /// Bare host (optionally with port), no scheme.
    pub host: String,
    pub country: String,
    pub city: String,
}

/// Ordered, read-only list of servers as they appear in the source JSON.
#[derive(Debug, Clone)]
pub struct ServerCatalog {
    servers: Vec<Server>,
}

impl ServerCatalog {
    /// Parse a catalog from raw JSON bytes.
    ///
    /// An empty blob, or a valid but empty array, is rejected: selection
    /// always needs a first entry to fall back on.
    pub fn load(bytes: &[u8]) -> Result<Self, CatalogError> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(CatalogError::Empty);
        }

        let servers: Vec<Server> = serde_json::from_slice(bytes)?;
        if servers.is_empty() {
            return Err(CatalogError::Empty);
        }

        debug!(servers = servers.len(), "parsed server catalog");
        Ok(Self { servers })
    }

    /// Read and parse the catalog file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CatalogError::Missing {
                path: path.display().to_string(),
            },
            _ => CatalogError::Io {
                path: path.display().to_string(),
                source: e,
            },
        })?;

        let catalog = Self::load(&bytes)?;
        info!(path = %path.display(), servers = catalog.len(), "loaded server catalog");
        Ok(catalog)
    }

    /// First server whose id equals `id`, scanning in catalog order.
    pub fn by_id(&self, id: i64) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// The entry selection falls back to when nothing matches.
    pub fn first(&self) -> &Server {
        // `load` guarantees at least one entry.
        &self.servers[0]
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
