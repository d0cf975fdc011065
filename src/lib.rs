//! speedpick -- pick a nearby speed test server and measure HTTP throughput.
//!
//! This crate provides the server catalog and selection logic, the geo-IP
//! location lookup, the single-shot download/upload meter, and the session
//! that sequences them for the CLI.

pub mod catalog;
pub mod config;
pub mod locate;
pub mod session;
pub mod throughput;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use catalog::ServerCatalog;
use config::Config;
use session::Session;
use throughput::transport::HttpTransport;

/// Build a session backed by the real HTTP transport.
///
/// Fails when the catalog cannot be loaded; nothing can run without it.
pub fn open_session(config: Config, catalog_override: Option<&Path>) -> Result<Session> {
    let catalog_path = catalog_override
        .unwrap_or(config.catalog.path.as_path())
        .to_path_buf();
    tracing::info!(path = %catalog_path.display(), "Loading server catalog");
    let catalog = ServerCatalog::from_path(&catalog_path)?;

    let transport = HttpTransport::new(&config.transfer)?;
    Ok(Session::new(config, catalog, Arc::new(transport)))
}
