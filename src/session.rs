//! Run orchestration: locate, pick a server, measure.
//!
//! A [`Session`] is built once per process from the loaded config and
//! catalog and then handed every requested [`Operation`] in order.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::{self, Server, ServerCatalog};
use crate::config::Config;
use crate::locate::{self, Location, ResolutionError};
use crate::throughput::transport::Transport;
use crate::throughput::{self, Direction, MeasurementResult, ThroughputError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Throughput(#[from] ThroughputError),

    #[error("no server with id {id} in catalog")]
    ServerNotFound { id: i64 },

    #[error("invalid server id {raw:?}")]
    InvalidServerId { raw: String },
}

impl SessionError {
    /// Recoverable errors skip the operation without marking the run failed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::ServerNotFound { .. } | SessionError::InvalidServerId { .. }
        )
    }
}

/// One requested action, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Locate, select, download, then upload.
    Auto,
    /// Download from the server with this (unparsed) id.
    Download(String),
    /// Upload to the server with this (unparsed) id.
    Upload(String),
    Locate,
    FindBest,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Auto => write!(f, "auto test"),
            Operation::Download(id) => write!(f, "download from server {}", id),
            Operation::Upload(id) => write!(f, "upload to server {}", id),
            Operation::Locate => write!(f, "locate"),
            Operation::FindBest => write!(f, "find best server"),
        }
    }
}

/// Something worth reporting, emitted as soon as it is known.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Located(Location),
    Selected(Server),
    Measured(MeasurementResult),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

pub struct Session {
    config: Config,
    catalog: ServerCatalog,
    transport: Arc<dyn Transport>,
    location: Option<Location>,
}

impl Session {
    pub fn new(config: Config, catalog: ServerCatalog, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            catalog,
            transport,
            location: None,
        }
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    /// Location resolved earlier in this run, if any.
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Query the geo service and remember the answer for later operations.
    pub async fn locate(&mut self) -> Result<Location, SessionError> {
        let location = locate::resolve(self.transport.as_ref(), &self.config.locate.endpoint).await?;
        self.location = Some(location.clone());
        Ok(location)
    }

    /// Best server for the stored location, resolving it first if needed.
    pub async fn find_best(&mut self) -> Result<Server, SessionError> {
        let location = match self.location.clone() {
            Some(location) => location,
            None => self.locate().await?,
        };
        Ok(self.select_for(&location))
    }

    fn select_for(&self, location: &Location) -> Server {
        let server = catalog::select(location, &self.catalog, self.config.selection.country_match);
        info!(id = server.id, host = %server.host, "selected server");
        server.clone()
    }

    fn url_for(&self, server: &Server, direction: Direction) -> String {
        let path = match direction {
            Direction::Download => &self.config.transfer.download_path,
            Direction::Upload => &self.config.transfer.upload_path,
        };
        throughput::build_url(&server.host, path)
    }

    /// Measure one direction against a known server.
    pub async fn measure_server(
        &self,
        server: &Server,
        direction: Direction,
    ) -> Result<MeasurementResult, SessionError> {
        let url = self.url_for(server, direction);
        let mut result = throughput::measure(
            self.transport.as_ref(),
            &self.config.transfer,
            direction,
            &url,
        )
        .await?;
        result.server_id = Some(server.id);
        Ok(result)
    }

    /// Measure one direction against the catalog server with id `raw_id`.
    pub async fn measure_by_id(
        &self,
        direction: Direction,
        raw_id: &str,
    ) -> Result<MeasurementResult, SessionError> {
        let id: i64 = raw_id.trim().parse().map_err(|_| SessionError::InvalidServerId {
            raw: raw_id.to_string(),
        })?;
        let server = self
            .catalog
            .by_id(id)
            .ok_or(SessionError::ServerNotFound { id })?;
        self.measure_server(server, direction).await
    }

    /// Execute one operation, reporting outcomes through `report` as they
    /// happen. The first failing step ends the operation.
    pub async fn run_operation(
        &mut self,
        op: &Operation,
        report: &mut dyn FnMut(Outcome),
    ) -> Result<(), SessionError> {
        match op {
            Operation::Auto => {
                let location = self.locate().await?;
                report(Outcome::Located(location.clone()));

                let server = self.select_for(&location);
                report(Outcome::Selected(server.clone()));

                for direction in [Direction::Download, Direction::Upload] {
                    let result = self.measure_server(&server, direction).await?;
                    report(Outcome::Measured(result));
                }
            }
            Operation::Download(raw) => {
                let result = self.measure_by_id(Direction::Download, raw).await?;
                report(Outcome::Measured(result));
            }
            Operation::Upload(raw) => {
                let result = self.measure_by_id(Direction::Upload, raw).await?;
                report(Outcome::Measured(result));
            }
            Operation::Locate => {
                let location = self.locate().await?;
                report(Outcome::Located(location));
            }
            Operation::FindBest => {
                let server = self.find_best().await?;
                report(Outcome::Selected(server));
            }
        }
        Ok(())
    }

    /// Run every operation in order. Failures are logged and counted; they
    /// never stop later operations.
    pub async fn run(&mut self, ops: &[Operation], report: &mut dyn FnMut(Outcome)) -> RunSummary {
        let mut summary = RunSummary::default();

        for op in ops {
            match self.run_operation(op, report).await {
                Ok(()) => summary.completed += 1,
                Err(e) if e.is_recoverable() => {
                    warn!(op = %op, error = %e, "operation skipped");
                    eprintln!("Skipping {}: {}", op, e);
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!(op = %op, error = %e, "operation failed");
                    eprintln!("Error in {}: {}", op, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            "run finished"
        );
        summary
    }
}
