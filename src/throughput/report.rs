//! Human-readable rendering of measurement, location and server results.

use super::{Direction, MeasurementResult};
use crate::catalog::Server;
use crate::locate::Location;

fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.2} Mbps", mbps)
    }
}

/// One-line summary of a measurement.
pub fn format_measurement(result: &MeasurementResult) -> String {
    let label = match result.direction {
        Direction::Download => "Download",
        Direction::Upload => "Upload",
    };

    let mut summary = format!(
        "{} speed: {} ({} bytes in {:.2}s",
        label,
        format_speed(result.speed_mbps),
        result.bytes_transferred,
        result.elapsed_secs,
    );
    if let Some(id) = result.server_id {
        summary.push_str(&format!(", server {}", id));
    }
    summary.push(')');

    summary
}

pub fn format_location(location: &Location) -> String {
    format!(
        "Location: {}, {}",
        location.city.as_deref().unwrap_or("unknown city"),
        location.country.as_deref().unwrap_or("unknown country"),
    )
}

pub fn format_server(server: &Server) -> String {
    format!(
        "Server {}: {} ({}, {})",
        server.id, server.host, server.city, server.country
    )
}
