//! Best-server selection for a resolved location.
//!
//! One pass over the catalog in order:
//! - a city match is taken immediately and ends the scan;
//! - a country match becomes the candidate, and with [`CountryMatch::LastWins`]
//!   a later country match replaces an earlier one;
//! - with neither, the first catalog entry is returned.
//!
//! A `None` field on the location never matches anything.

use tracing::debug;

use super::{Server, ServerCatalog};
use crate::config::CountryMatch;
use crate::locate::Location;

/// Pick the server for `location` from a non-empty `catalog`.
pub fn select<'a>(location: &Location, catalog: &'a ServerCatalog, policy: CountryMatch) -> &'a Server {
    let mut candidate: Option<&Server> = None;

    for server in catalog.servers() {
        if location.city.as_deref() == Some(server.city.as_str()) {
            debug!(id = server.id, city = %server.city, "city match");
            return server;
        }

        if location.country.as_deref() == Some(server.country.as_str()) {
            match policy {
                CountryMatch::LastWins => candidate = Some(server),
                CountryMatch::FirstWins if candidate.is_none() => candidate = Some(server),
                CountryMatch::FirstWins => {}
            }
        }
    }

    match candidate {
        Some(server) => {
            debug!(id = server.id, country = %server.country, "country match");
            server
        }
        None => {
            debug!("no city or country match, falling back to first catalog entry");
            catalog.first()
        }
    }
}
