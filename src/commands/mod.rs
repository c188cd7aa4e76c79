pub mod count;
pub mod refresh_airports;
pub mod serve;

pub use count::handle_count;
pub use refresh_airports::handle_refresh_airports;
pub use serve::handle_serve;

use std::collections::BTreeMap;
use tracing::{info, warn};

use busy_airports::ReferenceLookup;

/// Log the outcome of a reference fill, one line per airport
pub(crate) fn log_lookups(lookups: &BTreeMap<String, ReferenceLookup>) {
    for (icao, lookup) in lookups {
        match lookup {
            ReferenceLookup::Resolved(airport) => info!(
                "{}: lat {:.4}, lon {:.4}, elevation {} ft",
                icao, airport.latitude, airport.longitude, airport.elevation_ft
            ),
            ReferenceLookup::Unavailable(reason) => {
                warn!("{}: reference unavailable: {}", icao, reason)
            }
        }
    }
}
