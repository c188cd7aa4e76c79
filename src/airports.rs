use serde::{Deserialize, Serialize};

use crate::errors::{DepartureError, Result};
use crate::geodesy::GeoPoint;

/// Geodetic reference facts for one airport.
///
/// Created from a successful metadata lookup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportReference {
    pub icao: String,         // ICAO identifier, unique key
    pub latitude: f64,        // Latitude in decimal degrees
    pub longitude: f64,       // Longitude in decimal degrees
    pub elevation_ft: i32,    // Elevation above MSL in feet
}

impl AirportReference {
    /// Build a reference, rejecting records that break the coordinate invariants
    pub fn new(icao: &str, latitude: f64, longitude: f64, elevation_ft: i32) -> Result<Self> {
        let reference = Self {
            icao: normalize_icao(icao),
            latitude,
            longitude,
            elevation_ft,
        };
        reference.validate()?;
        Ok(reference)
    }

    pub fn validate(&self) -> Result<()> {
        if self.icao.is_empty() {
            return Err(DepartureError::reference_unavailable(
                &self.icao,
                "empty airport identifier",
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DepartureError::reference_unavailable(
                &self.icao,
                format!("latitude {} out of range", self.latitude),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DepartureError::reference_unavailable(
                &self.icao,
                format!("longitude {} out of range", self.longitude),
            ));
        }
        Ok(())
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Canonical form of an airport identifier used as a cache key
pub fn normalize_icao(icao: &str) -> String {
    icao.trim().to_ascii_uppercase()
}

/// Whether two airport codes name the same airport
pub fn same_airport(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Result of resolving one identifier during a population pass.
///
/// `Unavailable` is the explicit data-gap marker; it never aborts the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceLookup {
    Resolved(AirportReference),
    Unavailable(String),
}

impl ReferenceLookup {
    pub fn reference(&self) -> Option<&AirportReference> {
        match self {
            ReferenceLookup::Resolved(reference) => Some(reference),
            ReferenceLookup::Unavailable(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ReferenceLookup::Resolved(_))
    }
}
