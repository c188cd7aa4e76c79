use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::airports::AirportReference;
use crate::network_feed::AircraftObservation;

/// Tunable limits for the on-ground heuristic. These are tuning knobs, not physical limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundThresholds {
    /// Radius around the airport reference point. Generous on purpose: it only has to
    /// reject aircraft sitting at a different airport.
    pub max_distance_km: f64,
    /// Allowed difference between reported altitude and field elevation
    pub elevation_margin_ft: i32,
    /// Anything faster is taking off or landing
    pub max_groundspeed_kts: i32,
}

impl Default for GroundThresholds {
    fn default() -> Self {
        Self {
            max_distance_km: 6.0,
            elevation_margin_ft: 200,
            max_groundspeed_kts: 50,
        }
    }
}

/// Decides whether an observation is an aircraft on the ground at a given airport
#[derive(Debug, Clone, Default)]
pub struct GroundClassifier {
    thresholds: GroundThresholds,
}

impl GroundClassifier {
    pub fn new(thresholds: GroundThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &GroundThresholds {
        &self.thresholds
    }

    /// Proximity, altitude band and ground speed must all hold.
    /// Non-finite positions compare false and classify as airborne.
    pub fn is_on_ground(&self, observation: &AircraftObservation, airport: &AirportReference) -> bool {
        let distance_km = observation.position.distance_km(&airport.position());
        if distance_km.is_nan() || distance_km > self.thresholds.max_distance_km {
            return false;
        }

        let elevation_offset_ft =
            (i64::from(observation.altitude_ft) - i64::from(airport.elevation_ft)).abs();
        if elevation_offset_ft > i64::from(self.thresholds.elevation_margin_ft) {
            return false;
        }

        if observation.groundspeed_kts > self.thresholds.max_groundspeed_kts {
            return false;
        }

        trace!(
            "{} on ground at {} ({:.2} km, {} ft offset, {} kt)",
            observation.callsign,
            airport.icao,
            distance_km,
            elevation_offset_ft,
            observation.groundspeed_kts
        );
        true
    }
}
