//! Live network snapshot: the VATSIM v3 data feed and the observations derived from it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{DepartureError, Result};
use crate::geodesy::GeoPoint;

pub const DEFAULT_SNAPSHOT_URL: &str = "https://data.vatsim.net/v3/vatsim-data.json";

/// Source of network-wide snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<NetworkSnapshot>;
}

/// Top-level feed document. Only the parts the classifier needs are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSnapshot {
    #[serde(default)]
    pub general: Option<GeneralInfo>,
    pub pilots: Vec<Pilot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralInfo {
    #[serde(default)]
    pub update_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connected_clients: Option<u32>,
}

/// Single pilot entry
#[derive(Debug, Clone, Deserialize)]
pub struct Pilot {
    #[serde(default)]
    pub cid: Option<u64>,
    #[serde(default)]
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,    // Feet
    pub groundspeed: i32, // Knots
    #[serde(default)]
    pub flight_plan: Option<FlightPlan>,
}

/// Filed flight plan, may be null in the feed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlightPlan {
    #[serde(default)]
    pub departure: String,
    #[serde(default)]
    pub arrival: String,
}

/// Departure/arrival summary of a flight plan. Blank codes are unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlightPlanSummary {
    pub departure: Option<String>,
    pub arrival: Option<String>,
}

impl FlightPlanSummary {
    pub fn new(departure: Option<&str>, arrival: Option<&str>) -> Self {
        Self {
            departure: departure.and_then(non_blank),
            arrival: arrival.and_then(non_blank),
        }
    }

    pub fn is_unset(&self) -> bool {
        self.departure.is_none() && self.arrival.is_none()
    }
}

fn non_blank(code: &str) -> Option<String> {
    let t = code.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// A single aircraft's instantaneous state, one per pilot in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftObservation {
    pub callsign: String,
    pub position: GeoPoint,
    pub altitude_ft: i32,
    pub groundspeed_kts: i32,
    pub flight_plan: Option<FlightPlanSummary>,
}

impl From<&Pilot> for AircraftObservation {
    fn from(pilot: &Pilot) -> Self {
        Self {
            callsign: pilot.callsign.clone(),
            position: GeoPoint::new(pilot.latitude, pilot.longitude),
            altitude_ft: pilot.altitude,
            groundspeed_kts: pilot.groundspeed,
            flight_plan: pilot
                .flight_plan
                .as_ref()
                .map(|fp| FlightPlanSummary::new(Some(&fp.departure), Some(&fp.arrival))),
        }
    }
}

impl NetworkSnapshot {
    pub fn observations(&self) -> Vec<AircraftObservation> {
        self.pilots.iter().map(AircraftObservation::from).collect()
    }
}

/// Parse a feed document. Malformed JSON invalidates the whole cycle.
pub fn parse_snapshot(body: &str) -> Result<NetworkSnapshot> {
    serde_json::from_str(body).map_err(|e| DepartureError::MalformedSnapshot(e.to_string()))
}

/// HTTP client for the network status feed
pub struct NetworkFeedClient {
    client: Client,
    url: String,
}

impl NetworkFeedClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("busy-airports/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl SnapshotSource for NetworkFeedClient {
    async fn fetch_snapshot(&self) -> Result<NetworkSnapshot> {
        debug!("Fetching network snapshot from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let snapshot = parse_snapshot(&body)?;

        if let Some(general) = &snapshot.general {
            info!(
                "Fetched network snapshot with {} pilots (updated {:?}, {:?} clients connected)",
                snapshot.pilots.len(),
                general.update_timestamp,
                general.connected_clients
            );
        } else {
            info!("Fetched network snapshot with {} pilots", snapshot.pilots.len());
        }

        Ok(snapshot)
    }
}
