//! Common test utilities for departure cycle integration tests
//!
//! Provides in-memory stand-ins for the live network feed and the airport
//! metadata API, so a full cycle can run without touching the network.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use busy_airports::airport_api_client::AirportMetadataSource;
use busy_airports::config::Config;
use busy_airports::departure_service::DepartureService;
use busy_airports::errors::{DepartureError, Result};
use busy_airports::network_feed::{NetworkSnapshot, SnapshotSource, parse_snapshot};
use busy_airports::AirportReference;

/// Snapshot source serving a fixed feed document, or failing when none is set
pub struct FakeSnapshot {
    body: Mutex<Option<String>>,
    pub calls: AtomicUsize,
}

impl FakeSnapshot {
    pub fn new(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(Some(body.to_string())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_body(&self, body: &str) {
        *self.body.lock().unwrap() = Some(body.to_string());
    }
}

#[async_trait]
impl SnapshotSource for FakeSnapshot {
    async fn fetch_snapshot(&self) -> Result<NetworkSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.body.lock().unwrap().clone();
        match body {
            Some(body) => parse_snapshot(&body),
            None => Err(DepartureError::NetworkUnavailable(
                "connection refused".to_string(),
            )),
        }
    }
}

/// Metadata source backed by a map; unknown identifiers fail
pub struct FakeAirports {
    airports: HashMap<String, AirportReference>,
    calls: Mutex<Vec<String>>,
}

impl FakeAirports {
    pub fn new(airports: &[AirportReference]) -> Arc<Self> {
        Arc::new(Self {
            airports: airports
                .iter()
                .map(|a| (a.icao.clone(), a.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, icao: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == icao)
            .count()
    }
}

#[async_trait]
impl AirportMetadataSource for FakeAirports {
    async fn fetch_airport(&self, icao: &str) -> Result<AirportReference> {
        self.calls.lock().unwrap().push(icao.to_string());
        self.airports
            .get(icao)
            .cloned()
            .ok_or_else(|| DepartureError::reference_unavailable(icao, "no record returned"))
    }
}

pub fn lebl() -> AirportReference {
    AirportReference::new("LEBL", 41.2971, 2.0785, 14).unwrap()
}

pub fn lemd() -> AirportReference {
    AirportReference::new("LEMD", 40.4719, -3.5626, 1998).unwrap()
}

pub fn config_with(watch_list: &[&str], store_path: &Path) -> Config {
    Config {
        watch_list: watch_list.iter().map(|s| s.to_string()).collect(),
        store_path: store_path.to_path_buf(),
        ..Config::default()
    }
}

pub fn service(
    config: &Config,
    snapshots: Arc<FakeSnapshot>,
    airports: Arc<FakeAirports>,
) -> DepartureService {
    DepartureService::new(config, snapshots, airports)
}

/// Feed with one pilot per case around Barcelona:
/// - `VLG1` parked at LEBL, filed LEBL to LEPA: departing
/// - `IBE2` parked at LEBL, filed LEPA to LEBL: just arrived
/// - `RYR3` at LEBL at 180 kt: taking off, not on the ground
/// - `AEA4` parked at LEBL with no flight plan: counted
/// - `SWR5` at LEBL cruising level: overhead
/// - `DLH6` parked at LEMD, filed LEMD to EDDF: departing LEMD
pub const BARCELONA_FEED: &str = r#"{
  "general": { "update_timestamp": "2026-10-19T10:15:00Z", "connected_clients": 6 },
  "pilots": [
    { "cid": 1, "callsign": "VLG1", "latitude": 41.2975, "longitude": 2.0790, "altitude": 20, "groundspeed": 0,
      "flight_plan": { "departure": "LEBL", "arrival": "LEPA" } },
    { "cid": 2, "callsign": "IBE2", "latitude": 41.2980, "longitude": 2.0800, "altitude": 15, "groundspeed": 8,
      "flight_plan": { "departure": "LEPA", "arrival": "LEBL" } },
    { "cid": 3, "callsign": "RYR3", "latitude": 41.2990, "longitude": 2.0810, "altitude": 60, "groundspeed": 180,
      "flight_plan": { "departure": "LEBL", "arrival": "EGKK" } },
    { "cid": 4, "callsign": "AEA4", "latitude": 41.2960, "longitude": 2.0770, "altitude": 14, "groundspeed": 0,
      "flight_plan": null },
    { "cid": 5, "callsign": "SWR5", "latitude": 41.3000, "longitude": 2.0800, "altitude": 36000, "groundspeed": 460,
      "flight_plan": { "departure": "LSZH", "arrival": "LEMG" } },
    { "cid": 6, "callsign": "DLH6", "latitude": 40.4720, "longitude": -3.5630, "altitude": 2000, "groundspeed": 3,
      "flight_plan": { "departure": "LEMD", "arrival": "EDDF" } }
  ]
}"#;

/// Minimal feed: a single pilot on the ground at LEBL filed out of LEBL
pub const SINGLE_DEPARTURE_FEED: &str = r#"{
  "pilots": [
    { "callsign": "VLG1", "latitude": 41.2975, "longitude": 2.0790, "altitude": 20, "groundspeed": 0,
      "flight_plan": { "departure": "LEBL", "arrival": "LEPA" } }
  ]
}"#;
