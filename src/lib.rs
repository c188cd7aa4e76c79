//! Counts the pilots currently departing a watched set of airports.
//!
//! Each cycle pulls a live network snapshot, classifies which aircraft sit on the
//! ground at a watched airport and reports a count per airport. Airport reference
//! data is fetched once per identifier, cached in memory and persisted to a small
//! binary store between runs.

pub mod airport_api_client;
pub mod airports;
pub mod config;
pub mod departure_service;
pub mod departures;
pub mod errors;
pub mod geodesy;
pub mod ground_classifier;
pub mod log_format;
pub mod metrics;
pub mod network_feed;
pub mod reference_cache;
pub mod reference_store;
pub mod web;

pub use airports::{AirportReference, ReferenceLookup};
pub use config::Config;
pub use departure_service::DepartureService;
pub use departures::{DepartureAggregator, DepartureReport};
pub use errors::{DepartureError, Result};
pub use geodesy::{GeoPoint, haversine_distance_km};
pub use ground_classifier::{GroundClassifier, GroundThresholds};
pub use network_feed::{AircraftObservation, NetworkSnapshot};
