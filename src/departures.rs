use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::airports::{AirportReference, normalize_icao, same_airport};
use crate::errors::Result;
use crate::ground_classifier::GroundClassifier;
use crate::network_feed::{AircraftObservation, FlightPlanSummary};

/// What to do with a plan that departs from and arrives at the watched airport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundTripPolicy {
    /// The arrival rule wins: the aircraft is treated as landing
    #[default]
    Exclude,
    /// Counted once, like any other departure
    Count,
}

/// What to do with a filed plan whose departure and arrival are both blank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsetFlightPlanPolicy {
    /// Classified on geometry alone, as if no plan were filed
    AsAbsent,
    /// Never counted: a filed plan must name the watched airport as its departure
    #[default]
    Exclude,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightPlanPolicy {
    pub round_trip: RoundTripPolicy,
    pub unset_flight_plan: UnsetFlightPlanPolicy,
}

/// Departure counts for one cycle, keyed by airport.
///
/// `None` marks an airport whose reference could not be resolved this cycle and
/// serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartureReport(pub BTreeMap<String, Option<usize>>);

impl DepartureReport {
    pub fn get(&self, icao: &str) -> Option<Option<usize>> {
        self.0.get(&normalize_icao(icao)).copied()
    }

    /// Airports reported as data gaps
    pub fn gaps(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, count)| count.is_none())
            .map(|(icao, _)| icao.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Folds a snapshot's observations into per-airport departure counts
#[derive(Debug, Clone, Default)]
pub struct DepartureAggregator {
    classifier: GroundClassifier,
    policy: FlightPlanPolicy,
}

impl DepartureAggregator {
    pub fn new(classifier: GroundClassifier, policy: FlightPlanPolicy) -> Self {
        Self { classifier, policy }
    }

    /// Whether the observation's flight plan allows it to count as departing `watched`.
    /// Geometry is checked separately.
    fn plan_allows_departure(&self, plan: Option<&FlightPlanSummary>, watched: &str) -> bool {
        let Some(plan) = plan else {
            return true;
        };

        if plan.is_unset() {
            return self.policy.unset_flight_plan == UnsetFlightPlanPolicy::AsAbsent;
        }

        let departs = plan
            .departure
            .as_deref()
            .is_some_and(|code| same_airport(code, watched));
        let arrives = plan
            .arrival
            .as_deref()
            .is_some_and(|code| same_airport(code, watched));

        match (departs, arrives) {
            (true, true) => self.policy.round_trip == RoundTripPolicy::Count,
            (_, true) => false,
            (departs, false) => departs,
        }
    }

    /// Number of observations on the ground at `watched` and departing from it
    pub fn count(
        &self,
        observations: &[AircraftObservation],
        watched: &str,
        airport: &AirportReference,
    ) -> usize {
        observations
            .iter()
            .filter(|observation| {
                self.plan_allows_departure(observation.flight_plan.as_ref(), watched)
                    && self.classifier.is_on_ground(observation, airport)
            })
            .count()
    }

    /// Count every watched airport against the resolved `references`.
    /// Unresolved airports are reported as gaps.
    pub fn count_all(
        &self,
        observations: &[AircraftObservation],
        watch_list: &[String],
        references: &BTreeMap<String, AirportReference>,
    ) -> DepartureReport {
        let mut counts = BTreeMap::new();
        for watched in watch_list {
            let key = normalize_icao(watched);
            let count = match references.get(&key) {
                Some(airport) => Some(self.count(observations, &key, airport)),
                None => {
                    debug!("No reference for {}, reporting as data gap", key);
                    None
                }
            };
            counts.insert(key, count);
        }
        DepartureReport(counts)
    }
}
