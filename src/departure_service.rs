use metrics::{counter, gauge, histogram};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::airport_api_client::{AirportApiClient, AirportMetadataSource};
use crate::airports::ReferenceLookup;
use crate::config::Config;
use crate::departures::{DepartureAggregator, DepartureReport};
use crate::errors::{DepartureError, Result};
use crate::ground_classifier::GroundClassifier;
use crate::network_feed::{NetworkFeedClient, SnapshotSource};
use crate::reference_cache::ReferenceCache;
use crate::reference_store::ReferenceStore;

/// Entry point for one departure cycle: resolve references, fetch the snapshot, count.
pub struct DepartureService {
    watch_list: Vec<String>,
    cache: ReferenceCache,
    store: ReferenceStore,
    snapshots: Arc<dyn SnapshotSource>,
    aggregator: DepartureAggregator,
    /// Serialises store writes from concurrent cycles
    save_lock: Mutex<()>,
}

impl DepartureService {
    pub fn new(
        config: &Config,
        snapshots: Arc<dyn SnapshotSource>,
        metadata: Arc<dyn AirportMetadataSource>,
    ) -> Self {
        Self {
            watch_list: config.watch_list.clone(),
            cache: ReferenceCache::new(metadata),
            store: ReferenceStore::new(config.store_path.clone()),
            snapshots,
            aggregator: DepartureAggregator::new(
                GroundClassifier::new(config.thresholds.clone()),
                config.policy.clone(),
            ),
            save_lock: Mutex::new(()),
        }
    }

    /// Build a service talking to the live feed and metadata API
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.request_timeout();
        let snapshots = NetworkFeedClient::new(config.network.snapshot_url.clone(), timeout)?;
        let metadata = AirportApiClient::new(
            config.airport_api.base_url.clone(),
            config.airport_api.api_key.clone(),
            timeout,
        )?;
        Ok(Self::new(config, Arc::new(snapshots), Arc::new(metadata)))
    }

    pub fn watch_list(&self) -> &[String] {
        &self.watch_list
    }

    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    /// Seed the cache from the store, then fetch whatever the watch-list still lacks.
    ///
    /// A corrupt store is returned as an error and must stop the process.
    pub async fn initialize(&self) -> Result<BTreeMap<String, ReferenceLookup>> {
        let found = self.cache.load_from_store(&self.store).await?;
        if !found {
            info!(
                "Airport reference store {:?} absent, fetching all {} watched airports",
                self.store.path(),
                self.watch_list.len()
            );
        }
        self.ensure_references().await
    }

    /// Resolve every watched airport that is not cached yet and persist new results.
    /// Failures are reported per airport and retried on the next call.
    pub async fn ensure_references(&self) -> Result<BTreeMap<String, ReferenceLookup>> {
        let missing = self.cache.missing(&self.watch_list);
        if missing.is_empty() {
            return Ok(BTreeMap::new());
        }

        let lookups = self.cache.fill_all(&missing).await;
        if lookups.values().any(ReferenceLookup::is_resolved) {
            self.persist().await?;
        }
        Ok(lookups)
    }

    /// Fetch the whole watch-list again and rewrite the store.
    ///
    /// References that fail to refresh keep their stored value. A corrupt store is
    /// replaced, since this is how it gets repaired.
    pub async fn refresh_references(&self) -> Result<BTreeMap<String, ReferenceLookup>> {
        match self.cache.load_from_store(&self.store).await {
            Ok(_) => {}
            Err(e @ DepartureError::StoreCorrupt { .. }) => {
                warn!("{}, rebuilding it from the metadata source", e);
            }
            Err(e) => return Err(e),
        }

        let lookups = self.cache.refresh(&self.watch_list).await;
        if lookups.values().any(ReferenceLookup::is_resolved) {
            self.persist().await?;
        } else {
            warn!("No airport reference could be refreshed, keeping the existing store");
        }
        Ok(lookups)
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        self.cache.save_to_store(&self.store)
    }

    /// Run one full cycle and return the departure count per watched airport.
    /// Airports still missing a reference are fetched first.
    pub async fn current_departures(&self) -> Result<DepartureReport> {
        self.ensure_references().await?;
        self.current_departures_cached().await
    }

    /// Run one cycle against the references already cached, without fetching the
    /// missing ones. Those are reported as gaps.
    #[tracing::instrument(skip(self), fields(airports = self.watch_list.len()))]
    pub async fn current_departures_cached(&self) -> Result<DepartureReport> {
        let start = Instant::now();

        let snapshot = match self.snapshots.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                counter!("departure_cycle.failures_total").increment(1);
                return Err(e);
            }
        };
        let observations = snapshot.observations();
        gauge!("departure_cycle.pilots").set(observations.len() as f64);

        let report = self
            .aggregator
            .count_all(&observations, &self.watch_list, &self.cache.snapshot());

        let gaps = report.gaps();
        if !gaps.is_empty() {
            warn!("Airport references unavailable this cycle: {}", gaps.join(", "));
        }

        counter!("departure_cycle.completed_total").increment(1);
        histogram!("departure_cycle.duration_seconds").record(start.elapsed().as_secs_f64());
        info!(
            "Departure cycle over {} pilots completed in {:.2}ms",
            observations.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(report)
    }
}
