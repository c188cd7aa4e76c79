use metrics::{counter, gauge};
use moka::future::Cache;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::airport_api_client::AirportMetadataSource;
use crate::airports::{AirportReference, ReferenceLookup, normalize_icao};
use crate::errors::{DepartureError, Result};
use crate::reference_store::ReferenceStore;

/// Far above any realistic watch-list, so nothing is ever evicted
const MAX_CACHED_AIRPORTS: u64 = 10_000;

/// Airport reference cache, filled from the metadata source on miss.
///
/// Backed by moka: concurrent callers for the same missing identifier wait on a
/// single fetch, and a failed fetch is never cached so the next lookup retries it.
#[derive(Clone)]
pub struct ReferenceCache {
    /// Resolved references keyed by normalized identifier
    entries: Cache<String, AirportReference>,
    source: Arc<dyn AirportMetadataSource>,
}

impl ReferenceCache {
    pub fn new(source: Arc<dyn AirportMetadataSource>) -> Self {
        Self {
            entries: Cache::builder().max_capacity(MAX_CACHED_AIRPORTS).build(),
            source,
        }
    }

    /// Resolved reference for `icao`, without fetching
    pub async fn peek(&self, icao: &str) -> Option<AirportReference> {
        self.entries.get(&normalize_icao(icao)).await
    }

    pub fn contains(&self, icao: &str) -> bool {
        self.entries.contains_key(&normalize_icao(icao))
    }

    /// Number of resolved references
    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers from `identifiers` that are not resolved yet, normalized and deduplicated
    pub fn missing(&self, identifiers: &[String]) -> Vec<String> {
        identifiers
            .iter()
            .map(|icao| normalize_icao(icao))
            .filter(|icao| !self.contains(icao))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Store a reference obtained elsewhere, replacing any cached value
    pub async fn insert(&self, reference: AirportReference) {
        let key = normalize_icao(&reference.icao);
        self.entries.insert(key, reference).await;
    }

    /// Copy of every resolved reference, keyed by identifier
    pub fn snapshot(&self) -> BTreeMap<String, AirportReference> {
        self.entries
            .iter()
            .map(|(key, reference)| ((*key).clone(), reference))
            .collect()
    }

    /// Return the cached reference for `icao`, fetching it once on miss.
    ///
    /// Concurrent callers for the same missing identifier share a single fetch. A failed
    /// fetch leaves nothing behind; the caller decides whether to skip or abort.
    pub async fn get(&self, icao: &str) -> Result<AirportReference> {
        let key = normalize_icao(icao);

        if let Some(reference) = self.entries.get(&key).await {
            counter!("airport_reference.cache_hits_total").increment(1);
            return Ok(reference);
        }

        counter!("airport_reference.cache_misses_total").increment(1);
        let source = self.source.clone();
        let fetch_key = key.clone();
        let result = self
            .entries
            .try_get_with(key.clone(), async move {
                counter!("airport_reference.fetches_total").increment(1);
                source.fetch_airport(&fetch_key).await
            })
            .await;

        match result {
            Ok(reference) => {
                gauge!("airport_reference.cached").set(self.len() as f64);
                Ok(reference)
            }
            Err(e) => {
                counter!("airport_reference.fetch_failures_total").increment(1);
                Err(unshare_error(&key, e))
            }
        }
    }

    /// Resolve every identifier concurrently, one task per unresolved identifier.
    ///
    /// Waits for all tasks before returning. The result holds an entry for every
    /// requested identifier: either the reference or an `Unavailable` gap marker.
    /// Identifiers that are already resolved are answered from the cache.
    #[tracing::instrument(skip(self, identifiers), fields(requested = identifiers.len()))]
    pub async fn fill_all(&self, identifiers: &[String]) -> BTreeMap<String, ReferenceLookup> {
        let mut lookups = BTreeMap::new();
        let mut pending = BTreeSet::new();
        let mut tasks = JoinSet::new();

        for icao in identifiers {
            let key = normalize_icao(icao);
            if key.is_empty() {
                lookups.insert(
                    icao.clone(),
                    ReferenceLookup::Unavailable("empty airport identifier".to_string()),
                );
                continue;
            }
            if lookups.contains_key(&key) || pending.contains(&key) {
                continue;
            }
            if let Some(reference) = self.peek(&key).await {
                lookups.insert(key, ReferenceLookup::Resolved(reference));
                continue;
            }

            pending.insert(key.clone());
            let cache = self.clone();
            tasks.spawn(async move {
                let result = cache.get(&key).await;
                (key, result)
            });
        }

        let launched = pending.len();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(reference))) => {
                    pending.remove(&key);
                    lookups.insert(key, ReferenceLookup::Resolved(reference));
                }
                Ok((key, Err(e))) => {
                    if e.is_cycle_fatal() {
                        error!("Fetching airport reference for {} failed: {}", key, e);
                    } else {
                        warn!("Airport reference for {} unavailable: {}", key, e);
                    }
                    pending.remove(&key);
                    lookups.insert(key, ReferenceLookup::Unavailable(e.to_string()));
                }
                Err(e) => {
                    error!("Airport reference fetch task failed: {}", e);
                }
            }
        }

        // Tasks that panicked never reported their key
        for key in pending {
            lookups.insert(
                key,
                ReferenceLookup::Unavailable("fetch task aborted".to_string()),
            );
        }

        let resolved = lookups.values().filter(|l| l.is_resolved()).count();
        info!(
            "Airport references filled: {} fetched concurrently, {}/{} resolved",
            launched,
            resolved,
            lookups.len()
        );

        lookups
    }

    /// Fetch every identifier again, ignoring what is cached.
    ///
    /// Fresh references replace the cached ones. An identifier whose fetch fails keeps
    /// its previous reference, so a flaky metadata source never loses known airports.
    pub async fn refresh(&self, identifiers: &[String]) -> BTreeMap<String, ReferenceLookup> {
        let fresh = ReferenceCache::new(self.source.clone());
        let lookups = fresh.fill_all(identifiers).await;

        for lookup in lookups.values() {
            if let ReferenceLookup::Resolved(reference) = lookup {
                self.insert(reference.clone()).await;
            }
        }
        gauge!("airport_reference.cached").set(self.len() as f64);

        lookups
    }

    /// Seed the cache from the persistent store.
    ///
    /// Returns `false` when no store exists. A corrupt store is an error.
    pub async fn load_from_store(&self, store: &ReferenceStore) -> Result<bool> {
        match store.load()? {
            Some(references) => {
                for (key, reference) in references {
                    self.entries.insert(key, reference).await;
                }
                gauge!("airport_reference.cached").set(self.len() as f64);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn save_to_store(&self, store: &ReferenceStore) -> Result<()> {
        store.save(&self.snapshot())
    }
}

/// moka hands the same failure to every waiter behind an `Arc`; rebuild an owned error
/// of the same kind when it is still shared.
fn unshare_error(icao: &str, e: Arc<DepartureError>) -> DepartureError {
    match Arc::try_unwrap(e) {
        Ok(e) => e,
        Err(shared) => match shared.as_ref() {
            DepartureError::NetworkUnavailable(reason) => {
                DepartureError::NetworkUnavailable(reason.clone())
            }
            DepartureError::ReferenceUnavailable { reason, .. } => {
                DepartureError::reference_unavailable(icao, reason.clone())
            }
            other => DepartureError::reference_unavailable(icao, other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Metadata source backed by a fixed table that records every call
    struct CountingSource {
        airports: HashMap<String, AirportReference>,
        calls: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            Self::with_airports(
                delay,
                &[
                    ("LEBL", 41.297, 2.078, 12),
                    ("LEPA", 39.552, 2.739, 27),
                    ("LEMD", 40.472, -3.561, 1998),
                ],
            )
        }

        fn with_airports(delay: Duration, rows: &[(&str, f64, f64, i32)]) -> Self {
            let mut airports = HashMap::new();
            for &(icao, lat, lon, elev) in rows {
                airports.insert(
                    icao.to_string(),
                    AirportReference::new(icao, lat, lon, elev).unwrap(),
                );
            }
            Self {
                airports,
                calls: Mutex::new(Vec::new()),
                delay,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AirportMetadataSource for CountingSource {
        async fn fetch_airport(&self, icao: &str) -> Result<AirportReference> {
            self.calls.lock().unwrap().push(icao.to_string());
            tokio::time::sleep(self.delay).await;
            match icao {
                "BOOM" => panic!("metadata source exploded"),
                _ => self.airports.get(icao).cloned().ok_or_else(|| {
                    DepartureError::reference_unavailable(icao, "metadata API returned no results")
                }),
            }
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_fetches_once() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let cache = ReferenceCache::new(source.clone());

        let first = cache.get("LEBL").await.unwrap();
        let second = cache.get("lebl").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), vec!["LEBL".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let cache = ReferenceCache::new(source.clone());

        let err = cache.get("ZZZZ").await.unwrap_err();
        assert!(matches!(err, DepartureError::ReferenceUnavailable { .. }));
        assert!(!cache.contains("ZZZZ"));

        cache.get("ZZZZ").await.unwrap_err();
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_fetch() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(20)));
        let cache = ReferenceCache::new(source.clone());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get("LEPA").await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fill_all_reports_every_identifier() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(5)));
        let cache = ReferenceCache::new(source.clone());

        let lookups = cache.fill_all(&ids(&["LEBL", "LEPA", "ZZZZ", "LEMD"])).await;

        assert_eq!(lookups.len(), 4);
        assert!(lookups["LEBL"].is_resolved());
        assert!(lookups["LEPA"].is_resolved());
        assert!(lookups["LEMD"].is_resolved());
        assert!(matches!(lookups["ZZZZ"], ReferenceLookup::Unavailable(_)));
        assert!(source.calls().len() <= 4);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_fill_all_skips_present_and_duplicate_keys() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let cache = ReferenceCache::new(source.clone());
        cache
            .insert(AirportReference::new("LEBL", 41.297, 2.078, 12).unwrap())
            .await;

        let lookups = cache.fill_all(&ids(&["LEBL", "LEPA", "lepa", "LEPA"])).await;

        assert_eq!(lookups.len(), 2);
        assert_eq!(source.calls(), vec!["LEPA".to_string()]);
    }

    #[tokio::test]
    async fn test_fill_all_survives_panicking_task() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let cache = ReferenceCache::new(source);

        let lookups = cache.fill_all(&ids(&["BOOM", "LEBL"])).await;

        assert!(lookups["LEBL"].is_resolved());
        assert_eq!(
            lookups["BOOM"],
            ReferenceLookup::Unavailable("fetch task aborted".to_string())
        );
    }

    #[tokio::test]
    async fn test_store_round_trip_avoids_fetches() {
        let temp_dir = TempDir::new().unwrap();
        let store = ReferenceStore::new(temp_dir.path().join("airport_data.bin"));

        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let cache = ReferenceCache::new(source.clone());
        assert!(!cache.load_from_store(&store).await.unwrap());
        cache.fill_all(&ids(&["LEBL", "LEPA"])).await;
        cache.save_to_store(&store).unwrap();

        let fresh_source = Arc::new(CountingSource::new(Duration::ZERO));
        let reloaded = ReferenceCache::new(fresh_source.clone());
        assert!(reloaded.load_from_store(&store).await.unwrap());
        assert_eq!(reloaded.snapshot(), cache.snapshot());

        reloaded.get("LEBL").await.unwrap();
        assert!(fresh_source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing() {
        let cache = ReferenceCache::new(Arc::new(CountingSource::new(Duration::ZERO)));
        cache
            .insert(AirportReference::new("LEBL", 41.297, 2.078, 12).unwrap())
            .await;

        let missing = cache.missing(&ids(&["LEBL", "lepa", "LEPA", "LEMD"]));
        assert_eq!(missing, ids(&["LEMD", "LEPA"]));
    }

    #[tokio::test]
    async fn test_refresh_replaces_resolved_and_keeps_failed() {
        // The source now reports a moved LEBL and no longer knows LEMD
        let source = Arc::new(CountingSource::with_airports(
            Duration::ZERO,
            &[("LEBL", 41.2971, 2.0785, 14)],
        ));
        let cache = ReferenceCache::new(source.clone());
        cache
            .insert(AirportReference::new("LEBL", 41.297, 2.078, 12).unwrap())
            .await;
        cache
            .insert(AirportReference::new("LEMD", 40.472, -3.561, 1998).unwrap())
            .await;

        let lookups = cache.refresh(&ids(&["LEBL", "LEMD"])).await;

        assert!(lookups["LEBL"].is_resolved());
        assert!(!lookups["LEMD"].is_resolved());
        assert_eq!(source.calls().len(), 2);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["LEBL"].elevation_ft, 14);
        assert_eq!(snapshot["LEMD"].elevation_ft, 1998);
    }
}
