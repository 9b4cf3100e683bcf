use chrono::{DateTime, Duration, Utc};

use std::sync::{Mutex, PoisonError};

use super::address::OuiPrefix;
use super::fetcher::RegistrySource;
use super::parser::parse_registry;
use super::store::Store;
use super::types::{
    BatchEntry, BatchStatus, CacheError, CacheStats, RefreshFailure, RefreshOutcome, StoreError,
    VendorInfo,
};

/// Largest address list accepted by a single batch lookup.
pub const MAX_BATCH_SIZE: usize = 1000;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Vendor lookup cache: owns the store, knows where the registry comes from
/// and when it needs to be fetched again.
pub struct OuiCache {
    store: Store,
    source: Box<dyn RegistrySource>,
    max_age: Duration,
    refresh_lock: Mutex<()>,
}

impl OuiCache {
    pub fn new(store: Store, source: Box<dyn RegistrySource>, max_age: Duration) -> Self {
        Self {
            store,
            source,
            max_age,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Stale when never refreshed, older than the max age, or empty.
    pub fn is_stale(&self) -> Result<bool, StoreError> {
        self.is_stale_at(Utc::now())
    }

    fn is_stale_at(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let Some(last_update) = self.readable_last_update()? else {
            return Ok(true);
        };
        if now - last_update > self.max_age {
            return Ok(true);
        }
        Ok(self.store.count()? == 0)
    }

    /// Last refresh time, treating an unreadable timestamp as never refreshed.
    /// The next successful refresh overwrites it.
    fn readable_last_update(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self.store.last_update() {
            Ok(last_update) => Ok(last_update),
            Err(StoreError::InvalidTimestamp(raw)) => {
                tracing::warn!(
                    value = %raw,
                    "Unreadable OUI cache timestamp, treating cache as stale"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh the store if it is stale (or unconditionally when `force` is set).
    ///
    /// The store is only touched once a complete, non-empty replacement set has
    /// been parsed, so a failed refresh keeps serving the previous generation.
    pub fn ensure_fresh(&self, force: bool) -> Result<RefreshOutcome, StoreError> {
        if !force && !self.is_stale()? {
            return Ok(RefreshOutcome::NotNeeded);
        }

        // One download at a time per cache
        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Another caller may have finished a refresh while we waited
        if !force && !self.is_stale()? {
            return Ok(RefreshOutcome::NotNeeded);
        }

        tracing::info!(force, "Starting OUI cache refresh");

        let content = match self.source.fetch() {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "OUI registry download failed, keeping current cache");
                return Ok(RefreshOutcome::Failed(RefreshFailure::Fetch(e)));
            }
        };

        let records = parse_registry(&content);
        if records.is_empty() {
            tracing::error!("No valid records found in the OUI registry, keeping current cache");
            return Ok(RefreshOutcome::Failed(RefreshFailure::NoRecords));
        }

        let written = self.store.replace_all(&records, Utc::now())?;
        tracing::info!("OUI cache refresh completed");
        Ok(RefreshOutcome::Refreshed { records: written })
    }

    /// Lookups serve whatever is stored; a failed refresh is not their problem.
    fn refresh_best_effort(&self) {
        match self.ensure_fresh(false) {
            Ok(RefreshOutcome::Failed(reason)) => {
                tracing::warn!(%reason, "Serving lookup from existing cache");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Could not check OUI cache freshness"),
        }
    }

    /// Resolve the vendor for a hardware address.
    ///
    /// Malformed addresses return `Ok(None)` without touching the network or
    /// the store.
    pub fn lookup_mac(&self, address: &str) -> Result<Option<VendorInfo>, CacheError> {
        let Some(prefix) = OuiPrefix::from_mac(address) else {
            tracing::debug!(address, "Rejected malformed MAC address");
            return Ok(None);
        };

        self.refresh_best_effort();
        self.find(&prefix, address)
    }

    fn find(&self, prefix: &OuiPrefix, address: &str) -> Result<Option<VendorInfo>, CacheError> {
        let record = self.store.lookup_by_prefix(prefix.dashed(), prefix.hex())?;
        Ok(record.map(|r| r.into_info(Some(address.to_string()))))
    }

    /// Resolve up to [`MAX_BATCH_SIZE`] addresses, reporting each one separately.
    pub fn lookup_batch(&self, addresses: &[String]) -> Result<Vec<BatchEntry>, CacheError> {
        if addresses.len() > MAX_BATCH_SIZE {
            return Err(CacheError::Validation(format!(
                "batch of {} addresses exceeds the limit of {}",
                addresses.len(),
                MAX_BATCH_SIZE
            )));
        }

        let prefixes: Vec<Option<OuiPrefix>> =
            addresses.iter().map(|a| OuiPrefix::from_mac(a)).collect();

        if prefixes.iter().any(Option::is_some) {
            self.refresh_best_effort();
        }

        addresses
            .iter()
            .zip(prefixes)
            .map(|(address, prefix)| -> Result<BatchEntry, CacheError> {
                let Some(prefix) = prefix else {
                    return Ok(BatchEntry {
                        mac: address.clone(),
                        status: BatchStatus::Invalid,
                        vendor: None,
                    });
                };
                let vendor = self.find(&prefix, address)?;
                Ok(BatchEntry {
                    mac: address.clone(),
                    status: if vendor.is_some() {
                        BatchStatus::Found
                    } else {
                        BatchStatus::NotFound
                    },
                    vendor,
                })
            })
            .collect()
    }

    /// Vendors whose name contains `name`, alphabetical. `limit` is clamped to
    /// 1..=[`MAX_SEARCH_LIMIT`].
    pub fn search_vendor(&self, name: &str, limit: usize) -> Result<Vec<VendorInfo>, CacheError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CacheError::Validation("vendor name must not be empty".to_string()));
        }

        self.refresh_best_effort();

        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let records = self.store.search_by_name(name, limit)?;
        Ok(records.into_iter().map(|r| r.into_info(None)).collect())
    }

    /// Explicit refresh for operators.
    pub fn update(&self, force: bool) -> Result<RefreshOutcome, CacheError> {
        Ok(self.ensure_fresh(force)?)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = Utc::now();
        let last_update = self.readable_last_update()?;
        let size_bytes = self.store.size_bytes()?;

        Ok(CacheStats {
            total_records: self.store.count()?,
            last_refresh_records: self.store.total_records()?,
            last_update,
            cache_age_days: last_update.map(|ts| (now - ts).num_days()),
            needs_update: self.is_stale_at(now)?,
            database_size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            database_path: self.store.path().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oui::types::VendorRecord;
    use crate::test_utils::{StubSource, known_vendors_registry, sample_registry, test_cache};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn seeded_cache(
        source: StubSource,
        refreshed_at: DateTime<Utc>,
    ) -> (OuiCache, Arc<std::sync::atomic::AtomicUsize>) {
        let (cache, calls) = test_cache(source);
        let seed = parse_registry(&known_vendors_registry());
        cache.store.replace_all(&seed, refreshed_at).unwrap();
        (cache, calls)
    }

    #[test]
    fn test_empty_store_is_stale() {
        let (cache, calls) = test_cache(StubSource::serving(sample_registry(5)));
        assert!(cache.is_stale().unwrap());

        let outcome = cache.ensure_fresh(false).unwrap();
        assert!(matches!(outcome, RefreshOutcome::Refreshed { records: 5 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_stale().unwrap());
    }

    #[test]
    fn test_staleness_boundary() {
        let just_expired = Utc::now() - Duration::days(7) - Duration::seconds(1);
        let (cache, calls) = seeded_cache(StubSource::serving(sample_registry(3)), just_expired);
        assert!(matches!(
            cache.ensure_fresh(false).unwrap(),
            RefreshOutcome::Refreshed { records: 3 }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let recent = Utc::now() - Duration::days(6);
        let (cache, calls) = seeded_cache(StubSource::serving(sample_registry(3)), recent);
        assert!(matches!(
            cache.ensure_fresh(false).unwrap(),
            RefreshOutcome::NotNeeded
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_recent_but_empty_store_is_stale() {
        let (cache, calls) = test_cache(StubSource::serving(sample_registry(2)));
        cache.store.replace_all(&[], Utc::now()).unwrap();
        assert!(cache.is_stale().unwrap());

        cache.ensure_fresh(false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.store.count().unwrap(), 2);
    }

    #[test]
    fn test_fetch_failure_keeps_existing_records() {
        let (cache, calls) = seeded_cache(StubSource::failing(), Utc::now());
        let before = cache.store.count().unwrap();

        let outcome = cache.ensure_fresh(true).unwrap();
        assert!(matches!(
            outcome,
            RefreshOutcome::Failed(RefreshFailure::Fetch(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.store.count().unwrap(), before);
    }

    #[test]
    fn test_unparseable_registry_keeps_existing_records() {
        let (cache, _) = seeded_cache(
            StubSource::serving("OUI/MA-L Organization\nnothing useful here\n"),
            Utc::now(),
        );
        let before = cache.store.count().unwrap();

        let outcome = cache.ensure_fresh(true).unwrap();
        assert!(matches!(
            outcome,
            RefreshOutcome::Failed(RefreshFailure::NoRecords)
        ));
        assert_eq!(cache.store.count().unwrap(), before);
    }

    #[test]
    fn test_forced_refresh_replaces_generation() {
        let (cache, _) = seeded_cache(StubSource::serving(sample_registry(7)), Utc::now());
        assert_eq!(cache.store.count().unwrap(), 4);

        let outcome = cache.update(true).unwrap();
        assert!(matches!(outcome, RefreshOutcome::Refreshed { records: 7 }));
        assert_eq!(cache.store.count().unwrap(), 7);
        // VMware only existed in the seeded generation
        assert!(cache.lookup_mac("00:50:56:12:34:56").unwrap().is_none());
    }

    #[test]
    fn test_lookup_notations_resolve_alike() {
        let (cache, calls) = seeded_cache(StubSource::failing(), Utc::now());

        let results: Vec<VendorInfo> = ["00:50:56:12:34:56", "00-50-56-12-34-56", "005056123456"]
            .iter()
            .map(|mac| cache.lookup_mac(mac).unwrap().unwrap())
            .collect();

        for info in &results {
            assert_eq!(info.oui, "00-50-56");
            assert_eq!(info.oui_hex, "005056");
            assert_eq!(info.vendor, "VMware, Inc.");
            assert_eq!(info.address, "3401 Hillview Avenue PALO ALTO CA 94304 US");
        }
        assert_eq!(results[1].mac_queried.as_deref(), Some("00-50-56-12-34-56"));
        // Fresh cache, no downloads
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_mac_skips_refresh() {
        let (cache, calls) = test_cache(StubSource::serving(sample_registry(1)));

        assert!(cache.lookup_mac("not-a-mac").unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.store.count().unwrap(), 0);
    }

    #[test]
    fn test_lookup_on_never_refreshed_cache_with_failing_source() {
        let (cache, calls) = test_cache(StubSource::failing());

        assert!(cache.lookup_mac("00:50:56:12:34:56").unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_search_vendor() {
        let (cache, _) = seeded_cache(StubSource::failing(), Utc::now());

        let names: Vec<String> = cache
            .search_vendor("a", 2)
            .unwrap()
            .into_iter()
            .map(|v| v.vendor)
            .collect();
        assert_eq!(names, vec!["Acme", "Apple Inc"]);

        // Limit is clamped to at least one result
        assert_eq!(cache.search_vendor("a", 0).unwrap().len(), 1);

        assert!(matches!(
            cache.search_vendor("   ", 10),
            Err(CacheError::Validation(_))
        ));
    }

    #[test]
    fn test_lookup_batch_partial_success() {
        let (cache, calls) = seeded_cache(StubSource::failing(), Utc::now());
        let macs = vec![
            "00:50:56:aa:bb:cc".to_string(),
            "garbage".to_string(),
            "FF:FF:FF:00:00:00".to_string(),
        ];

        let entries = cache.lookup_batch(&macs).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].status, BatchStatus::Found);
        assert_eq!(
            entries[0].vendor.as_ref().map(|v| v.vendor.as_str()),
            Some("VMware, Inc.")
        );
        assert_eq!(entries[1].status, BatchStatus::Invalid);
        assert_eq!(entries[2].status, BatchStatus::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lookup_batch_limit() {
        let (cache, _) = test_cache(StubSource::failing());
        let macs = vec!["00:50:56:00:00:00".to_string(); MAX_BATCH_SIZE + 1];
        assert!(matches!(
            cache.lookup_batch(&macs),
            Err(CacheError::Validation(_))
        ));
    }

    #[test]
    fn test_concurrent_lookups_download_once() {
        let (cache, calls) = test_cache(StubSource::serving(sample_registry(50)));
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.lookup_mac("00:00:01:00:00:00").unwrap())
            })
            .collect();

        for handle in handles {
            let info = handle.join().unwrap().unwrap();
            assert_eq!(info.vendor, "Vendor 1 Corporation");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stats() {
        let refreshed_at = Utc::now() - Duration::days(3);
        let (cache, _) = seeded_cache(StubSource::failing(), refreshed_at);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.last_refresh_records, Some(4));
        assert_eq!(stats.cache_age_days, Some(3));
        assert!(!stats.needs_update);
        assert_eq!(stats.database_path, ":memory:");
        assert!(stats.database_size_mb >= 0.0);

        let (cache, _) = test_cache(StubSource::failing());
        let stats = cache.stats().unwrap();
        assert_eq!(stats.last_update, None);
        assert!(stats.needs_update);
    }

    #[test]
    fn test_records_round_trip_into_info() {
        let record = VendorRecord::new("08-00-27", None, "PCS Systemtechnik GmbH", "");
        let info = record.into_info(None);
        assert_eq!(info.oui_hex, "080027");
        assert_eq!(info.mac_queried, None);
    }

    #[test]
    fn test_unreadable_timestamp_triggers_refresh() {
        let (cache, calls) = seeded_cache(StubSource::serving(sample_registry(3)), Utc::now());
        // Naive timestamp without an offset
        crate::db::set_metadata(&cache.store.conn(), "last_update", "2024-01-01T10:00:00.123456")
            .unwrap();

        assert!(cache.is_stale().unwrap());
        let stats = cache.stats().unwrap();
        assert!(stats.needs_update);
        assert_eq!(stats.last_update, None);

        assert!(matches!(
            cache.ensure_fresh(false).unwrap(),
            RefreshOutcome::Refreshed { records: 3 }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.store.last_update().unwrap().is_some());
        assert!(!cache.is_stale().unwrap());
    }

    #[test]
    fn test_lookup_heals_unreadable_timestamp() {
        let (cache, calls) = test_cache(StubSource::serving(known_vendors_registry()));
        crate::db::set_metadata(&cache.store.conn(), "last_update", "yesterday").unwrap();

        let info = cache.lookup_mac("00:50:56:12:34:56").unwrap().unwrap();
        assert_eq!(info.vendor, "VMware, Inc.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
