//! In-process TTL cache.
//!
//! Entries expire `ttl_seconds` after they are set, measured on the
//! [`SafeTimeProvider`] the cache was built with. Expired entries are dropped
//! lazily on `get` or in bulk by [`CacheManager::purge_expired`].

pub mod portfolio;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CacheConfig;
use crate::errors::{AmortizationError, Result};

pub use portfolio::{PaymentSummary, PortfolioCache, PortfolioReport, RiskProfile};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    ttl_seconds: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    hits: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// entry details without the value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub key: String,
    pub ttl_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hits: u64,
    pub remaining_seconds: i64,
}

/// counters since creation or the last reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// live entries
    pub entries: usize,
    /// hits as a percentage of lookups, two decimal places
    pub hit_rate: Decimal,
}

/// key/value store with per-entry expiry and hit statistics
pub struct CacheManager<'t, V = Value> {
    time: &'t SafeTimeProvider,
    entries: HashMap<String, CacheEntry<V>>,
    default_ttl_seconds: i64,
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
}

impl<'t, V: Clone> CacheManager<'t, V> {
    pub fn new(time: &'t SafeTimeProvider) -> Self {
        Self::with_config(time, &CacheConfig::default())
    }

    pub fn with_config(time: &'t SafeTimeProvider, config: &CacheConfig) -> Self {
        Self {
            time,
            entries: HashMap::new(),
            default_ttl_seconds: config.default_ttl_seconds,
            hits: 0,
            misses: 0,
            sets: 0,
            deletes: 0,
        }
    }

    pub fn default_ttl(&self) -> i64 {
        self.default_ttl_seconds
    }

    pub fn set_default_ttl(&mut self, ttl_seconds: i64) -> Result<()> {
        validate_ttl(ttl_seconds)?;
        self.default_ttl_seconds = ttl_seconds;
        Ok(())
    }

    /// store `value` under `key`, replacing any previous entry.
    /// `ttl_seconds` falls back to the default ttl.
    pub fn set(&mut self, key: &str, value: V, ttl_seconds: Option<i64>) -> Result<()> {
        validate_key(key)?;
        let ttl_seconds = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        let ttl = validate_ttl(ttl_seconds)?;

        let created_at = self.time.now();
        let expires_at = created_at
            .checked_add_signed(ttl)
            .ok_or(AmortizationError::InvalidTtl { ttl: ttl_seconds })?;

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                ttl_seconds,
                created_at,
                expires_at,
                hits: 0,
            },
        );
        self.sets += 1;
        Ok(())
    }

    /// live value for `key`; an expired entry counts as a miss and is removed
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.time.now();

        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.misses += 1;
            log::debug!("cache entry {} expired", key);
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.hits += 1;
        self.hits += 1;
        Some(entry.value.clone())
    }

    /// value for `key`, computing and storing it on a miss
    pub fn get_or_insert_with<F>(&mut self, key: &str, ttl_seconds: Option<i64>, compute: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = compute()?;
        self.set(key, value.clone(), ttl_seconds)?;
        Ok(value)
    }

    /// true when `key` holds a live entry; does not touch the counters
    pub fn has(&self, key: &str) -> bool {
        let now = self.time.now();
        self.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.deletes += 1;
        }
        removed
    }

    /// remove every entry, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.deletes += removed as u64;
        removed
    }

    /// remove every key matching the regular expression `pattern`
    pub fn delete_by_pattern(&mut self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|e| AmortizationError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let before = self.entries.len();
        self.entries.retain(|key, _| !regex.is_match(key));
        let removed = before - self.entries.len();

        self.deletes += removed as u64;
        log::info!("invalidated {} cache entries matching {}", removed, pattern);
        Ok(removed)
    }

    /// live keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let now = self.time.now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn metadata(&self, key: &str) -> Option<EntryMetadata> {
        let now = self.time.now();
        let entry = self.entries.get(key).filter(|e| !e.is_expired(now))?;

        Some(EntryMetadata {
            key: key.to_string(),
            ttl_seconds: entry.ttl_seconds,
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            hits: entry.hits,
            remaining_seconds: (entry.expires_at - now).num_seconds(),
        })
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        let hit_rate = if lookups == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(self.hits) * Decimal::ONE_HUNDRED / Decimal::from(lookups)).round_dp(2)
        };

        CacheStats {
            hits: self.hits,
            misses: self.misses,
            sets: self.sets,
            deletes: self.deletes,
            entries: self.len(),
            hit_rate,
        }
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.sets = 0;
        self.deletes = 0;
    }

    /// drop every expired entry, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let now = self.time.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let purged = before - self.entries.len();

        if purged > 0 {
            log::debug!("purged {} expired cache entries", purged);
        }
        purged
    }

    /// load many entries at once; nothing is stored unless every key is valid
    pub fn warm<I, K>(&mut self, entries: I, ttl_seconds: Option<i64>) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        validate_ttl(ttl_seconds.unwrap_or(self.default_ttl_seconds))?;

        let entries: Vec<(String, V)> = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for (key, _) in &entries {
            validate_key(key)?;
        }

        let count = entries.len();
        for (key, value) in entries {
            self.set(&key, value, ttl_seconds)?;
        }

        log::info!("warmed cache with {} entries", count);
        Ok(count)
    }

    /// live entries
    pub fn len(&self) -> usize {
        let now = self.time.now();
        self.entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(AmortizationError::InvalidCacheKey {
            message: "cache key must not be empty".to_string(),
        });
    }
    Ok(())
}

fn validate_ttl(ttl_seconds: i64) -> Result<Duration> {
    if ttl_seconds <= 0 {
        return Err(AmortizationError::InvalidTtl { ttl: ttl_seconds });
    }
    Duration::try_seconds(ttl_seconds).ok_or(AmortizationError::InvalidTtl { ttl: ttl_seconds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hourglass_rs::TimeSource;
    use serde_json::json;

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    }

    #[test]
    fn test_set_and_get() {
        let time = test_time();
        let mut cache = CacheManager::new(&time);

        cache.set("loan_1", json!({"balance": "100.00"}), None).unwrap();
        assert_eq!(cache.get("loan_1"), Some(json!({"balance": "100.00"})));
        assert!(cache.has("loan_1"));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_hit_rate() {
        let time = test_time();
        let mut cache = CacheManager::new(&time);

        cache.set("a", json!(1), Some(60)).unwrap();
        cache.get("a");
        cache.get("a");
        cache.get("b");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hit_rate, Decimal::new(6667, 2));

        cache.reset_stats();
        assert_eq!(cache.stats().hit_rate, Decimal::ZERO);
    }

    #[test]
    fn test_expiry() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut cache = CacheManager::new(&time);

        cache.set("short", json!("x"), Some(1)).unwrap();
        cache.set("long", json!("y"), Some(3600)).unwrap();

        control.advance(Duration::seconds(2));

        assert!(!cache.has("short"));
        assert_eq!(cache.keys(), vec!["long".to_string()]);
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get("long"), Some(json!("y")));
    }

    #[test]
    fn test_purge_is_idempotent() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut cache = CacheManager::new(&time);

        cache.set("a", json!(1), Some(1)).unwrap();
        cache.set("b", json!(2), Some(1)).unwrap();
        cache.set("c", json!(3), Some(10)).unwrap();

        control.advance(Duration::seconds(2));
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalid_inputs() {
        let time = test_time();
        let mut cache = CacheManager::new(&time);

        let err = cache.set("", json!(1), None).unwrap_err();
        assert!(matches!(err, AmortizationError::InvalidCacheKey { .. }));

        let err = cache.set("k", json!(1), Some(0)).unwrap_err();
        assert!(matches!(err, AmortizationError::InvalidTtl { ttl: 0 }));

        let err = cache.set_default_ttl(-5).unwrap_err();
        assert!(err.is_invalid_argument());

        let err = cache.delete_by_pattern("(unclosed").unwrap_err();
        assert!(matches!(err, AmortizationError::InvalidPattern { .. }));
        assert_eq!(cache.stats().sets, 0);
    }

    #[test]
    fn test_delete_and_patterns() {
        let time = test_time();
        let mut cache = CacheManager::new(&time);

        cache.set("portfolio_report_1", json!(1), None).unwrap();
        cache.set("portfolio_risk_1", json!(2), None).unwrap();
        cache.set("scenario_standard_1", json!(3), None).unwrap();

        assert!(cache.delete("scenario_standard_1"));
        assert!(!cache.delete("scenario_standard_1"));

        assert_eq!(cache.delete_by_pattern("^portfolio_").unwrap(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().deletes, 3);

        cache.set("x", json!(0), None).unwrap();
        assert_eq!(cache.clear(), 1);
    }

    #[test]
    fn test_metadata() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut cache = CacheManager::new(&time);

        cache.set("k", json!(true), Some(100)).unwrap();
        cache.get("k");
        control.advance(Duration::seconds(40));

        let metadata = cache.metadata("k").unwrap();
        assert_eq!(metadata.ttl_seconds, 100);
        assert_eq!(metadata.hits, 1);
        assert_eq!(metadata.remaining_seconds, 60);
        assert_eq!(metadata.expires_at - metadata.created_at, Duration::seconds(100));
        assert!(cache.metadata("absent").is_none());
    }

    #[test]
    fn test_warm_is_all_or_nothing() {
        let time = test_time();
        let mut cache: CacheManager<'_, i32> = CacheManager::new(&time);

        assert_eq!(cache.warm([("a", 1), ("b", 2)], Some(60)).unwrap(), 2);
        assert_eq!(cache.len(), 2);

        let err = cache.warm([("c", 3), (" ", 4)], None).unwrap_err();
        assert!(matches!(err, AmortizationError::InvalidCacheKey { .. }));
        assert!(!cache.has("c"));
    }

    #[test]
    fn test_default_ttl_and_get_or_insert() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut cache: CacheManager<'_, String> = CacheManager::with_config(&time, &CacheConfig { default_ttl_seconds: 5 });

        let value = cache.get_or_insert_with("k", None, || Ok("computed".to_string())).unwrap();
        assert_eq!(value, "computed");
        let value = cache.get_or_insert_with("k", None, || Ok("recomputed".to_string())).unwrap();
        assert_eq!(value, "computed");

        control.advance(Duration::seconds(5));
        assert!(!cache.has("k"));

        cache.set_default_ttl(60).unwrap();
        assert_eq!(cache.default_ttl(), 60);
    }
}
