//! In-memory freshness cache for per-city PM2.5 readings.
//!
//! Uses `DashMap` so readers and the per-city writer only contend on the
//! shard holding that city, never on the whole cache. Entries are created
//! lazily by the first write and live for the process lifetime.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{validate_pm25, CachedReading, CityRecord, FetchOutcome, Result};
use dashmap::{DashMap, DashSet};
use tracing::{debug, warn};

use crate::registry::CityRegistry;

/// What a single `write` did to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEffect {
    /// Replaced with a new real-time value.
    Refreshed,
    /// Fetch failed; the previous real-time value was kept.
    KeptStale,
    /// Fetch failed with nothing real-time to fall back on; entry is static.
    FellBackToStatic,
    /// Outcome came from a fetch dispatched before the stored one; ignored.
    Superseded,
}

/// Thread-safe reading cache keyed by city name.
#[derive(Debug)]
pub struct FreshnessCache {
    registry: Arc<CityRegistry>,
    readings: DashMap<String, CachedReading>,
    in_flight: Arc<DashSet<String>>,
}

/// Exclusive right to refresh one city. Released on drop.
///
/// Owns its handle on the in-flight set, so it can move into a spawned
/// task together with the fetch it guards.
#[derive(Debug)]
pub struct RefreshClaim {
    in_flight: Arc<DashSet<String>>,
    city: String,
}

impl RefreshClaim {
    pub fn city(&self) -> &str {
        &self.city
    }
}

impl Drop for RefreshClaim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.city);
    }
}

impl FreshnessCache {
    pub fn new(registry: Arc<CityRegistry>) -> Self {
        Self {
            readings: DashMap::with_capacity(registry.len()),
            in_flight: Arc::new(DashSet::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<CityRegistry> {
        &self.registry
    }

    /// Current reading for `city`. Never touches the network: a city that
    /// has never been written reads as its static baseline.
    pub fn read(&self, city: &str) -> Result<CachedReading> {
        let record = self.registry.get(city)?;
        Ok(self.read_record(record))
    }

    fn read_record(&self, record: &CityRecord) -> CachedReading {
        match self.readings.get(&record.name) {
            Some(entry) => entry.value().clone(),
            None => CachedReading::baseline(record, 0),
        }
    }

    /// Readings for every registry city, in catalog order.
    pub fn snapshot(&self) -> Vec<CachedReading> {
        self.registry
            .list_cities()
            .iter()
            .map(|c| self.read_record(c))
            .collect()
    }

    /// True iff the city has a real-time reading younger than `ttl`.
    pub fn is_fresh(&self, city: &str, ttl: Duration) -> bool {
        self.is_fresh_at(city, ttl, Utc::now())
    }

    pub fn is_fresh_at(&self, city: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.readings.get(city) else {
            return false;
        };
        if !entry.is_real_time() {
            return false;
        }
        match entry.fetched_at {
            // A timestamp ahead of `now` (clock skew) counts as age zero.
            Some(fetched_at) => match (now - fetched_at).to_std() {
                Ok(age) => age < ttl,
                Err(_) => true,
            },
            None => false,
        }
    }

    /// Claim the right to refresh `city`. `None` if a refresh for it is
    /// already in flight.
    pub fn try_claim(&self, city: &str) -> Option<RefreshClaim> {
        if self.in_flight.insert(city.to_string()) {
            Some(RefreshClaim {
                in_flight: self.in_flight.clone(),
                city: city.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_refreshing(&self, city: &str) -> bool {
        self.in_flight.contains(city)
    }

    /// Apply a fetch outcome dispatched at `dispatched_at`.
    ///
    /// The update happens under the city's shard lock, so readers see
    /// either the old or the new reading, never a mix.
    pub fn write(
        &self,
        city: &str,
        outcome: &FetchOutcome,
        dispatched_at: DateTime<Utc>,
    ) -> Result<WriteEffect> {
        let record = self.registry.get(city)?;
        let mut entry = self
            .readings
            .entry(record.name.clone())
            .or_insert_with(|| CachedReading::baseline(record, 0));

        if let Some(stored) = entry.fetched_at {
            if stored > dispatched_at {
                debug!(
                    "{}: dropping {} outcome from {} (stored reading is from {})",
                    record.name,
                    outcome.kind(),
                    dispatched_at,
                    stored
                );
                return Ok(WriteEffect::Superseded);
            }
        }

        let reason = match outcome {
            FetchOutcome::Success { pm25, observed_at } => match validate_pm25(*pm25) {
                Ok(value) => {
                    *entry =
                        CachedReading::real_time(&record.name, value, dispatched_at, *observed_at);
                    return Ok(WriteEffect::Refreshed);
                }
                Err(reason) => reason,
            },
            FetchOutcome::Invalid { reason } | FetchOutcome::Unavailable { reason } => {
                reason.clone()
            }
        };

        let failures = entry.failure_count.saturating_add(1);
        if entry.is_real_time() {
            entry.failure_count = failures;
            warn!(
                "{}: fetch failed ({}), keeping last real-time value {:.1} [failures={}]",
                record.name, reason, entry.pm25, failures
            );
            Ok(WriteEffect::KeptStale)
        } else {
            *entry = CachedReading::baseline(record, failures);
            warn!(
                "{}: fetch failed ({}), using static baseline {:.1} [failures={}]",
                record.name, reason, record.baseline_pm25, failures
            );
            Ok(WriteEffect::FellBackToStatic)
        }
    }
}
