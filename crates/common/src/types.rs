//! Domain types shared across skywash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest PM2.5 concentration (µg/m³) accepted as a real measurement.
/// Anything above is treated as a sensor or feed glitch.
pub const MAX_PLAUSIBLE_PM25: f64 = 1000.0;

// ── City catalog ──────────────────────────────────────────────────────

/// A city in the registry. Loaded once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    /// Display name, also the unique registry key.
    #[serde(alias = "city")]
    pub name: String,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
    /// Region tag used by the client for filtering (e.g. "South Asia").
    pub region: String,
    /// Approximate metro population.
    #[serde(default)]
    pub population: u64,
    /// PM2.5 reported when no live reading is available.
    #[serde(alias = "pm25", alias = "baseline")]
    pub baseline_pm25: f64,
    /// Upstream station slug; derived from `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
}

impl CityRecord {
    /// Station identifier sent to the upstream feed.
    ///
    /// "Ho Chi Minh City" becomes `ho-chi-minh-city` unless an explicit
    /// station is configured.
    pub fn station_slug(&self) -> String {
        match self.station.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => self
                .name
                .trim()
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-"),
        }
    }
}

// ── Cached readings ───────────────────────────────────────────────────

/// Where a reading's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    RealTime,
    Static,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::RealTime => "real_time",
            DataSource::Static => "static",
        }
    }
}

/// Latest known PM2.5 for one city.
///
/// A `RealTime` reading always has `fetched_at`; a `Static` one never does.
/// Build through [`CachedReading::real_time`] / [`CachedReading::baseline`]
/// to keep that true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedReading {
    pub city: String,
    pub pm25: f64,
    pub source: DataSource,
    /// When the successful fetch behind this value was dispatched.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Observation time reported by the upstream station.
    pub observed_at: Option<DateTime<Utc>>,
    /// Failed fetches since the last success.
    pub failure_count: u32,
}

impl CachedReading {
    /// A static reading carrying the registry baseline.
    pub fn baseline(city: &CityRecord, failure_count: u32) -> Self {
        Self {
            city: city.name.clone(),
            pm25: city.baseline_pm25,
            source: DataSource::Static,
            fetched_at: None,
            observed_at: None,
            failure_count,
        }
    }

    /// A live reading with a zeroed failure count.
    pub fn real_time(
        city: &str,
        pm25: f64,
        fetched_at: DateTime<Utc>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            city: city.to_string(),
            pm25,
            source: DataSource::RealTime,
            fetched_at: Some(fetched_at),
            observed_at: Some(observed_at),
            failure_count: 0,
        }
    }

    pub fn is_real_time(&self) -> bool {
        self.source == DataSource::RealTime
    }
}

// ── Upstream fetch outcome ────────────────────────────────────────────

/// Result of a single upstream query, normalised so the orchestrator can
/// apply one fallback rule to every failure shape.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success {
        pm25: f64,
        observed_at: DateTime<Utc>,
    },
    /// Upstream answered but the payload failed validation.
    Invalid { reason: String },
    /// Network error, non-2xx, rate limit, or timeout.
    Unavailable { reason: String },
}

impl FetchOutcome {
    /// `Success` if `pm25` passes [`validate_pm25`], otherwise `Invalid`.
    pub fn from_value(pm25: f64, observed_at: DateTime<Utc>) -> Self {
        match validate_pm25(pm25) {
            Ok(v) => FetchOutcome::Success {
                pm25: v,
                observed_at,
            },
            Err(reason) => FetchOutcome::Invalid { reason },
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        FetchOutcome::Invalid {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        FetchOutcome::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchOutcome::Success { .. } => "success",
            FetchOutcome::Invalid { .. } => "invalid",
            FetchOutcome::Unavailable { .. } => "unavailable",
        }
    }
}

/// Accept a PM2.5 value only if it is finite, > 0 and plausible.
pub fn validate_pm25(value: f64) -> Result<f64, String> {
    if !value.is_finite() {
        return Err(format!("pm25 is not finite: {value}"));
    }
    if value <= 0.0 {
        return Err(format!("pm25 must be > 0, got {value}"));
    }
    if value > MAX_PLAUSIBLE_PM25 {
        return Err(format!(
            "pm25 {value} exceeds plausible maximum {MAX_PLAUSIBLE_PM25}"
        ));
    }
    Ok(value)
}
