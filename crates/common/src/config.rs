//! Service configuration types.

use serde::{Deserialize, Serialize};

use crate::types::CityRecord;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkywashConfig {
    /// WAQI API token. The public "demo" token only serves a few stations.
    #[serde(default = "default_token")]
    pub waqi_api_token: String,

    /// Base URL of the WAQI city feed endpoint.
    #[serde(default = "default_base_url")]
    pub waqi_base_url: String,

    /// Optional JSON city catalog replacing `cities`.
    #[serde(default)]
    pub cities_path: Option<String>,

    /// City catalog.
    #[serde(default = "default_cities")]
    pub cities: Vec<CityRecord>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub washout: WashoutConfig,
}

/// Freshness cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// A real-time reading older than this is refetched on the next pass.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

/// Refresh fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Max upstream requests in flight per refresh pass.
    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,

    /// Per-request timeout.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Overall deadline for one pass; 0 disables it.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Interval between ambient (scheduled) passes.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

/// Upstream request budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_sec")]
    pub requests_per_sec: u32,
}

/// Washout model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WashoutConfig {
    /// Scavenging coefficient, per mm of rain.
    #[serde(default = "default_coefficient")]
    pub coefficient: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────

pub const DEFAULT_WASHOUT_COEFFICIENT: f64 = 0.08;

fn default_token() -> String {
    "demo".into()
}
fn default_base_url() -> String {
    "https://api.waqi.info/feed".into()
}

fn default_ttl() -> u64 {
    3600
}

fn default_concurrency() -> usize {
    8
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_deadline() -> u64 {
    60
}
fn default_interval() -> u64 {
    300
}

fn default_requests_per_sec() -> u32 {
    5
}

fn default_coefficient() -> f64 {
    DEFAULT_WASHOUT_COEFFICIENT
}

fn city(
    name: &str,
    latitude: f64,
    longitude: f64,
    region: &str,
    population: u64,
    baseline_pm25: f64,
) -> CityRecord {
    CityRecord {
        name: name.into(),
        latitude,
        longitude,
        region: region.into(),
        population,
        baseline_pm25,
        station: None,
    }
}

/// Built-in catalog, baselines are rough annual PM2.5 means (µg/m³).
pub fn default_cities() -> Vec<CityRecord> {
    vec![
        // North America
        city("New York City", 40.7128, -74.0060, "North America", 19_500_000, 8.9),
        city("Los Angeles", 34.0522, -118.2437, "North America", 12_500_000, 12.3),
        city("Chicago", 41.8781, -87.6298, "North America", 8_900_000, 9.7),
        city("Houston", 29.7604, -95.3698, "North America", 7_300_000, 10.1),
        city("Toronto", 43.6532, -79.3832, "North America", 6_400_000, 7.4),
        city("Dallas", 32.7767, -96.7970, "North America", 7_900_000, 9.0),
        city("Mexico City", 19.4326, -99.1332, "North America", 21_800_000, 20.5),
        // Western Europe
        city("London", 51.5074, -0.1278, "Western Europe", 9_600_000, 9.8),
        city("Paris", 48.8566, 2.3522, "Western Europe", 11_100_000, 11.2),
        city("Berlin", 52.5200, 13.4050, "Western Europe", 3_700_000, 10.5),
        city("Madrid", 40.4168, -3.7038, "Western Europe", 6_700_000, 8.6),
        city("Rome", 41.9028, 12.4964, "Western Europe", 4_300_000, 12.9),
        city("Barcelona", 41.3874, 2.1686, "Western Europe", 5_600_000, 13.3),
        city("Amsterdam", 52.3676, 4.9041, "Western Europe", 1_200_000, 9.2),
        city("Munich", 48.1351, 11.5820, "Western Europe", 1_500_000, 9.9),
        // Eastern Europe
        city("Moscow", 55.7558, 37.6173, "Eastern Europe", 12_600_000, 12.4),
        city("Saint Petersburg", 59.9311, 30.3609, "Eastern Europe", 5_400_000, 10.7),
        city("Warsaw", 52.2297, 21.0122, "Eastern Europe", 1_800_000, 16.8),
        city("Kyiv", 50.4501, 30.5234, "Eastern Europe", 3_000_000, 14.9),
        city("Budapest", 47.4979, 19.0402, "Eastern Europe", 1_700_000, 15.5),
        city("Bucharest", 44.4268, 26.1025, "Eastern Europe", 1_800_000, 17.6),
        city("Prague", 50.0755, 14.4378, "Eastern Europe", 1_300_000, 14.2),
        // Middle East
        city("Istanbul", 41.0082, 28.9784, "Middle East", 15_600_000, 20.1),
        city("Tehran", 35.6892, 51.3890, "Middle East", 9_400_000, 29.8),
        city("Baghdad", 33.3152, 44.3661, "Middle East", 7_700_000, 49.7),
        city("Riyadh", 24.7136, 46.6753, "Middle East", 7_700_000, 45.3),
        city("Dubai", 25.2048, 55.2708, "Middle East", 3_600_000, 35.1),
        city("Cairo", 30.0444, 31.2357, "Middle East", 21_300_000, 63.4),
        // South Asia
        city("Delhi", 28.6139, 77.2090, "South Asia", 32_900_000, 98.6),
        city("Lahore", 31.5204, 74.3587, "South Asia", 13_500_000, 97.4),
        city("Mumbai", 19.0760, 72.8777, "South Asia", 21_300_000, 42.3),
        city("Karachi", 24.8607, 67.0011, "South Asia", 17_200_000, 54.7),
        city("Dhaka", 23.8103, 90.4125, "South Asia", 23_200_000, 80.2),
        city("Bangalore", 12.9716, 77.5946, "South Asia", 13_600_000, 28.6),
        city("Kolkata", 22.5726, 88.3639, "South Asia", 15_100_000, 47.9),
        city("Chennai", 13.0827, 80.2707, "South Asia", 11_800_000, 27.5),
        // Southeast Asia
        city("Jakarta", -6.2088, 106.8456, "Southeast Asia", 11_200_000, 43.8),
        city("Manila", 14.5995, 120.9842, "Southeast Asia", 14_700_000, 15.3),
        city("Bangkok", 13.7563, 100.5018, "Southeast Asia", 11_200_000, 21.7),
        city("Ho Chi Minh City", 10.8231, 106.6297, "Southeast Asia", 9_300_000, 23.9),
        city("Kuala Lumpur", 3.1390, 101.6869, "Southeast Asia", 8_600_000, 19.6),
        city("Singapore", 1.3521, 103.8198, "Southeast Asia", 5_900_000, 13.1),
        city("Hanoi", 21.0278, 105.8342, "Southeast Asia", 5_300_000, 40.1),
        // East Asia
        city("Beijing", 39.9042, 116.4074, "East Asia", 21_700_000, 32.6),
        city("Shanghai", 31.2304, 121.4737, "East Asia", 29_200_000, 28.4),
        city("Guangzhou", 23.1291, 113.2644, "East Asia", 14_000_000, 24.2),
        city("Shenzhen", 22.5431, 114.0579, "East Asia", 12_800_000, 18.9),
        city("Seoul", 37.5665, 126.9780, "East Asia", 9_900_000, 18.5),
        city("Tokyo", 35.6762, 139.6503, "East Asia", 37_200_000, 9.4),
        city("Osaka", 34.6937, 135.5023, "East Asia", 19_000_000, 10.6),
        // Oceania
        city("Sydney", -33.8688, 151.2093, "Oceania", 5_300_000, 6.8),
        city("Melbourne", -37.8136, 144.9631, "Oceania", 5_100_000, 6.2),
        city("Brisbane", -27.4698, 153.0251, "Oceania", 2_600_000, 5.9),
        city("Auckland", -36.8485, 174.7633, "Oceania", 1_700_000, 5.5),
        // South America
        city("Sao Paulo", -23.5505, -46.6333, "South America", 22_400_000, 16.2),
        city("Rio de Janeiro", -22.9068, -43.1729, "South America", 13_600_000, 13.4),
        city("Buenos Aires", -34.6037, -58.3816, "South America", 15_400_000, 14.1),
        city("Lima", -12.0464, -77.0428, "South America", 10_900_000, 26.6),
        city("Bogota", 4.7110, -74.0721, "South America", 11_300_000, 15.0),
        city("Santiago", -33.4489, -70.6693, "South America", 6_900_000, 22.1),
        city("Caracas", 10.4806, -66.9036, "South America", 2_900_000, 18.3),
        // Africa
        city("Lagos", 6.5244, 3.3792, "Africa", 15_900_000, 53.8),
        city("Nairobi", -1.2921, 36.8219, "Africa", 5_100_000, 17.9),
        city("Johannesburg", -26.2041, 28.0473, "Africa", 6_200_000, 24.7),
    ]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            deadline_secs: default_deadline(),
            interval_secs: default_interval(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_sec: default_requests_per_sec(),
        }
    }
}

impl Default for WashoutConfig {
    fn default() -> Self {
        Self {
            coefficient: default_coefficient(),
        }
    }
}

impl Default for SkywashConfig {
    fn default() -> Self {
        Self {
            waqi_api_token: default_token(),
            waqi_base_url: default_base_url(),
            cities_path: None,
            cities: default_cities(),
            cache: CacheConfig::default(),
            refresh: RefreshConfig::default(),
            rate_limit: RateLimitConfig::default(),
            washout: WashoutConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_catalog_names_unique() {
        let cities = default_cities();
        let names: HashSet<_> = cities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), cities.len());
        assert!(cities.iter().all(|c| c.baseline_pm25 > 0.0));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: SkywashConfig = parse(r#"{"cache": {"ttl_secs": 60}}"#);
        assert_eq!(cfg.cache.ttl_secs, 60);
        assert_eq!(cfg.refresh.concurrency_limit, 8);
        assert!((cfg.washout.coefficient - 0.08).abs() < 1e-12);
        assert_eq!(cfg.waqi_api_token, "demo");
        assert!(!cfg.cities.is_empty());
    }

    fn parse(raw: &str) -> SkywashConfig {
        serde_json::from_str(raw).expect("config should parse")
    }
}
