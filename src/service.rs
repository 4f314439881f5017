//! Inbound interface consumed by the view layer.
//!
//! Wires the registry, freshness cache, refresh orchestrator and washout
//! model together. Simulation results are returned to the caller only and
//! never written back into the cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{
    CachedReading, CityRecord, DataSource, Error, Result, SkywashConfig, MAX_PLAUSIBLE_PM25,
};
use freshness::{
    CityRegistry, FreshnessCache, RefreshMode, RefreshOptions, RefreshOrchestrator, RefreshReport,
};
use serde::{Deserialize, Serialize};
use waqi_client::{AirQualitySource, WaqiClient};
use washout::WashoutModel;

/// Highest accepted rain intensity, mm/h.
pub const MAX_RAIN_MM_PER_H: f64 = 1000.0;
/// Longest accepted simulation, hours (one week).
pub const MAX_DURATION_H: f64 = 168.0;

/// One city as presented to the client.
#[derive(Debug, Clone, Serialize)]
pub struct CityReading {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub region: String,
    pub population: u64,
    /// Current value, rounded to 0.1 µg/m³.
    pub pm25: f64,
    pub baseline_pm25: f64,
    pub data_source: DataSource,
    /// Time of the last successful fetch; absent for static readings.
    pub last_updated: Option<DateTime<Utc>>,
    pub observed_at: Option<DateTime<Utc>>,
    pub failure_count: u32,
    /// Whether the reading is still inside the cache TTL.
    pub fresh: bool,
}

impl CityReading {
    fn new(record: &CityRecord, reading: CachedReading, fresh: bool) -> Self {
        Self {
            city: record.name.clone(),
            lat: record.latitude,
            lon: record.longitude,
            region: record.region.clone(),
            population: record.population,
            pm25: round1(reading.pm25),
            baseline_pm25: record.baseline_pm25,
            data_source: reading.source,
            last_updated: reading.fetched_at,
            observed_at: reading.observed_at,
            failure_count: reading.failure_count,
            fresh,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WashoutRequest {
    pub pm25: f64,
    pub rain_mm_per_h: f64,
    pub duration_h: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WashoutResult {
    pub initial: f64,
    /// Total rain over the event, mm.
    pub rainfall_mm: f64,
    /// Post-rain PM2.5, rounded to 0.1 µg/m³.
    #[serde(rename = "final")]
    pub final_pm25: f64,
    pub washout_coefficient: f64,
}

pub struct AirQualityService {
    registry: Arc<CityRegistry>,
    cache: Arc<FreshnessCache>,
    orchestrator: RefreshOrchestrator,
    washout: WashoutModel,
}

impl AirQualityService {
    pub fn new(
        registry: Arc<CityRegistry>,
        source: Arc<dyn AirQualitySource>,
        options: RefreshOptions,
        washout: WashoutModel,
    ) -> Self {
        let cache = Arc::new(FreshnessCache::new(registry.clone()));
        let orchestrator = RefreshOrchestrator::new(source, cache.clone(), options);
        Self {
            registry,
            cache,
            orchestrator,
            washout,
        }
    }

    /// Wire the service against the live WAQI feed.
    pub fn from_config(cfg: &SkywashConfig) -> Result<Self> {
        let registry = Arc::new(crate::config::load_registry(cfg)?);
        let source: Arc<dyn AirQualitySource> = Arc::new(WaqiClient::from_config(cfg));
        let washout = WashoutModel::new(cfg.washout.coefficient)?;
        Ok(Self::new(
            registry,
            source,
            RefreshOptions::from_config(cfg),
            washout,
        ))
    }

    pub fn registry(&self) -> &Arc<CityRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &RefreshOrchestrator {
        &self.orchestrator
    }

    /// Current readings for every city. Never blocks on the network.
    pub fn list_readings(&self) -> Vec<CityReading> {
        let ttl = self.orchestrator.options().ttl;
        let now = Utc::now();
        self.registry
            .list_cities()
            .iter()
            .zip(self.cache.snapshot())
            .map(|(record, reading)| {
                let fresh = self.cache.is_fresh_at(&record.name, ttl, now);
                CityReading::new(record, reading, fresh)
            })
            .collect()
    }

    pub fn reading(&self, city: &str) -> Result<CityReading> {
        let record = self.registry.get(city)?;
        let reading = self.cache.read(city)?;
        let fresh = self.cache.is_fresh(city, self.orchestrator.options().ttl);
        Ok(CityReading::new(record, reading, fresh))
    }

    /// Refresh every city regardless of TTL.
    pub async fn refresh_now(&self) -> RefreshReport {
        self.orchestrator.refresh_all(RefreshMode::Forced).await
    }

    /// Refresh only cities past their TTL.
    pub async fn refresh_stale(&self) -> RefreshReport {
        self.orchestrator.refresh_all(RefreshMode::Scheduled).await
    }

    pub fn simulate_washout(&self, request: &WashoutRequest) -> Result<WashoutResult> {
        check_request_bounds(request)?;
        let remaining =
            self.washout
                .simulate(request.pm25, request.rain_mm_per_h, request.duration_h)?;
        Ok(WashoutResult {
            initial: request.pm25,
            rainfall_mm: request.rain_mm_per_h * request.duration_h,
            final_pm25: round1(remaining),
            washout_coefficient: self.washout.coefficient(),
        })
    }

    /// Simulate starting from the city's current reading.
    pub fn simulate_for_city(
        &self,
        city: &str,
        rain_mm_per_h: f64,
        duration_h: f64,
    ) -> Result<WashoutResult> {
        let reading = self.cache.read(city)?;
        self.simulate_washout(&WashoutRequest {
            pm25: reading.pm25,
            rain_mm_per_h,
            duration_h,
        })
    }
}

fn check_request_bounds(request: &WashoutRequest) -> Result<()> {
    if request.pm25 > MAX_PLAUSIBLE_PM25 {
        return Err(Error::InvalidInput(format!(
            "pm25 must be at most {MAX_PLAUSIBLE_PM25} µg/m³"
        )));
    }
    if request.rain_mm_per_h > MAX_RAIN_MM_PER_H {
        return Err(Error::InvalidInput(format!(
            "rain intensity must be at most {MAX_RAIN_MM_PER_H} mm/h"
        )));
    }
    if request.duration_h > MAX_DURATION_H {
        return Err(Error::InvalidInput(format!(
            "duration must be at most {MAX_DURATION_H} hours"
        )));
    }
    Ok(())
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::config::default_cities;
    use common::FetchOutcome;

    /// Live for Delhi and London, down for everyone else.
    struct TwoCitySource;

    #[async_trait]
    impl AirQualitySource for TwoCitySource {
        async fn fetch(&self, city: &CityRecord) -> FetchOutcome {
            match city.name.as_str() {
                "Delhi" => FetchOutcome::from_value(153.27, Utc::now()),
                "London" => FetchOutcome::from_value(7.0, Utc::now()),
                _ => FetchOutcome::unavailable("HTTP 503"),
            }
        }
    }

    fn service() -> AirQualityService {
        let registry = Arc::new(CityRegistry::new(default_cities()).expect("catalog"));
        AirQualityService::new(
            registry,
            Arc::new(TwoCitySource),
            RefreshOptions::default(),
            WashoutModel::default(),
        )
    }

    #[test]
    fn test_readings_before_any_refresh_are_static() {
        let svc = service();
        let readings = svc.list_readings();
        assert_eq!(readings.len(), default_cities().len());
        assert!(readings
            .iter()
            .all(|r| r.data_source == DataSource::Static && r.last_updated.is_none() && !r.fresh));
        assert!(readings.iter().all(|r| (r.pm25 - r.baseline_pm25).abs() < 0.05));
    }

    #[tokio::test]
    async fn test_refresh_now_mixes_live_and_static() {
        let svc = service();
        let report = svc.refresh_now().await;

        assert_eq!(report.refreshed, 2);
        assert_eq!(report.real_time_sources, 2);
        assert_eq!(report.static_sources, default_cities().len() - 2);

        let delhi = svc.reading("Delhi").expect("known city");
        assert_eq!(delhi.data_source, DataSource::RealTime);
        assert!((delhi.pm25 - 153.3).abs() < 1e-9);
        assert!(delhi.fresh);
        assert!(delhi.last_updated.is_some());

        let paris = svc.reading("Paris").expect("known city");
        assert_eq!(paris.data_source, DataSource::Static);
        assert_eq!(paris.failure_count, 1);
    }

    #[tokio::test]
    async fn test_simulate_for_city_does_not_touch_cache() {
        let svc = service();
        svc.refresh_now().await;

        let result = svc.simulate_for_city("Delhi", 10.0, 2.0).expect("valid");
        assert!((result.initial - 153.27).abs() < 1e-9);
        assert!((result.rainfall_mm - 20.0).abs() < 1e-9);
        assert!((result.final_pm25 - 30.9).abs() < 1e-9);

        let delhi = svc.reading("Delhi").expect("known city");
        assert!((delhi.pm25 - 153.3).abs() < 1e-9);
    }

    #[test]
    fn test_simulate_reference_and_errors() {
        let svc = service();
        let ok = svc
            .simulate_washout(&WashoutRequest {
                pm25: 100.0,
                rain_mm_per_h: 10.0,
                duration_h: 2.0,
            })
            .expect("valid");
        assert!((ok.final_pm25 - 20.2).abs() < 1e-9);
        assert!((ok.washout_coefficient - 0.08).abs() < 1e-12);

        for (pm25, rain, hours) in [
            (0.0, 10.0, 2.0),
            (100.0, -5.0, 2.0),
            (100.0, 10.0, 0.0),
            (1500.0, 10.0, 2.0),
            (100.0, 10.0, 200.0),
        ] {
            let err = svc
                .simulate_washout(&WashoutRequest {
                    pm25,
                    rain_mm_per_h: rain,
                    duration_h: hours,
                })
                .expect_err("out of domain");
            assert!(matches!(err, Error::InvalidInput(_)));
        }

        assert!(matches!(
            svc.simulate_for_city("Atlantis", 1.0, 1.0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_washout_result_json_shape() {
        let result = WashoutResult {
            initial: 50.0,
            rainfall_mm: 4.0,
            final_pm25: 36.3,
            washout_coefficient: 0.08,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["final"], 36.3);
        assert!(json.get("final_pm25").is_none());
    }
}
