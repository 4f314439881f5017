//! WAQI (World Air Quality Index) feed client.
//!
//! Issues one `GET {base}/{station}/?token=…` per call and folds every
//! response shape into a [`FetchOutcome`]. No retries happen here; the
//! refresh orchestrator decides when a city is tried again.

pub mod rate_limit;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CityRecord, FetchOutcome};
use serde::Deserialize;
use tracing::{debug, warn};

pub use rate_limit::RateLimiter;

/// Anything that can produce a single PM2.5 reading for a city.
///
/// Implementations must not retry and must not panic; every failure is
/// reported as `Invalid` or `Unavailable`.
#[async_trait]
pub trait AirQualitySource: Send + Sync {
    async fn fetch(&self, city: &CityRecord) -> FetchOutcome;
}

/// WAQI HTTP client with connection pooling and a shared rate limiter.
#[derive(Debug, Clone)]
pub struct WaqiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    limiter: RateLimiter,
}

// ── WAQI response types ───────────────────────────────────────────────

/// Envelope of `/feed/{station}/`. On error `data` is a bare message
/// string, so it is kept untyped until `status` is known.
#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    pub status: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct FeedData {
    #[serde(default)]
    pub iaqi: Option<Iaqi>,
    #[serde(default)]
    pub time: Option<FeedTime>,
}

/// Individual pollutant readings.
#[derive(Debug, Deserialize)]
pub struct Iaqi {
    #[serde(default)]
    pub pm25: Option<IaqiValue>,
}

#[derive(Debug, Deserialize)]
pub struct IaqiValue {
    /// Usually a number; some stations send strings such as "-".
    pub v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct FeedTime {
    #[serde(default)]
    pub iso: Option<String>,
    /// Epoch seconds.
    #[serde(default)]
    pub v: Option<i64>,
}

// ── Implementation ────────────────────────────────────────────────────

impl WaqiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
        limiter: RateLimiter,
    ) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("skywash/0.1 (air quality dashboard)")
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .expect("failed to build WAQI HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            limiter,
        }
    }

    /// Build from the service config.
    pub fn from_config(cfg: &common::SkywashConfig) -> Self {
        Self::new(
            cfg.waqi_base_url.clone(),
            cfg.waqi_api_token.clone(),
            Duration::from_secs(cfg.refresh.fetch_timeout_secs),
            RateLimiter::per_second(cfg.rate_limit.requests_per_sec),
        )
    }

    fn feed_url(&self, city: &CityRecord) -> String {
        format!(
            "{}/{}/",
            self.base_url.trim_end_matches('/'),
            city.station_slug()
        )
    }

    /// Fetch the current PM2.5 for one city.
    pub async fn fetch_pm25(&self, city: &CityRecord) -> FetchOutcome {
        self.limiter.wait().await;

        let url = self.feed_url(city);
        debug!("Fetching WAQI feed for {}: {}", city.name, url);

        let resp = match self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return transport_failure(&city.name, &e),
        };

        let status = resp.status().as_u16();
        if status == 429 {
            warn!("WAQI rate limited request for {}", city.name);
            return FetchOutcome::unavailable("rate limited");
        }
        if !resp.status().is_success() {
            return FetchOutcome::unavailable(format!("HTTP {status}"));
        }

        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return transport_failure(&city.name, &e),
        };

        let outcome = parse_feed(&body, Utc::now());
        debug!("WAQI {} for {}: {:?}", outcome.kind(), city.name, outcome);
        outcome
    }
}

#[async_trait]
impl AirQualitySource for WaqiClient {
    async fn fetch(&self, city: &CityRecord) -> FetchOutcome {
        self.fetch_pm25(city).await
    }
}

fn transport_failure(city: &str, e: &reqwest::Error) -> FetchOutcome {
    if e.is_timeout() {
        FetchOutcome::unavailable("timeout")
    } else {
        FetchOutcome::unavailable(format!("HTTP error for {city}: {e}"))
    }
}

/// Normalise a raw feed body. `now` stands in for a missing observation time.
pub fn parse_feed(body: &str, now: DateTime<Utc>) -> FetchOutcome {
    let envelope: FeedResponse = match serde_json::from_str(body) {
        Ok(e) => e,
        Err(e) => return FetchOutcome::invalid(format!("malformed payload: {e}")),
    };

    if envelope.status != "ok" {
        let message = envelope
            .data
            .as_str()
            .unwrap_or(envelope.status.as_str())
            .to_string();
        if message.to_ascii_lowercase().contains("quota") {
            return FetchOutcome::unavailable(format!("rate limited: {message}"));
        }
        return FetchOutcome::invalid(message);
    }

    let data: FeedData = match serde_json::from_value(envelope.data) {
        Ok(d) => d,
        Err(e) => return FetchOutcome::invalid(format!("malformed data block: {e}")),
    };

    let Some(raw) = data.iaqi.and_then(|i| i.pm25).map(|p| p.v) else {
        return FetchOutcome::invalid("no pm25 reading");
    };

    let value = match &raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(value) = value else {
        return FetchOutcome::invalid(format!("non-numeric pm25: {raw}"));
    };

    let observed_at = data
        .time
        .as_ref()
        .and_then(observation_time)
        .unwrap_or(now);

    FetchOutcome::from_value(value, observed_at)
}

fn observation_time(time: &FeedTime) -> Option<DateTime<Utc>> {
    if let Some(iso) = time.iso.as_deref() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(iso) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    time.v.and_then(|secs| DateTime::from_timestamp(secs, 0))
}
