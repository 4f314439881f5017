//! Refresh orchestrator: bounded fan-out of upstream fetches into the cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{CityRecord, DataSource, FetchOutcome, SkywashConfig};
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};
use waqi_client::AirQualitySource;

use crate::cache::{FreshnessCache, RefreshClaim, WriteEffect};

/// Which cities a pass considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Only cities whose reading is past its TTL.
    Scheduled,
    /// Every city, ignoring TTL.
    Forced,
}

/// Knobs for a single refresh pass.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub ttl: Duration,
    /// Max upstream fetches in flight at once. Zero is treated as one.
    pub concurrency_limit: usize,
    pub fetch_timeout: Duration,
    /// Overall deadline for the pass.
    pub deadline: Option<Duration>,
}

impl RefreshOptions {
    pub fn from_config(cfg: &SkywashConfig) -> Self {
        Self {
            ttl: Duration::from_secs(cfg.cache.ttl_secs),
            concurrency_limit: cfg.refresh.concurrency_limit,
            fetch_timeout: Duration::from_secs(cfg.refresh.fetch_timeout_secs),
            deadline: match cfg.refresh.deadline_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self::from_config(&SkywashConfig::default())
    }
}

/// Summary of one pass. For observability only; failures are already
/// absorbed by the cache.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub mode: RefreshMode,
    /// Fetches that produced a new real-time reading.
    pub refreshed: usize,
    /// Fetches that came back `Invalid` or `Unavailable`.
    pub failed: usize,
    /// Failed cities now serving their static baseline.
    pub fell_back_to_static: usize,
    /// Outcomes dropped because a newer reading was already stored.
    pub superseded: usize,
    pub skipped_fresh: usize,
    /// Cities another pass was already refreshing.
    pub skipped_in_flight: usize,
    /// Dispatched or queued fetches cut off by the deadline.
    pub abandoned: usize,
    pub total_cities: usize,
    pub real_time_sources: usize,
    pub static_sources: usize,
    pub completed_at: DateTime<Utc>,
}

impl RefreshReport {
    fn new(mode: RefreshMode) -> Self {
        Self {
            mode,
            refreshed: 0,
            failed: 0,
            fell_back_to_static: 0,
            superseded: 0,
            skipped_fresh: 0,
            skipped_in_flight: 0,
            abandoned: 0,
            total_cities: 0,
            real_time_sources: 0,
            static_sources: 0,
            completed_at: Utc::now(),
        }
    }

    fn record(&mut self, effect: WriteEffect) {
        match effect {
            WriteEffect::Refreshed => self.refreshed += 1,
            WriteEffect::KeptStale => self.failed += 1,
            WriteEffect::FellBackToStatic => {
                self.failed += 1;
                self.fell_back_to_static += 1;
            }
            WriteEffect::Superseded => self.superseded += 1,
        }
    }
}

/// One finished upstream query, still holding its city's claim.
struct Fetched {
    city: CityRecord,
    claim: RefreshClaim,
    dispatched_at: DateTime<Utc>,
    outcome: FetchOutcome,
}

async fn fetch_one(
    source: Arc<dyn AirQualitySource>,
    city: CityRecord,
    claim: RefreshClaim,
    fetch_timeout: Duration,
) -> Fetched {
    let dispatched_at = Utc::now();
    let outcome = match tokio::time::timeout(fetch_timeout, source.fetch(&city)).await {
        Ok(outcome) => outcome,
        Err(_) => FetchOutcome::unavailable("timeout"),
    };
    Fetched {
        city,
        claim,
        dispatched_at,
        outcome,
    }
}

/// Fans refreshes out to an [`AirQualitySource`] and commits each outcome
/// to the cache as soon as it arrives.
#[derive(Clone)]
pub struct RefreshOrchestrator {
    source: Arc<dyn AirQualitySource>,
    cache: Arc<FreshnessCache>,
    options: RefreshOptions,
}

impl RefreshOrchestrator {
    pub fn new(
        source: Arc<dyn AirQualitySource>,
        cache: Arc<FreshnessCache>,
        options: RefreshOptions,
    ) -> Self {
        Self {
            source,
            cache,
            options,
        }
    }

    pub fn cache(&self) -> &Arc<FreshnessCache> {
        &self.cache
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    /// Run one pass with the configured options.
    pub async fn refresh_all(&self, mode: RefreshMode) -> RefreshReport {
        self.refresh_with(mode, &self.options).await
    }

    /// Run one pass with explicit options.
    ///
    /// Cancelling the returned future keeps every write already made;
    /// fetches still in flight are dropped and their outcomes discarded.
    pub async fn refresh_with(&self, mode: RefreshMode, opts: &RefreshOptions) -> RefreshReport {
        let mut report = RefreshReport::new(mode);
        let now = Utc::now();

        let mut claimed = Vec::new();
        for city in self.cache.registry().list_cities() {
            if mode == RefreshMode::Scheduled && self.cache.is_fresh_at(&city.name, opts.ttl, now)
            {
                report.skipped_fresh += 1;
                continue;
            }
            match self.cache.try_claim(&city.name) {
                Some(claim) => claimed.push((city.clone(), claim)),
                None => report.skipped_in_flight += 1,
            }
        }

        let queued = claimed.len();
        let mut completed = 0usize;

        if queued > 0 {
            let limit = opts.concurrency_limit.max(1);
            let fetch_timeout = opts.fetch_timeout;
            let source = self.source.clone();
            let cache = self.cache.clone();

            let fan_in = async {
                let mut outcomes = stream::iter(claimed)
                    .map(|(city, claim)| {
                        fetch_one(source.clone(), city, claim, fetch_timeout).boxed()
                    })
                    .buffer_unordered(limit);

                while let Some(fetched) = outcomes.next().await {
                    completed += 1;
                    let name = &fetched.city.name;
                    match cache.write(name, &fetched.outcome, fetched.dispatched_at) {
                        Ok(effect) => report.record(effect),
                        Err(e) => error!("Failed to apply outcome for {}: {}", name, e),
                    }
                    drop(fetched.claim);
                }
            };

            match opts.deadline {
                Some(deadline) => {
                    if tokio::time::timeout(deadline, fan_in).await.is_err() {
                        warn!(
                            "Refresh deadline of {:?} hit after {}/{} cities",
                            deadline, completed, queued
                        );
                    }
                }
                None => fan_in.await,
            }
        }

        report.abandoned = queued - completed;

        let snapshot = self.cache.snapshot();
        report.total_cities = snapshot.len();
        report.real_time_sources = snapshot
            .iter()
            .filter(|r| r.source == DataSource::RealTime)
            .count();
        report.static_sources = report.total_cities - report.real_time_sources;
        report.completed_at = Utc::now();

        info!(
            "Refresh ({:?}): refreshed={} failed={} static_fallback={} skipped_fresh={} abandoned={} | real_time={}/{}",
            mode,
            report.refreshed,
            report.failed,
            report.fell_back_to_static,
            report.skipped_fresh,
            report.abandoned,
            report.real_time_sources,
            report.total_cities,
        );

        report
    }

    /// Ambient loop: a scheduled pass every `interval` until `shutdown`
    /// flips to true (or its sender is dropped).
    ///
    /// The first pass runs one `interval` after start. Shutdown is also
    /// honoured mid-pass; the cancelled pass keeps the writes it made.
    pub async fn run_scheduled(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pass = self.refresh_all(RefreshMode::Scheduled);
                    tokio::pin!(pass);
                    loop {
                        tokio::select! {
                            _ = &mut pass => break,
                            changed = shutdown.changed() => {
                                if stop_requested(changed.is_err(), &shutdown) {
                                    info!("Scheduled refresh loop stopping mid-pass");
                                    return;
                                }
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if stop_requested(changed.is_err(), &shutdown) {
                        info!("Scheduled refresh loop stopping");
                        return;
                    }
                }
            }
        }
    }
}

fn stop_requested(sender_gone: bool, shutdown: &watch::Receiver<bool>) -> bool {
    sender_gone || *shutdown.borrow()
}
