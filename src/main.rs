//! SkyWash: live PM2.5 readings and rain washout simulation.
//!
//! Single-binary Tokio application that:
//! 1. Loads the city catalog
//! 2. Keeps per-city PM2.5 readings fresh from the WAQI feed
//! 3. Falls back to static baselines when live data is unavailable
//! 4. Simulates how rainfall washes particulates out of the air

mod config;
mod service;

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::service::{AirQualityService, WashoutRequest};

/// SkyWash air-quality service
#[derive(Parser)]
#[command(name = "skywash", about = "Live PM2.5 readings and rain washout simulation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Keep readings fresh in the background until Ctrl+C (default).
    Serve,
    /// Refresh stale cities once and print readings as JSON.
    Readings {
        /// Print only this city.
        #[arg(long)]
        city: Option<String>,
    },
    /// Force-refresh every city and print the report as JSON.
    Refresh,
    /// Simulate rain washout and print the result as JSON.
    Washout {
        /// Starting PM2.5 in µg/m³.
        #[arg(long, conflicts_with = "city", required_unless_present = "city")]
        pm25: Option<f64>,
        /// Start from this city's current reading instead.
        #[arg(long)]
        city: Option<String>,
        /// Rain intensity in mm/h.
        #[arg(long)]
        rain_mm: f64,
        /// Duration in hours.
        #[arg(long)]
        duration_h: f64,
    },
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "skywash=info,waqi_client=info,freshness=info,washout=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let service = match AirQualityService::from_config(&cfg) {
        Ok(s) => s,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Tracking {} cities, ttl={}s, concurrency={}, washout_coeff={}",
        service.registry().len(),
        cfg.cache.ttl_secs,
        cfg.refresh.concurrency_limit,
        cfg.washout.coefficient,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&service, Duration::from_secs(cfg.refresh.interval_secs)).await,
        Command::Readings { city } => {
            service.refresh_stale().await;
            match city {
                Some(city) => match service.reading(&city) {
                    Ok(r) => print_json(&r),
                    Err(e) => {
                        error!("{}", e);
                        std::process::exit(2);
                    }
                },
                None => print_json(&service.list_readings()),
            }
        }
        Command::Refresh => {
            let report = service.refresh_now().await;
            print_json(&report);
        }
        Command::Washout {
            pm25,
            city,
            rain_mm,
            duration_h,
        } => {
            let result = match city {
                Some(city) => {
                    service.refresh_stale().await;
                    service.simulate_for_city(&city, rain_mm, duration_h)
                }
                None => service.simulate_washout(&WashoutRequest {
                    pm25: pm25.unwrap_or_default(),
                    rain_mm_per_h: rain_mm,
                    duration_h,
                }),
            };
            match result {
                Ok(r) => print_json(&r),
                Err(e) => {
                    error!("Washout simulation failed: {}", e);
                    std::process::exit(2);
                }
            }
        }
    }
}

async fn serve(service: &AirQualityService, interval: Duration) {
    info!("Running initial refresh...");
    service.refresh_now().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = service.orchestrator().clone();
    let refresh_handle = tokio::spawn(async move {
        orchestrator.run_scheduled(interval, shutdown_rx).await;
    });

    let hb_cache = service.orchestrator().cache().clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let snapshot = hb_cache.snapshot();
            let live = snapshot.iter().filter(|r| r.is_real_time()).count();
            info!(
                "HEARTBEAT: cities={} real_time={} static={}",
                snapshot.len(),
                live,
                snapshot.len() - live
            );
        }
    });

    info!("SkyWash is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = refresh_handle.await {
        error!("Refresh task exited abnormally: {:?}", e);
    }

    info!("SkyWash shut down.");
}
