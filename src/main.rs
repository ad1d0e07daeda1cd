//! HOS Worker - Hours-of-Service trip planning service
//!
//! This worker connects to NATS and answers trip planning requests.

mod cli;
mod config;
mod db;
mod handlers;
mod services;
mod types;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::services::hos::{ScheduleOrchestrator, TripInput};
use crate::services::trip_planner::default_start_time;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Console logs go to stderr so `plan` can print clean JSON on stdout
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hos_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::Migrate) => migrate(&config).await,
        Some(Command::Plan { distance, hours, cycle_used, start }) => {
            plan(&config, distance, hours, cycle_used, start)
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting HOS Worker...");

    let pool = db::create_pool(config.require_database_url()?).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await?;

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let handler_result = handlers::start_handlers(nats_client, pool, &config).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

async fn migrate(config: &Config) -> Result<()> {
    let pool = db::create_pool(config.require_database_url()?).await?;
    db::run_migrations(&pool).await
}

fn plan(
    config: &Config,
    distance: f64,
    hours: f64,
    cycle_used: f64,
    start: Option<NaiveDateTime>,
) -> Result<()> {
    let input = TripInput {
        total_distance_miles: distance,
        total_driving_hours: hours,
        cycle_hours_used: cycle_used,
        start_time: start.unwrap_or_else(default_start_time),
    };
    let trip_plan = ScheduleOrchestrator::new(config.engine())
        .compute(&input)
        .with_context(|| format!("Cannot schedule {} mi / {} h trip", distance, hours))?;

    println!("{}", serde_json::to_string_pretty(&trip_plan)?);
    Ok(())
}
