//! NATS message handlers

pub mod daily_log;
pub mod ping;
pub mod schedule;
pub mod trip;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info};

use crate::config::Config;
use crate::services::geocoding::{create_geocoder, Geocoder};
use crate::services::hos::ScheduleOrchestrator;
use crate::services::routing::{create_routing_service_with_fallback, RoutingService};
use crate::services::trip_planner::TripPlanner;

pub const SUBJECT_PING: &str = "hos.ping";
pub const SUBJECT_TRIP_CALCULATE: &str = "hos.trip.calculate";
pub const SUBJECT_SCHEDULE_PREVIEW: &str = "hos.schedule.preview";
pub const SUBJECT_TRIP_GET: &str = "hos.trip.get";
pub const SUBJECT_TRIP_LIST: &str = "hos.trip.list";
pub const SUBJECT_TRIP_LOGS: &str = "hos.trip.logs";
pub const SUBJECT_TRIP_ROUTE: &str = "hos.trip.route";
pub const SUBJECT_DAILY_LOG_ENTRIES_UPDATE: &str = "hos.daily_log.entries.update";

/// Build the planner from configuration: geocoder, routing with Valhalla
/// detection, and the engine.
pub async fn build_planner(config: &Config) -> Result<TripPlanner> {
    let geocoder: Arc<dyn Geocoder> = Arc::from(create_geocoder(
        &config.geocoder_backend,
        Some(&config.nominatim_url),
    )?);
    info!("Geocoder initialized: {}", geocoder.name());

    let routing_service: Arc<dyn RoutingService> = Arc::from(
        create_routing_service_with_fallback(config.valhalla_url.clone(), config.routing_timeout).await,
    );
    info!("Routing service initialized: {}", routing_service.name());

    let engine = ScheduleOrchestrator::new(config.engine());
    info!(
        "HOS engine initialized (rest: {:?}, cycle policy: {:?})",
        config.rest_status, config.cycle_policy
    );

    Ok(TripPlanner::new(
        geocoder,
        routing_service,
        engine,
        config.routing_timeout,
    ))
}

/// Start all message handlers
pub async fn start_handlers(client: Client, pool: PgPool, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    let planner = Arc::new(build_planner(config).await?);

    // Subscribe to all subjects
    let ping_sub = client.subscribe(SUBJECT_PING).await?;
    let trip_calculate_sub = client.subscribe(SUBJECT_TRIP_CALCULATE).await?;
    let schedule_preview_sub = client.subscribe(SUBJECT_SCHEDULE_PREVIEW).await?;
    let trip_get_sub = client.subscribe(SUBJECT_TRIP_GET).await?;
    let trip_list_sub = client.subscribe(SUBJECT_TRIP_LIST).await?;
    let trip_logs_sub = client.subscribe(SUBJECT_TRIP_LOGS).await?;
    let trip_route_sub = client.subscribe(SUBJECT_TRIP_ROUTE).await?;
    let log_entries_update_sub = client.subscribe(SUBJECT_DAILY_LOG_ENTRIES_UPDATE).await?;

    info!("Subscribed to NATS subjects");

    let client_ping = client.clone();
    let pool_ping = pool.clone();
    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub, pool_ping).await
    });

    let client_trip_calculate = client.clone();
    let pool_trip_calculate = pool.clone();
    let planner_trip_calculate = Arc::clone(&planner);
    let trip_calculate_handle = tokio::spawn(async move {
        trip::handle_calculate(client_trip_calculate, trip_calculate_sub, pool_trip_calculate, planner_trip_calculate).await
    });

    let client_schedule_preview = client.clone();
    let planner_schedule_preview = Arc::clone(&planner);
    let schedule_preview_handle = tokio::spawn(async move {
        schedule::handle_preview(client_schedule_preview, schedule_preview_sub, planner_schedule_preview).await
    });

    let client_trip_get = client.clone();
    let pool_trip_get = pool.clone();
    let trip_get_handle = tokio::spawn(async move {
        trip::handle_get(client_trip_get, trip_get_sub, pool_trip_get).await
    });

    let client_trip_list = client.clone();
    let pool_trip_list = pool.clone();
    let trip_list_handle = tokio::spawn(async move {
        trip::handle_list(client_trip_list, trip_list_sub, pool_trip_list).await
    });

    let client_trip_logs = client.clone();
    let pool_trip_logs = pool.clone();
    let trip_logs_handle = tokio::spawn(async move {
        trip::handle_logs(client_trip_logs, trip_logs_sub, pool_trip_logs).await
    });

    let client_trip_route = client.clone();
    let pool_trip_route = pool.clone();
    let trip_route_handle = tokio::spawn(async move {
        trip::handle_route(client_trip_route, trip_route_sub, pool_trip_route).await
    });

    let client_log_entries = client.clone();
    let pool_log_entries = pool.clone();
    let log_entries_update_handle = tokio::spawn(async move {
        daily_log::handle_update_entries(client_log_entries, log_entries_update_sub, pool_log_entries).await
    });

    info!("All handlers started, waiting for messages...");

    // Wait for any handler to finish (which indicates an error)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = trip_calculate_handle => {
            error!("Trip calculate handler finished: {:?}", result);
        }
        result = schedule_preview_handle => {
            error!("Schedule preview handler finished: {:?}", result);
        }
        result = trip_get_handle => {
            error!("Trip get handler finished: {:?}", result);
        }
        result = trip_list_handle => {
            error!("Trip list handler finished: {:?}", result);
        }
        result = trip_logs_handle => {
            error!("Trip logs handler finished: {:?}", result);
        }
        result = trip_route_handle => {
            error!("Trip route handler finished: {:?}", result);
        }
        result = log_entries_update_handle => {
            error!("Daily log entries handler finished: {:?}", result);
        }
    }

    Ok(())
}
