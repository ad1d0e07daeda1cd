//! Trip planning: geocode the three stops, route through them and run the
//! HOS engine over the result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::services::geocoding::Geocoder;
use crate::services::hos::{RouteShape, ScheduleError, ScheduleOrchestrator, TripInput, TripPlan};
use crate::services::routing::{RouteSummary, RoutingService};
use crate::types::{CalculateTripRequest, Coordinates, SchedulePreviewRequest};

/// Failures of a planning request, each with its envelope code
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{0}")]
    InvalidInput(String),

    /// Geocoding returned nothing, or routing failed or timed out.
    #[error("{0}")]
    UpstreamRouting(String),

    #[error("{0}")]
    Unschedulable(String),

    #[error("{0}")]
    Internal(String),
}

impl PlanError {
    pub const fn code(&self) -> &'static str {
        match self {
            PlanError::InvalidInput(_) => "INVALID_INPUT",
            PlanError::UpstreamRouting(_) => "UPSTREAM_ROUTING",
            PlanError::Unschedulable(_) => "UNSCHEDULABLE",
            PlanError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ScheduleError> for PlanError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidInput(_) => PlanError::InvalidInput(err.to_string()),
            ScheduleError::Unschedulable { .. } => PlanError::Unschedulable(err.to_string()),
            ScheduleError::InvariantViolation(_) => PlanError::Internal(err.to_string()),
        }
    }
}

/// Everything a calculate request produced, ready to persist.
#[derive(Debug, Clone)]
pub struct PlannedTrip {
    pub start_time: NaiveDateTime,
    pub route: RouteSummary,
    pub plan: TripPlan,
}

/// Current local time to the minute
pub fn default_start_time() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

pub struct TripPlanner {
    geocoder: Arc<dyn Geocoder>,
    routing: Arc<dyn RoutingService>,
    engine: ScheduleOrchestrator,
    upstream_timeout: Duration,
}

impl TripPlanner {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        routing: Arc<dyn RoutingService>,
        engine: ScheduleOrchestrator,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            geocoder,
            routing,
            engine,
            upstream_timeout,
        }
    }

    /// Run an upstream call under the timeout. No retry.
    async fn upstream<T, F>(&self, what: &str, call: F) -> Result<T, PlanError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.upstream_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("{} failed: {:#}", what, e);
                Err(PlanError::UpstreamRouting(format!("{} failed: {}", what, e)))
            }
            Err(_) => {
                warn!("{} timed out after {:?}", what, self.upstream_timeout);
                Err(PlanError::UpstreamRouting(format!(
                    "{} timed out after {} s",
                    what,
                    self.upstream_timeout.as_secs_f64()
                )))
            }
        }
    }

    async fn geocode(&self, address: &str) -> Result<Coordinates, PlanError> {
        let found = self
            .upstream(&format!("Geocoding '{}'", address), self.geocoder.geocode(address))
            .await?;
        match found {
            Some(result) => {
                debug!("Geocoded '{}' to {:?}", address, result.coordinates);
                Ok(result.coordinates)
            }
            None => Err(PlanError::UpstreamRouting(format!(
                "Could not geocode '{}'",
                address
            ))),
        }
    }

    /// Geocode, route current → pickup → dropoff and schedule the trip.
    pub async fn plan(&self, request: &CalculateTripRequest) -> Result<PlannedTrip, PlanError> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(PlanError::InvalidInput(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        // Checked before any geocoding so a bad balance never reaches the
        // rate-limited provider.
        self.engine
            .config()
            .limits
            .check_cycle_hours(request.current_cycle_used)?;

        let mut waypoints = Vec::with_capacity(3);
        for address in [
            &request.current_location,
            &request.pickup_location,
            &request.dropoff_location,
        ] {
            waypoints.push(self.geocode(address).await?);
        }

        let route = self
            .upstream(
                &format!("Routing via {}", self.routing.name()),
                self.routing.route(&waypoints),
            )
            .await?;

        let start_time = request.start_time.unwrap_or_else(default_start_time);
        let input = TripInput {
            total_distance_miles: route.distance_miles,
            total_driving_hours: route.duration_hours,
            cycle_hours_used: request.current_cycle_used,
            start_time,
        };
        let shape = RouteShape {
            waypoints,
            path: route.path.clone(),
            polyline: route.polyline(),
        };

        let plan = self.engine.compute_on(&input, &shape)?;
        info!(
            "Planned {:.1} mi trip over {} days ({} stops)",
            route.distance_miles,
            plan.daily_logs.len(),
            plan.route.stops.len()
        );

        Ok(PlannedTrip {
            start_time,
            route,
            plan,
        })
    }

    /// Schedule a trip from distance and duration alone.
    pub fn preview(&self, request: &SchedulePreviewRequest) -> Result<TripPlan, PlanError> {
        let input = TripInput {
            total_distance_miles: request.total_distance,
            total_driving_hours: request.total_driving_hours,
            cycle_hours_used: request.cycle_hours_used,
            start_time: request.start_time.unwrap_or_else(default_start_time),
        };
        Ok(self.engine.compute(&input)?)
    }
}
