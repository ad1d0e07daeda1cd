//! Hours-of-Service scheduling engine
//!
//! Turns a trip's drivable distance/duration and the driver's 70-hour cycle
//! balance into a contiguous stream of duty intervals, the stops implied by
//! it, and one log record per calendar day.
//!
//! The engine is a pure, synchronous function of its inputs. All duty state
//! is threaded explicitly through each step, so any number of computations
//! can run concurrently.

mod clock;
mod cycle;
mod daily_log;
mod error;
mod interval;
mod orchestrator;
mod stops;

pub use cycle::CyclePolicy;
pub use daily_log::{DailyLog, LogEntry};
pub use error::ScheduleError;
pub use interval::{DutyInterval, DutyStatus};
pub use orchestrator::{Route, RouteShape, ScheduleOrchestrator, TripInput, TripPlan, Truncation};
pub use stops::Stop;

use std::str::FromStr;

/// Tolerance for hour and mile comparisons (3.6 ms / a few inches).
pub const EPSILON: f64 = 1e-6;

/// Regulatory limits for property-carrying drivers on the 70-hour/8-day cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HosLimits {
    /// Driving allowed inside one on-duty window
    pub max_driving_hours: f64,
    /// Length of the on-duty window after a qualifying rest
    pub on_duty_window_hours: f64,
    /// Cumulative driving that requires a break
    pub break_after_driving_hours: f64,
    /// Length of the required break
    pub break_hours: f64,
    /// Minimum consecutive rest that resets the window
    pub reset_hours: f64,
    /// Rolling cycle ceiling
    pub cycle_limit_hours: f64,
}

impl HosLimits {
    /// Reject a cycle balance outside `[0, cycle_limit_hours]`.
    pub fn check_cycle_hours(&self, cycle_hours_used: f64) -> Result<(), ScheduleError> {
        if !cycle_hours_used.is_finite()
            || cycle_hours_used < 0.0
            || cycle_hours_used > self.cycle_limit_hours
        {
            return Err(ScheduleError::invalid(format!(
                "cycle hours used must be between 0 and {}, got {}",
                self.cycle_limit_hours, cycle_hours_used
            )));
        }
        Ok(())
    }
}

impl Default for HosLimits {
    fn default() -> Self {
        Self {
            max_driving_hours: 11.0,
            on_duty_window_hours: 14.0,
            break_after_driving_hours: 8.0,
            break_hours: 0.5,
            reset_hours: 10.0,
            cycle_limit_hours: 70.0,
        }
    }
}

/// Durations and spacing of the stops inserted into every trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopRules {
    pub pickup_hours: f64,
    pub dropoff_hours: f64,
    pub fuel_interval_miles: f64,
    pub fuel_stop_hours: f64,
}

impl Default for StopRules {
    fn default() -> Self {
        Self {
            pickup_hours: 1.0,
            dropoff_hours: 1.0,
            fuel_interval_miles: 1000.0,
            fuel_stop_hours: 0.5,
        }
    }
}

/// Duty status used for the 10-hour reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestStatus {
    #[default]
    SleeperBerth,
    OffDuty,
}

impl RestStatus {
    pub const fn duty_status(self) -> DutyStatus {
        match self {
            RestStatus::SleeperBerth => DutyStatus::SleeperBerth,
            RestStatus::OffDuty => DutyStatus::OffDuty,
        }
    }
}

impl FromStr for RestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sleeper_berth" | "sleeper" => Ok(RestStatus::SleeperBerth),
            "off_duty" | "off" => Ok(RestStatus::OffDuty),
            other => Err(format!("unknown rest status '{}'", other)),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineConfig {
    pub limits: HosLimits,
    pub stops: StopRules,
    pub rest_status: RestStatus,
    pub cycle_policy: CyclePolicy,
}
