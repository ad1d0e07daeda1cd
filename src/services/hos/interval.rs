//! Duty intervals and the cut primitive shared by fuel-stop insertion and
//! midnight splitting.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{ScheduleError, EPSILON};

const MICROS_PER_HOUR: f64 = 3_600_000_000.0;

/// Convert fractional hours to a duration with microsecond resolution.
pub fn hours(h: f64) -> Duration {
    Duration::microseconds((h * MICROS_PER_HOUR).round() as i64)
}

/// Convert a duration to fractional hours.
pub fn as_hours(d: Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / MICROS_PER_HOUR,
        None => d.num_seconds() as f64 / 3600.0,
    }
}

/// Duty status as printed on the log grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "duty_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DutyStatus {
    OffDuty,
    SleeperBerth,
    Driving,
    OnDutyNotDriving,
}

/// What the driver is doing during an interval. Serialized as the
/// human-readable activity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    #[serde(rename = "Pickup")]
    Pickup,
    #[serde(rename = "Dropoff")]
    Dropoff,
    #[serde(rename = "Fuel stop")]
    FuelStop,
    #[serde(rename = "Driving")]
    Driving,
    #[serde(rename = "30-minute break")]
    Break,
    #[serde(rename = "10-hour reset")]
    Reset,
    #[serde(rename = "Off duty")]
    OffDuty,
}

impl Activity {
    pub const fn label(self) -> &'static str {
        match self {
            Activity::Pickup => "Pickup",
            Activity::Dropoff => "Dropoff",
            Activity::FuelStop => "Fuel stop",
            Activity::Driving => "Driving",
            Activity::Break => "30-minute break",
            Activity::Reset => "10-hour reset",
            Activity::OffDuty => "Off duty",
        }
    }
}

/// Where to cut an interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CutPoint {
    /// Wall-clock instant
    Time(NaiveDateTime),
    /// Miles into the interval (only meaningful for driving)
    Distance(f64),
}

/// One contiguous stretch of a single duty status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyInterval {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: DutyStatus,
    pub distance_covered_miles: f64,
    pub activity_label: Activity,
}

impl DutyInterval {
    /// A non-driving interval of `duration_hours` starting at `start`.
    pub fn new(start: NaiveDateTime, duration_hours: f64, status: DutyStatus, activity: Activity) -> Self {
        Self {
            start_time: start,
            end_time: start + hours(duration_hours),
            status,
            distance_covered_miles: 0.0,
            activity_label: activity,
        }
    }

    pub fn driving(start: NaiveDateTime, duration_hours: f64, miles: f64) -> Self {
        Self {
            start_time: start,
            end_time: start + hours(duration_hours),
            status: DutyStatus::Driving,
            distance_covered_miles: miles,
            activity_label: Activity::Driving,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn duration_hours(&self) -> f64 {
        as_hours(self.duration())
    }

    /// Split the interval in two at `at`.
    ///
    /// Distance is shared in proportion to time, except for a distance cut
    /// where the head carries exactly the requested miles. Returns `None`
    /// when the cut point does not fall strictly inside the interval.
    pub fn cut(&self, at: CutPoint) -> Option<(DutyInterval, DutyInterval)> {
        let total_hours = self.duration_hours();
        if total_hours <= 0.0 {
            return None;
        }

        let (instant, head_miles) = match at {
            CutPoint::Time(t) => {
                if t <= self.start_time || t >= self.end_time {
                    return None;
                }
                let fraction = as_hours(t - self.start_time) / total_hours;
                (t, self.distance_covered_miles * fraction)
            }
            CutPoint::Distance(miles) => {
                if miles <= EPSILON || miles >= self.distance_covered_miles - EPSILON {
                    return None;
                }
                let fraction = miles / self.distance_covered_miles;
                let t = self.start_time + hours(total_hours * fraction);
                if t <= self.start_time || t >= self.end_time {
                    return None;
                }
                (t, miles)
            }
        };

        let head = DutyInterval {
            end_time: instant,
            distance_covered_miles: head_miles,
            ..self.clone()
        };
        let tail = DutyInterval {
            start_time: instant,
            distance_covered_miles: (self.distance_covered_miles - head_miles).max(0.0),
            ..self.clone()
        };
        Some((head, tail))
    }
}

/// Check the central invariant: every interval has positive length, is
/// driving-only for distance, and starts exactly where the previous ended.
pub fn ensure_contiguous(intervals: &[DutyInterval]) -> Result<(), ScheduleError> {
    for (i, interval) in intervals.iter().enumerate() {
        if interval.end_time <= interval.start_time {
            return Err(ScheduleError::invariant(format!(
                "interval {} ({}) has non-positive length at {}",
                i,
                interval.activity_label.label(),
                interval.start_time
            )));
        }
        if interval.status != DutyStatus::Driving && interval.distance_covered_miles != 0.0 {
            return Err(ScheduleError::invariant(format!(
                "non-driving interval {} covers {} miles",
                i, interval.distance_covered_miles
            )));
        }
        if interval.distance_covered_miles < 0.0 {
            return Err(ScheduleError::invariant(format!("interval {} has negative distance", i)));
        }
        if i > 0 && intervals[i - 1].end_time != interval.start_time {
            return Err(ScheduleError::invariant(format!(
                "gap or overlap between interval {} (ends {}) and {} (starts {})",
                i - 1,
                intervals[i - 1].end_time,
                i,
                interval.start_time
            )));
        }
    }
    Ok(())
}
