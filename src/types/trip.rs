//! Trip types

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::hos::{DailyLog, DutyInterval, LogEntry, Route, Stop, Truncation};

/// Coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Payload of `hos.trip.calculate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculateTripRequest {
    pub current_location: String,
    pub pickup_location: String,
    pub dropoff_location: String,
    #[serde(default)]
    pub current_cycle_used: f64,
    /// Local wall-clock start; defaults to now
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
}

impl CalculateTripRequest {
    /// Names of the location fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("current_location", &self.current_location),
            ("pickup_location", &self.pickup_location),
            ("dropoff_location", &self.dropoff_location),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Stored trip
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub current_location: String,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub current_cycle_used: f64,
    /// Miles
    pub total_distance: f64,
    /// Driving hours
    pub estimated_duration: f64,
    pub start_time: NaiveDateTime,
    #[serde(skip)]
    pub truncated_hours: Option<f64>,
    #[serde(skip)]
    pub truncated_miles: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn truncation(&self) -> Option<Truncation> {
        match (self.truncated_hours, self.truncated_miles) {
            (Some(driving_hours), Some(distance_miles)) => Some(Truncation {
                driving_hours,
                distance_miles,
            }),
            _ => None,
        }
    }
}

/// Stored daily log with its identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLogRecord {
    pub id: Uuid,
    pub trip_id: Uuid,
    #[serde(flatten)]
    pub log: DailyLog,
}

/// Trip with its logs and route, as returned by calculate and get
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripDetail {
    #[serde(flatten)]
    pub trip: Trip,
    pub daily_logs: Vec<DailyLogRecord>,
    pub route: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<Truncation>,
}

/// Payload of `hos.schedule.preview`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePreviewRequest {
    pub total_distance: f64,
    pub total_driving_hours: f64,
    #[serde(default)]
    pub cycle_hours_used: f64,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePreviewResponse {
    pub intervals: Vec<DutyInterval>,
    pub stops: Vec<Stop>,
    pub daily_logs: Vec<DailyLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<Truncation>,
}

/// Payload addressing one record by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: Uuid,
}

/// Payload of `hos.daily_log.entries.update`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLogEntriesRequest {
    pub daily_log_id: Uuid,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}

impl UpdateLogEntriesRequest {
    /// Reject entries that cannot sit on a 24-hour grid.
    pub fn validate(&self) -> Result<(), String> {
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.hour > 23 || entry.minute > 59 {
                return Err(format!(
                    "entry {} has invalid time {:02}:{:02}",
                    i, entry.hour, entry.minute
                ));
            }
        }
        Ok(())
    }
}

/// Summary row for trip listings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TripSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub trip: Trip,
    pub days: i64,
    pub first_log_date: Option<NaiveDate>,
}
