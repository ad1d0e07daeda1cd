//! Trip database queries

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::services::hos::{DailyLog, DutyStatus, LogEntry, Route, Stop};
use crate::services::trip_planner::PlannedTrip;
use crate::types::{
    CalculateTripRequest, Coordinates, DailyLogRecord, ListRequest, ListResponse, Trip,
    TripDetail, TripSummary,
};

const TRIP_COLUMNS: &str = r#"
    id, current_location, pickup_location, dropoff_location, current_cycle_used,
    total_distance, estimated_duration, start_time, truncated_hours, truncated_miles,
    created_at, updated_at
"#;

#[derive(Debug, Clone, sqlx::FromRow)]
struct DailyLogRow {
    id: Uuid,
    trip_id: Uuid,
    log_date: NaiveDate,
    off_duty_hours: f64,
    sleeper_berth_hours: f64,
    driving_hours: f64,
    on_duty_hours: f64,
    total_distance: f64,
    total_vehicle_miles: f64,
    remarks: String,
}

impl DailyLogRow {
    fn into_record(self, entries: Vec<LogEntry>) -> DailyLogRecord {
        DailyLogRecord {
            id: self.id,
            trip_id: self.trip_id,
            log: DailyLog {
                log_date: self.log_date,
                off_duty_hours: self.off_duty_hours,
                sleeper_berth_hours: self.sleeper_berth_hours,
                driving_hours: self.driving_hours,
                on_duty_hours: self.on_duty_hours,
                total_distance: self.total_distance,
                total_vehicle_miles: self.total_vehicle_miles,
                remarks: self.remarks,
                entries,
            },
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LogEntryRow {
    daily_log_id: Uuid,
    hour: i32,
    minute: i32,
    duty_status: DutyStatus,
    location: String,
    notes: String,
}

impl LogEntryRow {
    fn into_entry(self) -> Result<LogEntry> {
        Ok(LogEntry {
            hour: u32::try_from(self.hour).context("negative log entry hour")?,
            minute: u32::try_from(self.minute).context("negative log entry minute")?,
            duty_status: self.duty_status,
            location: self.location,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RouteRow {
    waypoints: Json<Vec<Coordinates>>,
    stops: Json<Vec<Stop>>,
    polyline: String,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        Route {
            waypoints: row.waypoints.0,
            stops: row.stops.0,
            polyline: row.polyline,
        }
    }
}

/// Attach entries to their logs, keeping log order.
fn assemble_logs(logs: Vec<DailyLogRow>, entries: Vec<LogEntryRow>) -> Result<Vec<DailyLogRecord>> {
    let mut by_log: HashMap<Uuid, Vec<LogEntry>> = HashMap::new();
    for row in entries {
        let log_id = row.daily_log_id;
        by_log.entry(log_id).or_default().push(row.into_entry()?);
    }

    Ok(logs
        .into_iter()
        .map(|log| {
            let entries = by_log.remove(&log.id).unwrap_or_default();
            log.into_record(entries)
        })
        .collect())
}

async fn insert_entries(
    tx: &mut Transaction<'_, Postgres>,
    daily_log_id: Uuid,
    entries: &[LogEntry],
) -> Result<()> {
    for (position, entry) in entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO log_entries (daily_log_id, position, hour, minute, duty_status, location, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#
        )
        .bind(daily_log_id)
        .bind(position as i32)
        .bind(entry.hour as i32)
        .bind(entry.minute as i32)
        .bind(entry.duty_status)
        .bind(&entry.location)
        .bind(&entry.notes)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Store a planned trip with its route, daily logs and log entries.
pub async fn save_trip(
    pool: &PgPool,
    request: &CalculateTripRequest,
    planned: &PlannedTrip,
) -> Result<TripDetail> {
    let mut tx = pool.begin().await?;
    let truncated = planned.plan.truncated;

    let trip = sqlx::query_as::<_, Trip>(&format!(
        r#"
        INSERT INTO trips (current_location, pickup_location, dropoff_location, current_cycle_used,
                           total_distance, estimated_duration, start_time, truncated_hours, truncated_miles)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        TRIP_COLUMNS
    ))
    .bind(request.current_location.trim())
    .bind(request.pickup_location.trim())
    .bind(request.dropoff_location.trim())
    .bind(request.current_cycle_used)
    .bind(planned.route.distance_miles)
    .bind(planned.route.duration_hours)
    .bind(planned.start_time)
    .bind(truncated.map(|t| t.driving_hours))
    .bind(truncated.map(|t| t.distance_miles))
    .fetch_one(&mut *tx)
    .await?;

    let route = &planned.plan.route;
    sqlx::query(
        r#"
        INSERT INTO routes (trip_id, waypoints, stops, polyline)
        VALUES ($1, $2, $3, $4)
        "#
    )
    .bind(trip.id)
    .bind(Json(&route.waypoints))
    .bind(Json(&route.stops))
    .bind(&route.polyline)
    .execute(&mut *tx)
    .await?;

    let mut daily_logs = Vec::with_capacity(planned.plan.daily_logs.len());
    for log in &planned.plan.daily_logs {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO daily_logs (trip_id, log_date, off_duty_hours, sleeper_berth_hours,
                                    driving_hours, on_duty_hours, total_distance,
                                    total_vehicle_miles, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#
        )
        .bind(trip.id)
        .bind(log.log_date)
        .bind(log.off_duty_hours)
        .bind(log.sleeper_berth_hours)
        .bind(log.driving_hours)
        .bind(log.on_duty_hours)
        .bind(log.total_distance)
        .bind(log.total_vehicle_miles)
        .bind(&log.remarks)
        .fetch_one(&mut *tx)
        .await?;

        insert_entries(&mut tx, id, &log.entries).await?;
        daily_logs.push(DailyLogRecord {
            id,
            trip_id: trip.id,
            log: log.clone(),
        });
    }

    tx.commit().await?;

    Ok(TripDetail {
        trip,
        daily_logs,
        route: Some(route.clone()),
        truncated,
    })
}

/// Get a single trip by ID
pub async fn get_trip(pool: &PgPool, trip_id: Uuid) -> Result<Option<Trip>> {
    let trip = sqlx::query_as::<_, Trip>(&format!(
        "SELECT {} FROM trips WHERE id = $1",
        TRIP_COLUMNS
    ))
    .bind(trip_id)
    .fetch_optional(pool)
    .await?;

    Ok(trip)
}

/// Trip with its daily logs and route
pub async fn get_trip_detail(pool: &PgPool, trip_id: Uuid) -> Result<Option<TripDetail>> {
    let Some(trip) = get_trip(pool, trip_id).await? else {
        return Ok(None);
    };
    let daily_logs = get_daily_logs(pool, trip_id).await?;
    let route = get_route(pool, trip_id).await?;
    let truncated = trip.truncation();

    Ok(Some(TripDetail {
        trip,
        daily_logs,
        route,
        truncated,
    }))
}

/// List trips, newest first
pub async fn list_trips(pool: &PgPool, request: &ListRequest) -> Result<ListResponse<TripSummary>> {
    let limit = request.limit.clamp(1, 500);
    let offset = request.offset.max(0);

    let items = sqlx::query_as::<_, TripSummary>(
        r#"
        SELECT
            t.id, t.current_location, t.pickup_location, t.dropoff_location, t.current_cycle_used,
            t.total_distance, t.estimated_duration, t.start_time, t.truncated_hours, t.truncated_miles,
            t.created_at, t.updated_at,
            COUNT(d.id) AS days,
            MIN(d.log_date) AS first_log_date
        FROM trips t
        LEFT JOIN daily_logs d ON d.trip_id = t.id
        GROUP BY t.id
        ORDER BY t.created_at DESC
        LIMIT $1 OFFSET $2
        "#
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trips")
        .fetch_one(pool)
        .await?;

    Ok(ListResponse {
        items,
        total,
        limit,
        offset,
    })
}

/// Daily logs of one trip, in date order, with their entries
pub async fn get_daily_logs(pool: &PgPool, trip_id: Uuid) -> Result<Vec<DailyLogRecord>> {
    let logs = sqlx::query_as::<_, DailyLogRow>(
        r#"
        SELECT id, trip_id, log_date, off_duty_hours, sleeper_berth_hours, driving_hours,
               on_duty_hours, total_distance, total_vehicle_miles, remarks
        FROM daily_logs
        WHERE trip_id = $1
        ORDER BY log_date ASC
        "#
    )
    .bind(trip_id)
    .fetch_all(pool)
    .await?;

    if logs.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = logs.iter().map(|l| l.id).collect();
    let entries = sqlx::query_as::<_, LogEntryRow>(
        r#"
        SELECT daily_log_id, hour, minute, duty_status, location, notes
        FROM log_entries
        WHERE daily_log_id = ANY($1)
        ORDER BY daily_log_id, position ASC
        "#
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    assemble_logs(logs, entries)
}

/// Route of one trip
pub async fn get_route(pool: &PgPool, trip_id: Uuid) -> Result<Option<Route>> {
    let row = sqlx::query_as::<_, RouteRow>(
        "SELECT waypoints, stops, polyline FROM routes WHERE trip_id = $1"
    )
    .bind(trip_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Route::from))
}

/// Replace all entries of a daily log. Returns `None` if the log does not exist.
pub async fn replace_log_entries(
    pool: &PgPool,
    daily_log_id: Uuid,
    entries: &[LogEntry],
) -> Result<Option<DailyLogRecord>> {
    let mut tx = pool.begin().await?;

    let log = sqlx::query_as::<_, DailyLogRow>(
        r#"
        SELECT id, trip_id, log_date, off_duty_hours, sleeper_berth_hours, driving_hours,
               on_duty_hours, total_distance, total_vehicle_miles, remarks
        FROM daily_logs
        WHERE id = $1
        FOR UPDATE
        "#
    )
    .bind(daily_log_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(log) = log else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM log_entries WHERE daily_log_id = $1")
        .bind(daily_log_id)
        .execute(&mut *tx)
        .await?;

    insert_entries(&mut tx, daily_log_id, entries).await?;

    sqlx::query("UPDATE trips SET updated_at = NOW() WHERE id = $1")
        .bind(log.trip_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Some(log.into_record(entries.to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_row(id: Uuid, day: u32) -> DailyLogRow {
        DailyLogRow {
            id,
            trip_id: Uuid::nil(),
            log_date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            off_duty_hours: 11.0,
            sleeper_berth_hours: 0.0,
            driving_hours: 11.0,
            on_duty_hours: 2.0,
            total_distance: 660.0,
            total_vehicle_miles: 660.0,
            remarks: format!("Day {}", day),
        }
    }

    fn entry_row(daily_log_id: Uuid, hour: i32, status: DutyStatus) -> LogEntryRow {
        LogEntryRow {
            daily_log_id,
            hour,
            minute: 0,
            duty_status: status,
            location: "Mile 0".to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_assemble_logs_groups_entries_by_log() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let logs = vec![log_row(first, 21), log_row(second, 22)];
        let entries = vec![
            entry_row(second, 0, DutyStatus::SleeperBerth),
            entry_row(first, 0, DutyStatus::OffDuty),
            entry_row(first, 6, DutyStatus::OnDutyNotDriving),
        ];

        let records = assemble_logs(logs, entries).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, first);
        assert_eq!(records[0].log.entries.len(), 2);
        assert_eq!(records[0].log.entries[1].hour, 6);
        assert_eq!(records[1].log.entries.len(), 1);
        assert_eq!(records[1].log.entries[0].duty_status, DutyStatus::SleeperBerth);
    }

    #[test]
    fn test_assemble_logs_keeps_logs_without_entries() {
        let id = Uuid::new_v4();
        let records = assemble_logs(vec![log_row(id, 21)], Vec::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].log.entries.is_empty());
        assert_eq!(records[0].log.remarks, "Day 21");
    }

    #[test]
    fn test_negative_entry_hour_is_rejected() {
        let row = entry_row(Uuid::nil(), -1, DutyStatus::Driving);
        assert!(row.into_entry().is_err());
    }

    #[test]
    fn test_route_row_converts() {
        let row = RouteRow {
            waypoints: Json(vec![Coordinates { lat: 41.88, lng: -87.63 }]),
            stops: Json(Vec::new()),
            polyline: "abc".to_string(),
        };
        let route = Route::from(row);
        assert_eq!(route.waypoints.len(), 1);
        assert_eq!(route.polyline, "abc");
    }
}
