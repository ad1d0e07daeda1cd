//! One log record per calendar day

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::interval::{Activity, CutPoint, DutyInterval, DutyStatus};
use super::{ScheduleError, EPSILON};

/// A status change on the log grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub hour: u32,
    pub minute: u32,
    pub duty_status: DutyStatus,
    pub location: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub log_date: NaiveDate,
    pub off_duty_hours: f64,
    pub sleeper_berth_hours: f64,
    pub driving_hours: f64,
    pub on_duty_hours: f64,
    /// Miles driven on this day
    pub total_distance: f64,
    /// Cumulative miles driven through the end of this day
    pub total_vehicle_miles: f64,
    pub remarks: String,
    pub entries: Vec<LogEntry>,
}

impl DailyLog {
    fn empty(log_date: NaiveDate, miles_so_far: f64) -> Self {
        Self {
            log_date,
            off_duty_hours: 0.0,
            sleeper_berth_hours: 0.0,
            driving_hours: 0.0,
            on_duty_hours: 0.0,
            total_distance: 0.0,
            total_vehicle_miles: miles_so_far,
            remarks: String::new(),
            entries: Vec::new(),
        }
    }

    pub fn total_hours(&self) -> f64 {
        self.off_duty_hours + self.sleeper_berth_hours + self.driving_hours + self.on_duty_hours
    }

    fn hours_mut(&mut self, status: DutyStatus) -> &mut f64 {
        match status {
            DutyStatus::OffDuty => &mut self.off_duty_hours,
            DutyStatus::SleeperBerth => &mut self.sleeper_berth_hours,
            DutyStatus::Driving => &mut self.driving_hours,
            DutyStatus::OnDutyNotDriving => &mut self.on_duty_hours,
        }
    }
}

fn midnight_of(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn next_midnight(t: NaiveDateTime) -> Option<NaiveDateTime> {
    t.date().succ_opt().map(midnight_of)
}

/// Splits an interval stream at midnight and aggregates each day. The
/// first and last day are padded with off-duty time so every day sums to
/// 24 hours.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyLogBuilder;

impl DailyLogBuilder {
    pub fn new() -> Self {
        Self
    }

    fn padded(&self, intervals: &[DutyInterval]) -> Vec<DutyInterval> {
        let mut stream = Vec::with_capacity(intervals.len() + 2);
        let (first, last) = match (intervals.first(), intervals.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return stream,
        };

        let day_start = midnight_of(first.start_time.date());
        if first.start_time > day_start {
            stream.push(off_duty(day_start, first.start_time));
        }
        stream.extend(intervals.iter().cloned());
        if last.end_time.time() != NaiveTime::MIN {
            if let Some(day_end) = next_midnight(last.end_time) {
                stream.push(off_duty(last.end_time, day_end));
            }
        }
        stream
    }

    /// Build the day records. The input must be contiguous.
    pub fn build(&self, intervals: &[DutyInterval]) -> Vec<DailyLog> {
        let mut days: Vec<DailyLog> = Vec::new();
        let mut miles = 0.0;

        for interval in self.padded(intervals) {
            let mut piece = interval;
            loop {
                let split = next_midnight(piece.start_time).and_then(|m| piece.cut(CutPoint::Time(m)));
                match split {
                    Some((head, tail)) => {
                        accumulate(&mut days, &head, &mut miles);
                        piece = tail;
                    }
                    None => {
                        accumulate(&mut days, &piece, &mut miles);
                        break;
                    }
                }
            }
        }

        let n = days.len();
        for (i, day) in days.iter_mut().enumerate() {
            day.remarks = format!("Day {} of {}", i + 1, n);
        }
        days
    }

    /// Every day must sum to 24 hours.
    pub fn verify(&self, days: &[DailyLog]) -> Result<(), ScheduleError> {
        for day in days {
            if (day.total_hours() - 24.0).abs() > EPSILON {
                return Err(ScheduleError::invariant(format!(
                    "log for {} covers {:.6} hours",
                    day.log_date,
                    day.total_hours()
                )));
            }
        }
        Ok(())
    }
}

fn off_duty(start: NaiveDateTime, end: NaiveDateTime) -> DutyInterval {
    DutyInterval {
        start_time: start,
        end_time: end,
        status: DutyStatus::OffDuty,
        distance_covered_miles: 0.0,
        activity_label: Activity::OffDuty,
    }
}

fn accumulate(days: &mut Vec<DailyLog>, piece: &DutyInterval, miles: &mut f64) {
    let date = piece.start_time.date();
    if days.last().map(|d| d.log_date) != Some(date) {
        days.push(DailyLog::empty(date, *miles));
    }
    let Some(day) = days.last_mut() else {
        return;
    };

    let location = format!("Mile {:.0}", *miles);
    *day.hours_mut(piece.status) += piece.duration_hours();
    if piece.status == DutyStatus::Driving {
        day.total_distance += piece.distance_covered_miles;
        *miles += piece.distance_covered_miles;
        day.total_vehicle_miles = *miles;
    }

    let notes = piece.activity_label.label();
    let changed = day
        .entries
        .last()
        .map_or(true, |e| e.duty_status != piece.status || e.notes != notes);
    if changed {
        day.entries.push(LogEntry {
            hour: piece.start_time.hour(),
            minute: piece.start_time.minute(),
            duty_status: piece.status,
            location,
            notes: notes.to_string(),
        });
    }
}
