//! Pickup, dropoff and fuel stops

use serde::{Deserialize, Serialize};

use super::interval::{Activity, CutPoint, DutyInterval, DutyStatus};
use super::{StopRules, EPSILON};
use crate::services::geo::interpolate_along;
use crate::types::Coordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopKind {
    Fuel,
    Rest,
}

/// A fuel or rest stop along the route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(rename = "type")]
    pub kind: StopKind,
    /// Cumulative driving distance when the stop begins
    #[serde(rename = "distance_at")]
    pub distance_at_miles: f64,
    pub duration_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// An on-duty block the planner wants in the stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedBlock {
    pub hours: f64,
    pub activity: Activity,
}

/// Decides where stops go in the interval stream.
///
/// Fuel stops are tracked by count so repeated float additions of the
/// driven distance never skip or repeat a threshold.
#[derive(Debug, Clone)]
pub struct StopPlanner {
    rules: StopRules,
    total_distance_miles: f64,
    fuel_stops_planned: u32,
}

impl StopPlanner {
    pub fn new(rules: StopRules, total_distance_miles: f64) -> Self {
        Self {
            rules,
            total_distance_miles,
            fuel_stops_planned: 0,
        }
    }

    pub fn pickup(&self) -> PlannedBlock {
        PlannedBlock {
            hours: self.rules.pickup_hours,
            activity: Activity::Pickup,
        }
    }

    pub fn dropoff(&self) -> PlannedBlock {
        PlannedBlock {
            hours: self.rules.dropoff_hours,
            activity: Activity::Dropoff,
        }
    }

    /// Next fuel threshold, if one lies strictly below the trip distance.
    fn next_fuel_threshold(&self) -> Option<f64> {
        let t = (self.fuel_stops_planned + 1) as f64 * self.rules.fuel_interval_miles;
        (t < self.total_distance_miles - EPSILON).then_some(t)
    }

    fn fuel_stop_at(&mut self, interval_end: &DutyInterval) -> DutyInterval {
        self.fuel_stops_planned += 1;
        DutyInterval::new(
            interval_end.end_time,
            self.rules.fuel_stop_hours,
            DutyStatus::OnDutyNotDriving,
            Activity::FuelStop,
        )
    }

    /// Insert fuel stops into a freshly simulated piece of the stream.
    ///
    /// `driven_before` is the cumulative driving distance at the start of
    /// the piece. A driving interval that straddles the next threshold is
    /// cut there and the fuel stop follows the head; whatever came after
    /// the cut is dropped, since the caller re-simulates it from the new
    /// clock position.
    pub fn plan(&mut self, piece: Vec<DutyInterval>, driven_before: f64) -> Vec<DutyInterval> {
        let mut planned = Vec::with_capacity(piece.len() + 1);
        let mut driven = driven_before;

        for interval in piece {
            let threshold = match (interval.status, self.next_fuel_threshold()) {
                (DutyStatus::Driving, Some(t)) => t,
                _ => {
                    driven += interval.distance_covered_miles;
                    planned.push(interval);
                    continue;
                }
            };

            let driven_after = driven + interval.distance_covered_miles;
            if driven_after < threshold - EPSILON {
                driven = driven_after;
                planned.push(interval);
                continue;
            }

            let into = threshold - driven;
            if into <= EPSILON {
                // Threshold sits at the start of this interval.
                let fuel = DutyInterval::new(
                    interval.start_time,
                    self.rules.fuel_stop_hours,
                    DutyStatus::OnDutyNotDriving,
                    Activity::FuelStop,
                );
                self.fuel_stops_planned += 1;
                planned.push(fuel);
                return planned;
            }

            match interval.cut(CutPoint::Distance(into)) {
                Some((head, _tail)) => {
                    let fuel = self.fuel_stop_at(&head);
                    planned.push(head);
                    planned.push(fuel);
                }
                None => {
                    let fuel = self.fuel_stop_at(&interval);
                    planned.push(interval);
                    planned.push(fuel);
                }
            }
            return planned;
        }

        planned
    }

    /// Derive the fuel and rest stops of a finished stream, ordered by
    /// distance, with coordinates interpolated along `path` when possible.
    pub fn stops(&self, intervals: &[DutyInterval], path: &[Coordinates]) -> Vec<Stop> {
        let mut stops = Vec::new();
        let mut driven = 0.0;

        for interval in intervals {
            if interval.status == DutyStatus::Driving {
                driven += interval.distance_covered_miles;
                continue;
            }
            let kind = match interval.activity_label {
                Activity::FuelStop => StopKind::Fuel,
                Activity::Break | Activity::Reset => StopKind::Rest,
                _ => continue,
            };

            let position = if self.total_distance_miles > 0.0 {
                interpolate_along(path, driven / self.total_distance_miles)
            } else {
                None
            };

            stops.push(Stop {
                kind,
                distance_at_miles: driven,
                duration_hours: interval.duration_hours(),
                lat: position.as_ref().map(|c| c.lat),
                lng: position.as_ref().map(|c| c.lng),
            });
        }

        stops
    }
}
