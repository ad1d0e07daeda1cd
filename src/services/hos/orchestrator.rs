//! Drives the clock, stop planner and log builder for one trip.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::clock::{Advance, ClockSimulator, DutyState};
use super::cycle::{CyclePolicy, CycleTracker};
use super::daily_log::{DailyLog, DailyLogBuilder};
use super::interval::{ensure_contiguous, Activity, DutyInterval, DutyStatus};
use super::stops::{Stop, StopPlanner};
use super::{EngineConfig, HosLimits, ScheduleError, EPSILON};
use crate::types::Coordinates;

/// Upper bound on simulation steps. A 70-hour cycle needs a few dozen.
const MAX_STEPS: usize = 10_000;

/// What the engine needs to know about a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripInput {
    pub total_distance_miles: f64,
    pub total_driving_hours: f64,
    pub cycle_hours_used: f64,
    pub start_time: NaiveDateTime,
}

impl TripInput {
    /// Distances and hours at or below `EPSILON` count as nothing left to
    /// drive, so they are rejected rather than scheduled as an empty trip.
    pub fn validate(&self, limits: &HosLimits) -> Result<(), ScheduleError> {
        if !self.total_distance_miles.is_finite() || self.total_distance_miles <= EPSILON {
            return Err(ScheduleError::invalid(format!(
                "total distance must be a positive number of miles, got {}",
                self.total_distance_miles
            )));
        }
        if !self.total_driving_hours.is_finite() || self.total_driving_hours <= EPSILON {
            return Err(ScheduleError::invalid(format!(
                "total driving hours must be positive, got {}",
                self.total_driving_hours
            )));
        }
        limits.check_cycle_hours(self.cycle_hours_used)
    }
}

/// Geometry the stops are placed along
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteShape {
    pub waypoints: Vec<Coordinates>,
    pub path: Vec<Coordinates>,
    pub polyline: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub waypoints: Vec<Coordinates>,
    pub stops: Vec<Stop>,
    pub polyline: String,
}

/// Driving left undone when the cycle ran out under the truncate policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Truncation {
    pub driving_hours: f64,
    pub distance_miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlan {
    pub route: Route,
    pub daily_logs: Vec<DailyLog>,
    pub intervals: Vec<DutyInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<Truncation>,
}

impl TripPlan {
    pub fn driving_hours(&self) -> f64 {
        self.intervals
            .iter()
            .filter(|i| i.status == DutyStatus::Driving)
            .map(DutyInterval::duration_hours)
            .sum()
    }
}

/// Committed part of the schedule and the state it implies.
struct Simulation<'a> {
    clock: &'a ClockSimulator,
    cursor: NaiveDateTime,
    state: DutyState,
    intervals: Vec<DutyInterval>,
    driven_miles: f64,
    remaining_distance: f64,
    remaining_hours: f64,
}

impl<'a> Simulation<'a> {
    fn new(clock: &'a ClockSimulator, input: &TripInput) -> Self {
        Self {
            clock,
            cursor: input.start_time,
            state: DutyState::rested(input.cycle_hours_used),
            intervals: Vec::new(),
            driven_miles: 0.0,
            remaining_distance: input.total_distance_miles,
            remaining_hours: input.total_driving_hours,
        }
    }

    fn commit(&mut self, interval: DutyInterval) -> Result<(), ScheduleError> {
        if interval.start_time != self.cursor {
            return Err(ScheduleError::invariant(format!(
                "{} starts at {} but the schedule is at {}",
                interval.activity_label.label(),
                interval.start_time,
                self.cursor
            )));
        }
        self.state.record(&interval, self.clock.limits());
        if interval.status == DutyStatus::Driving {
            self.driven_miles += interval.distance_covered_miles;
            self.remaining_distance -= interval.distance_covered_miles;
            self.remaining_hours -= interval.duration_hours();
        }
        self.cursor = interval.end_time;
        self.intervals.push(interval);
        Ok(())
    }

    /// Commit a whole step and report whether the cycle blocked it.
    fn commit_step(&mut self, step: Advance) -> Result<bool, ScheduleError> {
        let blocked = step.blocked;
        for interval in step.intervals {
            self.commit(interval)?;
        }
        Ok(blocked)
    }

    fn on_duty(&mut self, hours: f64, activity: Activity, cycle: &CycleTracker) -> Result<bool, ScheduleError> {
        let step = self
            .clock
            .on_duty(hours, activity, self.cursor, &self.state, cycle);
        self.commit_step(step)
    }
}

/// Entry point of the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleOrchestrator {
    config: EngineConfig,
}

impl ScheduleOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute a plan without route geometry; stops carry no coordinates.
    pub fn compute(&self, input: &TripInput) -> Result<TripPlan, ScheduleError> {
        self.compute_on(input, &RouteShape::default())
    }

    /// Compute a plan and place its stops along `shape`.
    pub fn compute_on(&self, input: &TripInput, shape: &RouteShape) -> Result<TripPlan, ScheduleError> {
        let result = self.run(input, shape);
        if let Err(ScheduleError::InvariantViolation(detail)) = &result {
            error!("Schedule invariant violated for {:?}: {}", input, detail);
        }
        result
    }

    fn run(&self, input: &TripInput, shape: &RouteShape) -> Result<TripPlan, ScheduleError> {
        let limits = self.config.limits;
        input.validate(&limits)?;

        debug!(
            "Scheduling {:.1} mi / {:.2} h from {} with {:.2} cycle hours used",
            input.total_distance_miles, input.total_driving_hours, input.start_time, input.cycle_hours_used
        );

        let clock = ClockSimulator::new(limits, self.config.rest_status);
        let cycle = CycleTracker::new(limits.cycle_limit_hours, self.config.cycle_policy);
        let mut planner = StopPlanner::new(self.config.stops, input.total_distance_miles);
        let mut sim = Simulation::new(&clock, input);

        let pickup = planner.pickup();
        let mut blocked_on = sim
            .on_duty(pickup.hours, pickup.activity, &cycle)?
            .then_some(Activity::Pickup);

        let mut steps = 0;
        while blocked_on.is_none() {
            steps += 1;
            if steps > MAX_STEPS {
                return Err(ScheduleError::invariant(format!(
                    "simulation did not finish within {} steps",
                    MAX_STEPS
                )));
            }

            let step = clock.advance(sim.remaining_distance, sim.remaining_hours, sim.cursor, &sim.state, &cycle);
            if step.is_finished() {
                break;
            }
            if step.blocked {
                blocked_on = Some(Activity::Driving);
                break;
            }

            for interval in planner.plan(step.intervals, sim.driven_miles) {
                if interval.activity_label == Activity::FuelStop {
                    if sim.on_duty(interval.duration_hours(), Activity::FuelStop, &cycle)? {
                        blocked_on = Some(Activity::FuelStop);
                        break;
                    }
                } else {
                    sim.commit(interval)?;
                }
            }
        }

        if blocked_on.is_none() {
            let dropoff = planner.dropoff();
            if sim.on_duty(dropoff.hours, dropoff.activity, &cycle)? {
                blocked_on = Some(Activity::Dropoff);
            }
        }

        let truncated = match blocked_on {
            None => None,
            Some(activity) => {
                let err = cycle.exhausted(sim.state.cycle_hours_used, &activity.label().to_lowercase());
                if cycle.policy() == CyclePolicy::Reject || sim.driven_miles <= EPSILON {
                    debug!("Trip unschedulable: {}", err);
                    return Err(err);
                }
                Some(Truncation {
                    driving_hours: sim.remaining_hours.max(0.0),
                    distance_miles: sim.remaining_distance.max(0.0),
                })
            }
        };

        let intervals = sim.intervals;
        ensure_contiguous(&intervals)?;

        let driven: f64 = intervals
            .iter()
            .filter(|i| i.status == DutyStatus::Driving)
            .map(DutyInterval::duration_hours)
            .sum();
        let expected = input.total_driving_hours - truncated.map_or(0.0, |t| t.driving_hours);
        if (driven - expected).abs() > EPSILON {
            return Err(ScheduleError::invariant(format!(
                "scheduled {:.6} driving hours, expected {:.6}",
                driven, expected
            )));
        }

        let log_builder = DailyLogBuilder::new();
        let daily_logs = log_builder.build(&intervals);
        log_builder.verify(&daily_logs)?;

        let route = Route {
            waypoints: shape.waypoints.clone(),
            stops: planner.stops(&intervals, &shape.path),
            polyline: shape.polyline.clone(),
        };

        debug!(
            "Scheduled {} intervals over {} days with {} stops",
            intervals.len(),
            daily_logs.len(),
            route.stops.len()
        );

        Ok(TripPlan {
            route,
            daily_logs,
            intervals,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hos::interval::as_hours;
    use crate::services::hos::stops::StopKind;
    use crate::services::hos::RestStatus;
    use chrono::{NaiveDate, Timelike};
    use proptest::prelude::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 21).unwrap().and_hms_opt(6, 0, 0).unwrap()
    }

    fn input(distance: f64, hours: f64, cycle: f64) -> TripInput {
        TripInput {
            total_distance_miles: distance,
            total_driving_hours: hours,
            cycle_hours_used: cycle,
            start_time: start(),
        }
    }

    fn engine() -> ScheduleOrchestrator {
        ScheduleOrchestrator::default()
    }

    fn fuel_distances(plan: &TripPlan) -> Vec<f64> {
        plan.route
            .stops
            .iter()
            .filter(|s| s.kind == StopKind::Fuel)
            .map(|s| s.distance_at_miles)
            .collect()
    }

    #[test]
    fn single_day_trip() {
        let plan = engine().compute(&input(660.0, 11.0, 0.0)).unwrap();

        assert_eq!(plan.daily_logs.len(), 1);
        let day = &plan.daily_logs[0];
        assert_eq!(day.driving_hours, 11.0);
        assert_eq!(day.on_duty_hours, 2.0);
        assert_eq!(day.off_duty_hours, 11.0);
        assert!(fuel_distances(&plan).is_empty());
        assert!(plan.truncated.is_none());

        let labels: Vec<_> = plan.intervals.iter().map(|i| i.activity_label).collect();
        assert_eq!(
            labels,
            vec![
                Activity::Pickup,
                Activity::Driving,
                Activity::Break,
                Activity::Driving,
                Activity::Dropoff
            ]
        );
        assert_eq!(plan.intervals[2].start_time.hour(), 15);
        assert_eq!(plan.intervals[4].end_time.hour(), 19);
        assert_eq!(plan.intervals[4].end_time.minute(), 30);
    }

    #[test]
    fn fuel_stops_at_each_thousand_miles() {
        let plan = engine().compute(&input(2015.5, 33.6, 0.0)).unwrap();

        let fuel = fuel_distances(&plan);
        assert_eq!(fuel.len(), 2);
        assert!((fuel[0] - 1000.0).abs() < 1e-6);
        assert!((fuel[1] - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn fuel_threshold_at_trip_end_is_skipped() {
        let plan = engine().compute(&input(2000.0, 33.0, 0.0)).unwrap();
        assert_eq!(fuel_distances(&plan).len(), 1);
    }

    #[test]
    fn exhausted_cycle_is_rejected() {
        let err = engine().compute(&input(660.0, 11.0, 69.5)).unwrap_err();
        assert!(matches!(err, ScheduleError::Unschedulable { .. }));
        assert!(err.to_string().contains("70-hour/8-day cycle"));
    }

    #[test]
    fn truncate_policy_reports_remaining_driving() {
        let config = EngineConfig {
            cycle_policy: CyclePolicy::Truncate,
            ..Default::default()
        };
        let plan = ScheduleOrchestrator::new(config)
            .compute(&input(600.0, 10.0, 65.0))
            .unwrap();

        // Pickup takes 1 h of the remaining 5, leaving 4 h of driving.
        let truncated = plan.truncated.unwrap();
        assert!((truncated.driving_hours - 6.0).abs() < 1e-6);
        assert!((truncated.distance_miles - 360.0).abs() < 1e-6);
        assert!((plan.driving_hours() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn truncate_without_progress_is_still_unschedulable() {
        let config = EngineConfig {
            cycle_policy: CyclePolicy::Truncate,
            ..Default::default()
        };
        let err = ScheduleOrchestrator::new(config)
            .compute(&input(660.0, 11.0, 69.5))
            .unwrap_err();
        assert_eq!(err.code(), "UNSCHEDULABLE");
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        for bad in [
            input(0.0, 11.0, 0.0),
            input(-5.0, 11.0, 0.0),
            input(660.0, 0.0, 0.0),
            input(f64::NAN, 11.0, 0.0),
            input(660.0, f64::INFINITY, 0.0),
            input(660.0, 11.0, -1.0),
            input(660.0, 11.0, 70.5),
        ] {
            let err = engine().compute(&bad).unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT", "{:?}", bad);
        }
    }

    #[test]
    fn negligible_distance_or_hours_are_invalid_not_lost() {
        for bad in [input(5e-7, 2.0, 0.0), input(100.0, 5e-7, 0.0)] {
            let err = engine().compute(&bad).unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT", "{:?}", bad);
        }

        // Just above the tolerance the whole trip is still driven.
        let plan = engine().compute(&input(0.01, 0.001, 0.0)).unwrap();
        assert!((plan.driving_hours() - 0.001).abs() < 1e-9);
    }

    #[test]
    fn on_duty_blocks_may_outlast_the_window() {
        // 300 mph puts three fuel stops and the dropoff inside one window:
        // pickup 06:00, driving ends 19:30 at the 11-hour cap, dropoff runs
        // to 20:30. The window bounds driving only, so the last on-duty
        // block is allowed to end after 20:00.
        let plan = engine().compute(&input(3300.0, 11.0, 0.0)).unwrap();
        assert_eq!(fuel_distances(&plan).len(), 3);
        assert_windows_legal(&plan.intervals);

        let window_end = start() + chrono::Duration::hours(14);
        let last_drive = plan
            .intervals
            .iter()
            .filter(|i| i.status == DutyStatus::Driving)
            .last()
            .unwrap();
        assert!(last_drive.end_time <= window_end);

        let dropoff = plan.intervals.last().unwrap();
        assert_eq!(dropoff.activity_label, Activity::Dropoff);
        assert!(dropoff.end_time > window_end);
        assert!(dropoff.start_time <= window_end);
    }

    #[test]
    fn multi_day_trip_takes_resets() {
        let plan = engine().compute(&input(1500.0, 25.0, 0.0)).unwrap();

        let resets: Vec<_> = plan
            .intervals
            .iter()
            .filter(|i| i.activity_label == Activity::Reset)
            .collect();
        assert_eq!(resets.len(), 2);
        assert!(resets.iter().all(|r| r.status == DutyStatus::SleeperBerth));
        assert!(plan.daily_logs.len() >= 2);
        let last = plan.daily_logs.last().unwrap();
        assert!((last.total_vehicle_miles - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn off_duty_rest_status_is_honored() {
        let config = EngineConfig {
            rest_status: RestStatus::OffDuty,
            ..Default::default()
        };
        let plan = ScheduleOrchestrator::new(config)
            .compute(&input(1500.0, 25.0, 0.0))
            .unwrap();
        assert!(plan
            .intervals
            .iter()
            .filter(|i| i.activity_label == Activity::Reset)
            .all(|r| r.status == DutyStatus::OffDuty));
    }

    #[test]
    fn stops_follow_route_path() {
        let shape = RouteShape {
            waypoints: vec![Coordinates { lat: 34.0, lng: -118.0 }],
            path: vec![
                Coordinates { lat: 34.0, lng: -118.0 },
                Coordinates { lat: 34.0, lng: -98.0 },
            ],
            polyline: "abc".into(),
        };
        let plan = engine().compute_on(&input(1200.0, 20.0, 0.0), &shape).unwrap();
        assert_eq!(plan.route.polyline, "abc");
        assert!(plan.route.stops.iter().all(|s| s.lat.is_some() && s.lng.is_some()));
    }

    #[test]
    fn computation_is_deterministic() {
        let a = engine().compute(&input(2015.5, 33.6, 12.0)).unwrap();
        let b = engine().compute(&input(2015.5, 33.6, 12.0)).unwrap();
        assert_eq!(a, b);
    }

    /// Check the window rules over the committed stream.
    fn assert_windows_legal(intervals: &[DutyInterval]) {
        let limits = HosLimits::default();
        let mut window_start: Option<NaiveDateTime> = None;
        let mut driving = 0.0;
        for interval in intervals {
            let h = interval.duration_hours();
            match interval.status {
                DutyStatus::OffDuty | DutyStatus::SleeperBerth if h >= limits.reset_hours - EPSILON => {
                    window_start = None;
                    driving = 0.0;
                }
                // Non-driving work may run past the window end; it must
                // still start inside it.
                DutyStatus::OnDutyNotDriving => {
                    let opened = *window_start.get_or_insert(interval.start_time);
                    let started = as_hours(interval.start_time - opened);
                    assert!(started <= limits.on_duty_window_hours + EPSILON, "work starts {} h into window", started);
                }
                DutyStatus::Driving => {
                    let opened = *window_start.get_or_insert(interval.start_time);
                    let elapsed = as_hours(interval.end_time - opened);
                    assert!(elapsed <= limits.on_duty_window_hours + EPSILON, "window of {} h", elapsed);
                    driving += h;
                    assert!(driving <= limits.max_driving_hours + EPSILON, "{} h driving", driving);
                }
                _ => {}
            }
        }
    }

    proptest! {
        #[test]
        fn schedules_hold_invariants(
            distance in 1.0f64..2500.0,
            speed in 50.0f64..70.0,
            cycle in 0.0f64..15.0,
        ) {
            let trip = input(distance, distance / speed, cycle);
            let plan = engine().compute(&trip).unwrap();

            prop_assert!(ensure_contiguous(&plan.intervals).is_ok());
            prop_assert!((plan.driving_hours() - trip.total_driving_hours).abs() < 1e-6);
            for day in &plan.daily_logs {
                prop_assert!((day.total_hours() - 24.0).abs() < 1e-6);
            }
            for pair in plan.daily_logs.windows(2) {
                prop_assert_eq!(pair[0].log_date.succ_opt().unwrap(), pair[1].log_date);
            }
            assert_windows_legal(&plan.intervals);

            let expected_fuel = ((distance - 1e-6) / 1000.0).floor() as usize;
            prop_assert_eq!(fuel_distances(&plan).len(), expected_fuel);
            for (k, at) in fuel_distances(&plan).iter().enumerate() {
                prop_assert!((at - 1000.0 * (k + 1) as f64).abs() < 1e-6);
            }
        }
    }
}
