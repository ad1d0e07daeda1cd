//! Wall-clock simulation of the driving day.
//!
//! Each call looks at the current duty state and emits the next legal
//! piece of the schedule: a mandated rest, or the longest driving stretch
//! the limits allow. Limits are checked in priority order:
//!
//! 1. 8 hours of driving since the last 30-minute break → break
//! 2. 11-hour driving cap and 14-hour window → 10-hour reset
//! 3. the cycle budget
//!
//! When the break falls due while a reset is also due, or within half an
//! hour of the end of the window, only the reset is taken.

use chrono::NaiveDateTime;

use super::interval::{as_hours, Activity, DutyInterval, DutyStatus};
use super::cycle::CycleTracker;
use super::{HosLimits, RestStatus, EPSILON};

/// Duty state threaded through every simulation step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DutyState {
    /// Start of the current on-duty window; `None` right after a reset
    pub window_start: Option<NaiveDateTime>,
    pub driving_hours_in_window: f64,
    /// Driving since the last qualifying 30-minute non-driving period
    pub hours_since_break: f64,
    pub cycle_hours_used: f64,
}

impl DutyState {
    /// State of a driver coming off a qualifying rest.
    pub fn rested(cycle_hours_used: f64) -> Self {
        Self {
            cycle_hours_used,
            ..Default::default()
        }
    }

    /// Fold one interval into the state.
    pub fn record(&mut self, interval: &DutyInterval, limits: &HosLimits) {
        let h = interval.duration_hours();
        match interval.status {
            DutyStatus::Driving => {
                self.window_start.get_or_insert(interval.start_time);
                self.driving_hours_in_window += h;
                self.hours_since_break += h;
                self.cycle_hours_used += h;
            }
            DutyStatus::OnDutyNotDriving => {
                self.window_start.get_or_insert(interval.start_time);
                self.cycle_hours_used += h;
                if h >= limits.break_hours - EPSILON {
                    self.hours_since_break = 0.0;
                }
            }
            DutyStatus::OffDuty | DutyStatus::SleeperBerth => {
                if h >= limits.reset_hours - EPSILON {
                    self.window_start = None;
                    self.driving_hours_in_window = 0.0;
                    self.hours_since_break = 0.0;
                } else if h >= limits.break_hours - EPSILON {
                    self.hours_since_break = 0.0;
                }
            }
        }
    }

    /// Hours since the window opened (0 when no window is open).
    pub fn window_elapsed(&self, cursor: NaiveDateTime) -> f64 {
        self.window_start
            .map(|start| as_hours(cursor - start))
            .unwrap_or(0.0)
    }
}

/// Result of one simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub intervals: Vec<DutyInterval>,
    pub cursor: NaiveDateTime,
    pub state: DutyState,
    /// The cycle ceiling stopped the step short of what was asked.
    pub blocked: bool,
}

impl Advance {
    fn new(cursor: NaiveDateTime, state: DutyState) -> Self {
        Self {
            intervals: Vec::new(),
            cursor,
            state,
            blocked: false,
        }
    }

    fn push(&mut self, interval: DutyInterval, limits: &HosLimits) {
        self.state.record(&interval, limits);
        self.cursor = interval.end_time;
        self.intervals.push(interval);
    }

    /// Nothing left to drive.
    pub fn is_finished(&self) -> bool {
        self.intervals.is_empty() && !self.blocked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rest {
    Break,
    Reset,
}

/// Emits rests and driving stretches under the HOS limits.
#[derive(Debug, Clone, Copy)]
pub struct ClockSimulator {
    limits: HosLimits,
    rest_status: RestStatus,
}

impl ClockSimulator {
    pub fn new(limits: HosLimits, rest_status: RestStatus) -> Self {
        Self { limits, rest_status }
    }

    pub fn limits(&self) -> &HosLimits {
        &self.limits
    }

    fn window_remaining(&self, state: &DutyState, cursor: NaiveDateTime) -> f64 {
        self.limits.on_duty_window_hours - state.window_elapsed(cursor)
    }

    fn driving_remaining(&self, state: &DutyState) -> f64 {
        self.limits.max_driving_hours - state.driving_hours_in_window
    }

    fn break_remaining(&self, state: &DutyState) -> f64 {
        self.limits.break_after_driving_hours - state.hours_since_break
    }

    fn mandated_rest(&self, state: &DutyState, cursor: NaiveDateTime) -> Option<Rest> {
        let window = self.window_remaining(state, cursor);
        let reset_due = window <= EPSILON || self.driving_remaining(state) <= EPSILON;
        if self.break_remaining(state) <= EPSILON {
            if reset_due || window - self.limits.break_hours <= EPSILON {
                return Some(Rest::Reset);
            }
            return Some(Rest::Break);
        }
        reset_due.then_some(Rest::Reset)
    }

    fn rest_interval(&self, rest: Rest, cursor: NaiveDateTime) -> DutyInterval {
        match rest {
            Rest::Reset => DutyInterval::new(
                cursor,
                self.limits.reset_hours,
                self.rest_status.duty_status(),
                Activity::Reset,
            ),
            Rest::Break => DutyInterval::new(
                cursor,
                self.limits.break_hours,
                DutyStatus::OffDuty,
                Activity::Break,
            ),
        }
    }

    /// Emit the next piece of the driving schedule.
    ///
    /// Returns either a single mandated rest or a single driving stretch
    /// that covers distance and hours in proportion. An empty, unblocked
    /// result means there is nothing left to drive.
    pub fn advance(
        &self,
        remaining_distance: f64,
        remaining_drive_hours: f64,
        cursor: NaiveDateTime,
        state: &DutyState,
        cycle: &CycleTracker,
    ) -> Advance {
        let mut step = Advance::new(cursor, state.clone());
        if remaining_distance <= EPSILON || remaining_drive_hours <= EPSILON {
            return step;
        }

        if let Some(rest) = self.mandated_rest(state, cursor) {
            step.push(self.rest_interval(rest, cursor), &self.limits);
            return step;
        }

        let legal = self
            .driving_remaining(state)
            .min(self.window_remaining(state, cursor))
            .min(self.break_remaining(state));
        let allowed = cycle.can_drive_or_work(legal.min(remaining_drive_hours), state.cycle_hours_used);
        if allowed <= 0.0 {
            step.blocked = true;
            return step;
        }

        let (drive_hours, miles) = if allowed >= remaining_drive_hours - EPSILON {
            (remaining_drive_hours, remaining_distance)
        } else {
            (allowed, remaining_distance * allowed / remaining_drive_hours)
        };
        step.push(DutyInterval::driving(cursor, drive_hours, miles), &self.limits);
        step
    }

    /// Schedule a non-driving on-duty block such as a pickup or fuel stop.
    ///
    /// The 14-hour window and the 11-hour cap only restrict driving, so the
    /// block starts at the cursor even past the end of the window. Only the
    /// cycle can shorten it.
    pub fn on_duty(
        &self,
        duration_hours: f64,
        activity: Activity,
        cursor: NaiveDateTime,
        state: &DutyState,
        cycle: &CycleTracker,
    ) -> Advance {
        let mut step = Advance::new(cursor, state.clone());

        let allowed = cycle.can_drive_or_work(duration_hours, state.cycle_hours_used);
        if allowed > 0.0 {
            let block = DutyInterval::new(cursor, allowed, DutyStatus::OnDutyNotDriving, activity);
            step.push(block, &self.limits);
        }
        if allowed < duration_hours - EPSILON {
            step.blocked = true;
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hos::interval::hours;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 21).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn clock() -> ClockSimulator {
        ClockSimulator::new(HosLimits::default(), RestStatus::SleeperBerth)
    }

    fn state(window_start: Option<NaiveDateTime>, driving: f64, since_break: f64) -> DutyState {
        DutyState {
            window_start,
            driving_hours_in_window: driving,
            hours_since_break: since_break,
            cycle_hours_used: 0.0,
        }
    }

    #[test]
    fn fresh_driver_drives_until_break_is_due() {
        let cycle = CycleTracker::default();
        let step = clock().advance(1200.0, 20.0, at(6, 0), &DutyState::rested(0.0), &cycle);

        assert_eq!(step.intervals.len(), 1);
        let drive = &step.intervals[0];
        assert_eq!(drive.status, DutyStatus::Driving);
        assert_eq!(drive.duration_hours(), 8.0);
        assert!((drive.distance_covered_miles - 480.0).abs() < 1e-9);
        assert_eq!(step.state.window_start, Some(at(6, 0)));
        assert_eq!(step.cursor, at(14, 0));
    }

    #[test]
    fn break_is_emitted_after_eight_hours() {
        let cycle = CycleTracker::default();
        let s = state(Some(at(6, 0)), 8.0, 8.0);
        let step = clock().advance(300.0, 5.0, at(14, 0), &s, &cycle);

        let rest = &step.intervals[0];
        assert_eq!(rest.activity_label, Activity::Break);
        assert_eq!(rest.status, DutyStatus::OffDuty);
        assert_eq!(rest.duration_hours(), 0.5);
        assert_eq!(step.state.hours_since_break, 0.0);
        assert_eq!(step.state.window_start, Some(at(6, 0)));
    }

    #[test]
    fn eleven_hour_cap_forces_reset() {
        let cycle = CycleTracker::default();
        let s = state(Some(at(6, 0)), 11.0, 3.0);
        let step = clock().advance(300.0, 5.0, at(17, 30), &s, &cycle);

        let rest = &step.intervals[0];
        assert_eq!(rest.activity_label, Activity::Reset);
        assert_eq!(rest.status, DutyStatus::SleeperBerth);
        assert_eq!(rest.duration_hours(), 10.0);
        assert_eq!(step.state, DutyState::rested(0.0));
    }

    #[test]
    fn window_end_forces_reset_even_with_driving_left() {
        let cycle = CycleTracker::default();
        let s = state(Some(at(6, 0)), 6.0, 2.0);
        let step = clock().advance(300.0, 5.0, at(20, 0), &s, &cycle);
        assert_eq!(step.intervals[0].activity_label, Activity::Reset);
    }

    #[test]
    fn break_and_window_boundary_together_take_only_the_reset() {
        let cycle = CycleTracker::default();
        // 8 hours driven, window ends in 20 minutes: a break would leave no
        // usable window, so the longer rest wins.
        let s = state(Some(at(6, 0)), 8.0, 8.0);
        let step = clock().advance(300.0, 5.0, at(19, 40), &s, &cycle);

        assert_eq!(step.intervals.len(), 1);
        assert_eq!(step.intervals[0].activity_label, Activity::Reset);
    }

    #[test]
    fn break_due_with_driving_cap_spent_takes_only_the_reset() {
        let cycle = CycleTracker::default();
        let s = state(Some(at(6, 0)), 11.0, 8.0);
        let step = clock().advance(300.0, 5.0, at(17, 0), &s, &cycle);

        assert_eq!(step.intervals.len(), 1);
        assert_eq!(step.intervals[0].activity_label, Activity::Reset);
    }

    #[test]
    fn stretch_is_bounded_by_window() {
        let cycle = CycleTracker::default();
        let s = state(Some(at(6, 0)), 2.0, 2.0);
        let step = clock().advance(600.0, 10.0, at(17, 0), &s, &cycle);

        assert_eq!(step.intervals[0].duration_hours(), 3.0);
        assert_eq!(step.cursor, at(20, 0));
    }

    #[test]
    fn last_stretch_consumes_exact_remainder() {
        let cycle = CycleTracker::default();
        let step = clock().advance(123.4, 2.25, at(6, 0), &DutyState::rested(0.0), &cycle);

        let drive = &step.intervals[0];
        assert_eq!(drive.distance_covered_miles, 123.4);
        assert_eq!(drive.duration(), hours(2.25));
    }

    #[test]
    fn nothing_left_means_finished() {
        let cycle = CycleTracker::default();
        let step = clock().advance(0.0, 3.0, at(6, 0), &DutyState::rested(0.0), &cycle);
        assert!(step.is_finished());
    }

    #[test]
    fn exhausted_cycle_blocks_driving() {
        let cycle = CycleTracker::default();
        let step = clock().advance(300.0, 5.0, at(6, 0), &DutyState::rested(70.0), &cycle);
        assert!(step.blocked);
        assert!(step.intervals.is_empty());
    }

    #[test]
    fn cycle_budget_shortens_stretch() {
        let cycle = CycleTracker::default();
        let step = clock().advance(600.0, 10.0, at(6, 0), &DutyState::rested(67.0), &cycle);
        assert_eq!(step.intervals[0].duration_hours(), 3.0);
        assert!((step.state.cycle_hours_used - 70.0).abs() < 1e-9);
    }

    #[test]
    fn on_duty_block_may_run_past_window() {
        let cycle = CycleTracker::default();
        let s = state(Some(at(6, 0)), 10.0, 1.0);
        let step = clock().on_duty(1.0, Activity::Dropoff, at(19, 30), &s, &cycle);

        assert_eq!(step.intervals.len(), 1);
        assert_eq!(step.intervals[0].activity_label, Activity::Dropoff);
        assert_eq!(step.cursor, at(20, 30));
        assert_eq!(step.state.window_start, Some(at(6, 0)));

        // Driving afterwards must wait for the reset.
        let next = clock().advance(100.0, 2.0, step.cursor, &step.state, &cycle);
        assert_eq!(next.intervals[0].activity_label, Activity::Reset);
    }

    #[test]
    fn on_duty_block_after_driving_cap_is_allowed_inside_window() {
        let cycle = CycleTracker::default();
        let s = state(Some(at(6, 0)), 11.0, 3.0);
        let step = clock().on_duty(0.5, Activity::FuelStop, at(18, 0), &s, &cycle);

        assert_eq!(step.intervals.len(), 1);
        assert_eq!(step.intervals[0].activity_label, Activity::FuelStop);
        assert_eq!(step.state.hours_since_break, 0.0);
    }

    #[test]
    fn on_duty_block_is_truncated_by_cycle() {
        let cycle = CycleTracker::default();
        let step = clock().on_duty(1.0, Activity::Pickup, at(6, 0), &DutyState::rested(69.5), &cycle);

        assert!(step.blocked);
        assert_eq!(step.intervals.len(), 1);
        assert_eq!(step.intervals[0].duration_hours(), 0.5);
    }

    #[test]
    fn off_duty_rest_status_is_configurable() {
        let clock = ClockSimulator::new(HosLimits::default(), RestStatus::OffDuty);
        let cycle = CycleTracker::default();
        let s = state(Some(at(6, 0)), 11.0, 3.0);
        let step = clock.advance(100.0, 2.0, at(18, 0), &s, &cycle);
        assert_eq!(step.intervals[0].status, DutyStatus::OffDuty);
    }
}
