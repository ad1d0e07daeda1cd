//! Rolling 70-hour/8-day on-duty ceiling

use std::str::FromStr;

use super::{ScheduleError, EPSILON};

/// What happens when the cycle runs out before the trip is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Fail the computation. No restart provision is modeled.
    #[default]
    Reject,
    /// Stop the trip where the cycle ran out and report what was left.
    Truncate,
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(CyclePolicy::Reject),
            "truncate" => Ok(CyclePolicy::Truncate),
            other => Err(format!("unknown cycle policy '{}'", other)),
        }
    }
}

/// Budget check against the cycle ceiling. The running total itself lives
/// in `DutyState::cycle_hours_used` so it travels with the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTracker {
    limit_hours: f64,
    policy: CyclePolicy,
}

impl CycleTracker {
    pub const LIMIT_NAME: &'static str = "70-hour/8-day cycle";

    pub fn new(limit_hours: f64, policy: CyclePolicy) -> Self {
        Self { limit_hours, policy }
    }

    pub fn policy(&self) -> CyclePolicy {
        self.policy
    }

    /// Hours of the request that fit under the ceiling, `0 ≤ allowed ≤ requested`.
    pub fn can_drive_or_work(&self, hours_requested: f64, cycle_hours_used_so_far: f64) -> f64 {
        let remaining = self.remaining(cycle_hours_used_so_far);
        let allowed = hours_requested.min(remaining).max(0.0);
        if allowed <= EPSILON {
            0.0
        } else {
            allowed
        }
    }

    fn remaining(&self, cycle_hours_used_so_far: f64) -> f64 {
        (self.limit_hours - cycle_hours_used_so_far).max(0.0)
    }

    /// Error reported when the ceiling stops the trip.
    pub fn exhausted(&self, cycle_hours_used_so_far: f64, pending: &str) -> ScheduleError {
        ScheduleError::Unschedulable {
            limit: Self::LIMIT_NAME.to_string(),
            detail: format!(
                "{:.2} of {:.0} on-duty hours used, {} cannot be scheduled",
                cycle_hours_used_so_far, self.limit_hours, pending
            ),
        }
    }
}

impl Default for CycleTracker {
    fn default() -> Self {
        Self::new(70.0, CyclePolicy::Reject)
    }
}
