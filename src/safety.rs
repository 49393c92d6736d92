//! Safety-margin supervisor.
//!
//! Runs **every operating tick after commands are chosen** and decides
//! whether the plan can still keep the water inside the physical safety
//! band. Any violation is fatal: the controller stops the boiler before
//! the plant can leave the envelope, not after.
//!
//! Three families of check:
//!
//! 1. The prediction window itself crosses a safety limit.
//! 2. One-pump margin: the level is so close to a limit that a single
//!    misbehaving pump could push it across within a tick.
//! 3. Rescue capacity: while navigating blind, the pump set must be
//!    able to outrun the steam rate in both directions; if it cannot,
//!    no prediction will save us.

use core::fmt;

use crate::config::BoilerConfig;
use crate::expectation::Expectation;
use crate::fsm::context::TickContext;
use crate::fsm::Mode;

/// Why the safety supervisor demanded an emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyViolation {
    /// The predicted window reaches above the upper safety limit.
    PredictedAboveLimit,
    /// The predicted window reaches below the lower safety limit.
    PredictedBelowLimit,
    /// One pump-second of inflow could cross the upper limit.
    MarginHigh,
    /// One pump-second of outflow could cross the lower limit.
    MarginLow,
    /// In rescue, the runnable pumps cannot match the steam rate.
    RescueStarved,
    /// In rescue, the stuck-open pumps outrun the steam rate.
    RescueFlooded,
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PredictedAboveLimit => write!(f, "predicted level above upper safety limit"),
            Self::PredictedBelowLimit => write!(f, "predicted level below lower safety limit"),
            Self::MarginHigh => write!(f, "one-pump margin to upper limit exhausted"),
            Self::MarginLow => write!(f, "one-pump margin to lower limit exhausted"),
            Self::RescueStarved => write!(f, "runnable pumps cannot match steam rate"),
            Self::RescueFlooded => write!(f, "stuck-open pumps exceed steam rate"),
        }
    }
}

/// Safety supervisor. Holds the plant limits it judges against.
pub struct SafetyMonitor {
    limit_min: f64,
    limit_max: f64,
    pump_capacity: f64,
    pump_count: usize,
}

impl SafetyMonitor {
    pub fn new(config: &BoilerConfig) -> Self {
        Self {
            limit_min: config.limit_min,
            limit_max: config.limit_max,
            pump_capacity: config.pump_capacity,
            pump_count: config.pump_count,
        }
    }

    /// Judge the tick's chosen commands. `None` means the plan is safe.
    pub fn evaluate(&self, ctx: &TickContext, mode: Mode) -> Option<SafetyViolation> {
        if let Expectation::Window { lo, hi } = ctx.expectation {
            if hi > self.limit_max {
                return Some(SafetyViolation::PredictedAboveLimit);
            }
            if lo < self.limit_min {
                return Some(SafetyViolation::PredictedBelowLimit);
            }
        }

        if mode == Mode::Rescue {
            // the reading is untrusted; judge raw capacity instead
            let steam = ctx.intake.steam;
            let runnable =
                (self.pump_count - ctx.faults.pumps_locked_off()) as f64 * self.pump_capacity;
            if runnable < steam {
                return Some(SafetyViolation::RescueStarved);
            }
            let forced = ctx.faults.pumps_locked_on() as f64 * self.pump_capacity;
            if forced > steam {
                return Some(SafetyViolation::RescueFlooded);
            }
        } else {
            let level = ctx.intake.level;
            if level - self.pump_capacity <= self.limit_min {
                return Some(SafetyViolation::MarginLow);
            }
            if level + self.pump_capacity >= self.limit_max {
                return Some(SafetyViolation::MarginHigh);
            }
        }
        None
    }
}
