//! Pump-count planner and pump commanding.
//!
//! Each tick the controller picks the number of pumps to run so that
//! the middle of the predicted level window lands closest to the target
//! level. The same scan also yields the prediction window the failure
//! detector will judge the next reading against.
//!
//! The per-tick level balance for `k` healthy pumps is
//!
//! ```text
//!   next = level + 5·Q·k − 5·steam          (steam holds)
//!   next = level + 5·Q·k − 5·W              (steam ramps to max)
//! ```
//!
//! so the reachable range is `[lo, hi]` with `hi` from the current
//! steam reading and `lo` from the worst-case rate. A broken valve
//! drains a further `5·E` from both bounds.

use log::debug;

use crate::config::{BoilerConfig, TICK_SECS};
use crate::expectation::Expectation;
use crate::faults::{FaultKind, Peripheral};
use crate::fsm::context::TickContext;

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Result of one planning pass: how many pumps to run, and the raw
/// (slack-free) level bounds that choice predicts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpPlan {
    pub count: usize,
    pub lo: f64,
    pub hi: f64,
}

/// Select the pump count whose predicted mid-range is closest to the
/// target level.
///
/// `base_lo`/`base_hi` are the level the prediction starts from: the
/// reading itself in level-trusting modes, the previous prediction
/// window in rescue. `steam` is the current reading, substituted with
/// zero by the caller while the steam sensor is distrusted. The scan
/// covers `k ∈ [locked_on, P − locked_off]`: pumps stuck open are
/// always delivering, pumps stuck closed never can.
pub fn plan(
    config: &BoilerConfig,
    base_lo: f64,
    base_hi: f64,
    steam: f64,
    locked_on: usize,
    locked_off: usize,
    valve_broken: bool,
) -> PumpPlan {
    let target = config.target();
    let leak = if valve_broken {
        config.valve_tick_volume()
    } else {
        0.0
    };

    let k_max = config.pump_count - locked_off;
    let mut best = None;
    let mut best_dist = f64::INFINITY;
    for k in locked_on..=k_max {
        let inflow = config.pump_tick_volume() * k as f64;
        let hi = base_hi + inflow - TICK_SECS * steam - leak;
        let lo = base_lo + inflow - TICK_SECS * config.max_steam_rate - leak;
        let dist = ((hi + lo) / 2.0 - target).abs();
        if dist < best_dist {
            best_dist = dist;
            best = Some(PumpPlan { count: k, lo, hi });
        }
    }

    // locked_on ≤ P − locked_off always holds (a pump cannot be stuck
    // both ways), so the scan is never empty.
    let plan = best.unwrap_or(PumpPlan {
        count: locked_on,
        lo: base_lo,
        hi: base_hi,
    });
    debug!(
        "planned {} pumps, window [{:.1}, {:.1}]",
        plan.count, plan.lo, plan.hi
    );
    plan
}

// ---------------------------------------------------------------------------
// Commanding
// ---------------------------------------------------------------------------

/// Open pumps `0..count` and close the rest. Only valid while every
/// pump is healthy (normal mode and initial fill).
pub fn command_full_set(ctx: &mut TickContext, count: usize) {
    for i in 0..ctx.config.pump_count {
        if i < count {
            ctx.open_pump(i);
        } else {
            ctx.close_pump(i);
        }
    }
}

/// Open enough pumps to meet the plan while respecting the fault
/// registry, and record the resulting window in the context.
///
/// Locked-on pumps consume quota first (they deliver whether we like it
/// or not). Healthy pumps fill the remainder; if they run out, reduced
/// pumps are pressed into service and the window's lower edge is
/// widened by half a tick-volume each, since such a pump may deliver as
/// little as half its rating over the tick. Every commandable pump not
/// needed is closed — in particular, reduced pumps never idle open.
pub fn command_respecting_faults(ctx: &mut TickContext, plan: &PumpPlan) {
    ctx.expectation = Expectation::window(plan.lo, plan.hi);

    let pump_count = ctx.config.pump_count;
    let mut quota = plan.count;
    for i in 0..pump_count {
        if ctx.faults.pump_forced_on(i) {
            quota = quota.saturating_sub(1);
        }
    }

    let mut opened = vec![false; pump_count];
    for i in 0..pump_count {
        if quota == 0 {
            break;
        }
        if open_eligible(ctx, i) {
            ctx.open_pump(i);
            opened[i] = true;
            quota -= 1;
        }
    }
    for i in 0..pump_count {
        if quota == 0 {
            break;
        }
        if pump_reduced(ctx, i) && !opened[i] {
            ctx.open_pump(i);
            opened[i] = true;
            quota -= 1;
            ctx.expectation.widen_lo(ctx.config.pump_tick_volume() / 2.0);
        }
    }

    for i in 0..pump_count {
        if pump_locked(ctx, i) || opened[i] {
            continue;
        }
        ctx.close_pump(i);
    }
}

/// Physically forced on or off; commands to it are meaningless.
fn pump_locked(ctx: &TickContext, i: usize) -> bool {
    ctx.faults.pump_forced_on(i) || ctx.faults.pump_forced_off(i)
}

fn pump_reduced(ctx: &TickContext, i: usize) -> bool {
    ctx.faults
        .fault(Peripheral::Pump(i))
        .is_some_and(|f| f.kind == FaultKind::Reduced)
}

/// A pump we may open at full trust: its own slot is clean (or a
/// transmission fault the plant has acknowledged, so the pump itself
/// works), and its controller is not diagnosed as stuck.
fn open_eligible(ctx: &TickContext, i: usize) -> bool {
    let pump_ok = match ctx.faults.fault(Peripheral::Pump(i)) {
        None => true,
        Some(f) => f.kind == FaultKind::TxWrong && f.acknowledged,
    };
    let controller_ok = match ctx.faults.fault(Peripheral::PumpController(i)) {
        None => true,
        Some(f) => f.kind == FaultKind::TxWrong && f.acknowledged,
    };
    pump_ok && controller_ok
}
