//! Concrete mode handler functions and table builder.
//!
//! Each mode is defined by plain `fn` pointers — no closures, no
//! dynamic dispatch, no heap. The handlers only contain each mode's
//! *per-tick behavior*; fault-driven transitions come from the failure
//! detector and the repair handshake through `force_transition`.
//!
//! ```text
//!  WAITING ──[level in band]──▶ READY ──[units ready]──▶ NORMAL
//!     │                                                  │  ▲
//!     │                              [non-level fault]   ▼  │ [repaired]
//!     │                                              DEGRADED
//!     │                                                  │  ▲
//!     │                                  [level fault]   ▼  │ [level repaired]
//!     │                                               RESCUE
//!     │
//!  Any mode ──[transmission / margin / double fault]──▶ EMERGENCY_STOP
//! ```

use super::context::TickContext;
use super::{Mode, ModeDescriptor};
use log::{error, info, warn};

use crate::expectation::Expectation;
use crate::mailbox::Message;
use crate::planner;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static mode table. Called once at startup.
pub fn build_mode_table() -> [ModeDescriptor; Mode::COUNT] {
    [
        // Index 0 — Waiting
        ModeDescriptor {
            id: Mode::Waiting,
            name: "Waiting",
            on_enter: None,
            on_exit: None,
            on_update: waiting_update,
        },
        // Index 1 — Ready
        ModeDescriptor {
            id: Mode::Ready,
            name: "Ready",
            on_enter: Some(ready_enter),
            on_exit: None,
            on_update: ready_update,
        },
        // Index 2 — Normal
        ModeDescriptor {
            id: Mode::Normal,
            name: "Normal",
            on_enter: Some(normal_enter),
            on_exit: None,
            on_update: normal_update,
        },
        // Index 3 — Degraded
        ModeDescriptor {
            id: Mode::Degraded,
            name: "Degraded",
            on_enter: Some(degraded_enter),
            on_exit: None,
            on_update: degraded_update,
        },
        // Index 4 — Rescue
        ModeDescriptor {
            id: Mode::Rescue,
            name: "Rescue",
            on_enter: Some(rescue_enter),
            on_exit: Some(rescue_exit),
            on_update: rescue_update,
        },
        // Index 5 — EmergencyStop
        ModeDescriptor {
            id: Mode::EmergencyStop,
            name: "EmergencyStop",
            on_enter: Some(emergency_enter),
            on_exit: None,
            on_update: emergency_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAITING — drive the level into the normal band before start-up
// ═══════════════════════════════════════════════════════════════════════════

fn waiting_update(ctx: &mut TickContext) -> Option<Mode> {
    if !ctx.intake.boiler_waiting {
        // the plant has not announced itself yet
        return None;
    }
    let level = ctx.intake.level;

    // Sanity: a waiting boiler produces no steam, and a level reading
    // outside the vessel is nonsense. Either means a sensor died before
    // start-up, and nothing is left to do but stop.
    if ctx.intake.steam != 0.0 {
        error!("steam {:.2} while waiting: sensor broken", ctx.intake.steam);
        return Some(Mode::EmergencyStop);
    }
    if level < 0.0 || level >= ctx.config.capacity {
        error!("level reading {level:.1} outside the vessel: sensor broken");
        return Some(Mode::EmergencyStop);
    }

    // An open valve must drain: a level that refuses to fall means the
    // valve or the sensor is dead, and we cannot tell which.
    if ctx.valve_open {
        if let Some(last) = ctx.last.level {
            if level >= last {
                error!("valve open but level did not fall ({last:.1} -> {level:.1})");
                return Some(Mode::EmergencyStop);
            }
        }
    }

    if level > ctx.config.normal_max {
        // drain toward the band
        if !ctx.valve_open {
            info!("initial level {level:.1} above band, opening evacuation valve");
            ctx.toggle_valve();
        }
        None
    } else if level < ctx.config.normal_min {
        initial_fill(ctx);
        if ctx.valve_open {
            ctx.toggle_valve();
        }
        None
    } else {
        // in band: everything off, hand over to the plant
        planner::command_full_set(ctx, 0);
        if ctx.valve_open {
            ctx.toggle_valve();
        }
        info!("initial level {level:.1} in band, program ready");
        ctx.outbox.send(Message::ProgramReady);
        Some(Mode::Ready)
    }
}

/// Open the pump set whose one-tick fill lands closest to the target.
fn initial_fill(ctx: &mut TickContext) {
    let target = ctx.config.target();
    let mut best = 1;
    let mut best_dist = f64::INFINITY;
    let mut predicted = ctx.intake.level;
    for k in 1..=ctx.config.pump_count {
        let next = ctx.intake.level + ctx.config.pump_tick_volume() * k as f64;
        let dist = (next - target).abs();
        if dist < best_dist {
            best = k;
            best_dist = dist;
            predicted = next;
        }
    }
    // steam is zero while waiting, so the fill prediction is exact
    ctx.expectation = Expectation::window(predicted, predicted);
    planner::command_full_set(ctx, best);
}

// ═══════════════════════════════════════════════════════════════════════════
//  READY — wait for the plant to acknowledge PROGRAM_READY
// ═══════════════════════════════════════════════════════════════════════════

fn ready_enter(_ctx: &mut TickContext) {
    info!("READY: waiting for physical units");
}

fn ready_update(ctx: &mut TickContext) -> Option<Mode> {
    if ctx.intake.units_ready {
        Some(Mode::Normal)
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  NORMAL — plan against the level reading with a clean plant
// ═══════════════════════════════════════════════════════════════════════════

fn normal_enter(ctx: &mut TickContext) {
    info!(
        "NORMAL: steering level toward {:.0}",
        ctx.config.target()
    );
}

fn normal_update(ctx: &mut TickContext) -> Option<Mode> {
    let level = ctx.intake.level;
    let plan = planner::plan(
        &ctx.config,
        level,
        level,
        ctx.intake.steam,
        0,
        0,
        false,
    );
    ctx.expectation = Expectation::window(plan.lo, plan.hi);
    planner::command_full_set(ctx, plan.count);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DEGRADED — plan around the latched faults
// ═══════════════════════════════════════════════════════════════════════════

fn degraded_enter(ctx: &mut TickContext) {
    warn!(
        "DEGRADED: operating with faults (locked on {}, locked off {})",
        ctx.faults.pumps_locked_on(),
        ctx.faults.pumps_locked_off()
    );
}

fn degraded_update(ctx: &mut TickContext) -> Option<Mode> {
    let level = ctx.intake.level;
    let steam = steam_for_planning(ctx);
    let plan = planner::plan(
        &ctx.config,
        level,
        level,
        steam,
        ctx.faults.pumps_locked_on(),
        ctx.faults.pumps_locked_off(),
        ctx.faults.is_faulted(crate::faults::Peripheral::Valve),
    );
    planner::command_respecting_faults(ctx, &plan);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  RESCUE — the level sensor lies; navigate on the prediction window
// ═══════════════════════════════════════════════════════════════════════════

fn rescue_enter(ctx: &mut TickContext) {
    warn!(
        "RESCUE: level sensor distrusted, navigating on predictions around {:.0}",
        ctx.config.target()
    );
}

fn rescue_exit(_ctx: &mut TickContext) {
    info!("RESCUE: level reading trusted again");
}

fn rescue_update(ctx: &mut TickContext) -> Option<Mode> {
    if ctx.probe.is_some() {
        // the reduced-capacity probe already commanded this tick's
        // pump set and prediction
        return None;
    }
    let (base_lo, base_hi) = match ctx.expectation {
        Expectation::Window { lo, hi } => (lo, hi),
        // no window to navigate by; assume the target and let the next
        // reading correct us
        Expectation::Unknown => (ctx.config.target(), ctx.config.target()),
    };
    let steam = steam_for_planning(ctx);
    let plan = planner::plan(
        &ctx.config,
        base_lo,
        base_hi,
        steam,
        ctx.faults.pumps_locked_on(),
        ctx.faults.pumps_locked_off(),
        ctx.faults.is_faulted(crate::faults::Peripheral::Valve),
    );
    planner::command_respecting_faults(ctx, &plan);
    None
}

/// Steam rate the planner may trust: the reading, unless the steam
/// sensor is flagged, in which case zero keeps the window's upper bound
/// conservative (the lower bound always assumes the maximum rate).
fn steam_for_planning(ctx: &TickContext) -> f64 {
    if ctx
        .faults
        .is_faulted(crate::faults::Peripheral::SteamSensor)
    {
        0.0
    } else {
        ctx.intake.steam
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  EMERGENCY_STOP — terminal
// ═══════════════════════════════════════════════════════════════════════════

fn emergency_enter(ctx: &mut TickContext) {
    error!(
        "EMERGENCY STOP at tick {}: controller can no longer guarantee the safety band",
        ctx.total_ticks
    );
}

fn emergency_update(_ctx: &mut TickContext) -> Option<Mode> {
    // nothing left to decide; the orchestrator re-emits the mode
    None
}
