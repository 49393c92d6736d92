//! Failure detector: decides which peripheral an anomaly implicates.
//!
//! Every operating tick the detector compares four observations per
//! pump (our last command `c`, the pump's reported state `p`, the
//! controller's reported state `s`) against the level-normality bit
//! `n` (reading inside the predicted window) and resolves the
//! combination with a truth table:
//!
//! ```text
//!  case │ s vs c │ p vs c │  n  │ conclusion
//!  ─────┼────────┼────────┼─────┼──────────────────────────────────────
//!    1  │  s = c │  p ≠ c │ yes │ pump reports wrong (TX)
//!    2  │  s = c │  p ≠ c │ no  │ pump stuck (direction: level vs T)
//!    3  │  s ≠ c │  p = s │ yes │ pump stuck in reported state s
//!    4  │  s ≠ c │  p = c │ no  │ pump stuck (direction: level vs window)
//!    5  │  s ≠ c │  p = c │ yes │ ambiguous — deferred one tick
//!    6  │  s ≠ c │  p ≠ c │ no  │ pump stuck (direction: level vs T)
//! ```
//!
//! A tick implicates at most one new peripheral. When every report is
//! consistent and the level is still out of the window, the level
//! sensor itself is flagged and the controller enters rescue; the next
//! tick gets one chance to re-explain that anomaly as a leaking valve
//! or a half-capacity pump before the diagnosis sticks.

use log::{info, warn};

use crate::config::TICK_SECS;
use crate::expectation::{Expectation, SLACK};
use crate::faults::{FaultKind, Peripheral};
use crate::fsm::context::TickContext;
use crate::fsm::Mode;
use crate::mailbox::Message;

// ---------------------------------------------------------------------------
// Carried diagnoses
// ---------------------------------------------------------------------------

/// A case-5 observation waiting for one more tick of level drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingDiagnosis {
    /// Controller `s` disagreed with command `c` while the pump agreed
    /// and the level was nominal: either the pump is quietly failing or
    /// the controller is. The drift direction decides.
    PumpOrController { pump: usize },
}

/// Evidence captured at the moment rescue is entered.
#[derive(Debug, Clone, PartialEq)]
pub struct RescueEntry {
    /// How far below the predicted window the reading fell (negative
    /// when the miss was high).
    pub shortfall: f64,
    /// Pumps that were commanded open during the anomalous tick.
    pub candidates: Vec<usize>,
}

/// In-progress hunt for a pump delivering below rated capacity: one
/// candidate pump runs alone per tick against a full-capacity
/// prediction until one falls short or the list runs out.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedProbe {
    candidates: Vec<usize>,
    current: usize,
}

impl ReducedProbe {
    /// The pump currently being exercised.
    pub fn current_pump(&self) -> usize {
        self.candidates[self.current]
    }

    #[cfg(test)]
    pub fn for_tests(candidates: Vec<usize>) -> Self {
        Self {
            candidates,
            current: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-tick entry point
// ---------------------------------------------------------------------------

/// Run the detector for one operating tick. Returns the mode the
/// controller should move to when something was implicated.
pub fn run(ctx: &mut TickContext, mode: Mode) -> Option<Mode> {
    if let Some(next) = resolve_pending(ctx) {
        return Some(next);
    }
    if ctx.last.rescue_entry.is_some() {
        if let Some(next) = resolve_rescue_entry(ctx) {
            return Some(next);
        }
    }
    if let Some(next) = check_steam(ctx, mode) {
        return Some(next);
    }
    // With the level sensor distrusted the normality bit is
    // meaningless, so pump reports cannot be judged until the sensor is
    // repaired (at most one fault at a time). The same applies while a
    // probe owns the pump set: its window and commands describe the
    // *next* reading, not this one.
    if mode != Mode::Rescue && ctx.probe.is_none() {
        if let Some(next) = check_pumps(ctx) {
            return Some(next);
        }
        if let Some(next) = check_level(ctx) {
            return Some(next);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Deferred case-5 resolution
// ---------------------------------------------------------------------------

fn resolve_pending(ctx: &mut TickContext) -> Option<Mode> {
    let PendingDiagnosis::PumpOrController { pump } = ctx.pending.take()?;
    let level = ctx.intake.level;

    if let Expectation::Window { lo, hi } = ctx.expectation {
        if level < lo {
            // the pump quietly stopped delivering
            warn!("deferred diagnosis: pump {pump} stuck closed (level drifted low)");
            ctx.faults.set(Peripheral::Pump(pump), FaultKind::StuckOff);
            ctx.pump_commanded[pump] = false;
            ctx.outbox.send(Message::PumpFailureDetection(pump));
            return Some(Mode::Degraded);
        }
        if level > hi {
            // the controller is holding its pump open
            warn!("deferred diagnosis: controller {pump} stuck (level drifted high)");
            ctx.faults
                .set(Peripheral::PumpController(pump), FaultKind::StuckOn);
            ctx.pump_commanded[pump] = true;
            ctx.outbox.send(Message::PumpControlFailureDetection(pump));
            return Some(Mode::Degraded);
        }
    }

    // no drift: the physical side behaved, so the controller's report
    // was the lie
    warn!("deferred diagnosis: controller {pump} reports wrong");
    ctx.faults
        .set(Peripheral::PumpController(pump), FaultKind::TxWrong);
    ctx.outbox.send(Message::PumpControlFailureDetection(pump));
    Some(Mode::Degraded)
}

// ---------------------------------------------------------------------------
// Fresh-rescue re-explanation
// ---------------------------------------------------------------------------

/// One tick after entering rescue, try to pin the anomaly on a cheaper
/// culprit than the level sensor.
fn resolve_rescue_entry(ctx: &mut TickContext) -> Option<Mode> {
    let entry = ctx.last.rescue_entry.take()?;
    let last_level = ctx.last.level?;
    let level = ctx.intake.level;

    // Valve hypothesis: a stuck-open valve drains a full tick of
    // evacuation on top of the ordinary pump/steam balance.
    let avg_steam = (ctx.last.steam + ctx.intake.steam) / 2.0;
    let leaked = last_level
        + TICK_SECS * (ctx.commanded_inflow() - avg_steam - ctx.config.valve_rate);
    if (level - leaked).abs() <= SLACK {
        info!("rescue anomaly re-explained: evacuation valve leaking");
        ctx.faults.retract(Peripheral::LevelSensor);
        ctx.faults.set(Peripheral::Valve, FaultKind::Defective);
        // the old window predates the revised diagnosis; planning
        // restarts from the (again trusted) reading
        ctx.expectation = Expectation::Unknown;
        return Some(Mode::Degraded);
    }

    // Half-capacity hypothesis: the shortfall at the anomaly matched
    // one pump delivering half its rating.
    let half_pump = ctx.config.pump_tick_volume() / 2.0;
    if !entry.candidates.is_empty()
        && (entry.shortfall - half_pump).abs() <= ctx.config.pump_capacity
    {
        info!(
            "rescue anomaly consistent with a half-capacity pump; probing {:?}",
            entry.candidates
        );
        start_probe(ctx, entry.candidates);
    }
    None
}

// ---------------------------------------------------------------------------
// Reduced-capacity probe
// ---------------------------------------------------------------------------

fn start_probe(ctx: &mut TickContext, candidates: Vec<usize>) {
    let probe = ReducedProbe {
        candidates,
        current: 0,
    };
    command_probe_candidate(ctx, probe.current_pump());
    ctx.probe = Some(probe);
}

/// Evaluate the candidate exercised during the previous tick and either
/// convict it, move to the next candidate, or fall back to the
/// level-sensor diagnosis.
pub fn resolve_probe(ctx: &mut TickContext) -> Option<Mode> {
    let mut probe = ctx.probe.take()?;
    let pump = probe.current_pump();

    let below_window = ctx
        .expectation
        .lo()
        .is_some_and(|lo| ctx.intake.level < lo);
    if below_window {
        // running alone against a full-capacity prediction and falling
        // short convicts this pump
        warn!("probe: pump {pump} delivers below rated capacity");
        ctx.faults.set(Peripheral::Pump(pump), FaultKind::Reduced);
        ctx.outbox.send(Message::PumpFailureDetection(pump));
        ctx.faults.retract(Peripheral::LevelSensor);
        // the full-capacity prediction just failed by design; planning
        // restarts from the reading
        ctx.expectation = Expectation::Unknown;
        return Some(ctx.faults.recovery_mode());
    }

    probe.current += 1;
    if probe.current >= probe.candidates.len() {
        // no pump fell short; the level sensor really is at fault
        info!("probe exhausted; level-sensor diagnosis stands");
        return None;
    }
    command_probe_candidate(ctx, probe.current_pump());
    ctx.probe = Some(probe);
    None
}

/// Run exactly one pump and predict its effect at full rating.
fn command_probe_candidate(ctx: &mut TickContext, pump: usize) {
    info!("probe: exercising pump {pump} alone");
    for i in 0..ctx.config.pump_count {
        if i == pump {
            ctx.open_pump(i);
        } else {
            ctx.close_pump(i);
        }
    }
    let base = ctx.intake.level;
    let inflow = ctx.config.pump_tick_volume();
    let hi = base + inflow - TICK_SECS * ctx.intake.steam;
    let lo = base + inflow - TICK_SECS * ctx.config.max_steam_rate;
    ctx.expectation = Expectation::window(lo, hi);
}

// ---------------------------------------------------------------------------
// Valve-return check
// ---------------------------------------------------------------------------

/// While the valve is flagged broken, watch for the drain disappearing:
/// a reading one tick of evacuation above the leak-adjusted prediction
/// means the valve has sealed again. Returns `true` when the fault was
/// cleared (the caller re-selects the mode).
pub fn check_valve_return(ctx: &mut TickContext) -> bool {
    if !ctx.faults.is_faulted(Peripheral::Valve) {
        return false;
    }
    let Some(hi) = ctx.expectation.hi() else {
        return false;
    };
    let sealed = hi - SLACK + ctx.config.valve_tick_volume();
    if (ctx.intake.level - sealed).abs() <= SLACK {
        info!("valve drain no longer observed; clearing valve fault");
        ctx.faults.retract(Peripheral::Valve);
        // the leak-adjusted window no longer describes the plant
        ctx.expectation = Expectation::Unknown;
        return true;
    }
    false
}

// ---------------------------------------------------------------------------
// Steam sanity
// ---------------------------------------------------------------------------

fn check_steam(ctx: &mut TickContext, mode: Mode) -> Option<Mode> {
    if ctx.faults.is_faulted(Peripheral::SteamSensor) {
        return None;
    }
    let steam = ctx.intake.steam;
    let nonsense =
        steam < 0.0 || steam > ctx.config.max_steam_rate || steam < ctx.last.steam;
    if !nonsense {
        return None;
    }
    warn!(
        "steam reading {steam:.2} impossible (last {:.2}, max {:.2})",
        ctx.last.steam, ctx.config.max_steam_rate
    );
    ctx.faults.set(Peripheral::SteamSensor, FaultKind::Defective);
    ctx.outbox.send(Message::SteamFailureDetection);
    if mode == Mode::Rescue {
        // navigating on predictions with neither trusted sensor is not
        // survivable
        Some(Mode::EmergencyStop)
    } else {
        Some(Mode::Degraded)
    }
}

// ---------------------------------------------------------------------------
// Pump / controller truth table
// ---------------------------------------------------------------------------

fn check_pumps(ctx: &mut TickContext) -> Option<Mode> {
    let normal = ctx.level_in_window();
    let level = ctx.intake.level;
    let target = ctx.config.target();

    for i in 0..ctx.config.pump_count {
        // reports from already-implicated hardware prove nothing new
        if ctx.faults.is_faulted(Peripheral::Pump(i))
            || ctx.faults.is_faulted(Peripheral::PumpController(i))
        {
            continue;
        }
        let c = ctx.pump_commanded[i];
        let p = ctx.intake.pump_state[i];
        let s = ctx.intake.control_state[i];
        if p == c && s == c {
            continue;
        }

        if s == c {
            // p ≠ c
            let kind = if normal {
                // case 1: the pump obeys (controller confirms) but
                // reports the opposite
                FaultKind::TxWrong
            } else if level > target {
                // case 2
                FaultKind::StuckOn
            } else {
                FaultKind::StuckOff
            };
            latch_pump(ctx, i, kind);
            return Some(Mode::Degraded);
        }

        if p == c {
            if normal {
                // case 5: controller disagrees but nothing else does.
                // Wait one tick for the level to take sides.
                warn!("pump {i}: controller report disagrees, level nominal; deferring");
                ctx.pending = Some(PendingDiagnosis::PumpOrController { pump: i });
                return None;
            }
            // case 4: direction from which side of the window broke
            let kind = match ctx.expectation.hi() {
                Some(hi) if level > hi => FaultKind::StuckOn,
                _ => FaultKind::StuckOff,
            };
            latch_pump(ctx, i, kind);
            return Some(Mode::Degraded);
        }

        // s ≠ c and p ≠ c, hence p = s
        let kind = if normal {
            // case 3: both reports agree the pump is in state s
            if s {
                FaultKind::StuckOn
            } else {
                FaultKind::StuckOff
            }
        } else if level > target {
            // case 6
            FaultKind::StuckOn
        } else {
            FaultKind::StuckOff
        };
        latch_pump(ctx, i, kind);
        return Some(Mode::Degraded);
    }
    None
}

/// Latch a pump fault, align the commanded record with the physical
/// truth for stuck pumps, and report the failure.
fn latch_pump(ctx: &mut TickContext, i: usize, kind: FaultKind) {
    ctx.faults.set(Peripheral::Pump(i), kind);
    match kind {
        FaultKind::StuckOn => ctx.pump_commanded[i] = true,
        FaultKind::StuckOff => ctx.pump_commanded[i] = false,
        _ => {}
    }
    ctx.outbox.send(Message::PumpFailureDetection(i));
}

// ---------------------------------------------------------------------------
// Level normality
// ---------------------------------------------------------------------------

fn check_level(ctx: &mut TickContext) -> Option<Mode> {
    if ctx.faults.is_faulted(Peripheral::LevelSensor) || ctx.level_in_window() {
        return None;
    }
    let level = ctx.intake.level;
    if level < ctx.config.limit_min || level > ctx.config.limit_max {
        warn!("level sensor clear break: reading {level:.1}");
    } else {
        warn!("level sensor subtle failure: reading {level:.1} outside predicted window");
    }

    // capture the evidence so next tick can try the valve-leak and
    // half-capacity re-explanations
    let shortfall = ctx.expectation.lo().map_or(0.0, |lo| lo - level);
    let candidates: Vec<usize> = (0..ctx.config.pump_count)
        .filter(|&i| ctx.pump_commanded[i])
        .collect();
    ctx.last.rescue_entry = Some(RescueEntry {
        shortfall,
        candidates,
    });

    ctx.faults
        .set(Peripheral::LevelSensor, FaultKind::Defective);
    ctx.outbox.send(Message::LevelFailureDetection);
    Some(Mode::Rescue)
}
