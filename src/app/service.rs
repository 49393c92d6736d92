//! Tick orchestrator: the hexagonal core.
//!
//! [`BoilerService`] owns the mode machine, the safety supervisor, and
//! the shared context, and wires the per-tick phases together:
//!
//! ```text
//!  incoming ──▶ ┌──────────────────────────────────────────┐
//!               │ intake → probe → valve → handshake →     │
//!               │ detector → mode dispatch → safety → MODE │──▶ outgoing
//!               └──────────────────────────────────────────┘
//! ```
//!
//! The mailboxes are borrowed for exactly one call; the controller
//! never retains references across ticks and performs no I/O of its
//! own. Phase order is fixed: intake validation, deferred-probe and
//! valve re-checks, the repair handshake, the failure detector, the
//! current mode's dispatch, the safety-margin check, and finally the
//! single MODE message every tick must carry.

use core::mem;

use log::{error, warn};

use crate::config::BoilerConfig;
use crate::detector;
use crate::error::Result;
use crate::faults::Peripheral;
use crate::fsm::context::TickContext;
use crate::fsm::states::build_mode_table;
use crate::fsm::{Fsm, Mode};
use crate::mailbox::{Mailbox, Message};
use crate::safety::SafetyMonitor;

// ───────────────────────────────────────────────────────────────
// BoilerService
// ───────────────────────────────────────────────────────────────

/// The controller core: a pure per-tick function plus private state.
pub struct BoilerService {
    fsm: Fsm,
    ctx: TickContext,
    safety: SafetyMonitor,
}

impl BoilerService {
    /// Construct the controller for a validated plant description.
    pub fn new(config: BoilerConfig) -> Result<Self> {
        config.validate()?;
        let safety = SafetyMonitor::new(&config);
        let ctx = TickContext::new(config);
        let fsm = Fsm::new(build_mode_table(), Mode::Waiting);
        Ok(Self { fsm, ctx, safety })
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Process one five-second clock signal: consume `incoming`,
    /// append this tick's output to `outgoing`, update internal state.
    pub fn clock(&mut self, incoming: &Mailbox, outgoing: &mut Mailbox) {
        self.ctx.outbox.clear();

        // 1–2. Intake. A mailbox we cannot parse is a transmission
        // failure, and a controller that cannot hear the plant stops it.
        match super::intake::parse(incoming, &self.ctx.config) {
            Ok(intake) => self.ctx.intake = intake,
            Err(e) => {
                error!("transmission failure: {e}");
                self.fsm.force_transition(Mode::EmergencyStop, &mut self.ctx);
                self.emit_mode(outgoing);
                return;
            }
        }

        // Terminal: only ever re-announce the stop.
        if self.fsm.current_mode() == Mode::EmergencyStop {
            self.emit_mode(outgoing);
            return;
        }

        // 3. Reduced-capacity probe in progress. A probe only makes
        // sense while the level sensor is under suspicion; if a repair
        // moved us out of rescue mid-probe, abandon it.
        if self.ctx.probe.is_some() {
            if self.fsm.current_mode() == Mode::Rescue {
                if let Some(next) = detector::resolve_probe(&mut self.ctx) {
                    self.fsm.force_transition(next, &mut self.ctx);
                }
            } else {
                self.ctx.probe = None;
            }
        }

        // 4. Valve-return check while the valve is flagged broken.
        if detector::check_valve_return(&mut self.ctx) {
            let next = self.ctx.faults.recovery_mode();
            self.fsm.force_transition(next, &mut self.ctx);
        }

        // 5. Repair handshake, then the failure detector.
        if matches!(self.fsm.current_mode(), Mode::Degraded | Mode::Rescue) {
            self.process_acknowledgements();
            self.process_repairs();
        }
        let mode = self.fsm.current_mode();
        if matches!(mode, Mode::Normal | Mode::Degraded | Mode::Rescue) {
            if let Some(next) = detector::run(&mut self.ctx, mode) {
                self.fsm.force_transition(next, &mut self.ctx);
            }
        }

        // 6. A fault may have been unrecoverable.
        if self.fsm.current_mode() == Mode::EmergencyStop {
            self.emit_mode(outgoing);
            return;
        }

        // 7. Current mode's per-tick behavior.
        self.fsm.tick(&mut self.ctx);

        // 8. Safety margins, judged against the commands just chosen.
        let mode = self.fsm.current_mode();
        if matches!(mode, Mode::Normal | Mode::Degraded | Mode::Rescue) {
            if let Some(violation) = self.safety.evaluate(&self.ctx, mode) {
                error!("safety margin violated: {violation}");
                self.fsm.force_transition(Mode::EmergencyStop, &mut self.ctx);
            }
        }

        // 9–10. The tick's single MODE message, then bookkeeping.
        self.record_last_tick();
        self.emit_mode(outgoing);
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        self.fsm.current_mode()
    }

    /// The controller's view of the evacuation valve.
    pub fn valve_open(&self) -> bool {
        self.ctx.valve_open
    }

    /// Last OPEN/CLOSE command sent to each pump.
    pub fn pump_commanded(&self) -> &[bool] {
        &self.ctx.pump_commanded
    }

    /// Whether a fault is currently latched for `id`.
    pub fn is_faulted(&self, id: Peripheral) -> bool {
        self.ctx.faults.is_faulted(id)
    }

    /// Total clock ticks processed.
    pub fn tick_count(&self) -> u64 {
        self.ctx.total_ticks
    }

    // ── Repair handshake ──────────────────────────────────────

    /// Record plant acknowledgements of our failure reports. Rogue
    /// acknowledgements are logged and ignored.
    fn process_acknowledgements(&mut self) {
        let acks = mem::take(&mut self.ctx.intake.acks);
        for ack in acks {
            let target = match ack {
                Message::LevelFailureAcknowledgement => Peripheral::LevelSensor,
                Message::SteamFailureAcknowledgement => Peripheral::SteamSensor,
                Message::PumpFailureAcknowledgement(i) => Peripheral::Pump(i),
                Message::PumpControlFailureAcknowledgement(i) => Peripheral::PumpController(i),
                _ => continue,
            };
            if !self.ctx.faults.acknowledge(target) {
                warn!("rogue acknowledgement for {target}");
            }
        }
    }

    /// Accept REPAIRED messages for acknowledged faults: confirm with
    /// the matching acknowledgement, clear the slot, and re-select the
    /// mode from what remains faulted. Anything else is a rogue repair
    /// and is ignored.
    fn process_repairs(&mut self) {
        let repairs = mem::take(&mut self.ctx.intake.repairs);
        let mut any_cleared = false;
        for repair in repairs {
            let (target, confirm) = match repair {
                Message::LevelRepaired => {
                    (Peripheral::LevelSensor, Message::LevelRepairedAcknowledgement)
                }
                Message::SteamRepaired => {
                    (Peripheral::SteamSensor, Message::SteamRepairedAcknowledgement)
                }
                Message::PumpRepaired(i) => {
                    (Peripheral::Pump(i), Message::PumpRepairedAcknowledgement(i))
                }
                Message::PumpControlRepaired(i) => (
                    Peripheral::PumpController(i),
                    Message::PumpControlRepairedAcknowledgement(i),
                ),
                _ => continue,
            };
            if self.ctx.faults.clear(target) {
                // a repaired pump resumes whatever state the plant last
                // put it in; adopt its report as the commanded baseline
                // so the detector does not mistake the transition for a
                // fresh stuck diagnosis
                if let Peripheral::Pump(i) | Peripheral::PumpController(i) = target {
                    if let Some(&reported) = self.ctx.intake.pump_state.get(i) {
                        self.ctx.pump_commanded[i] = reported;
                    }
                }
                self.ctx.outbox.send(confirm);
                any_cleared = true;
            } else {
                warn!("rogue repair for {target}");
            }
        }
        if any_cleared {
            let next = self.ctx.faults.recovery_mode();
            self.fsm.force_transition(next, &mut self.ctx);
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Append the mandatory MODE message and flush the tick's output.
    fn emit_mode(&mut self, outgoing: &mut Mailbox) {
        self.ctx
            .outbox
            .send(Message::Mode(self.fsm.current_mode().report()));
        for m in self.ctx.outbox.iter() {
            outgoing.send(*m);
        }
    }

    /// Remember this tick's readings for the next one. The steam record
    /// freezes at the last trusted value while the sensor is flagged.
    fn record_last_tick(&mut self) {
        if !self.ctx.faults.is_faulted(Peripheral::SteamSensor) {
            self.ctx.last.steam = self.ctx.intake.steam;
        }
        self.ctx.last.level = Some(self.ctx.intake.level);
    }
}
