//! Shared mutable context threaded through every mode handler.
//!
//! `TickContext` is the single struct that mode handlers read from and
//! write to. It contains the tick's parsed intake, the outbound mailbox
//! being assembled, the commanded pump/valve records, the prediction
//! window, the fault registry, and the previous tick's snapshot. Think
//! of it as the "blackboard" in a blackboard architecture.

use crate::config::BoilerConfig;
use crate::detector::{PendingDiagnosis, ReducedProbe, RescueEntry};
use crate::expectation::Expectation;
use crate::faults::FaultRegistry;
use crate::mailbox::{Mailbox, Message};

// ---------------------------------------------------------------------------
// Per-tick intake (read-only to mode handlers; written by the parser)
// ---------------------------------------------------------------------------

/// The validated inbound message set for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intake {
    /// Plant announced STEAM_BOILER_WAITING (exactly once).
    pub boiler_waiting: bool,
    /// Plant announced PHYSICAL_UNITS_READY (exactly once).
    pub units_ready: bool,
    /// Water level reading (litres).
    pub level: f64,
    /// Steam output reading (litres/second).
    pub steam: f64,
    /// Reported pump state, indexed by pump.
    pub pump_state: Vec<bool>,
    /// Reported pump-controller state, indexed by pump.
    pub control_state: Vec<bool>,
    /// REPAIRED messages, in arrival order.
    pub repairs: Vec<Message>,
    /// FAILURE_ACKNOWLEDGEMENT messages, in arrival order.
    pub acks: Vec<Message>,
}

// ---------------------------------------------------------------------------
// Previous-tick snapshot
// ---------------------------------------------------------------------------

/// What the controller remembers from the tick before.
#[derive(Debug, Clone)]
pub struct LastTick {
    /// Last trusted steam reading. Monotone non-decreasing while the
    /// steam sensor is healthy.
    pub steam: f64,
    /// Last level reading, `None` before the first tick.
    pub level: Option<f64>,
    /// Evidence captured when rescue was entered on the previous tick;
    /// the detector gets one shot at re-explaining the anomaly as a
    /// valve leak or a half-capacity pump before the level-sensor
    /// diagnosis sticks.
    pub rescue_entry: Option<RescueEntry>,
}

impl Default for LastTick {
    fn default() -> Self {
        Self {
            steam: 0.0,
            level: None,
            rescue_entry: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TickContext
// ---------------------------------------------------------------------------

/// The shared context passed to every mode handler function.
pub struct TickContext {
    // -- Timing --
    /// Ticks elapsed since the current mode was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,

    // -- Per-tick data --
    /// Parsed inbound messages. Refreshed before each FSM tick.
    pub intake: Intake,
    /// Outbound messages being assembled for this tick.
    pub outbox: Mailbox,

    // -- Actuator records --
    /// Last OPEN/CLOSE command sent to each pump.
    pub pump_commanded: Vec<bool>,
    /// Whether the evacuation valve is open. The VALVE wire message is
    /// a toggle, so this bit is the only record of the valve's state.
    pub valve_open: bool,

    // -- Reasoning state --
    /// Prediction window for the next level reading.
    pub expectation: Expectation,
    /// Per-peripheral fault bookkeeping.
    pub faults: FaultRegistry,
    /// Previous tick's snapshot.
    pub last: LastTick,
    /// Ambiguous pump-vs-controller observation awaiting one more tick.
    pub pending: Option<PendingDiagnosis>,
    /// In-progress reduced-capacity pump probe.
    pub probe: Option<ReducedProbe>,

    // -- Configuration --
    /// Plant parameters (immutable).
    pub config: BoilerConfig,
}

impl TickContext {
    /// Create a new context with the given plant parameters.
    pub fn new(config: BoilerConfig) -> Self {
        let pump_count = config.pump_count;
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            intake: Intake::default(),
            outbox: Mailbox::new(),
            pump_commanded: vec![false; pump_count],
            valve_open: false,
            expectation: Expectation::Unknown,
            faults: FaultRegistry::new(pump_count),
            last: LastTick::default(),
            pending: None,
            probe: None,
            config,
        }
    }

    /// Command pump `i` open and record it.
    pub fn open_pump(&mut self, i: usize) {
        self.outbox.send(Message::OpenPump(i));
        self.pump_commanded[i] = true;
    }

    /// Command pump `i` closed and record it.
    pub fn close_pump(&mut self, i: usize) {
        self.outbox.send(Message::ClosePump(i));
        self.pump_commanded[i] = false;
    }

    /// Emit the VALVE toggle and flip the tracked state.
    pub fn toggle_valve(&mut self) {
        self.outbox.send(Message::Valve);
        self.valve_open = !self.valve_open;
    }

    /// Number of pumps currently commanded open.
    pub fn commanded_open_count(&self) -> usize {
        self.pump_commanded.iter().filter(|&&on| on).count()
    }

    /// Litres per second the commanded pump set should deliver at rated
    /// capacity.
    pub fn commanded_inflow(&self) -> f64 {
        self.commanded_open_count() as f64 * self.config.pump_capacity
    }

    /// Whether this tick's level reading is consistent with the window
    /// predicted last tick.
    pub fn level_in_window(&self) -> bool {
        self.expectation.contains(self.intake.level)
    }
}
