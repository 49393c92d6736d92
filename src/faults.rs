//! Fault registry — one slot per peripheral.
//!
//! The registry is a flat fixed-layout array indexed by [`Peripheral`]:
//!
//! ```text
//! ┌───────┬───────┬───────┬──────────────┬────────────────────┐
//! │ valve │ steam │ level │ pump 0..P    │ controller 0..P    │
//! │   0   │   1   │   2   │ 3 .. 3+P     │ 3+P .. 3+2P        │
//! └───────┴───────┴───────┴──────────────┴────────────────────┘
//! ```
//!
//! Each slot records the diagnosed fault kind and whether the plant has
//! acknowledged the failure report. A healthy slot is `None`, which
//! makes "OK implies unacknowledged" hold by construction.

use core::fmt;

use log::{error, info};

use crate::fsm::Mode;

// ---------------------------------------------------------------------------
// Peripheral identity
// ---------------------------------------------------------------------------

/// Every plant component the controller can implicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peripheral {
    Valve,
    SteamSensor,
    LevelSensor,
    Pump(usize),
    PumpController(usize),
}

impl Peripheral {
    /// Position of this peripheral's slot in the registry.
    fn index(self, pump_count: usize) -> usize {
        match self {
            Self::Valve => 0,
            Self::SteamSensor => 1,
            Self::LevelSensor => 2,
            Self::Pump(i) => 3 + i,
            Self::PumpController(i) => 3 + pump_count + i,
        }
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valve => write!(f, "valve"),
            Self::SteamSensor => write!(f, "steam sensor"),
            Self::LevelSensor => write!(f, "level sensor"),
            Self::Pump(i) => write!(f, "pump {i}"),
            Self::PumpController(i) => write!(f, "pump controller {i}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fault record
// ---------------------------------------------------------------------------

/// Diagnosed failure class for a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Physically running regardless of commands.
    StuckOn,
    /// Physically stopped regardless of commands.
    StuckOff,
    /// Delivering a fraction of rated capacity.
    Reduced,
    /// Operating correctly but reporting the wrong state.
    TxWrong,
    /// Broken in a way with no on/off direction (sensors, valve).
    Defective,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StuckOn => write!(f, "stuck on"),
            Self::StuckOff => write!(f, "stuck off"),
            Self::Reduced => write!(f, "reduced capacity"),
            Self::TxWrong => write!(f, "transmission wrong"),
            Self::Defective => write!(f, "defective"),
        }
    }
}

/// A latched fault awaiting the repair handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    /// Whether the plant has acknowledged our FAILURE_DETECTION.
    pub acknowledged: bool,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Fault bookkeeping for every peripheral of one boiler.
#[derive(Debug, Clone)]
pub struct FaultRegistry {
    slots: Vec<Option<Fault>>,
    pump_count: usize,
}

impl FaultRegistry {
    pub fn new(pump_count: usize) -> Self {
        Self {
            slots: vec![None; 3 + 2 * pump_count],
            pump_count,
        }
    }

    /// The fault latched for `id`, if any.
    pub fn fault(&self, id: Peripheral) -> Option<Fault> {
        self.slots[id.index(self.pump_count)]
    }

    /// Whether `id` currently has a latched fault.
    pub fn is_faulted(&self, id: Peripheral) -> bool {
        self.fault(id).is_some()
    }

    /// Latch a fault. Returns `true` when the slot was previously OK;
    /// a slot that is already faulted keeps its original diagnosis so
    /// each failure is reported to the plant exactly once.
    pub fn set(&mut self, id: Peripheral, kind: FaultKind) -> bool {
        let slot = &mut self.slots[id.index(self.pump_count)];
        if slot.is_some() {
            return false;
        }
        error!("FAULT LATCHED: {id} {kind}");
        *slot = Some(Fault {
            kind,
            acknowledged: false,
        });
        true
    }

    /// Record the plant's acknowledgement of a failure report. Returns
    /// `false` for a rogue ack (no unacknowledged fault on `id`).
    pub fn acknowledge(&mut self, id: Peripheral) -> bool {
        match &mut self.slots[id.index(self.pump_count)] {
            Some(fault) if !fault.acknowledged => {
                fault.acknowledged = true;
                info!("fault acknowledged: {id}");
                true
            }
            _ => false,
        }
    }

    /// Clear a slot after a completed repair handshake. Returns `false`
    /// for a rogue repair (no acknowledged fault on `id`).
    pub fn clear(&mut self, id: Peripheral) -> bool {
        match self.slots[id.index(self.pump_count)] {
            Some(fault) if fault.acknowledged => {
                self.slots[id.index(self.pump_count)] = None;
                info!("fault cleared: {id}");
                true
            }
            _ => false,
        }
    }

    /// Drop a latched fault without the repair handshake. Used when a
    /// diagnosis is revised (e.g. a suspected level-sensor break turns
    /// out to be a leaking valve or a half-capacity pump).
    pub fn retract(&mut self, id: Peripheral) {
        let slot = &mut self.slots[id.index(self.pump_count)];
        if slot.is_some() {
            info!("fault retracted: {id}");
            *slot = None;
        }
    }

    /// Whether any peripheral is currently faulted.
    pub fn any_fault(&self) -> bool {
        self.slots.iter().any(|s| s.is_some())
    }

    /// Whether pump `i` is physically forced on: its own slot says
    /// stuck open, or its controller is stuck driving it.
    pub fn pump_forced_on(&self, i: usize) -> bool {
        self.fault(Peripheral::Pump(i))
            .is_some_and(|f| f.kind == FaultKind::StuckOn)
            || self
                .fault(Peripheral::PumpController(i))
                .is_some_and(|f| f.kind == FaultKind::StuckOn)
    }

    /// Whether pump `i` is physically forced off.
    pub fn pump_forced_off(&self, i: usize) -> bool {
        self.fault(Peripheral::Pump(i))
            .is_some_and(|f| f.kind == FaultKind::StuckOff)
    }

    /// Pumps whose physical output is forced on.
    pub fn pumps_locked_on(&self) -> usize {
        (0..self.pump_count).filter(|&i| self.pump_forced_on(i)).count()
    }

    /// Pumps whose physical output is forced off.
    pub fn pumps_locked_off(&self) -> usize {
        (0..self.pump_count).filter(|&i| self.pump_forced_off(i)).count()
    }

    /// Operating mode implied by the current fault set: a distrusted
    /// level sensor forces Rescue, any other fault Degraded, a clean
    /// registry Normal.
    pub fn recovery_mode(&self) -> Mode {
        if self.is_faulted(Peripheral::LevelSensor) {
            Mode::Rescue
        } else if self.any_fault() {
            Mode::Degraded
        } else {
            Mode::Normal
        }
    }
}
