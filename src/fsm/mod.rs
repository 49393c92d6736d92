//! Function-pointer finite state machine over the operating modes.
//!
//! Classic embedded FSM pattern:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  ModeTable                                                 │
//! │  ┌───────────────┬──────────┬───────────────────────────┐  │
//! │  │ Mode          │ on_enter │ on_update                 │  │
//! │  ├───────────────┼──────────┼───────────────────────────┤  │
//! │  │ Waiting       │ fn(ctx)  │ fn(ctx) -> Option<Mode>   │  │
//! │  │ Ready         │ fn(ctx)  │ fn(ctx) -> Option<Mode>   │  │
//! │  │ Normal        │ fn(ctx)  │ fn(ctx) -> Option<Mode>   │  │
//! │  │ Degraded      │ fn(ctx)  │ fn(ctx) -> Option<Mode>   │  │
//! │  │ Rescue        │ fn(ctx)  │ fn(ctx) -> Option<Mode>   │  │
//! │  │ EmergencyStop │ fn(ctx)  │ fn(ctx) -> Option<Mode>   │  │
//! │  └───────────────┴──────────┴───────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** mode. If
//! it returns `Some(next)`, the engine runs `on_exit`, then `on_enter`
//! for the next mode, and moves the current pointer. All handlers
//! receive `&mut TickContext`. The failure detector and the repair
//! handshake drive transitions from outside the table through
//! [`Fsm::force_transition`].
//!
//! `EmergencyStop` is terminal: once entered, no transition — forced or
//! otherwise — ever leaves it.

pub mod context;
pub mod states;

use context::TickContext;
use log::{error, info};

use crate::mailbox::ModeReport;

// ---------------------------------------------------------------------------
// Mode identity
// ---------------------------------------------------------------------------

/// The six operating modes of the controller.
/// Must stay in sync with the table built in [`states::build_mode_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    Waiting = 0,
    Ready = 1,
    Normal = 2,
    Degraded = 3,
    Rescue = 4,
    EmergencyStop = 5,
}

impl Mode {
    /// Total number of modes — used to size the table array.
    pub const COUNT: usize = 6;

    /// Convert a `u8` index back to `Mode`. Out-of-range maps to
    /// `EmergencyStop` in release builds (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Waiting,
            1 => Self::Ready,
            2 => Self::Normal,
            3 => Self::Degraded,
            4 => Self::Rescue,
            5 => Self::EmergencyStop,
            _ => {
                debug_assert!(false, "invalid mode index: {idx}");
                Self::EmergencyStop
            }
        }
    }

    /// A terminal mode admits no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        self == Self::EmergencyStop
    }

    /// The value announced in the per-tick MODE message. The wire
    /// protocol reports both start-up modes as initialisation.
    pub fn report(self) -> ModeReport {
        match self {
            Self::Waiting | Self::Ready => ModeReport::Initialisation,
            Self::Normal => ModeReport::Normal,
            Self::Degraded => ModeReport::Degraded,
            Self::Rescue => ModeReport::Rescue,
            Self::EmergencyStop => ModeReport::EmergencyStop,
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type ModeActionFn = fn(&mut TickContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type ModeUpdateFn = fn(&mut TickContext) -> Option<Mode>;

// ---------------------------------------------------------------------------
// Mode descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single mode.
/// Stored in a fixed-size array — no heap, no `dyn`.
pub struct ModeDescriptor {
    pub id: Mode,
    pub name: &'static str,
    pub on_enter: Option<ModeActionFn>,
    pub on_exit: Option<ModeActionFn>,
    pub on_update: ModeUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The mode machine engine.
///
/// Owns the mode table (array of [`ModeDescriptor`]) and tracks how
/// long the current mode has been active.
pub struct Fsm {
    /// Fixed-size table indexed by `Mode as usize`.
    table: [ModeDescriptor; Mode::COUNT],
    /// Index of the currently active mode.
    current: usize,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current mode was entered.
    mode_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given mode table, starting in `initial`.
    pub fn new(table: [ModeDescriptor; Mode::COUNT], initial: Mode) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            mode_entry_tick: 0,
        }
    }

    /// Advance the FSM by one tick: run the current mode's `on_update`
    /// and execute the transition it requests, if any.
    pub fn tick(&mut self, ctx: &mut TickContext) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.mode_entry_tick;
        ctx.total_ticks = self.tick_count;

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition (used by the failure detector and
    /// the repair handshake, which decide modes outside the table).
    pub fn force_transition(&mut self, next: Mode, ctx: &mut TickContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current mode.
    pub fn current_mode(&self) -> Mode {
        Mode::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current mode.
    pub fn ticks_in_current_mode(&self) -> u64 {
        self.tick_count - self.mode_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: Mode, ctx: &mut TickContext) {
        if self.current_mode().is_terminal() {
            error!(
                "transition {} -> {} refused: emergency stop is terminal",
                self.table[self.current].name,
                self.table[next_id as usize].name
            );
            return;
        }

        let next_idx = next_id as usize;
        info!(
            "mode transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.mode_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
