//! Unified error types for the boiler controller.
//!
//! A single `Error` enum that every subsystem can convert into, keeping
//! the orchestrator's error handling uniform. All variants are `Copy` so
//! they can be passed through the tick path without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The inbound message set for a tick was malformed.
    Transmission(TransmissionError),
    /// Plant configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transmission(e) => write!(f, "transmission: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transmission errors
// ---------------------------------------------------------------------------

/// Ways the per-tick inbound mailbox can fail validation.
///
/// Any of these is fatal: the controller cannot reason about a plant it
/// cannot hear, so it goes straight to emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionError {
    /// The LEVEL reading is absent or duplicated.
    MissingLevel,
    /// The STEAM reading is absent or duplicated.
    MissingSteam,
    /// A reading carried a non-finite value.
    MalformedReading,
    /// Wrong number of PUMP_STATE messages, a repeated pump index, or an
    /// index outside `0..pump_count`.
    PumpStateMismatch,
    /// Same as `PumpStateMismatch`, for PUMP_CONTROL_STATE messages.
    ControlStateMismatch,
}

impl fmt::Display for TransmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLevel => write!(f, "level reading absent or duplicated"),
            Self::MissingSteam => write!(f, "steam reading absent or duplicated"),
            Self::MalformedReading => write!(f, "non-finite sensor reading"),
            Self::PumpStateMismatch => write!(f, "pump state multiplicity wrong"),
            Self::ControlStateMismatch => write!(f, "pump controller state multiplicity wrong"),
        }
    }
}

impl From<TransmissionError> for Error {
    fn from(e: TransmissionError) -> Self {
        Self::Transmission(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from [`BoilerConfig::validate`](crate::config::BoilerConfig::validate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A parameter failed range validation. The message names the field.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
