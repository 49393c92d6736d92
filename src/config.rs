//! Boiler plant characteristics.
//!
//! All physical parameters of the boiler under control. The controller
//! receives one of these at construction and treats it as immutable for
//! its whole lifetime; there is no runtime reconfiguration path.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Seconds between clock ticks.
pub const TICK_SECS: f64 = 5.0;

/// Immutable plant parameters handed to the controller at startup.
///
/// Levels are litres, rates are litres per second. The control cycle is
/// fixed at one tick every [`TICK_SECS`] seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoilerConfig {
    /// Total boiler capacity (litres).
    pub capacity: f64,
    /// Lower bound of the normal operating band.
    pub normal_min: f64,
    /// Upper bound of the normal operating band.
    pub normal_max: f64,
    /// Lower safety limit. Below this the boiler is physically unsafe.
    pub limit_min: f64,
    /// Upper safety limit. Above this the boiler is physically unsafe.
    pub limit_max: f64,
    /// Number of feedwater pumps.
    pub pump_count: usize,
    /// Throughput of one healthy pump (litres/second), uniform across pumps.
    pub pump_capacity: f64,
    /// Maximum steam production rate (litres/second).
    pub max_steam_rate: f64,
    /// Evacuation valve throughput while open (litres/second).
    pub valve_rate: f64,
}

impl Default for BoilerConfig {
    fn default() -> Self {
        Self {
            capacity: 1000.0,
            normal_min: 400.0,
            normal_max: 600.0,
            limit_min: 100.0,
            limit_max: 900.0,
            pump_count: 4,
            pump_capacity: 5.0,
            max_steam_rate: 10.0,
            valve_rate: 10.0,
        }
    }
}

impl BoilerConfig {
    /// Level the controller steers toward: the middle of the normal band.
    pub fn target(&self) -> f64 {
        (self.normal_min + self.normal_max) / 2.0
    }

    /// Litres one healthy pump delivers over a full tick.
    pub fn pump_tick_volume(&self) -> f64 {
        TICK_SECS * self.pump_capacity
    }

    /// Litres the open valve evacuates over a full tick.
    pub fn valve_tick_volume(&self) -> f64 {
        TICK_SECS * self.valve_rate
    }

    /// Reject parameter sets that violate the plant invariants.
    ///
    /// Invalid values are refused, never clamped. A controller running
    /// against a nonsensical plant description cannot keep the water
    /// level safe.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.capacity.is_finite()
            && self.normal_min.is_finite()
            && self.normal_max.is_finite()
            && self.limit_min.is_finite()
            && self.limit_max.is_finite()
            && self.pump_capacity.is_finite()
            && self.max_steam_rate.is_finite()
            && self.valve_rate.is_finite())
        {
            return Err(ConfigError::ValidationFailed("non-finite parameter"));
        }
        if self.limit_min <= 0.0 {
            return Err(ConfigError::ValidationFailed("limit_min must be positive"));
        }
        if self.normal_min <= self.limit_min {
            return Err(ConfigError::ValidationFailed(
                "normal_min must exceed limit_min",
            ));
        }
        if self.normal_max <= self.normal_min {
            return Err(ConfigError::ValidationFailed(
                "normal_max must exceed normal_min",
            ));
        }
        if self.limit_max <= self.normal_max {
            return Err(ConfigError::ValidationFailed(
                "limit_max must exceed normal_max",
            ));
        }
        if self.capacity <= self.limit_max {
            return Err(ConfigError::ValidationFailed(
                "capacity must exceed limit_max",
            ));
        }
        if self.pump_count == 0 {
            return Err(ConfigError::ValidationFailed("at least one pump required"));
        }
        if self.pump_capacity <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "pump_capacity must be positive",
            ));
        }
        if self.max_steam_rate <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "max_steam_rate must be positive",
            ));
        }
        if self.valve_rate <= 0.0 {
            return Err(ConfigError::ValidationFailed("valve_rate must be positive"));
        }
        Ok(())
    }
}
