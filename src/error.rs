//! Error types of the control core.
//!
//! Runtime faults are not errors: they latch into [`FaultCode`] and are
//! observed through the state machine. These types cover lookups,
//! configuration and rejected commands.

use thiserror::Error;

use crate::fault_monitor::FaultCode;
use crate::state_machine::MotorState;

/// Invalid Hall reading handed to the commutation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HallError {
    #[error("invalid hall sector {0} (valid: 1-6)")]
    InvalidSector(u8),
}

/// Rejected [`MotorConfig`](crate::config::MotorConfig).
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("pole pair count must be non-zero")]
    ZeroPolePairs,
    #[error("control period must be non-zero")]
    ZeroControlPeriod,
    #[error("current limits must satisfy 0 < soft ({soft_ma} mA) < hard ({hard_ma} mA)")]
    CurrentLimits { soft_ma: f32, hard_ma: f32 },
    #[error("undervoltage ({under_v} V) must be below overvoltage ({over_v} V)")]
    VoltageLimits { under_v: f32, over_v: f32 },
    #[error("duty bounds must lie within 0-1000")]
    DutyBounds,
    #[error("filter coefficient {0} outside (0, 1]")]
    FilterAlpha(f32),
    #[error("controller gains must not be negative")]
    NegativeGain,
    #[error("startup needs a positive run threshold and timeout")]
    Startup,
}

/// Command that the controller could not honor in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    #[error("fault {0:?} is latched, clear it first")]
    FaultLatched(FaultCode),
    #[error("motor must be stopped (currently {0:?})")]
    NotStopped(MotorState),
    #[error("fault condition {0:?} is still present")]
    ConditionActive(FaultCode),
    #[error("setpoint is not a finite, non-negative number")]
    InvalidSetpoint,
}
