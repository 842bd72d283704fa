//! Hall-sensored six-step BLDC control core
//!
//! 6ステップ転流・Hall速度推定・PID速度制御・電流制限・フォルト監視を
//! ハードウェア非依存で実装します。ハードウェアアクセスは
//! [`MotorHardware`] トレイト経由で注入します。
#![cfg_attr(not(test), no_std)]

// ログマクロは他モジュールより先に定義
mod fmt;

pub mod command;
pub mod commutation;
pub mod config;
pub mod current_limiter;
pub mod driver;
pub mod error;
pub mod fault_monitor;
pub mod hall_sensor;
pub mod motor_control;
pub mod pid_controller;
pub mod state_machine;

pub use command::{CommandChannel, PendingCommands, Transition};
pub use commutation::{commutate, Direction, HallSector, PhaseDrive, PhasePattern};
pub use config::MotorConfig;
pub use current_limiter::{CurrentLimit, CurrentLimiter};
pub use driver::MotorHardware;
pub use error::{CommandError, ConfigError, HallError};
pub use fault_monitor::{FaultCode, FaultMonitor, Measurements};
pub use hall_sensor::{HallTracking, SpeedEstimator};
pub use motor_control::{ControlMode, MotorContext, MotorController, MotorStatus};
pub use pid_controller::{PidGains, PidState};
pub use state_machine::{MotorState, MotorStateMachine};
