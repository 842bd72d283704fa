//! タスク間指令チャネル
//!
//! 他の実行コンテキスト（タスク・割り込み）から制御ループへ指令を渡し、
//! 制御ループからステータスを公開します。`static` に置けるよう
//! `embassy-sync` のブロッキングMutexで保護します。

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::commutation::Direction;
use crate::fault_monitor::FaultCode;
use crate::motor_control::{ControlMode, MotorStatus};

/// Requested state transition. A newer request replaces an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    Start,
    Stop,
    ClearFault,
}

/// Commands posted since the last [`CommandChannel::take`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingCommands {
    pub transition: Option<Transition>,
    pub speed_rpm: Option<f32>,
    pub torque_percent: Option<f32>,
    pub mode: Option<ControlMode>,
    pub direction: Option<Direction>,
    /// 最初に通知されたフォルトを保持
    pub fault: FaultCode,
}

impl PendingCommands {
    pub const fn new() -> Self {
        Self {
            transition: None,
            speed_rpm: None,
            torque_percent: None,
            mode: None,
            direction: None,
            fault: FaultCode::None,
        }
    }
}

impl Default for PendingCommands {
    fn default() -> Self {
        Self::new()
    }
}

/// 指令メールボックス
///
/// ```ignore
/// static COMMANDS: CommandChannel<CriticalSectionRawMutex> = CommandChannel::new();
/// ```
pub struct CommandChannel<M: RawMutex> {
    pending: Mutex<M, Cell<PendingCommands>>,
    status: Mutex<M, Cell<MotorStatus>>,
}

impl<M: RawMutex> CommandChannel<M> {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(PendingCommands::new())),
            status: Mutex::new(Cell::new(MotorStatus::new())),
        }
    }

    fn update(&self, f: impl FnOnce(&mut PendingCommands)) {
        self.pending.lock(|cell| {
            let mut pending = cell.get();
            f(&mut pending);
            cell.set(pending);
        });
    }

    pub fn request_start(&self) {
        self.update(|p| p.transition = Some(Transition::Start));
    }

    pub fn request_stop(&self) {
        self.update(|p| p.transition = Some(Transition::Stop));
    }

    pub fn request_clear_fault(&self) {
        self.update(|p| p.transition = Some(Transition::ClearFault));
    }

    /// 目標速度 [RPM]
    pub fn set_speed(&self, rpm: f32) {
        self.update(|p| p.speed_rpm = Some(rpm));
    }

    /// 目標トルク [%]
    pub fn set_torque(&self, percent: f32) {
        self.update(|p| p.torque_percent = Some(percent));
    }

    pub fn set_mode(&self, mode: ControlMode) {
        self.update(|p| p.mode = Some(mode));
    }

    pub fn set_direction(&self, direction: Direction) {
        self.update(|p| p.direction = Some(direction));
    }

    /// フォルト通知（制御ループ未処理のものがあれば最初の通知を保持）
    pub fn inject_fault(&self, code: FaultCode) {
        self.update(|p| {
            if !p.fault.is_fault() {
                p.fault = code;
            }
        });
    }

    /// Take every pending command, leaving the mailbox empty.
    pub fn take(&self) -> PendingCommands {
        self.pending
            .lock(|cell| cell.replace(PendingCommands::new()))
    }

    /// 制御ループからステータスを公開
    pub fn publish(&self, status: MotorStatus) {
        self.status.lock(|cell| cell.set(status));
    }

    /// 最新のステータス
    pub fn status(&self) -> MotorStatus {
        self.status.lock(Cell::get)
    }

    /// Latched fault as of the last published tick.
    pub fn fault(&self) -> FaultCode {
        self.status().fault
    }
}

impl<M: RawMutex> Default for CommandChannel<M> {
    fn default() -> Self {
        Self::new()
    }
}
