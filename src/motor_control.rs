//! モーター制御オーケストレータ
//!
//! `MotorContext` を所有し、制御周期ごとに
//! Hall読み取り → 速度推定 → フォルト監視 → デューティ計算 → 電流制限 → 転流
//! の順で1ティックを実行します。

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;

use crate::command::{CommandChannel, Transition};
use crate::commutation::{commutate, Direction, HallSector, PhasePattern};
use crate::config::MotorConfig;
use crate::current_limiter::{CurrentLimit, CurrentLimiter};
use crate::driver::MotorHardware;
use crate::error::{CommandError, ConfigError};
use crate::fault_monitor::{FaultCode, FaultInputs, FaultMonitor, Measurements};
use crate::fmt::*;
use crate::hall_sensor::{HallTracking, SpeedEstimator};
use crate::pid_controller::{to_duty, PidState};
use crate::state_machine::{MotorState, MotorStateMachine};

/// 制御モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlMode {
    /// 固定デューティ
    OpenLoop,
    /// 速度PID制御
    #[default]
    Speed,
    /// 電流（トルク）制御
    Torque,
}

/// 制御コンテキスト
///
/// 制御コアの可変状態は全てここに集約されます。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorContext {
    pub state: MotorState,
    pub mode: ControlMode,
    pub direction: Direction,
    /// 目標速度 [RPM]
    pub target_speed_rpm: f32,
    /// 目標トルク [%]
    pub target_torque_percent: f32,
    /// 最後に適用したデューティ (0-1000)
    pub duty: u16,
    /// ラッチされたフォルト
    pub fault: FaultCode,
    /// Hall遷移トラッキング（前回セクター・タイムスタンプ・RPM）
    pub hall: HallTracking,
    /// 最新のHall生値 (0-7)
    pub last_hall_raw: u8,
    /// Starting突入時刻
    pub starting_since: Option<Instant>,
    /// フィルタ済みバス電圧 [V]（初回サンプルまでNone）
    pub filtered_voltage_v: Option<f32>,
    /// 最新の測定値
    pub measurements: Measurements,
    /// パワーステージ出力が有効か
    pub outputs_enabled: bool,
    pub pid: PidState,
    /// トルク制御の積分デューティ（未開始ならNone）
    pub torque_integral: Option<f32>,
}

impl MotorContext {
    pub fn new(config: &MotorConfig) -> Self {
        Self {
            state: MotorState::Stop,
            mode: ControlMode::default(),
            direction: Direction::default(),
            target_speed_rpm: 0.0,
            target_torque_percent: 0.0,
            duty: 0,
            fault: FaultCode::None,
            hall: HallTracking::default(),
            last_hall_raw: 0,
            starting_since: None,
            filtered_voltage_v: None,
            measurements: Measurements::default(),
            outputs_enabled: false,
            pid: PidState::from_config(&config.pid),
            torque_integral: None,
        }
    }

    /// Current speed estimate [RPM]
    pub fn rpm(&self) -> f32 {
        self.hall.rpm
    }
}

/// モーターステータス（他コンテキストへの公開用スナップショット）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorStatus {
    pub state: MotorState,
    pub mode: ControlMode,
    pub direction: Direction,
    pub fault: FaultCode,
    pub speed_rpm: f32,
    pub duty: u16,
    pub current_ma: f32,
    /// フィルタ済みバス電圧 [V]
    pub voltage_v: f32,
}

impl MotorStatus {
    pub const fn new() -> Self {
        Self {
            state: MotorState::Stop,
            mode: ControlMode::Speed,
            direction: Direction::Clockwise,
            fault: FaultCode::None,
            speed_rpm: 0.0,
            duty: 0,
            current_ma: 0.0,
            voltage_v: 0.0,
        }
    }
}

impl Default for MotorStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// BLDC six-step controller
///
/// Owns the hardware collaborator and the [`MotorContext`]. Call
/// [`tick`](Self::tick) (or [`service`](Self::service)) once per control
/// period.
pub struct MotorController<H: MotorHardware> {
    hw: H,
    config: MotorConfig,
    machine: MotorStateMachine,
    estimator: SpeedEstimator,
    limiter: CurrentLimiter,
    monitor: FaultMonitor,
    ctx: MotorContext,
}

impl<H: MotorHardware> MotorController<H> {
    /// Create a controller
    ///
    /// # Arguments
    /// * `hw` - Hardware-access collaborator
    /// * `config` - Calibration values, validated here
    pub fn new(hw: H, config: MotorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            hw,
            machine: MotorStateMachine::new(config.startup),
            estimator: SpeedEstimator::new(
                config.pole_pairs,
                config.stall_timeout,
                config.speed_filter_alpha,
            ),
            limiter: CurrentLimiter::new(&config.current),
            monitor: FaultMonitor::new(&config),
            ctx: MotorContext::new(&config),
            config,
        })
    }

    /// ハードウェア初期化（起動時に1回だけ呼び出す）
    ///
    /// 出力を無効化し、電圧フィルタとHall状態を初回サンプルで初期化します。
    pub fn init(&mut self) {
        self.hw.init_gpio();
        self.hw.init_pwm();
        self.hw.init_hall();
        self.hw.init_adc();
        self.outputs_off();

        // 初回ADC読み取りでフィルタを初期化（起動時のUNDERVOLTAGE誤検出を防ぐ）
        let voltage = self.hw.get_voltage();
        let filtered = self
            .monitor
            .filter_voltage(&mut self.ctx.filtered_voltage_v, voltage);
        self.ctx.measurements.voltage_v = voltage;
        self.ctx.last_hall_raw = self.hw.get_hall_state();

        info!(
            "Motor controller initialized: pole_pairs={}, dt={}s, Vbus={}V, hall={}",
            self.config.pole_pairs,
            self.config.dt(),
            filtered,
            self.ctx.last_hall_raw
        );
    }

    /// Start command (Stop → Starting)
    pub fn start(&mut self) -> Result<(), CommandError> {
        let now = self.hw.now();
        self.machine.start(&mut self.ctx, now)
    }

    /// Stop command
    ///
    /// Always zeroes the duty and disables the outputs. A latched fault
    /// stays latched.
    pub fn stop(&mut self) {
        self.machine.stop(&mut self.ctx);
        self.outputs_off();
    }

    /// 目標速度を設定 [RPM]
    ///
    /// フォルト中も目標値は更新されます（出力は0のまま）。
    pub fn set_speed(&mut self, rpm: f32) -> Result<(), CommandError> {
        if !rpm.is_finite() || rpm < 0.0 {
            warn!("SetSpeed rejected: {}", rpm);
            return Err(CommandError::InvalidSetpoint);
        }
        self.ctx.target_speed_rpm = rpm.min(self.config.max_speed_rpm);
        Ok(())
    }

    /// 目標トルクを設定 [%] (0-100)
    pub fn set_torque(&mut self, percent: f32) -> Result<(), CommandError> {
        if !percent.is_finite() || percent < 0.0 {
            warn!("SetTorque rejected: {}", percent);
            return Err(CommandError::InvalidSetpoint);
        }
        self.ctx.target_torque_percent = percent.min(100.0);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: ControlMode) -> Result<(), CommandError> {
        self.machine.set_mode(&mut self.ctx, mode)
    }

    pub fn set_direction(&mut self, direction: Direction) -> Result<(), CommandError> {
        self.machine.set_direction(&mut self.ctx, direction)
    }

    /// 外部からのフォルト通知
    ///
    /// Latches `code` unless another fault is already latched. `None` is
    /// ignored.
    pub fn fault_handler(&mut self, code: FaultCode) {
        if self.machine.latch_fault(&mut self.ctx, code) {
            self.outputs_off();
        }
    }

    /// Latched fault code
    pub fn fault(&self) -> FaultCode {
        self.ctx.fault
    }

    /// ClearFault command
    ///
    /// Re-verifies the latched cause against the latest tick's
    /// measurements. While the cause persists the fault stays latched and
    /// `Err(CommandError::ConditionActive)` is returned.
    ///
    /// A `Stall` fault has no measurable condition and can always be
    /// cleared; the next `start()` re-runs the startup timeout.
    pub fn clear_fault(&mut self) -> Result<(), CommandError> {
        let filtered_v = self
            .ctx
            .filtered_voltage_v
            .unwrap_or(self.ctx.measurements.voltage_v);
        let cleared = self.monitor.condition_cleared(
            self.ctx.fault,
            &self.ctx.measurements,
            filtered_v,
            self.ctx.last_hall_raw,
        );
        self.machine.clear_fault(&mut self.ctx, cleared)
    }

    /// 制御ループ1周期
    pub fn tick(&mut self) {
        let dt = self.config.dt();

        // 1. Hall・電気量の読み取り
        let now = self.hw.now();
        let raw = self.hw.get_hall_state();
        let meas = Measurements {
            current_ma: self.hw.get_current(),
            voltage_v: self.hw.get_voltage(),
            temperature_c: self.hw.get_temperature(),
        };
        self.ctx.last_hall_raw = raw;
        self.ctx.measurements = meas;
        let filtered_v = self
            .monitor
            .filter_voltage(&mut self.ctx.filtered_voltage_v, meas.voltage_v);

        // 2. 速度推定・フォルト監視
        let sector = HallSector::new(raw).ok();
        let running = self.ctx.state == MotorState::Running;
        let sample = self.estimator.update(&mut self.ctx.hall, sector, now, running);

        if matches!(self.ctx.state, MotorState::Starting | MotorState::Running) {
            let code = self.monitor.evaluate(
                &meas,
                &FaultInputs {
                    filtered_voltage_v: filtered_v,
                    hall_valid: sector.is_some(),
                    stalled: sample.stalled,
                },
            );
            self.machine.latch_fault(&mut self.ctx, code);
        }

        // 3-5. 状態ごとのデューティ計算
        let duty = match self.ctx.state {
            MotorState::Stop | MotorState::Fault => {
                self.ctx.duty = 0;
                self.outputs_off();
                return;
            }
            MotorState::Starting => {
                match self.machine.update_startup(&mut self.ctx, now, sample.rpm) {
                    Some(duty) => duty,
                    None => {
                        self.outputs_off();
                        return;
                    }
                }
            }
            MotorState::Running => match self.ctx.mode {
                ControlMode::OpenLoop => self.config.open_loop_duty,
                ControlMode::Speed => {
                    to_duty(self.ctx.pid.update(self.ctx.target_speed_rpm, sample.rpm, dt))
                }
                ControlMode::Torque => self.limiter.torque_duty(
                    &mut self.ctx.torque_integral,
                    self.ctx.duty,
                    self.ctx.target_torque_percent,
                    meas.current_ma,
                    dt,
                ),
            },
        };

        // 6. 電流制限
        let duty = match self.limiter.limit(duty, meas.current_ma) {
            CurrentLimit::Overcurrent => {
                self.fault_handler(FaultCode::Overcurrent);
                return;
            }
            limited => limited.duty(),
        };

        // 7. 転流パターンとデューティを出力
        let pattern = match commutate(raw, self.ctx.direction) {
            Ok(pattern) => pattern,
            Err(_) => {
                self.fault_handler(FaultCode::HallError);
                return;
            }
        };
        self.hw.apply_phase_pattern(pattern);
        self.hw.set_pwm_duty(duty);
        if !self.ctx.outputs_enabled {
            self.hw.enable();
            self.ctx.outputs_enabled = true;
        }
        self.ctx.duty = duty;
    }

    /// 指令チャネルを処理して1ティック実行し、ステータスを公開
    ///
    /// Fault injections are applied first, then mode and direction, then
    /// targets, then the pending transition request.
    pub fn service<M: RawMutex>(&mut self, channel: &CommandChannel<M>) {
        let pending = channel.take();

        self.fault_handler(pending.fault);
        if let Some(mode) = pending.mode {
            self.set_mode(mode).ok();
        }
        if let Some(direction) = pending.direction {
            self.set_direction(direction).ok();
        }
        if let Some(rpm) = pending.speed_rpm {
            self.set_speed(rpm).ok();
        }
        if let Some(percent) = pending.torque_percent {
            self.set_torque(percent).ok();
        }
        if let Some(transition) = pending.transition {
            match transition {
                Transition::Start => {
                    self.start().ok();
                }
                Transition::Stop => self.stop(),
                Transition::ClearFault => {
                    self.clear_fault().ok();
                }
            }
        }

        self.tick();
        channel.publish(self.status());
    }

    pub fn state(&self) -> MotorState {
        self.ctx.state
    }

    pub fn context(&self) -> &MotorContext {
        &self.ctx
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    pub fn status(&self) -> MotorStatus {
        MotorStatus {
            state: self.ctx.state,
            mode: self.ctx.mode,
            direction: self.ctx.direction,
            fault: self.ctx.fault,
            speed_rpm: self.ctx.rpm(),
            duty: self.ctx.duty,
            current_ma: self.ctx.measurements.current_ma,
            voltage_v: self.ctx.filtered_voltage_v.unwrap_or(0.0),
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// デューティ0・全相フロート・出力無効
    fn outputs_off(&mut self) {
        self.hw.set_pwm_duty(0);
        self.hw.apply_phase_pattern(PhasePattern::OFF);
        self.hw.disable();
        self.ctx.outputs_enabled = false;
    }
}
