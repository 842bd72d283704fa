//! Motor state machine
//!
//! Stop / Starting / Running / Fault の遷移を管理します。
//! 状態は全て `MotorContext` に保持し、ここには始動プロファイルのみ持ちます。

use embassy_time::{Duration, Instant};

use crate::commutation::Direction;
use crate::config::StartupConfig;
use crate::error::CommandError;
use crate::fault_monitor::FaultCode;
use crate::fmt::*;
use crate::motor_control::{ControlMode, MotorContext};

/// Motor operating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorState {
    #[default]
    Stop,
    Starting,
    Running,
    Fault,
}

/// 状態遷移ロジック
#[derive(Debug, Clone, Copy)]
pub struct MotorStateMachine {
    startup: StartupConfig,
}

impl MotorStateMachine {
    pub fn new(startup: StartupConfig) -> Self {
        Self { startup }
    }

    pub fn startup(&self) -> &StartupConfig {
        &self.startup
    }

    fn transition(&self, ctx: &mut MotorContext, next: MotorState) {
        if ctx.state == next {
            return;
        }
        info!("Motor state: {} -> {}", ctx.state, next);

        // Starting突入時とRunning離脱時はPIDとトルク積分をリセット
        if next == MotorState::Starting || ctx.state == MotorState::Running {
            ctx.pid.reset();
            ctx.torque_integral = None;
        }
        if next != MotorState::Starting {
            ctx.starting_since = None;
        }
        ctx.state = next;
    }

    /// Start command
    ///
    /// Stop → Starting. A latched fault rejects the command; Starting and
    /// Running ignore it.
    pub fn start(&self, ctx: &mut MotorContext, now: Instant) -> Result<(), CommandError> {
        match ctx.state {
            MotorState::Fault => {
                warn!("Start rejected: fault {} latched", ctx.fault);
                Err(CommandError::FaultLatched(ctx.fault))
            }
            MotorState::Starting | MotorState::Running => Ok(()),
            MotorState::Stop => {
                ctx.duty = 0;
                // 停止中の古いタイムスタンプで速度を計算しない
                ctx.hall.reset();
                self.transition(ctx, MotorState::Starting);
                ctx.starting_since = Some(now);
                Ok(())
            }
        }
    }

    /// Stop command
    ///
    /// Zeroes the duty in every state. Fault stays latched until cleared.
    pub fn stop(&self, ctx: &mut MotorContext) {
        ctx.duty = 0;
        if ctx.state != MotorState::Fault {
            self.transition(ctx, MotorState::Stop);
        }
    }

    /// フォルトをラッチ（最初に検出した要因を保持）
    ///
    /// # Returns
    /// `true` if this call latched `code`, `false` if it was `None` or
    /// another fault was already latched
    pub fn latch_fault(&self, ctx: &mut MotorContext, code: FaultCode) -> bool {
        if !code.is_fault() {
            return false;
        }
        ctx.duty = 0;
        if ctx.fault.is_fault() {
            if code != ctx.fault {
                debug!("Fault {} ignored, {} already latched", code, ctx.fault);
            }
            return false;
        }

        error!("FAULT latched: {} (state {})", code, ctx.state);
        ctx.fault = code;
        self.transition(ctx, MotorState::Fault);
        true
    }

    /// 始動ランプのデューティ
    ///
    /// `initial_duty` から `final_duty` まで `ramp_time` かけて線形に変化し、
    /// その後は `final_duty` を保持します。
    pub fn ramp_duty(&self, elapsed: Duration) -> u16 {
        let ramp_us = self.startup.ramp_time.as_micros();
        let initial = self.startup.initial_duty as f32;
        let target = self.startup.final_duty as f32;
        if ramp_us == 0 || elapsed.as_micros() >= ramp_us {
            return self.startup.final_duty;
        }
        let fraction = elapsed.as_micros() as f32 / ramp_us as f32;
        libm::roundf(initial + (target - initial) * fraction) as u16
    }

    /// Starting state step
    ///
    /// Promotes to Running once `rpm` exceeds the run threshold, faults
    /// with Stall once the startup timeout elapses first.
    ///
    /// # Returns
    /// Duty to apply this tick, or `None` when the timeout latched a fault
    pub fn update_startup(&self, ctx: &mut MotorContext, now: Instant, rpm: f32) -> Option<u16> {
        let since = *ctx.starting_since.get_or_insert(now);
        let elapsed = now
            .checked_duration_since(since)
            .unwrap_or(Duration::from_ticks(0));

        let duty = self.ramp_duty(elapsed);

        if rpm > self.startup.min_run_rpm && elapsed < self.startup.timeout {
            info!("Startup complete: {} RPM after {} ms", rpm, elapsed.as_millis());
            self.transition(ctx, MotorState::Running);
            return Some(duty);
        }
        if elapsed >= self.startup.timeout {
            warn!("Startup timeout: {} RPM < {} RPM", rpm, self.startup.min_run_rpm);
            self.latch_fault(ctx, FaultCode::Stall);
            return None;
        }
        Some(duty)
    }

    /// ClearFault command
    ///
    /// # Arguments
    /// * `condition_cleared` - Result of re-verifying the latched fault's cause
    pub fn clear_fault(
        &self,
        ctx: &mut MotorContext,
        condition_cleared: bool,
    ) -> Result<(), CommandError> {
        if ctx.state != MotorState::Fault {
            return Ok(());
        }
        if !condition_cleared {
            warn!("ClearFault rejected: {} still present", ctx.fault);
            return Err(CommandError::ConditionActive(ctx.fault));
        }
        info!("Fault {} cleared", ctx.fault);
        ctx.fault = FaultCode::None;
        ctx.duty = 0;
        self.transition(ctx, MotorState::Stop);
        Ok(())
    }

    /// 制御モード変更（Stop状態のみ）
    pub fn set_mode(&self, ctx: &mut MotorContext, mode: ControlMode) -> Result<(), CommandError> {
        if ctx.state != MotorState::Stop {
            warn!("Mode change to {} rejected in {}", mode, ctx.state);
            return Err(CommandError::NotStopped(ctx.state));
        }
        if ctx.mode != mode {
            info!("Control mode: {} -> {}", ctx.mode, mode);
            ctx.pid.reset();
            ctx.torque_integral = None;
            ctx.mode = mode;
        }
        Ok(())
    }

    /// 回転方向変更（Stop状態のみ）
    pub fn set_direction(
        &self,
        ctx: &mut MotorContext,
        direction: Direction,
    ) -> Result<(), CommandError> {
        if ctx.state != MotorState::Stop {
            warn!("Direction change rejected in {}", ctx.state);
            return Err(CommandError::NotStopped(ctx.state));
        }
        ctx.direction = direction;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotorConfig;

    fn setup() -> (MotorStateMachine, MotorContext) {
        let config = MotorConfig::default();
        (
            MotorStateMachine::new(config.startup),
            MotorContext::new(&config),
        )
    }

    #[test]
    fn test_start_enters_starting() {
        let (sm, mut ctx) = setup();
        ctx.duty = 400;
        assert_eq!(sm.start(&mut ctx, Instant::from_millis(5)), Ok(()));
        assert_eq!(ctx.state, MotorState::Starting);
        assert_eq!(ctx.duty, 0);
        assert_eq!(ctx.starting_since, Some(Instant::from_millis(5)));
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let (sm, mut ctx) = setup();
        ctx.state = MotorState::Running;
        ctx.duty = 400;
        assert_eq!(sm.start(&mut ctx, Instant::from_millis(5)), Ok(()));
        assert_eq!(ctx.state, MotorState::Running);
        assert_eq!(ctx.duty, 400);
    }

    #[test]
    fn test_start_rejected_in_fault() {
        let (sm, mut ctx) = setup();
        sm.latch_fault(&mut ctx, FaultCode::Overtemp);
        assert_eq!(
            sm.start(&mut ctx, Instant::from_millis(0)),
            Err(CommandError::FaultLatched(FaultCode::Overtemp))
        );
        assert_eq!(ctx.state, MotorState::Fault);
    }

    #[test]
    fn test_first_fault_wins() {
        let (sm, mut ctx) = setup();
        assert!(sm.latch_fault(&mut ctx, FaultCode::Overcurrent));
        assert!(!sm.latch_fault(&mut ctx, FaultCode::Overtemp));
        assert_eq!(ctx.fault, FaultCode::Overcurrent);
        assert!(!sm.latch_fault(&mut ctx, FaultCode::None));
    }

    #[test]
    fn test_stop_in_fault_keeps_fault() {
        let (sm, mut ctx) = setup();
        sm.latch_fault(&mut ctx, FaultCode::Stall);
        ctx.duty = 10;
        sm.stop(&mut ctx);
        assert_eq!(ctx.state, MotorState::Fault);
        assert_eq!(ctx.duty, 0);
    }

    #[test]
    fn test_ramp_is_linear_then_holds() {
        let (sm, _) = setup();
        // 100 -> 300 over 500 ms
        assert_eq!(sm.ramp_duty(Duration::from_millis(0)), 100);
        assert_eq!(sm.ramp_duty(Duration::from_millis(250)), 200);
        assert_eq!(sm.ramp_duty(Duration::from_millis(500)), 300);
        assert_eq!(sm.ramp_duty(Duration::from_millis(900)), 300);
    }

    #[test]
    fn test_startup_promotion() {
        let (sm, mut ctx) = setup();
        sm.start(&mut ctx, Instant::from_millis(0)).unwrap();
        assert_eq!(sm.update_startup(&mut ctx, Instant::from_millis(100), 50.0), Some(140));
        assert_eq!(ctx.state, MotorState::Starting);
        assert!(sm.update_startup(&mut ctx, Instant::from_millis(200), 250.0).is_some());
        assert_eq!(ctx.state, MotorState::Running);
        assert_eq!(ctx.starting_since, None);
    }

    #[test]
    fn test_startup_timeout_is_stall() {
        let (sm, mut ctx) = setup();
        sm.start(&mut ctx, Instant::from_millis(0)).unwrap();
        assert_eq!(sm.update_startup(&mut ctx, Instant::from_millis(1500), 100.0), None);
        assert_eq!(ctx.state, MotorState::Fault);
        assert_eq!(ctx.fault, FaultCode::Stall);
    }

    #[test]
    fn test_clear_fault_requires_cleared_condition() {
        let (sm, mut ctx) = setup();
        sm.latch_fault(&mut ctx, FaultCode::Overvoltage);
        assert_eq!(
            sm.clear_fault(&mut ctx, false),
            Err(CommandError::ConditionActive(FaultCode::Overvoltage))
        );
        assert_eq!(ctx.fault, FaultCode::Overvoltage);
        assert_eq!(sm.clear_fault(&mut ctx, true), Ok(()));
        assert_eq!(ctx.state, MotorState::Stop);
        assert_eq!(ctx.fault, FaultCode::None);
    }

    #[test]
    fn test_mode_change_only_in_stop() {
        let (sm, mut ctx) = setup();
        ctx.pid.update(1000.0, 0.0, 0.01);
        assert_eq!(sm.set_mode(&mut ctx, ControlMode::Torque), Ok(()));
        assert_eq!(ctx.pid.integral(), 0.0);

        ctx.state = MotorState::Running;
        assert_eq!(
            sm.set_mode(&mut ctx, ControlMode::OpenLoop),
            Err(CommandError::NotStopped(MotorState::Running))
        );
        assert_eq!(ctx.mode, ControlMode::Torque);
        assert_eq!(
            sm.set_direction(&mut ctx, Direction::CounterClockwise),
            Err(CommandError::NotStopped(MotorState::Running))
        );
        assert_eq!(ctx.direction, Direction::Clockwise);
    }

    #[test]
    fn test_leaving_running_resets_pid() {
        let (sm, mut ctx) = setup();
        ctx.state = MotorState::Running;
        ctx.pid.update(1000.0, 0.0, 0.01);
        sm.stop(&mut ctx);
        assert_eq!(ctx.pid.integral(), 0.0);
        assert_eq!(ctx.state, MotorState::Stop);
    }
}
