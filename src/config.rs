//! Configuration module
//!
//! 制御コアの全キャリブレーション値を `MotorConfig` にまとめます。
//! デフォルト値は `params` の定数から生成します。

pub mod params;

use embassy_time::Duration;

use crate::error::ConfigError;

// params.rsから主要な定数を再エクスポート
pub use params::*;

/// Speed PID gains and output bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub output_min: f32,
    pub output_max: f32,
}

/// Current thresholds and torque-mode mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentConfig {
    /// Foldback starts at this current [mA]
    pub soft_limit_ma: f32,
    /// Overcurrent fault at or above this current [mA]
    pub hard_limit_ma: f32,
    /// Current reference for 100 % torque [mA]
    pub torque_full_scale_ma: f32,
    /// Duty change per mA of current error per second
    pub torque_gain: f32,
}

/// Bus voltage protection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoltageConfig {
    pub overvoltage_v: f32,
    pub undervoltage_v: f32,
    /// Low-pass coefficient applied before the threshold comparison (0.0-1.0]
    pub filter_alpha: f32,
}

/// Starting-state ramp profile.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartupConfig {
    pub initial_duty: u16,
    pub final_duty: u16,
    pub ramp_time: Duration,
    /// Starting must reach `min_run_rpm` within this time or the motor faults with Stall
    pub timeout: Duration,
    pub min_run_rpm: f32,
}

/// 制御コア設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorConfig {
    /// モーターの極対数
    pub pole_pairs: u8,
    /// 制御周期（Loop呼び出し間隔）
    pub control_period: Duration,
    /// 速度指令の上限 [RPM]
    pub max_speed_rpm: f32,
    /// Hall速度推定のフィルタ係数
    pub speed_filter_alpha: f32,
    /// ストール判定時間
    pub stall_timeout: Duration,
    /// 過温度しきい値 [°C]
    pub overtemp_c: f32,
    /// オープンループ運転時の固定デューティ
    pub open_loop_duty: u16,
    pub pid: PidConfig,
    pub current: CurrentConfig,
    pub voltage: VoltageConfig,
    pub startup: StartupConfig,
}

impl MotorConfig {
    /// デフォルト設定を生成（params.rsの値を使用）
    pub const fn default() -> Self {
        Self {
            pole_pairs: DEFAULT_POLE_PAIRS,
            control_period: Duration::from_micros(DEFAULT_CONTROL_PERIOD_US),
            max_speed_rpm: DEFAULT_MAX_SPEED_RPM,
            speed_filter_alpha: DEFAULT_SPEED_FILTER_ALPHA,
            stall_timeout: Duration::from_millis(DEFAULT_STALL_TIMEOUT_MS),
            overtemp_c: DEFAULT_OVERTEMP_C,
            open_loop_duty: DEFAULT_OPEN_LOOP_DUTY,
            pid: PidConfig {
                kp: pid::DEFAULT_KP,
                ki: pid::DEFAULT_KI,
                kd: pid::DEFAULT_KD,
                output_min: pid::DEFAULT_OUTPUT_MIN,
                output_max: pid::DEFAULT_OUTPUT_MAX,
            },
            current: CurrentConfig {
                soft_limit_ma: current::DEFAULT_SOFT_LIMIT_MA,
                hard_limit_ma: current::DEFAULT_HARD_LIMIT_MA,
                torque_full_scale_ma: current::DEFAULT_TORQUE_FULL_SCALE_MA,
                torque_gain: current::DEFAULT_TORQUE_GAIN,
            },
            voltage: VoltageConfig {
                overvoltage_v: voltage::DEFAULT_OVERVOLTAGE_V,
                undervoltage_v: voltage::DEFAULT_UNDERVOLTAGE_V,
                filter_alpha: voltage::DEFAULT_FILTER_ALPHA,
            },
            startup: StartupConfig {
                initial_duty: startup::DEFAULT_INITIAL_DUTY,
                final_duty: startup::DEFAULT_FINAL_DUTY,
                ramp_time: Duration::from_millis(startup::DEFAULT_RAMP_TIME_MS),
                timeout: Duration::from_millis(startup::DEFAULT_TIMEOUT_MS),
                min_run_rpm: startup::DEFAULT_MIN_RUN_RPM,
            },
        }
    }

    /// Control period in seconds, the `dt` of every per-tick computation.
    pub fn dt(&self) -> f32 {
        self.control_period.as_micros() as f32 / 1_000_000.0
    }

    /// Check that the configuration describes a controllable motor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pole_pairs == 0 {
            return Err(ConfigError::ZeroPolePairs);
        }
        if self.control_period.as_ticks() == 0 {
            return Err(ConfigError::ZeroControlPeriod);
        }
        if !(self.current.soft_limit_ma > 0.0
            && self.current.soft_limit_ma < self.current.hard_limit_ma)
        {
            return Err(ConfigError::CurrentLimits {
                soft_ma: self.current.soft_limit_ma,
                hard_ma: self.current.hard_limit_ma,
            });
        }
        if !(self.voltage.undervoltage_v < self.voltage.overvoltage_v) {
            return Err(ConfigError::VoltageLimits {
                under_v: self.voltage.undervoltage_v,
                over_v: self.voltage.overvoltage_v,
            });
        }
        let max_duty = MAX_DUTY as f32;
        if !(self.pid.output_min >= 0.0
            && self.pid.output_min < self.pid.output_max
            && self.pid.output_max <= max_duty)
            || self.open_loop_duty > MAX_DUTY
            || self.startup.initial_duty > MAX_DUTY
            || self.startup.final_duty > MAX_DUTY
        {
            return Err(ConfigError::DutyBounds);
        }
        for alpha in [self.speed_filter_alpha, self.voltage.filter_alpha] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(ConfigError::FilterAlpha(alpha));
            }
        }
        if self.pid.kp < 0.0 || self.pid.ki < 0.0 || self.pid.kd < 0.0 || self.current.torque_gain < 0.0
        {
            return Err(ConfigError::NegativeGain);
        }
        if self.startup.min_run_rpm <= 0.0 || self.startup.timeout.as_ticks() == 0 {
            return Err(ConfigError::Startup);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(MotorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_dt_from_control_period() {
        let mut config = MotorConfig::default();
        config.control_period = Duration::from_millis(1);
        assert!((config.dt() - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_inverted_current_limits() {
        let mut config = MotorConfig::default();
        config.current.soft_limit_ma = 12_000.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CurrentLimits { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_pole_pairs() {
        let mut config = MotorConfig::default();
        config.pole_pairs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPolePairs));
    }

    #[test]
    fn test_rejects_filter_alpha_out_of_range() {
        let mut config = MotorConfig::default();
        config.voltage.filter_alpha = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::FilterAlpha(0.0)));
    }

    #[test]
    fn test_rejects_duty_above_full_scale() {
        let mut config = MotorConfig::default();
        config.open_loop_duty = 1200;
        assert_eq!(config.validate(), Err(ConfigError::DutyBounds));
    }
}
