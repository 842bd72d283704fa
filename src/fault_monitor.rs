//! Fault detection
//!
//! 毎周期の測定値をしきい値と比較し、フォルト要因を判定します。
//! ラッチ自体は状態機械が行い、ここでは判定のみ行います。

use crate::commutation::HallSector;
use crate::config::MotorConfig;
use crate::fmt::*;

/// Latched fault cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultCode {
    #[default]
    None,
    Overcurrent,
    Overvoltage,
    Undervoltage,
    Overtemp,
    HallError,
    Stall,
}

impl FaultCode {
    pub fn is_fault(self) -> bool {
        self != FaultCode::None
    }
}

/// One tick's electrical measurements.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurements {
    /// 相電流 [mA]
    pub current_ma: f32,
    /// DCバス電圧 [V]（フィルタ前）
    pub voltage_v: f32,
    /// 温度 [°C]（センサ無しはNone）
    pub temperature_c: Option<f32>,
}

/// Per-tick inputs to the fault evaluation besides the measurements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultInputs {
    /// Filtered bus voltage [V]
    pub filtered_voltage_v: f32,
    /// The raw Hall reading was a valid sector
    pub hall_valid: bool,
    /// The speed estimator reported a stall
    pub stalled: bool,
}

/// フォルト監視
#[derive(Debug, Clone, Copy)]
pub struct FaultMonitor {
    hard_limit_ma: f32,
    overvoltage_v: f32,
    undervoltage_v: f32,
    overtemp_c: f32,
    /// 電圧ローパスフィルタ係数
    voltage_alpha: f32,
}

impl FaultMonitor {
    pub fn new(config: &MotorConfig) -> Self {
        Self {
            hard_limit_ma: config.current.hard_limit_ma,
            overvoltage_v: config.voltage.overvoltage_v,
            undervoltage_v: config.voltage.undervoltage_v,
            overtemp_c: config.overtemp_c,
            voltage_alpha: config.voltage.filter_alpha,
        }
    }

    /// バス電圧にローパスフィルタを適用
    ///
    /// 初回サンプルでフィルタを初期化します（起動直後の低電圧誤検出防止）。
    ///
    /// # Arguments
    /// * `filtered` - Filter state stored in the motor context
    /// * `raw_v` - Unfiltered sample [V]
    ///
    /// # Returns
    /// Filtered voltage [V]
    pub fn filter_voltage(&self, filtered: &mut Option<f32>, raw_v: f32) -> f32 {
        let next = match *filtered {
            // filtered = alpha * raw + (1 - alpha) * filtered_prev
            Some(prev) => self.voltage_alpha * raw_v + (1.0 - self.voltage_alpha) * prev,
            None => raw_v,
        };
        *filtered = Some(next);
        next
    }

    fn overcurrent(&self, current_ma: f32) -> bool {
        current_ma >= self.hard_limit_ma
    }

    fn overtemp(&self, temperature_c: Option<f32>) -> bool {
        temperature_c.is_some_and(|t| t >= self.overtemp_c)
    }

    /// 現在の測定値からフォルト要因を判定
    ///
    /// 複数の要因が同時に成立した場合は
    /// Overcurrent > Overvoltage > Undervoltage > Overtemp > HallError > Stall
    /// の順で1つを返します。
    ///
    /// # Returns
    /// `FaultCode::None` when every quantity is within bounds
    pub fn evaluate(&self, meas: &Measurements, inputs: &FaultInputs) -> FaultCode {
        let code = if self.overcurrent(meas.current_ma) {
            FaultCode::Overcurrent
        } else if inputs.filtered_voltage_v > self.overvoltage_v {
            FaultCode::Overvoltage
        } else if inputs.filtered_voltage_v < self.undervoltage_v {
            FaultCode::Undervoltage
        } else if self.overtemp(meas.temperature_c) {
            FaultCode::Overtemp
        } else if !inputs.hall_valid {
            FaultCode::HallError
        } else if inputs.stalled {
            FaultCode::Stall
        } else {
            FaultCode::None
        };

        if code.is_fault() {
            debug!(
                "Fault condition {}: I={}mA V={}V",
                code, meas.current_ma, inputs.filtered_voltage_v
            );
        }
        code
    }

    /// ラッチされたフォルトの要因が解消されたか再検証
    ///
    /// # Arguments
    /// * `code` - Latched fault
    /// * `meas` - Latest measurements
    /// * `filtered_voltage_v` - Latest filtered bus voltage
    /// * `last_hall_raw` - Latest raw Hall reading
    pub fn condition_cleared(
        &self,
        code: FaultCode,
        meas: &Measurements,
        filtered_voltage_v: f32,
        last_hall_raw: u8,
    ) -> bool {
        match code {
            FaultCode::None => true,
            FaultCode::Overcurrent => !self.overcurrent(meas.current_ma),
            FaultCode::Overvoltage | FaultCode::Undervoltage => {
                filtered_voltage_v >= self.undervoltage_v && filtered_voltage_v <= self.overvoltage_v
            }
            FaultCode::Overtemp => !self.overtemp(meas.temperature_c),
            FaultCode::HallError => HallSector::new(last_hall_raw).is_ok(),
            // 出力停止中なのでストール状態は存在しない
            FaultCode::Stall => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> FaultMonitor {
        FaultMonitor::new(&MotorConfig::default())
    }

    fn meas(current_ma: f32, voltage_v: f32, temperature_c: Option<f32>) -> Measurements {
        Measurements {
            current_ma,
            voltage_v,
            temperature_c,
        }
    }

    fn healthy() -> FaultInputs {
        FaultInputs {
            filtered_voltage_v: 24.0,
            hall_valid: true,
            stalled: false,
        }
    }

    #[test]
    fn test_nominal_is_no_fault() {
        assert_eq!(
            monitor().evaluate(&meas(2000.0, 24.0, Some(40.0)), &healthy()),
            FaultCode::None
        );
    }

    #[test]
    fn test_each_condition_detected() {
        let m = monitor();
        assert_eq!(
            m.evaluate(&meas(10_000.0, 24.0, None), &healthy()),
            FaultCode::Overcurrent
        );
        let mut inputs = healthy();
        inputs.filtered_voltage_v = 31.0;
        assert_eq!(m.evaluate(&meas(0.0, 31.0, None), &inputs), FaultCode::Overvoltage);
        inputs.filtered_voltage_v = 9.0;
        assert_eq!(m.evaluate(&meas(0.0, 9.0, None), &inputs), FaultCode::Undervoltage);
        assert_eq!(
            m.evaluate(&meas(0.0, 24.0, Some(90.0)), &healthy()),
            FaultCode::Overtemp
        );
        let mut inputs = healthy();
        inputs.hall_valid = false;
        assert_eq!(m.evaluate(&meas(0.0, 24.0, None), &inputs), FaultCode::HallError);
        let mut inputs = healthy();
        inputs.stalled = true;
        assert_eq!(m.evaluate(&meas(0.0, 24.0, None), &inputs), FaultCode::Stall);
    }

    #[test]
    fn test_priority_order() {
        let inputs = FaultInputs {
            filtered_voltage_v: 35.0,
            hall_valid: false,
            stalled: true,
        };
        assert_eq!(
            monitor().evaluate(&meas(12_000.0, 35.0, Some(100.0)), &inputs),
            FaultCode::Overcurrent
        );
        assert_eq!(
            monitor().evaluate(&meas(0.0, 35.0, Some(100.0)), &inputs),
            FaultCode::Overvoltage
        );
    }

    #[test]
    fn test_voltage_filter_seeds_and_smooths() {
        let m = monitor();
        let mut filtered = None;
        assert_eq!(m.filter_voltage(&mut filtered, 24.0), 24.0);
        // 単発のグリッチ（0V）は alpha=0.1 で 21.6V までしか下がらない
        let v = m.filter_voltage(&mut filtered, 0.0);
        assert!((v - 21.6).abs() < 1e-4);
        assert_eq!(m.evaluate(&meas(0.0, 0.0, None), &FaultInputs {
            filtered_voltage_v: v,
            ..healthy()
        }), FaultCode::None);
    }

    #[test]
    fn test_condition_cleared() {
        let m = monitor();
        let ok = meas(1000.0, 24.0, Some(30.0));
        assert!(m.condition_cleared(FaultCode::Overcurrent, &ok, 24.0, 1));
        assert!(!m.condition_cleared(FaultCode::Overcurrent, &meas(10_500.0, 24.0, None), 24.0, 1));
        assert!(!m.condition_cleared(FaultCode::Undervoltage, &ok, 8.0, 1));
        assert!(m.condition_cleared(FaultCode::Overvoltage, &ok, 24.0, 1));
        assert!(!m.condition_cleared(FaultCode::Overtemp, &meas(0.0, 24.0, Some(90.0)), 24.0, 1));
        assert!(m.condition_cleared(FaultCode::Overtemp, &meas(0.0, 24.0, None), 24.0, 1));
        assert!(!m.condition_cleared(FaultCode::HallError, &ok, 24.0, 7));
        assert!(m.condition_cleared(FaultCode::HallError, &ok, 24.0, 5));
        assert!(m.condition_cleared(FaultCode::Stall, &ok, 24.0, 0));
    }
}
