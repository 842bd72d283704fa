//! Configuration module
//!
//! ボード固有の設定と、制御コアへ渡す `MotorConfig` を提供します。

pub mod params;

use bldc_six_step::MotorConfig;

// params.rsから主要な定数を再エクスポート
pub use params::*;

/// このボード・モーター用の制御コア設定
///
/// 制御コアのデフォルト値（12極モーター、2kHz制御）をそのまま使用します。
pub const fn motor_config() -> MotorConfig {
    MotorConfig::default()
}

/// ADC生値を電圧 [V] に変換
pub fn adc_to_volts(adc_raw: u16) -> f32 {
    (adc_raw as f32 / adc::ADC_MAX) * adc::VREF
}

/// ADC生値からDCバス電圧 [V] を計算
///
/// V_bus = V_adc * (R_upper + R_lower) / R_lower
pub fn adc_to_bus_voltage(adc_raw: u16) -> f32 {
    let divider_ratio = (adc::VBUS_R_UPPER + adc::VBUS_R_LOWER) / adc::VBUS_R_LOWER;
    adc_to_volts(adc_raw) * divider_ratio
}

/// ADC生値から相電流 [mA] を計算
///
/// I = (V_adc - V_offset) / (gain * R_shunt)
pub fn adc_to_current_ma(adc_raw: u16) -> f32 {
    let v_shunt = (adc_to_volts(adc_raw) - adc::CURRENT_OFFSET_V) / adc::CURRENT_AMP_GAIN;
    v_shunt / adc::SHUNT_RESISTANCE * 1000.0
}
