//! STM32G431ハードウェア実装
//!
//! 制御コアの `MotorHardware` トレイトを TIM1相補PWM・TIM4 Hallキャプチャ・
//! ADC1（電流）/ ADC2（バス電圧）で実装します。

use bldc_six_step::{MotorHardware, PhaseDrive, PhasePattern};
use embassy_stm32::{
    adc::{Adc, AnyAdcChannel, SampleTime},
    peripherals,
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};
use embassy_time::Instant;

use crate::config::{self, pwm};
use crate::fmt::*;
use crate::hall_tim;
use crate::hardware;

/// U/V/W相に対応するPWMチャネル
const PHASE_CHANNELS: [Channel; 3] = [Channel::Ch1, Channel::Ch2, Channel::Ch3];

/// 3相モータードライバー
///
/// 6ステップ駆動ではHigh相のみデューティでスイッチングし、
/// Low相はデューティ0（相補側ON）、Float相はチャネル無効（両スイッチOFF）とします。
pub struct Stm32Hardware {
    pwm: ComplementaryPwm<'static, peripherals::TIM1>,
    max_duty: u16,
    current_adc: Adc<'static, peripherals::ADC1>,
    current_pin: AnyAdcChannel<peripherals::ADC1>,
    voltage_adc: Adc<'static, peripherals::ADC2>,
    voltage_pin: AnyAdcChannel<peripherals::ADC2>,
    /// 正規化デューティ (0-1000)
    duty: u16,
    pattern: PhasePattern,
    enabled: bool,
}

impl Stm32Hardware {
    /// 新しいハードウェア実装を作成
    ///
    /// # 引数
    /// * `pwm` - PWMペリフェラル（TIM1）
    /// * `current_adc` / `current_pin` - 電流センスアンプ出力（OPAMP1 → PA2）
    /// * `voltage_adc` / `voltage_pin` - バス電圧分圧（PC1）
    pub fn new(
        pwm: ComplementaryPwm<'static, peripherals::TIM1>,
        current_adc: Adc<'static, peripherals::ADC1>,
        current_pin: AnyAdcChannel<peripherals::ADC1>,
        voltage_adc: Adc<'static, peripherals::ADC2>,
        voltage_pin: AnyAdcChannel<peripherals::ADC2>,
    ) -> Self {
        let max_duty = pwm.get_max_duty();
        Self {
            pwm,
            max_duty,
            current_adc,
            current_pin,
            voltage_adc,
            voltage_pin,
            duty: 0,
            pattern: PhasePattern::OFF,
            enabled: false,
        }
    }

    /// 0-1000 正規化デューティをタイマーカウントに変換
    fn scale_duty(&self, duty: u16) -> u16 {
        (duty.min(1000) as u32 * self.max_duty as u32 / 1000) as u16
    }

    fn disable_all_channels(&mut self) {
        for ch in PHASE_CHANNELS {
            self.pwm.set_duty(ch, 0);
            self.pwm.disable(ch);
        }
    }

    /// 現在のパターン・デューティ・有効状態をPWMに反映
    fn write_outputs(&mut self) {
        if !self.enabled {
            self.disable_all_channels();
            return;
        }

        let high_duty = self.scale_duty(self.duty);
        for (ch, drive) in PHASE_CHANNELS.into_iter().zip(self.pattern.phases()) {
            match drive {
                PhaseDrive::High => {
                    self.pwm.set_duty(ch, high_duty);
                    self.pwm.enable(ch);
                }
                PhaseDrive::Low => {
                    self.pwm.set_duty(ch, 0);
                    self.pwm.enable(ch);
                }
                PhaseDrive::Float => {
                    self.pwm.set_duty(ch, 0);
                    self.pwm.disable(ch);
                }
            }
        }
    }
}

impl MotorHardware for Stm32Hardware {
    fn init_gpio(&mut self) {
        unsafe {
            hardware::init_hall_gpio();
        }
    }

    fn init_pwm(&mut self) {
        self.disable_all_channels();
        self.pwm.set_dead_time(pwm::DEFAULT_DEAD_TIME);
        info!(
            "PWM initialized: max_duty={}, dead_time={}",
            self.max_duty,
            pwm::DEFAULT_DEAD_TIME
        );
    }

    fn init_hall(&mut self) {
        unsafe {
            hardware::init_hall_sensor();
        }
    }

    fn init_adc(&mut self) {
        self.current_adc.set_sample_time(SampleTime::CYCLES640_5);
        self.voltage_adc.set_sample_time(SampleTime::CYCLES640_5);
    }

    fn set_pwm_duty(&mut self, duty: u16) {
        self.duty = duty;
        self.write_outputs();
    }

    fn apply_phase_pattern(&mut self, pattern: PhasePattern) {
        if pattern != self.pattern {
            self.pattern = pattern;
            self.write_outputs();
        }
    }

    fn get_hall_state(&mut self) -> u8 {
        hall_tim::get_hall_state()
    }

    fn get_current(&mut self) -> f32 {
        let raw = self.current_adc.blocking_read(&mut self.current_pin);
        config::adc_to_current_ma(raw)
    }

    fn get_voltage(&mut self) -> f32 {
        let raw = self.voltage_adc.blocking_read(&mut self.voltage_pin);
        config::adc_to_bus_voltage(raw)
    }

    fn enable(&mut self) {
        self.enabled = true;
        self.write_outputs();
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.disable_all_channels();
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}
