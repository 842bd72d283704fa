#![no_std]
#![no_main]

mod fmt;

mod config;
mod hall_tim;
mod hardware;
mod motor_driver;
mod state;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use bldc_six_step::MotorController;
use embassy_executor::Spawner;
use embassy_stm32::{
    adc::{Adc, AdcChannel},
    gpio::{Level, Output, OutputType, Speed},
    opamp::{OpAmp, OpAmpGain, OpAmpSpeed},
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
    },
};
use embassy_time::{Duration, Timer};

use fmt::*;
use motor_driver::Stm32Hardware;
use state::COMMANDS;
use tasks::{led_task, motor_control_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let config = hardware::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("═══════════════════════════════════════════════════════════════════");
    info!("");
    info!("        BLDC Six-Step Controller • STM32G431VB @ 170MHz");
    info!("        Hall-sensored trapezoidal commutation");
    info!("");
    info!("═══════════════════════════════════════════════════════════════════");

    // LED初期化＆タスク起動
    let led1 = Output::new(p.PC13, Level::High, Speed::Low);
    let led2 = Output::new(p.PC14, Level::High, Speed::Low);
    let led3 = Output::new(p.PC15, Level::High, Speed::Low);
    spawner.spawn(led_task(led1, led2, led3)).unwrap();

    // 電流センスアンプ（OPAMP1 PGA ×4、PA1入力 → PA2出力）
    let mut op1 = OpAmp::new(p.OPAMP1, OpAmpSpeed::HighSpeed);
    let _op1_out = op1.pga_ext(p.PA1, p.PA2, OpAmpGain::Mul4);

    // ADC初期化（サンプル時間は MotorHardware::init_adc で設定）
    // PA2 = ADC1_IN3（OPAMP1出力）、PC1 = ADC2_IN7（バス電圧）
    // PA2の所有権はOPAMPに移っているため、ADCチャネル用に再取得
    let p2 = unsafe { embassy_stm32::Peripherals::steal() };
    let current_adc = Adc::new(p.ADC1);
    let current_pin = p2.PA2.degrade_adc();
    let voltage_adc = Adc::new(p.ADC2);
    let voltage_pin = p.PC1.degrade_adc();

    // PWM初期化（TIM1、3相補完PWM）
    let uvw_pwm = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE8, OutputType::PushPull)),
        Some(PwmPin::new(p.PE11, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE10, OutputType::PushPull)),
        Some(PwmPin::new(p.PE13, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE12, OutputType::PushPull)),
        None,
        None,
        config::pwm::DEFAULT_FREQUENCY,
        CountingMode::EdgeAlignedUp,
    );

    let hw = Stm32Hardware::new(uvw_pwm, current_adc, current_pin, voltage_adc, voltage_pin);

    let mut controller = match MotorController::new(hw, config::motor_config()) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Invalid motor configuration: {}", e);
            loop {
                Timer::after(Duration::from_millis(1000)).await;
            }
        }
    };
    controller.init();

    if config::boot::AUTO_START {
        // デバッグ用: 起動時に目標速度を設定して始動
        COMMANDS.set_speed(config::boot::DEFAULT_TARGET_SPEED_RPM);
        COMMANDS.request_start();
        info!(
            "Auto start: target {} RPM",
            config::boot::DEFAULT_TARGET_SPEED_RPM
        );
    }

    // モーター制御タスクを起動
    spawner.spawn(motor_control_task(controller)).unwrap();

    // メインループ（OPAMPを保持）
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
