//! ステータスLEDタスク
//!
//! 制御ループが公開するステータスをLEDで表示します。
//! - LED1: ハートビート（500ms周期で点滅）
//! - LED2: Running中に点灯、Starting中に点滅
//! - LED3: Fault中に点灯

use bldc_six_step::MotorState;
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Timer};

use crate::fmt::*;
use crate::state::COMMANDS;

/// ステータスLEDタスク
#[embassy_executor::task]
pub async fn led_task(
    mut led1: Output<'static>,
    mut led2: Output<'static>,
    mut led3: Output<'static>,
) {
    info!("LED task started");

    let mut last_state = MotorState::Stop;

    loop {
        let status = COMMANDS.status();
        if status.state != last_state {
            debug!("LED: motor state {}", status.state);
            last_state = status.state;
        }

        led1.toggle();

        match status.state {
            MotorState::Running => led2.set_high(),
            MotorState::Starting => led2.toggle(),
            MotorState::Stop | MotorState::Fault => led2.set_low(),
        }

        if status.fault.is_fault() {
            led3.set_high();
        } else {
            led3.set_low();
        }

        Timer::after(Duration::from_millis(250)).await;
    }
}
