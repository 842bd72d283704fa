//! モーター制御タスク
//!
//! 制御周期ごとに指令チャネルを処理し、6ステップ制御を1ティック実行します。

use bldc_six_step::MotorController;
use embassy_time::{Duration, Ticker};

use crate::config::STATUS_LOG_INTERVAL_MS;
use crate::fmt::*;
use crate::hall_tim;
use crate::motor_driver::Stm32Hardware;
use crate::state::COMMANDS;

/// モーター制御タスク
#[embassy_executor::task]
pub async fn motor_control_task(mut controller: MotorController<Stm32Hardware>) {
    let period = controller.config().control_period;
    info!(
        "Motor control task started: period={}us, pole_pairs={}",
        period.as_micros(),
        controller.config().pole_pairs
    );

    let mut ticker = Ticker::every(period);

    // ステータスログ用カウンタ（1秒ごとにログ）
    let log_every =
        (Duration::from_millis(STATUS_LOG_INTERVAL_MS).as_ticks() / period.as_ticks().max(1)) as u32;
    let mut log_counter = 0u32;

    loop {
        ticker.next().await;

        controller.service(&COMMANDS);

        log_counter += 1;
        if log_counter >= log_every {
            log_counter = 0;
            let status = controller.status();
            debug!(
                "[Motor] state={}, mode={}, dir={}, rpm={}, duty={}, I={}mA, Vbus={}V, fault={}, edges={}",
                status.state,
                status.mode,
                status.direction,
                status.speed_rpm,
                status.duty,
                status.current_ma,
                status.voltage_v,
                status.fault,
                hall_tim::edge_count()
            );
        }
    }
}
