//! タスクモジュール
//!
//! 各タスクの実装を分離して管理します。

pub mod led;
pub mod motor_control;

// タスク関数を再エクスポート
pub use led::led_task;
pub use motor_control::motor_control_task;
