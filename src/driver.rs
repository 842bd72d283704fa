//! ハードウェアアクセス抽象化レイヤー
//!
//! GPIO / PWM / Hallキャプチャ / ADC への直接アクセスを隠蔽し、
//! 制御コアに必要な最小限のインターフェースを提供します。
//! 実機では `firmware` の `Stm32Hardware`、テストではシミュレーションが実装します。

use embassy_time::Instant;

use crate::commutation::PhasePattern;

/// Hardware-access collaborator of the control core.
///
/// The `init_*` operations are invoked once by
/// [`MotorController::init`](crate::motor_control::MotorController::init),
/// in declaration order, before the first control tick.
pub trait MotorHardware {
    /// GPIO（ゲートドライバのイネーブル等）の初期化
    fn init_gpio(&mut self);

    /// PWMタイマーの初期化（出力は無効のまま）
    fn init_pwm(&mut self);

    /// Hallセンサーキャプチャの初期化
    fn init_hall(&mut self);

    /// ADC（電流・電圧・温度）の初期化
    fn init_adc(&mut self);

    /// Duty比を設定
    ///
    /// # 引数
    /// * `duty` - 0-1000 正規化デューティ
    fn set_pwm_duty(&mut self, duty: u16);

    /// 各相の通電パターンを選択（Duty比はHigh相に適用）
    fn apply_phase_pattern(&mut self, pattern: PhasePattern);

    /// Hall状態 (0-7) を取得
    fn get_hall_state(&mut self) -> u8;

    /// 相電流 [mA]
    fn get_current(&mut self) -> f32;

    /// DCバス電圧 [V]
    fn get_voltage(&mut self) -> f32;

    /// 温度 [°C]
    ///
    /// Boards without a temperature sensor keep the default `None`, which
    /// disables overtemperature detection.
    fn get_temperature(&mut self) -> Option<f32> {
        None
    }

    /// パワーステージ出力を有効化
    fn enable(&mut self);

    /// パワーステージ出力を無効化（全スイッチオフ）
    fn disable(&mut self);

    /// Monotonic timestamp used for Hall timing and the startup timeout.
    fn now(&self) -> Instant;
}
