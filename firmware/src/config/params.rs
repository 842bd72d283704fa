//! ボード固有パラメータ（デフォルト値）
//!
//! 制御コアのキャリブレーション値は `bldc_six_step::config` を参照。
//! ここにはSTM32G431ボードの配線・アナログ回路に依存する値のみ置きます。

/// PWM設定
pub mod pwm {
    use embassy_stm32::time::Hertz;

    /// PWM周波数（20kHz、6ステップ駆動の可聴域外）
    pub const DEFAULT_FREQUENCY: Hertz = Hertz(20_000);

    /// デッドタイム [タイマーカウント]（170MHz: 85カウント = 500ns）
    pub const DEFAULT_DEAD_TIME: u16 = 85;
}

/// ADC設定
pub mod adc {
    /// ADC分解能（12ビット = 4096）
    pub const ADC_MAX: f32 = 4096.0;

    /// ADC基準電圧 [V]
    pub const VREF: f32 = 3.3;

    /// バス電圧分圧回路: 33.3kΩ + 3.3kΩ（電圧変換係数 11.09倍）
    pub const VBUS_R_UPPER: f32 = 33_300.0;
    pub const VBUS_R_LOWER: f32 = 3_300.0;

    /// シャント抵抗 [Ω]
    pub const SHUNT_RESISTANCE: f32 = 0.01;

    /// OPAMP1 PGAゲイン（Mul4）
    pub const CURRENT_AMP_GAIN: f32 = 4.0;

    /// 電流0Aでのアンプ出力 [V]
    pub const CURRENT_OFFSET_V: f32 = 0.0;
}

/// 起動時動作
pub mod boot {
    /// デバッグ用: 起動直後に始動する
    pub const AUTO_START: bool = true;

    /// デバッグ用: 起動時の目標速度 [RPM]
    pub const DEFAULT_TARGET_SPEED_RPM: f32 = 1000.0;
}

/// ステータスログ間隔 [ms]
pub const STATUS_LOG_INTERVAL_MS: u64 = 1000;
