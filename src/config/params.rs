//! モーター制御パラメータ（デフォルト値）
//!
//! 実機に合わせたキャリブレーション値は `MotorConfig` で上書きします。

/// モーターの極対数（ポール数12 / 2 = 6）
pub const DEFAULT_POLE_PAIRS: u8 = 6;

/// 制御周期 [μs]（2kHz = 500μs）
pub const DEFAULT_CONTROL_PERIOD_US: u64 = 500;

/// デューティ指令の上限（0-1000 正規化）
pub const MAX_DUTY: u16 = 1000;

/// 速度指令の上限 [RPM]
pub const DEFAULT_MAX_SPEED_RPM: f32 = 6000.0;

/// Hall速度推定のフィルタ係数（1.0 = フィルタなし）
pub const DEFAULT_SPEED_FILTER_ALPHA: f32 = 1.0;

/// 停止（ストール）判定時間 [ms]
/// Running中にこの時間Hallエッジが無ければストール
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 250;

/// 速度PID制御パラメータ
pub mod pid {
    /// 比例ゲイン [duty/RPM]
    pub const DEFAULT_KP: f32 = 0.5;
    /// 積分ゲイン [duty/(RPM·s)]
    pub const DEFAULT_KI: f32 = 0.5;
    /// 微分ゲイン [duty·s/RPM]
    pub const DEFAULT_KD: f32 = 0.0;
    /// 出力下限（デューティ）
    pub const DEFAULT_OUTPUT_MIN: f32 = 0.0;
    /// 出力上限（デューティ）
    pub const DEFAULT_OUTPUT_MAX: f32 = super::MAX_DUTY as f32;
}

/// 電流制限パラメータ
pub mod current {
    /// フォールドバック開始電流 [mA]
    pub const DEFAULT_SOFT_LIMIT_MA: f32 = 8000.0;
    /// 過電流しきい値 [mA]（到達で即時フォルト）
    pub const DEFAULT_HARD_LIMIT_MA: f32 = 10000.0;
    /// トルク100%に対応する電流 [mA]
    pub const DEFAULT_TORQUE_FULL_SCALE_MA: f32 = 8000.0;
    /// トルク制御の電流誤差積分ゲイン [duty/(mA·s)]
    pub const DEFAULT_TORQUE_GAIN: f32 = 0.5;
}

/// DCバス電圧保護パラメータ
pub mod voltage {
    /// 過電圧しきい値 [V]
    pub const DEFAULT_OVERVOLTAGE_V: f32 = 30.0;
    /// 低電圧しきい値 [V]
    pub const DEFAULT_UNDERVOLTAGE_V: f32 = 10.0;
    /// ローパスフィルタ係数（0.0-1.0、大きいほど応答速度が速い）
    pub const DEFAULT_FILTER_ALPHA: f32 = 0.1;
}

/// 過温度しきい値 [°C]
pub const DEFAULT_OVERTEMP_C: f32 = 85.0;

/// 始動ランプパラメータ（Hall転流 + デューティランプ）
pub mod startup {
    /// 初期デューティ (0-1000)
    pub const DEFAULT_INITIAL_DUTY: u16 = 100;
    /// ランプ到達デューティ (0-1000)
    pub const DEFAULT_FINAL_DUTY: u16 = 300;
    /// ランプ時間 [ms]
    pub const DEFAULT_RAMP_TIME_MS: u64 = 500;
    /// 始動タイムアウト [ms]（この時間内にRunningへ移行できなければストール）
    pub const DEFAULT_TIMEOUT_MS: u64 = 1500;
    /// Running移行回転数 [RPM]
    pub const DEFAULT_MIN_RUN_RPM: f32 = 200.0;
}

/// オープンループ運転時の固定デューティ (0-1000)
pub const DEFAULT_OPEN_LOOP_DUTY: u16 = 300;
