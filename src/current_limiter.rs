//! 電流制限（フォールドバック）とトルク制御
//!
//! ソフトリミット以上ではデューティを比例的に絞り、ハードリミット以上で
//! 過電流を通知します。

use crate::config::{CurrentConfig, MAX_DUTY};

/// Outcome of applying the limiter to a duty command.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CurrentLimit {
    /// Below the soft limit, duty unchanged
    PassThrough(u16),
    /// Between soft and hard limit, duty reduced
    FoldedBack(u16),
    /// At or above the hard limit
    Overcurrent,
}

impl CurrentLimit {
    /// Duty to apply, 0 on overcurrent.
    pub fn duty(self) -> u16 {
        match self {
            Self::PassThrough(duty) | Self::FoldedBack(duty) => duty,
            Self::Overcurrent => 0,
        }
    }
}

/// 電流リミッタ
#[derive(Debug, Clone, Copy)]
pub struct CurrentLimiter {
    /// フォールドバック開始電流 [mA]
    soft_limit_ma: f32,
    /// 過電流しきい値 [mA]
    hard_limit_ma: f32,
    /// トルク100%の電流 [mA]
    torque_full_scale_ma: f32,
    /// トルク制御ゲイン [duty/(mA·s)]
    torque_gain: f32,
}

impl CurrentLimiter {
    pub fn new(config: &CurrentConfig) -> Self {
        Self {
            soft_limit_ma: config.soft_limit_ma,
            hard_limit_ma: config.hard_limit_ma,
            torque_full_scale_ma: config.torque_full_scale_ma,
            torque_gain: config.torque_gain,
        }
    }

    /// 過電流判定
    pub fn is_overcurrent(&self, current_ma: f32) -> bool {
        current_ma >= self.hard_limit_ma
    }

    /// デューティ指令に電流制限を適用
    ///
    /// # 引数
    /// * `duty` - 指令デューティ (0-1000)
    /// * `current_ma` - 測定電流 [mA]
    ///
    /// # 戻り値
    /// フォールドバック後のデューティ、または過電流
    pub fn limit(&self, duty: u16, current_ma: f32) -> CurrentLimit {
        let duty = duty.min(MAX_DUTY);

        if self.is_overcurrent(current_ma) {
            return CurrentLimit::Overcurrent;
        }
        if current_ma < self.soft_limit_ma {
            return CurrentLimit::PassThrough(duty);
        }

        // duty * (hard - I) / (hard - soft): ソフトリミットで1.0、ハードリミットで0
        let scale = (self.hard_limit_ma - current_ma) / (self.hard_limit_ma - self.soft_limit_ma);
        let folded = libm::roundf(duty as f32 * scale.clamp(0.0, 1.0)) as u16;
        CurrentLimit::FoldedBack(folded)
    }

    /// トルク指令 [%] を電流指令 [mA] に変換
    pub fn torque_reference_ma(&self, torque_percent: f32) -> f32 {
        torque_percent.clamp(0.0, 100.0) / 100.0 * self.torque_full_scale_ma
    }

    /// トルク制御: 電流誤差を積分してデューティを電流指令へ収束させる
    ///
    /// 積分値は `f32` のまま保持し、出力時のみ丸めます。
    ///
    /// # 引数
    /// * `integral` - 積分デューティ（Noneなら `last_duty` から開始）
    /// * `last_duty` - 前回適用デューティ
    /// * `torque_percent` - トルク指令 (0-100)
    /// * `current_ma` - 測定電流 [mA]
    /// * `dt` - 制御周期 [s]
    ///
    /// # 戻り値
    /// 電流制限適用前のデューティ指令
    pub fn torque_duty(
        &self,
        integral: &mut Option<f32>,
        last_duty: u16,
        torque_percent: f32,
        current_ma: f32,
        dt: f32,
    ) -> u16 {
        let reference = self.torque_reference_ma(torque_percent);
        let step = self.torque_gain * (reference - current_ma) * dt;
        let duty = (integral.unwrap_or(last_duty as f32) + step).clamp(0.0, MAX_DUTY as f32);
        *integral = Some(duty);
        libm::roundf(duty) as u16
    }
}
