// Hall sensor speed estimation for six-step BLDC control
// Derives mechanical RPM from the time between successive valid Hall transitions

use embassy_time::{Duration, Instant};

use crate::commutation::HallSector;
use crate::fmt::*;

/// Hall edges per electrical revolution
pub const SECTORS_PER_ELECTRICAL_REV: f32 = 6.0;

/// Hall transition tracking, stored in the motor context.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallTracking {
    /// Last valid sector observed
    pub last_sector: Option<HallSector>,
    /// Timestamp of the last valid transition (None right after reset)
    pub last_transition: Option<Instant>,
    /// Current speed estimate in RPM
    pub rpm: f32,
}

impl HallTracking {
    /// Forget the previous transition so the next one only stores its timestamp.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Result of one estimator update.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedSample {
    /// Speed in RPM
    pub rpm: f32,
    /// No valid transition for longer than the stall timeout while running
    pub stalled: bool,
    /// This update observed a new valid transition
    pub transition: bool,
}

/// Speed estimator
///
/// `rpm = k / period`, with `k = 60 / (6 * pole_pairs)` so that one
/// electrical revolution (six transitions) per pole pair is one
/// mechanical revolution.
#[derive(Debug, Clone, Copy)]
pub struct SpeedEstimator {
    /// Calibration constant [RPM·s]
    k: f32,
    /// Maximum time between transitions before the rotor counts as stopped
    stall_timeout: Duration,
    /// Low-pass filter coefficient for speed (0.0 - 1.0]
    /// 1.0 disables filtering
    filter_alpha: f32,
}

impl SpeedEstimator {
    /// Create a new estimator
    ///
    /// # Arguments
    /// * `pole_pairs` - Number of pole pairs in the motor
    /// * `stall_timeout` - Time without transitions after which speed is reported as 0
    /// * `filter_alpha` - Low-pass filter coefficient (0.0-1.0]
    pub fn new(pole_pairs: u8, stall_timeout: Duration, filter_alpha: f32) -> Self {
        Self {
            k: 60.0 / (SECTORS_PER_ELECTRICAL_REV * pole_pairs.max(1) as f32),
            stall_timeout,
            filter_alpha: filter_alpha.clamp(0.0, 1.0),
        }
    }

    /// Calibration constant in RPM·s.
    pub fn k(&self) -> f32 {
        self.k
    }

    /// Instantaneous speed for a transition period.
    ///
    /// # Returns
    /// RPM, or 0 for a zero-length period
    pub fn rpm_from_period(&self, period: Duration) -> f32 {
        let period_us = period.as_micros();
        if period_us == 0 {
            return 0.0;
        }
        self.k * 1_000_000.0 / period_us as f32
    }

    /// Feed one Hall reading into the estimator
    ///
    /// # Arguments
    /// * `track` - Transition state owned by the motor context
    /// * `sector` - Current reading, `None` when it was not a valid sector
    /// * `now` - Sample timestamp
    /// * `running` - Whether the motor is in the Running state (stall reporting)
    pub fn update(
        &self,
        track: &mut HallTracking,
        sector: Option<HallSector>,
        now: Instant,
        running: bool,
    ) -> SpeedSample {
        let mut transition = false;

        if let Some(sector) = sector {
            if track.last_sector != Some(sector) {
                transition = true;
                match track.last_transition {
                    Some(prev) => {
                        if let Some(period) = now.checked_duration_since(prev) {
                            if period.as_micros() > 0 {
                                let instant_rpm = self.rpm_from_period(period);
                                track.rpm = self.filter_alpha * instant_rpm
                                    + (1.0 - self.filter_alpha) * track.rpm;
                            }
                        }
                    }
                    // 初回エッジ: 周期が無いので速度0でタイムスタンプのみ保存
                    None => track.rpm = 0.0,
                }
                trace!(
                    "Hall edge: {} -> {}, rpm={}",
                    track.last_sector.map(HallSector::get).unwrap_or(0),
                    sector.get(),
                    track.rpm
                );
                track.last_sector = Some(sector);
                track.last_transition = Some(now);
            }
        }

        let mut stalled = false;
        if !transition {
            if let Some(prev) = track.last_transition {
                let silent = now
                    .checked_duration_since(prev)
                    .unwrap_or(Duration::from_ticks(0));
                if silent > self.stall_timeout {
                    track.rpm = 0.0;
                    stalled = running;
                } else {
                    // 次のエッジまでの経過時間から上限を決め、減速中の古い速度を抑える
                    let bound = self.rpm_from_period(silent);
                    if silent.as_micros() > 0 && bound < track.rpm {
                        track.rpm = bound;
                    }
                }
            }
        }

        SpeedSample {
            rpm: track.rpm,
            stalled,
            transition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(raw: u8) -> Option<HallSector> {
        HallSector::new(raw).ok()
    }

    fn estimator() -> SpeedEstimator {
        SpeedEstimator::new(6, Duration::from_millis(100), 1.0)
    }

    #[test]
    fn test_k_constant() {
        // 6極対: k = 60 / 36
        let est = estimator();
        assert!((est.k() - 60.0 / 36.0).abs() < 1e-6);
    }

    #[test]
    fn test_first_transition_reports_zero() {
        let est = estimator();
        let mut track = HallTracking::default();
        let sample = est.update(&mut track, sector(1), Instant::from_millis(10), false);
        assert!(sample.transition);
        assert_eq!(sample.rpm, 0.0);
        assert_eq!(track.last_transition, Some(Instant::from_millis(10)));
    }

    #[test]
    fn test_rpm_from_transition_period() {
        let est = estimator();
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_micros(0), false);
        let sample = est.update(&mut track, sector(3), Instant::from_micros(2_000), false);
        // k / 0.002s = (60/36) / 0.002 = 833.33 RPM
        assert!((sample.rpm - 833.333).abs() < 0.01);
    }

    #[test]
    fn test_doubling_period_halves_rpm() {
        let est = estimator();
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_micros(0), false);
        let fast = est.update(&mut track, sector(3), Instant::from_micros(1_000), false);
        let slow = est.update(&mut track, sector(2), Instant::from_micros(3_000), false);
        assert!((fast.rpm / slow.rpm - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_same_sector_is_not_a_transition() {
        let est = estimator();
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_micros(0), false);
        est.update(&mut track, sector(3), Instant::from_micros(1_000), false);
        let sample = est.update(&mut track, sector(3), Instant::from_micros(1_500), false);
        assert!(!sample.transition);
        assert_eq!(track.last_transition, Some(Instant::from_micros(1_000)));
    }

    #[test]
    fn test_invalid_readings_keep_timestamp() {
        let est = estimator();
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_micros(0), false);
        let sample = est.update(&mut track, None, Instant::from_micros(500), false);
        assert!(!sample.transition);
        assert_eq!(track.last_sector, sector(1));
        assert_eq!(track.last_transition, Some(Instant::from_micros(0)));
    }

    #[test]
    fn test_stall_reported_only_while_running() {
        let est = estimator();
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_millis(0), true);
        est.update(&mut track, sector(3), Instant::from_millis(2), true);
        assert!(track.rpm > 0.0);

        let idle = est.update(&mut track, sector(3), Instant::from_millis(150), false);
        assert_eq!(idle.rpm, 0.0);
        assert!(!idle.stalled);

        let running = est.update(&mut track, sector(3), Instant::from_millis(160), true);
        assert_eq!(running.rpm, 0.0);
        assert!(running.stalled);
    }

    #[test]
    fn test_within_timeout_is_not_stall() {
        let est = estimator();
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_millis(0), true);
        let sample = est.update(&mut track, sector(1), Instant::from_millis(100), true);
        assert!(!sample.stalled);
    }

    #[test]
    fn test_speed_decays_between_late_edges() {
        let est = estimator();
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_micros(0), true);
        let measured = est.update(&mut track, sector(3), Instant::from_micros(2_000), true);

        // 前回周期より短い経過時間では測定値を保持
        let early = est.update(&mut track, sector(3), Instant::from_micros(3_000), true);
        assert_eq!(early.rpm, measured.rpm);

        // 周期の2倍経過: 速度は半分以下
        let late = est.update(&mut track, sector(3), Instant::from_micros(6_000), true);
        assert!(late.rpm <= measured.rpm / 2.0 + 0.01);
        assert!(!late.stalled);

        let later = est.update(&mut track, sector(3), Instant::from_micros(20_000), true);
        assert!(later.rpm < late.rpm);
        assert!(later.rpm > 0.0);
    }

    #[test]
    fn test_filtered_speed() {
        let est = SpeedEstimator::new(6, Duration::from_millis(100), 0.5);
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_micros(0), false);
        let sample = est.update(&mut track, sector(3), Instant::from_micros(1_000), false);
        let instant = est.rpm_from_period(Duration::from_micros(1_000));
        assert!((sample.rpm - instant * 0.5).abs() < 0.01);
    }

    #[test]
    fn test_reset_forgets_timestamp() {
        let est = estimator();
        let mut track = HallTracking::default();
        est.update(&mut track, sector(1), Instant::from_micros(0), false);
        est.update(&mut track, sector(3), Instant::from_micros(1_000), false);
        track.reset();
        let sample = est.update(&mut track, sector(2), Instant::from_micros(2_000), false);
        assert_eq!(sample.rpm, 0.0);
    }
}
