// PID speed controller with integral clamping anti-windup

use crate::config::{PidConfig, MAX_DUTY};

/// PID gains
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidGains {
    /// Proportional gain
    pub kp: f32,
    /// Integral gain (0 = disabled)
    pub ki: f32,
    /// Derivative gain (0 = disabled)
    pub kd: f32,
}

/// PID controller state
///
/// Lives in the motor context. Must be reset on entry to Starting, on exit
/// from Running and on every control mode change.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidState {
    /// Integral accumulator
    integral: f32,
    /// Error of the previous update (for derivative)
    prev_error: f32,
    gains: PidGains,
    /// Minimum output limit
    output_min: f32,
    /// Maximum output limit
    output_max: f32,
}

impl PidState {
    /// Create a new PID controller
    ///
    /// # Arguments
    /// * `gains` - Kp, Ki, Kd
    /// * `output_min` - Minimum output limit
    /// * `output_max` - Maximum output limit
    pub const fn new(gains: PidGains, output_min: f32, output_max: f32) -> Self {
        Self {
            integral: 0.0,
            prev_error: 0.0,
            gains,
            output_min,
            output_max,
        }
    }

    pub const fn from_config(config: &PidConfig) -> Self {
        Self::new(
            PidGains {
                kp: config.kp,
                ki: config.ki,
                kd: config.kd,
            },
            config.output_min,
            config.output_max,
        )
    }

    /// Update the controller
    ///
    /// # Arguments
    /// * `target` - Desired speed
    /// * `current` - Measured speed
    /// * `dt` - Time step (seconds)
    ///
    /// # Returns
    /// Controller output (limited to output_min..output_max)
    pub fn update(&mut self, target: f32, current: f32, dt: f32) -> f32 {
        if dt <= 0.0 {
            return 0.0;
        }

        let error = target - current;

        let p_term = self.gains.kp * error;

        // Anti-windup: Ki·integral alone never leaves the output bounds
        let i_term = if self.gains.ki > 0.0 {
            self.integral += error * dt;
            self.integral = self.integral.clamp(
                self.output_min / self.gains.ki,
                self.output_max / self.gains.ki,
            );
            self.gains.ki * self.integral
        } else {
            self.integral = 0.0;
            0.0
        };

        let d_term = self.gains.kd * (error - self.prev_error) / dt;
        self.prev_error = error;

        (p_term + i_term + d_term).clamp(self.output_min, self.output_max)
    }

    /// Reset integral and previous error to zero
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    /// Set the PID gains
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Get the current integral accumulator
    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn prev_error(&self) -> f32 {
        self.prev_error
    }
}

/// Convert a controller output into a 0-1000 duty.
pub fn to_duty(output: f32) -> u16 {
    if !output.is_finite() {
        return 0;
    }
    libm::roundf(output.clamp(0.0, MAX_DUTY as f32)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(kp: f32, ki: f32, kd: f32) -> PidState {
        PidState::new(PidGains { kp, ki, kd }, 0.0, 1000.0)
    }

    #[test]
    fn test_speed_scenario() {
        // 3000 RPM指令、2000 RPM実測: 0.5*1000 + 0.01*(1000*0.001) = 500.01
        let mut pid = pid(0.5, 0.01, 0.0);
        let output = pid.update(3000.0, 2000.0, 0.001);
        assert!((output - 500.01).abs() < 1e-3);
        assert_eq!(to_duty(output), 500);
    }

    #[test]
    fn test_proportional_only() {
        let mut pid = pid(1.0, 0.0, 0.0);
        assert_eq!(pid.update(5.0, 0.0, 0.1), 5.0);
    }

    #[test]
    fn test_output_limiting() {
        let mut pid = pid(1.0, 0.0, 0.0);
        assert_eq!(pid.update(5000.0, 0.0, 0.1), 1000.0);
        assert_eq!(pid.update(0.0, 5000.0, 0.1), 0.0);
    }

    #[test]
    fn test_integral_accumulation() {
        let mut pid = pid(0.0, 1.0, 0.0);
        // Error = 10, dt = 0.1 -> integral +1.0 per step
        pid.update(10.0, 0.0, 0.1);
        assert!((pid.integral() - 1.0).abs() < 1e-6);
        pid.update(10.0, 0.0, 0.1);
        assert!((pid.integral() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_integral_clamped_to_output_bounds() {
        let mut pid = pid(0.0, 2.0, 0.0);
        for _ in 0..10_000 {
            pid.update(1000.0, 0.0, 0.01);
        }
        // Ki·integral <= 1000
        assert!(pid.integral() * 2.0 <= 1000.0 + 1e-3);
        // 誤差反転で直ちに出力が下がる
        let output = pid.update(0.0, 1000.0, 0.01);
        assert!(output < 1000.0);
    }

    #[test]
    fn test_derivative_term() {
        let mut pid = pid(0.0, 0.0, 0.01);
        pid.update(100.0, 0.0, 0.001);
        // error 100 -> 150: derivative = 50 / 0.001 = 50000, * 0.01 = 500
        let output = pid.update(150.0, 0.0, 0.001);
        assert!((output - 500.0).abs() < 1e-2);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pid = pid(0.5, 1.0, 0.1);
        pid.update(100.0, 0.0, 0.01);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.prev_error(), 0.0);
    }

    #[test]
    fn test_non_positive_dt() {
        let mut pid = pid(1.0, 1.0, 1.0);
        assert_eq!(pid.update(100.0, 0.0, 0.0), 0.0);
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn test_to_duty_clamps() {
        assert_eq!(to_duty(-5.0), 0);
        assert_eq!(to_duty(1500.0), 1000);
        assert_eq!(to_duty(499.6), 500);
        assert_eq!(to_duty(f32::NAN), 0);
    }
}
