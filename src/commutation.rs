//! 6-step commutation for Hall-sensored BLDC motors
//!
//! Maps a Hall reading and the commanded direction to the pair of phases
//! that must be energized. The mapping is a static table so that the lookup
//! costs the same for every sector.

use crate::error::HallError;

/// Rotation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    #[default]
    Clockwise = 0,
    CounterClockwise = 1,
}

/// Drive applied to one phase during a commutation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseDrive {
    /// High-side switch modulated with the duty
    High,
    /// Low-side switch held on
    Low,
    /// Both switches off (high-Z)
    Float,
}

/// Phase energization pattern for U, V and W.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhasePattern {
    pub u: PhaseDrive,
    pub v: PhaseDrive,
    pub w: PhaseDrive,
}

impl PhasePattern {
    /// All phases floating.
    pub const OFF: Self = Self::new(PhaseDrive::Float, PhaseDrive::Float, PhaseDrive::Float);

    pub const fn new(u: PhaseDrive, v: PhaseDrive, w: PhaseDrive) -> Self {
        Self { u, v, w }
    }

    /// Per-phase drives in U, V, W order.
    pub const fn phases(&self) -> [PhaseDrive; 3] {
        [self.u, self.v, self.w]
    }
}

/// Validated Hall sector (1-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallSector(u8);

impl HallSector {
    /// Validate a raw 3-bit Hall reading.
    ///
    /// # Returns
    /// `Err(HallError::InvalidSector)` for 0, 7 and anything above 7
    pub const fn new(raw: u8) -> Result<Self, HallError> {
        if raw >= 1 && raw <= 6 {
            Ok(Self(raw))
        } else {
            Err(HallError::InvalidSector(raw))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

use PhaseDrive::{Float as Z, High as H, Low as L};

/// Commutation table indexed by `[direction][raw hall state]`.
///
/// Clockwise sequence: 1 -> 3 -> 2 -> 6 -> 4 -> 5, energizing
/// U+V-, U+W-, V+W-, V+U-, W+U-, W+V-.
/// Counter-clockwise drives the same phase pair with the polarity swapped.
/// Raw states 0 and 7 have no entry.
static COMMUTATION_TABLE: [[Option<PhasePattern>; 8]; 2] = [
    // Clockwise
    [
        None,
        Some(PhasePattern::new(H, L, Z)), // 1: U+ V-
        Some(PhasePattern::new(Z, H, L)), // 2: V+ W-
        Some(PhasePattern::new(H, Z, L)), // 3: U+ W-
        Some(PhasePattern::new(L, Z, H)), // 4: W+ U-
        Some(PhasePattern::new(Z, L, H)), // 5: W+ V-
        Some(PhasePattern::new(L, H, Z)), // 6: V+ U-
        None,
    ],
    // CounterClockwise
    [
        None,
        Some(PhasePattern::new(L, H, Z)), // 1: V+ U-
        Some(PhasePattern::new(Z, L, H)), // 2: W+ V-
        Some(PhasePattern::new(L, Z, H)), // 3: W+ U-
        Some(PhasePattern::new(H, Z, L)), // 4: U+ W-
        Some(PhasePattern::new(Z, H, L)), // 5: V+ W-
        Some(PhasePattern::new(H, L, Z)), // 6: U+ V-
        None,
    ],
];

/// Look up the phase pattern for a raw Hall reading.
///
/// # Arguments
/// * `sector` - Raw Hall state (0-7)
/// * `direction` - Commanded rotation direction
///
/// # Returns
/// The pattern to apply, or `HallError` when the reading is not a valid
/// sector. On error nothing may be energized.
#[inline]
pub fn commutate(sector: u8, direction: Direction) -> Result<PhasePattern, HallError> {
    COMMUTATION_TABLE[direction as usize]
        .get(sector as usize)
        .copied()
        .flatten()
        .ok_or(HallError::InvalidSector(sector))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTIONS: [Direction; 2] = [Direction::Clockwise, Direction::CounterClockwise];

    #[test]
    fn test_valid_sectors_have_patterns() {
        for direction in DIRECTIONS {
            for sector in 1..=6 {
                let first = commutate(sector, direction).unwrap();
                // 同じセクターの再評価は同じパターン
                assert_eq!(commutate(sector, direction).unwrap(), first);
            }
        }
    }

    #[test]
    fn test_patterns_pairwise_distinct() {
        for direction in DIRECTIONS {
            let patterns: Vec<_> = (1..=6).map(|s| commutate(s, direction).unwrap()).collect();
            for i in 0..patterns.len() {
                for j in (i + 1)..patterns.len() {
                    assert_ne!(patterns[i], patterns[j], "sectors {} and {}", i + 1, j + 1);
                }
            }
        }
    }

    #[test]
    fn test_each_step_drives_one_high_one_low() {
        for direction in DIRECTIONS {
            for sector in 1..=6 {
                let phases = commutate(sector, direction).unwrap().phases();
                assert_eq!(phases.iter().filter(|p| **p == PhaseDrive::High).count(), 1);
                assert_eq!(phases.iter().filter(|p| **p == PhaseDrive::Low).count(), 1);
                assert_eq!(phases.iter().filter(|p| **p == PhaseDrive::Float).count(), 1);
            }
        }
    }

    #[test]
    fn test_invalid_sectors_rejected() {
        for direction in DIRECTIONS {
            for sector in [0u8, 7, 8, 255] {
                assert_eq!(
                    commutate(sector, direction),
                    Err(HallError::InvalidSector(sector))
                );
            }
        }
    }

    #[test]
    fn test_counter_clockwise_swaps_polarity() {
        let flip = |p: PhaseDrive| match p {
            PhaseDrive::High => PhaseDrive::Low,
            PhaseDrive::Low => PhaseDrive::High,
            PhaseDrive::Float => PhaseDrive::Float,
        };
        for sector in 1..=6 {
            let cw = commutate(sector, Direction::Clockwise).unwrap();
            let ccw = commutate(sector, Direction::CounterClockwise).unwrap();
            assert_eq!(ccw, PhasePattern::new(flip(cw.u), flip(cw.v), flip(cw.w)));
        }
    }

    #[test]
    fn test_clockwise_sequence_advances_one_step() {
        // CW順序 1 -> 3 -> 2 -> 6 -> 4 -> 5: 各ステップでHigh相が60°ずつ進む
        let sequence = [1u8, 3, 2, 6, 4, 5];
        let expected = [
            PhasePattern::new(H, L, Z),
            PhasePattern::new(H, Z, L),
            PhasePattern::new(Z, H, L),
            PhasePattern::new(L, H, Z),
            PhasePattern::new(L, Z, H),
            PhasePattern::new(Z, L, H),
        ];
        for (sector, pattern) in sequence.iter().zip(expected.iter()) {
            assert_eq!(commutate(*sector, Direction::Clockwise).unwrap(), *pattern);
        }
    }

    #[test]
    fn test_hall_sector_validation() {
        assert!(HallSector::new(0).is_err());
        assert_eq!(HallSector::new(1).map(HallSector::get), Ok(1));
        assert_eq!(HallSector::new(6).map(HallSector::get), Ok(6));
        assert!(HallSector::new(7).is_err());
    }
}
