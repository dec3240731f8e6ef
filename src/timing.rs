// ⏱ Timing Value - race-clock arithmetic
// A triple (minutes, seconds, hundredths) with base-60/base-100 carry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

// ============================================================================
// TIMING
// ============================================================================

/// A race time, normalized to integer minutes / seconds / hundredths.
///
/// Addition and subtraction propagate carries the way a race clock does:
/// 100 hundredths roll into a second, 60 seconds roll into a minute.
/// Subtraction saturates at zero rather than going negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timing {
    pub minutes: u32,
    pub seconds: u32,
    pub hundredths: u32,
}

impl Timing {
    pub fn new(minutes: u32, seconds: u32, hundredths: u32) -> Self {
        // Normalize whatever the caller hands us
        Timing::from_hundredths(
            (minutes as i64) * 6000 + (seconds as i64) * 100 + hundredths as i64,
        )
    }

    /// Total time expressed in hundredths of a second
    pub fn to_hundredths(&self) -> i64 {
        (self.minutes as i64) * 6000 + (self.seconds as i64) * 100 + self.hundredths as i64
    }

    /// Build a timing from a total-hundredths value (negative clamps to zero)
    pub fn from_hundredths(total: i64) -> Self {
        let total = total.max(0);
        Timing {
            minutes: (total / 6000) as u32,
            seconds: ((total % 6000) / 100) as u32,
            hundredths: (total % 100) as u32,
        }
    }

    /// A zero timing is the "no time recorded" sentinel in result rows
    pub fn is_zero(&self) -> bool {
        self.minutes == 0 && self.seconds == 0 && self.hundredths == 0
    }
}

impl Add for Timing {
    type Output = Timing;

    fn add(self, other: Timing) -> Timing {
        Timing::from_hundredths(self.to_hundredths() + other.to_hundredths())
    }
}

impl Sub for Timing {
    type Output = Timing;

    fn sub(self, other: Timing) -> Timing {
        Timing::from_hundredths(self.to_hundredths() - other.to_hundredths())
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'{:02}\"{:02}", self.minutes, self.seconds, self.hundredths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_with_carry() {
        // 0'57"10 + 0'28"50 = 1'25"60 (carry from seconds into minutes)
        let prev = Timing::new(0, 57, 10);
        let delta = Timing::new(0, 28, 50);
        let sum = prev + delta;

        assert_eq!(sum, Timing::new(1, 25, 60));
    }

    #[test]
    fn test_add_hundredths_carry() {
        let a = Timing::new(0, 59, 99);
        let b = Timing::new(0, 0, 1);

        assert_eq!(a + b, Timing::new(1, 0, 0));
    }

    #[test]
    fn test_sub_with_borrow() {
        // 1'25"60 - 0'57"10 = 0'28"50 (borrow from minutes)
        let total = Timing::new(1, 25, 60);
        let prev = Timing::new(0, 57, 10);

        assert_eq!(total - prev, Timing::new(0, 28, 50));
    }

    #[test]
    fn test_sub_saturates_at_zero() {
        let small = Timing::new(0, 10, 0);
        let big = Timing::new(1, 0, 0);

        assert_eq!(small - big, Timing::new(0, 0, 0));
    }

    #[test]
    fn test_round_trip_delta() {
        // For any P and D: (P + D) - P == D, carry-correct to the hundredth
        let cases = [
            (Timing::new(0, 57, 10), Timing::new(0, 28, 50)),
            (Timing::new(1, 59, 99), Timing::new(0, 0, 1)),
            (Timing::new(0, 0, 0), Timing::new(0, 31, 7)),
            (Timing::new(4, 12, 88), Timing::new(1, 47, 12)),
        ];

        for (p, d) in cases {
            let absolute = p + d;
            assert_eq!(absolute - p, d, "round trip failed for P={} D={}", p, d);
        }
    }

    #[test]
    fn test_new_normalizes() {
        // Out-of-range components are normalized on construction
        let t = Timing::new(0, 90, 150);
        assert_eq!(t, Timing::new(1, 31, 50));
    }

    #[test]
    fn test_ordering() {
        assert!(Timing::new(0, 59, 99) < Timing::new(1, 0, 0));
        assert!(Timing::new(1, 2, 3) > Timing::new(1, 2, 2));
    }

    #[test]
    fn test_display() {
        assert_eq!(Timing::new(1, 25, 60).to_string(), "1'25\"60");
        assert_eq!(Timing::new(0, 5, 3).to_string(), "0'05\"03");
    }
}
