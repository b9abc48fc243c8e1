//! LA32 envelope ramp.
//!
//! Every envelope in the chip (amplitude, filter cutoff) is a ramp towards
//! an 8-bit target at a log-coded rate. The target is held in the top bits of
//! a 26-bit accumulator; the increment is decoded from 7 bits of exponent via
//! the exponential table and added or subtracted once per sample.
//!
//! Reaching the target does not signal the envelope immediately. The
//! "interrupt" that moves the envelope to its next phase fires a fixed number
//! of samples after arrival, which shapes the short plateaus audible between
//! segments on the hardware.
//!
//! ```text
//! increment byte: D EEE MMM
//!                 | |   +-- mantissa step (eighths of an octave)
//!                 | +------ octave
//!                 +-------- 1 = descending
//! ```

use crate::tables::MathTables;

/// Bits below the 8-bit target in the accumulator.
pub const TARGET_SHIFTS: u32 = 18;
/// Largest accumulator value.
pub const MAX_CURRENT: u32 = 0xFF << TARGET_SHIFTS;
/// Samples between reaching the target and raising the interrupt.
pub const INTERRUPT_TIME: u8 = 7;

/// One LA32 ramp generator.
#[derive(Debug, Clone, Default)]
pub struct La32Ramp {
    current: u32,
    large_target: u32,
    large_increment: u32,
    descending: bool,
    interrupt_countdown: u8,
    interrupt_raised: bool,
}

impl La32Ramp {
    /// A ramp resting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ramping towards `target` (0-255). An increment of 0 holds the
    /// current value and never raises an interrupt.
    pub fn start(&mut self, math: &MathTables, target: u8, increment: u8) {
        if increment == 0 {
            self.large_increment = 0;
        } else {
            let exp_arg = u32::from(increment & 0x7F);
            let mantissa = math.exp2_mantissa((exp_arg & 7) << 9);
            self.large_increment = ((mantissa << (exp_arg >> 3)) + 64) >> 9;
        }
        self.descending = increment & 0x80 != 0;
        if self.descending {
            self.large_increment += 1;
        }
        self.large_target = u32::from(target) << TARGET_SHIFTS;
        self.interrupt_countdown = 0;
        self.interrupt_raised = false;
    }

    /// Advance one sample and return the accumulator.
    #[inline]
    pub fn next_value(&mut self) -> u32 {
        if self.interrupt_countdown > 0 {
            self.interrupt_countdown -= 1;
            if self.interrupt_countdown == 0 {
                self.interrupt_raised = true;
            }
        } else if self.large_increment != 0 {
            if self.descending {
                if self.large_increment > self.current {
                    self.arrive();
                } else {
                    self.current -= self.large_increment;
                    if self.current <= self.large_target {
                        self.arrive();
                    }
                }
            } else if MAX_CURRENT - self.current < self.large_increment {
                self.arrive();
            } else {
                self.current += self.large_increment;
                if self.current >= self.large_target {
                    self.arrive();
                }
            }
        }
        self.current
    }

    fn arrive(&mut self) {
        self.current = self.large_target;
        self.interrupt_countdown = INTERRUPT_TIME;
    }

    /// Take the pending interrupt, if any.
    #[inline]
    pub fn check_interrupt(&mut self) -> bool {
        core::mem::take(&mut self.interrupt_raised)
    }

    /// Return to rest at zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether `target` lies below the current value.
    #[inline]
    pub fn is_below_current(&self, target: u8) -> bool {
        (u32::from(target) << TARGET_SHIFTS) < self.current
    }

    /// Current accumulator without advancing.
    #[inline]
    pub fn current(&self) -> u32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_until_interrupt(ramp: &mut La32Ramp, limit: usize) -> Option<usize> {
        (0..limit).find(|_| {
            ramp.next_value();
            ramp.check_interrupt()
        })
    }

    #[test]
    fn test_rises_to_target() {
        let math = MathTables::new();
        let mut ramp = La32Ramp::new();
        ramp.start(&math, 200, 100);
        let n = run_until_interrupt(&mut ramp, 1_000_000).unwrap();
        assert!(n > 0);
        assert_eq!(ramp.current(), 200 << TARGET_SHIFTS);
    }

    #[test]
    fn test_interrupt_delay() {
        let math = MathTables::new();
        let mut ramp = La32Ramp::new();
        ramp.start(&math, 255, 127);
        let mut steps = 0;
        while ramp.next_value() < MAX_CURRENT {
            assert!(!ramp.check_interrupt());
            steps += 1;
            assert!(steps < 1000);
        }
        for _ in 0..INTERRUPT_TIME - 1 {
            ramp.next_value();
            assert!(!ramp.check_interrupt());
        }
        ramp.next_value();
        assert!(ramp.check_interrupt());
        assert!(!ramp.check_interrupt());
    }

    #[test]
    fn test_descends_to_target() {
        let math = MathTables::new();
        let mut ramp = La32Ramp::new();
        ramp.start(&math, 255, 127);
        run_until_interrupt(&mut ramp, 1000).unwrap();
        ramp.start(&math, 10, 0x80 | 60);
        run_until_interrupt(&mut ramp, 10_000_000).unwrap();
        assert_eq!(ramp.current(), 10 << TARGET_SHIFTS);
        assert!(ramp.is_below_current(9));
        assert!(!ramp.is_below_current(10));
        assert!(!ramp.is_below_current(11));
    }

    #[test]
    fn test_faster_increment_arrives_sooner() {
        let math = MathTables::new();
        let mut slow = La32Ramp::new();
        let mut fast = La32Ramp::new();
        slow.start(&math, 255, 40);
        fast.start(&math, 255, 80);
        let ns = run_until_interrupt(&mut slow, 10_000_000).unwrap();
        let nf = run_until_interrupt(&mut fast, 10_000_000).unwrap();
        assert!(nf < ns);
    }

    #[test]
    fn test_zero_increment_holds() {
        let math = MathTables::new();
        let mut ramp = La32Ramp::new();
        ramp.start(&math, 255, 127);
        run_until_interrupt(&mut ramp, 1000).unwrap();
        ramp.start(&math, 0, 0);
        for _ in 0..1000 {
            assert_eq!(ramp.next_value(), MAX_CURRENT);
            assert!(!ramp.check_interrupt());
        }
    }

    #[test]
    fn test_descending_zero_rate_still_moves() {
        let math = MathTables::new();
        let mut ramp = La32Ramp::new();
        ramp.start(&math, 255, 127);
        run_until_interrupt(&mut ramp, 1000).unwrap();
        ramp.start(&math, 0, 0x80);
        let before = ramp.current();
        ramp.next_value();
        assert!(ramp.current() < before);
    }

    #[test]
    fn test_reset() {
        let math = MathTables::new();
        let mut ramp = La32Ramp::new();
        ramp.start(&math, 100, 127);
        ramp.next_value();
        ramp.reset();
        assert_eq!(ramp.current(), 0);
        assert_eq!(ramp.next_value(), 0);
    }
}
