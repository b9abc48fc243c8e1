//! Delay-line stages of the reverb network.
//!
//! All stages run on integers and store 16-bit samples, clipping on write.
//! Coefficient multiplies go through [`serial_mul`] so rounding follows the
//! hardware multiplier.

use lasynth_core::{RingBuffer, clip_i16, serial_mul};

/// Schroeder allpass with a fixed coefficient of one half.
#[derive(Debug, Clone)]
pub struct AllpassStage {
    ring: RingBuffer,
}

impl AllpassStage {
    /// Create a stage able to hold `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
        }
    }

    /// Set the active delay length.
    pub fn set_len(&mut self, len: usize) {
        self.ring.set_len(len);
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, input: i32) -> i32 {
        let delayed = i32::from(self.ring.advance());
        // Store input minus half the feedback.
        let stored = clip_i16(input - (delayed >> 1));
        self.ring.store(stored);
        // Output plus half the feedforward.
        delayed + (i32::from(stored) >> 1)
    }

    /// Clear the delay memory.
    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Largest stored magnitude.
    pub fn peak(&self) -> u16 {
        self.ring.peak()
    }
}

/// Comb filter with a one-pole low-pass in its feedback path.
///
/// The same storage serves three roles depending on the mode: a feedback
/// comb, the entrance delay with low-pass, and the tapped echo line.
#[derive(Debug, Clone)]
pub struct CombStage {
    ring: RingBuffer,
    filter_factor: u8,
    feedback_factor: u8,
}

impl CombStage {
    /// Create a stage able to hold `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            filter_factor: 0,
            feedback_factor: 0,
        }
    }

    /// Set the active delay length.
    pub fn set_len(&mut self, len: usize) {
        self.ring.set_len(len);
    }

    /// Set the low-pass coefficient.
    pub fn set_filter_factor(&mut self, factor: u8) {
        self.filter_factor = factor;
    }

    /// Set the feedback coefficient.
    pub fn set_feedback_factor(&mut self, factor: u8) {
        self.feedback_factor = factor;
    }

    /// Read the sample `delay` slots behind the write head.
    #[inline]
    pub fn output_at(&self, delay: usize) -> i32 {
        i32::from(self.ring.tap(delay))
    }

    /// Feedback comb step.
    #[inline]
    pub fn process(&mut self, input: i32) {
        let last = i32::from(self.ring.current());
        let oldest = i32::from(self.ring.advance());
        let filter_in = input + serial_mul(oldest, self.feedback_factor, 0xF0);
        self.ring
            .store(clip_i16(serial_mul(last, self.filter_factor, 0xC0) - filter_in));
    }

    /// Entrance delay step: low-pass the input, then scale by `amp`.
    #[inline]
    pub fn process_lowpass(&mut self, input: i32, amp: u8) {
        let last = i32::from(self.ring.current());
        self.ring.advance();
        let lpf_out = serial_mul(last, self.filter_factor, 0xFF) + input;
        self.ring.store(clip_i16(serial_mul(lpf_out, amp, 0xFF)));
    }

    /// Tapped echo step; the feedback is taken from the `feedback_tap` position.
    #[inline]
    pub fn process_tap(&mut self, input: i32, feedback_tap: usize) {
        let last = i32::from(self.ring.current());
        self.ring.advance();
        let lpf_out = serial_mul(last, self.filter_factor, 0xF0) + input;
        let feedback = i32::from(self.ring.tap(feedback_tap));
        self.ring
            .store(clip_i16(serial_mul(feedback, self.feedback_factor, 0xF0) - lpf_out));
    }

    /// Clear the delay memory.
    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Largest stored magnitude.
    pub fn peak(&self) -> u16 {
        self.ring.peak()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allpass_impulse_delay() {
        let mut ap = AllpassStage::new(10);
        ap.set_len(4);
        let mut out = Vec::new();
        out.push(ap.process(1000));
        for _ in 0..8 {
            out.push(ap.process(0));
        }
        // Direct path is half the input; the delayed echo arrives after `len` steps.
        assert_eq!(out[0], 500);
        assert_eq!(out[1], 0);
        assert!(out[4] != 0, "echo missing: {:?}", out);
    }

    #[test]
    fn test_allpass_energy_decays() {
        let mut ap = AllpassStage::new(16);
        ap.process(20000);
        let mut last_peak = u16::MAX;
        for _ in 0..20 {
            for _ in 0..16 {
                ap.process(0);
            }
            let peak = ap.peak();
            assert!(peak <= last_peak);
            last_peak = peak;
        }
        assert!(last_peak < 20);
    }

    #[test]
    fn test_comb_feedback_inverts() {
        let mut comb = CombStage::new(8);
        comb.set_len(8);
        comb.process(1000);
        // The comb stores the negated input.
        assert_eq!(comb.output_at(0), -1000);
    }

    #[test]
    fn test_comb_tail_decays() {
        let mut comb = CombStage::new(64);
        comb.set_len(37);
        comb.set_filter_factor(0x60);
        comb.set_feedback_factor(0x98);
        comb.process(16000);
        for _ in 0..20_000 {
            comb.process(0);
        }
        assert!(comb.peak() < 16, "peak {}", comb.peak());
    }

    #[test]
    fn test_lowpass_scales_input() {
        let mut delay = CombStage::new(8);
        delay.process_lowpass(1024, 0x80);
        assert_eq!(delay.output_at(0), 512);
    }

    #[test]
    fn test_clear() {
        let mut comb = CombStage::new(8);
        comb.process(5000);
        comb.clear();
        assert_eq!(comb.peak(), 0);
    }
}
