//! Streaming rate conversion from the native 32 kHz clock to the output rate.
//!
//! Linear interpolation between consecutive native frames, with the position
//! kept in 32.32 fixed point so the conversion is exact and deterministic.
//! At the native rate the converter passes frames straight through.
//!
//! ```text
//! out = prev + (next - prev) * frac
//! ```

use crate::config::NATIVE_SAMPLE_RATE;

const ONE: u64 = 1 << 32;

/// Linear sample-rate converter pulling native frames on demand.
#[derive(Debug, Clone, Copy)]
pub struct RateConverter {
    step: u64,
    pos: u64,
    prev: (i16, i16),
    next: (i16, i16),
    primed: bool,
}

impl RateConverter {
    /// Converter for an output rate in Hz.
    pub fn new(output_rate: u32) -> Self {
        Self {
            step: (u64::from(NATIVE_SAMPLE_RATE) << 32) / u64::from(output_rate.max(1)),
            pos: 0,
            prev: (0, 0),
            next: (0, 0),
            primed: false,
        }
    }

    /// True when output and native rates match.
    #[inline]
    pub fn is_passthrough(&self) -> bool {
        self.step == ONE
    }

    /// Produce one output frame, pulling native frames from `source` as
    /// needed.
    #[inline]
    pub fn next_frame(&mut self, mut source: impl FnMut() -> (i16, i16)) -> (i16, i16) {
        if self.is_passthrough() {
            return source();
        }
        if !self.primed {
            self.prev = source();
            self.next = source();
            self.primed = true;
        }
        while self.pos >= ONE {
            self.pos -= ONE;
            self.prev = self.next;
            self.next = source();
        }
        let frac = (self.pos >> 16) as i64;
        let lerp = |a: i16, b: i16| {
            let a = i64::from(a);
            (a + (((i64::from(b) - a) * frac) >> 16)) as i16
        };
        let out = (lerp(self.prev.0, self.next.0), lerp(self.prev.1, self.next.1));
        self.pos += self.step;
        out
    }

    /// Drop buffered frames.
    pub fn reset(&mut self) {
        *self = Self::new_with_step(self.step);
    }

    fn new_with_step(step: u64) -> Self {
        Self {
            step,
            pos: 0,
            prev: (0, 0),
            next: (0, 0),
            primed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_source() -> impl FnMut() -> (i16, i16) {
        let mut n: i16 = 0;
        move || {
            n += 100;
            (n, -n)
        }
    }

    #[test]
    fn test_passthrough_at_native_rate() {
        let mut conv = RateConverter::new(32000);
        assert!(conv.is_passthrough());
        let mut src = ramp_source();
        let mut pulled = 0;
        for i in 1..=10 {
            let out = conv.next_frame(|| {
                pulled += 1;
                src()
            });
            assert_eq!(out, (i * 100, -i * 100));
        }
        assert_eq!(pulled, 10);
    }

    #[test]
    fn test_upsampling_pulls_fewer_frames() {
        let mut conv = RateConverter::new(64000);
        let mut src = ramp_source();
        let mut pulled = 0;
        let out: Vec<(i16, i16)> = (0..100)
            .map(|_| {
                conv.next_frame(|| {
                    pulled += 1;
                    src()
                })
            })
            .collect();
        assert!((50..=52).contains(&pulled), "{pulled}");
        // Halfway points interpolate linearly.
        assert_eq!(out[0], (100, -100));
        assert_eq!(out[1], (150, -150));
        assert_eq!(out[2], (200, -200));
    }

    #[test]
    fn test_downsampling_pulls_more_frames() {
        let mut conv = RateConverter::new(16000);
        let mut pulled = 0;
        for _ in 0..100 {
            conv.next_frame(|| {
                pulled += 1;
                (0, 0)
            });
        }
        assert!((199..=202).contains(&pulled), "{pulled}");
    }

    #[test]
    fn test_reset_reprimes() {
        let mut conv = RateConverter::new(48000);
        let mut src = ramp_source();
        for _ in 0..10 {
            conv.next_frame(&mut src);
        }
        conv.reset();
        assert_eq!(conv.next_frame(|| (7, 7)), (7, 7));
    }
}
