//! LA32 wave generators.
//!
//! Synth partials build their waveform in the log domain: every component is
//! a log attenuation that is summed with the TVA attenuation and converted
//! back to linear once through [`MathTables::unlog`].
//!
//! | Component | Shape |
//! |-----------|-------|
//! | square | flat top and bottom joined by half-cosine edges |
//! | sawtooth | square multiplied by a cosine at twice its frequency |
//! | resonance | decaying sine restarted on every edge |
//!
//! Edge length follows the TVF cutoff: a closed filter stretches the edges
//! over up to a quarter period (a near-sine), an open one shortens them
//! towards a hard square. Cutoffs under the bottom of the edge range lower
//! the level instead.
//!
//! PCM partials step through a wave in Q16 with nearest or linear
//! interpolation and loop over the whole wave when it is flagged looped.

use crate::config::PcmInterpolation;
use crate::ramp::TARGET_SHIFTS;
use crate::rom::PcmWaveDescriptor;
use crate::tables::{MathTables, SILENT_ATTENUATION};

/// A quarter of the phase range.
const QUARTER: u64 = 1 << 30;
/// Full phase range.
const PERIOD: u64 = 1 << 32;
/// Cutoff below which the edge length stops growing.
const EDGE_CUTOFF_FLOOR: i32 = 128;

/// What a generator plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveKind {
    /// Square or sawtooth synthesis.
    Synth {
        /// Sawtooth instead of square.
        saw: bool,
        /// Pulse width, 0-255 (0 = symmetric square).
        pulse_width: u8,
        /// Resonance, 0-30.
        resonance: u8,
    },
    /// PCM playback.
    Pcm(PcmWaveDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Region {
    #[default]
    Rising,
    High,
    Falling,
    Low,
}

/// Oscillator phase increment (Q32 of a period) for a pitch.
#[inline]
pub fn phase_increment(math: &MathTables, pitch: u16) -> u32 {
    let mantissa = math.exp2_mantissa(u32::from(pitch) & 4095);
    mantissa << ((u32::from(pitch) >> 12) + 4)
}

/// PCM step (Q16 samples per tick) for a pitch.
#[inline]
pub fn pcm_step(math: &MathTables, pitch: u16) -> u32 {
    let mantissa = math.exp2_mantissa(u32::from(pitch) & 4095);
    (mantissa << (u32::from(pitch) >> 12)) >> 5
}

/// Wave generator of one partial.
#[derive(Debug, Clone)]
pub struct WaveGenerator {
    kind: WaveKind,
    phase: u32,
    region: Region,
    resonance_phase: u32,
    resonance_decay: u32,
    resonance_negative: bool,
    pcm_index: u32,
    pcm_frac: u32,
    finished: bool,
}

impl Default for WaveGenerator {
    fn default() -> Self {
        Self::new(WaveKind::Synth {
            saw: false,
            pulse_width: 0,
            resonance: 0,
        })
    }
}

impl WaveGenerator {
    /// A generator at phase zero.
    pub fn new(kind: WaveKind) -> Self {
        Self {
            kind,
            phase: 0,
            region: Region::Low,
            resonance_phase: 0,
            resonance_decay: SILENT_ATTENUATION,
            resonance_negative: false,
            pcm_index: 0,
            pcm_frac: 0,
            finished: false,
        }
    }

    /// Restart with a new wave.
    pub fn start(&mut self, kind: WaveKind) {
        *self = Self::new(kind);
    }

    /// A one-shot PCM wave has played out.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Produce one sample (signed, 14-bit range).
    ///
    /// `attenuation` is the TVA log attenuation; `cutoff` the TVF value.
    #[inline]
    pub fn next_sample(
        &mut self,
        math: &MathTables,
        pcm: &[i16],
        pitch: u16,
        attenuation: u32,
        cutoff: u32,
        interpolation: PcmInterpolation,
    ) -> i32 {
        if self.finished {
            return 0;
        }
        match self.kind {
            WaveKind::Synth {
                saw,
                pulse_width,
                resonance,
            } => self.next_synth(math, pitch, attenuation, cutoff, saw, pulse_width, resonance),
            WaveKind::Pcm(wave) => self.next_pcm(math, pcm, wave, pitch, attenuation, interpolation),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn next_synth(
        &mut self,
        math: &MathTables,
        pitch: u16,
        attenuation: u32,
        cutoff: u32,
        saw: bool,
        pulse_width: u8,
        resonance: u8,
    ) -> i32 {
        let increment = phase_increment(math, pitch);
        let position = u64::from(self.phase);
        self.phase = self.phase.wrapping_add(increment);

        let high = QUARTER * 2 - (u64::from(pulse_width) * QUARTER * 2 * 15 / 16) / 256;
        let low = PERIOD - high;

        let c = ((cutoff >> TARGET_SHIFTS) as i32).min(510);
        let mut attenuation = attenuation;
        if c < EDGE_CUTOFF_FLOOR {
            attenuation += ((EDGE_CUTOFF_FLOOR - c) * 64) as u32;
        }
        let edge_att = ((c - EDGE_CUTOFF_FLOOR).max(0) * 64) as u32;
        let mut edge = if edge_att >= SILENT_ATTENUATION {
            0
        } else {
            ((u64::from(math.exp9[((edge_att & 4095) >> 3) as usize]) << 30) >> 13) >> (edge_att >> 12)
        };
        edge = edge.max(2 * u64::from(increment)).min(QUARTER).min(high / 2).min(low / 2).max(1);

        // Square shape: log attenuation and sign.
        let (region, shape_att, mut negative) = if position < edge {
            let (att, positive) = Self::cos_edge(math, position, edge);
            (Region::Rising, att, positive)
        } else if position < high {
            (Region::High, 0, false)
        } else if position < high + edge {
            let (att, positive) = Self::cos_edge(math, position - high, edge);
            (Region::Falling, att, !positive)
        } else {
            (Region::Low, 0, true)
        };

        let mut total = attenuation + shape_att;
        if saw {
            let angle = (position as u32).wrapping_mul(2) >> 21;
            let quadrant = angle >> 9;
            let index = (angle & 511) as usize;
            let cos_att = if quadrant & 1 == 0 {
                math.logsin(511 - index)
            } else {
                math.logsin(index)
            };
            total += cos_att;
            if quadrant == 1 || quadrant == 2 {
                negative = !negative;
            }
        }
        let magnitude = math.unlog(total);
        let mut sample = if negative { -magnitude } else { magnitude };

        if resonance > 0 {
            if region != self.region && matches!(region, Region::Rising | Region::Falling) {
                self.resonance_phase = 0;
                self.resonance_decay = 0;
                self.resonance_negative = region == Region::Falling;
            }
            let res_increment = ((u64::from(increment) << 31) / edge).min(u64::from(u32::MAX >> 2)) as u32;
            self.resonance_phase = self.resonance_phase.wrapping_add(res_increment);
            let factor = u32::from(math.res_amp_decay_factor[usize::from(resonance >> 2).min(7)]);
            let angle = self.resonance_phase >> 21;
            let quadrant = angle >> 9;
            let index = (angle & 511) as usize;
            let sin_att = if quadrant & 1 == 0 {
                math.logsin(index)
            } else {
                math.logsin(511 - index)
            };
            let res_att = attenuation
                + sin_att
                + (30 - u32::from(resonance.min(30))) * 256
                + self.resonance_decay;
            let res = math.unlog(res_att);
            let res_negative = (quadrant >= 2) != self.resonance_negative;
            sample += if res_negative { -res } else { res };
            self.resonance_decay = (self.resonance_decay + factor).min(SILENT_ATTENUATION);
        }
        self.region = region;
        sample
    }

    /// Log attenuation and sign of `-cos(pi * x / edge)`.
    fn cos_edge(math: &MathTables, x: u64, edge: u64) -> (u32, bool) {
        let t = ((x << 10) / edge).min(1023) as usize;
        if t < 512 {
            // First half of the edge: cosine positive, so the rising edge is negative.
            (math.logsin(511 - t), false)
        } else {
            (math.logsin(t - 512), true)
        }
    }

    fn next_pcm(
        &mut self,
        math: &MathTables,
        pcm: &[i16],
        wave: PcmWaveDescriptor,
        pitch: u16,
        attenuation: u32,
        interpolation: PcmInterpolation,
    ) -> i32 {
        let start = wave.start as usize;
        let len = wave.len as usize;
        let Some(samples) = pcm.get(start..start + len).filter(|s| !s.is_empty()) else {
            self.finished = true;
            return 0;
        };
        if self.pcm_index as usize >= len {
            if wave.looped {
                self.pcm_index %= wave.len;
            } else {
                self.finished = true;
                return 0;
            }
        }
        let index = self.pcm_index as usize;
        let current = i32::from(samples[index]);
        let value = match interpolation {
            PcmInterpolation::Nearest => current,
            PcmInterpolation::Linear => {
                let next = match samples.get(index + 1) {
                    Some(&s) => i32::from(s),
                    None if wave.looped => i32::from(samples[0]),
                    None => current,
                };
                let delta = i64::from(next - current) * i64::from(self.pcm_frac);
                current + (delta >> 16) as i32
            }
        };

        let step = pcm_step(math, pitch);
        let frac = self.pcm_frac + (step & 0xFFFF);
        self.pcm_frac = frac & 0xFFFF;
        self.pcm_index = self
            .pcm_index
            .saturating_add(step >> 16)
            .saturating_add(frac >> 16);

        (value * math.unlog(attenuation)) >> 15
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: u32 = 400 << TARGET_SHIFTS;
    const PITCH_C4: u16 = 37133;

    fn square() -> WaveGenerator {
        WaveGenerator::new(WaveKind::Synth {
            saw: false,
            pulse_width: 0,
            resonance: 0,
        })
    }

    fn render(wg: &mut WaveGenerator, math: &MathTables, pcm: &[i16], n: usize, pitch: u16) -> Vec<i32> {
        (0..n)
            .map(|_| wg.next_sample(math, pcm, pitch, 0, OPEN, PcmInterpolation::Linear))
            .collect()
    }

    #[test]
    fn test_phase_increment_middle_c() {
        let math = MathTables::new();
        let inc = phase_increment(&math, PITCH_C4);
        let hz = f64::from(inc) / 4_294_967_296.0 * 32000.0;
        assert!((hz - 261.6).abs() < 1.0, "{hz}");
        assert_eq!(pcm_step(&math, 36864), 1 << 16);
        assert_eq!(pcm_step(&math, 36864 + 4096), 2 << 16);
    }

    #[test]
    fn test_square_is_symmetric_and_bounded() {
        let math = MathTables::new();
        let mut wg = square();
        let out = render(&mut wg, &math, &[], 32000, PITCH_C4);
        let max = *out.iter().max().unwrap();
        let min = *out.iter().min().unwrap();
        assert!(max > 8000 && max <= 8191);
        assert!(min < -8000 && min >= -8191);
        let positive = out.iter().filter(|&&v| v > 0).count();
        let ratio = positive as f64 / out.len() as f64;
        assert!((ratio - 0.5).abs() < 0.02, "{ratio}");
    }

    #[test]
    fn test_pulse_width_shortens_high_part() {
        let math = MathTables::new();
        let mut wg = WaveGenerator::new(WaveKind::Synth {
            saw: false,
            pulse_width: 200,
            resonance: 0,
        });
        let out = render(&mut wg, &math, &[], 32000, PITCH_C4);
        let positive = out.iter().filter(|&&v| v > 0).count() as f64 / out.len() as f64;
        assert!(positive < 0.3, "{positive}");
    }

    #[test]
    fn test_attenuation_scales_output() {
        let math = MathTables::new();
        let mut loud = square();
        let mut quiet = square();
        let mut peak_loud = 0;
        let mut peak_quiet = 0;
        for _ in 0..1000 {
            peak_loud = peak_loud.max(loud.next_sample(&math, &[], PITCH_C4, 0, OPEN, PcmInterpolation::Nearest).abs());
            peak_quiet =
                peak_quiet.max(quiet.next_sample(&math, &[], PITCH_C4, 4096, OPEN, PcmInterpolation::Nearest).abs());
        }
        assert!((peak_loud / 2 - peak_quiet).abs() <= 2);
    }

    #[test]
    fn test_closed_cutoff_is_quieter() {
        let math = MathTables::new();
        let mut open = square();
        let mut closed = square();
        let mut e_open = 0i64;
        let mut e_closed = 0i64;
        for _ in 0..3200 {
            let a = open.next_sample(&math, &[], PITCH_C4, 0, OPEN, PcmInterpolation::Nearest);
            let b = closed.next_sample(&math, &[], PITCH_C4, 0, 20 << TARGET_SHIFTS, PcmInterpolation::Nearest);
            e_open += i64::from(a) * i64::from(a);
            e_closed += i64::from(b) * i64::from(b);
        }
        assert!(e_closed < e_open);
    }

    #[test]
    fn test_saw_and_resonance_stay_in_range() {
        let math = MathTables::new();
        for (saw, resonance) in [(true, 0), (false, 30), (true, 30)] {
            let mut wg = WaveGenerator::new(WaveKind::Synth {
                saw,
                pulse_width: 0,
                resonance,
            });
            for pitch in [0u16, 20000, 33037, 50000, 59392] {
                for v in render(&mut wg, &math, &[], 2000, pitch) {
                    assert!(v.abs() <= 16383, "{v}");
                }
            }
        }
    }

    #[test]
    fn test_pcm_one_shot_finishes() {
        let math = MathTables::new();
        let pcm: Vec<i16> = (0..100).map(|i| i as i16 * 100).collect();
        let wave = PcmWaveDescriptor {
            start: 10,
            len: 50,
            looped: false,
            pitch: 36864,
        };
        let mut wg = WaveGenerator::new(WaveKind::Pcm(wave));
        let out = render(&mut wg, &math, &pcm, 60, 36864);
        // Native step reads sample by sample, scaled by the full-level unlog.
        assert_eq!(out[0], (1000 * 8191) >> 15);
        assert_eq!(out[1], (1100 * 8191) >> 15);
        assert!(wg.is_finished());
        assert_eq!(out[55], 0);
    }

    #[test]
    fn test_pcm_loop_wraps() {
        let math = MathTables::new();
        let pcm = vec![1000i16, 2000, 3000, 4000];
        let wave = PcmWaveDescriptor {
            start: 0,
            len: 4,
            looped: true,
            pitch: 36864,
        };
        let mut wg = WaveGenerator::new(WaveKind::Pcm(wave));
        let out = render(&mut wg, &math, &pcm, 12, 36864);
        assert_eq!(out[0], out[4]);
        assert_eq!(out[3], out[11]);
        assert!(!wg.is_finished());
    }

    #[test]
    fn test_pcm_linear_interpolates_half_step() {
        let math = MathTables::new();
        let pcm = vec![0i16, 8000, 16000, 24000];
        let wave = PcmWaveDescriptor {
            start: 0,
            len: 4,
            looped: false,
            pitch: 36864,
        };
        let mut lin = WaveGenerator::new(WaveKind::Pcm(wave));
        let mut near = WaveGenerator::new(WaveKind::Pcm(wave));
        // One octave down: half a sample per tick.
        let pitch = 36864 - 4096;
        let l: Vec<i32> = (0..4)
            .map(|_| lin.next_sample(&math, &pcm, pitch, 0, 0, PcmInterpolation::Linear))
            .collect();
        let n: Vec<i32> = (0..4)
            .map(|_| near.next_sample(&math, &pcm, pitch, 0, 0, PcmInterpolation::Nearest))
            .collect();
        assert_eq!(n[1], n[0]);
        assert!(l[1] > l[0] && l[1] < l[2]);
    }

    #[test]
    fn test_pcm_linear_full_scale_alternation() {
        let math = MathTables::new();
        let pcm: Vec<i16> = (0..64).map(|i| if i % 2 == 0 { 30000 } else { -30000 }).collect();
        let wave = PcmWaveDescriptor {
            start: 0,
            len: 64,
            looped: true,
            pitch: 36864,
        };
        let mut wg = WaveGenerator::new(WaveKind::Pcm(wave));
        // Just under native pitch, so the fraction sweeps up to nearly one.
        let pitch = 36864 - 1000;
        let mut max_frac = 0;
        for _ in 0..4000 {
            let v = wg.next_sample(&math, &pcm, pitch, 0, 0, PcmInterpolation::Linear);
            assert!(v.abs() <= 7500, "{v}");
            max_frac = max_frac.max(wg.pcm_frac);
        }
        assert!(max_frac > 0xF000);
        assert!(!wg.is_finished());
    }

    #[test]
    fn test_pcm_out_of_rom_is_silent() {
        let math = MathTables::new();
        let wave = PcmWaveDescriptor {
            start: 1000,
            len: 10,
            looped: true,
            pitch: 36864,
        };
        let mut wg = WaveGenerator::new(WaveKind::Pcm(wave));
        assert_eq!(render(&mut wg, &math, &[0; 16], 4, 36864), vec![0; 4]);
        assert!(wg.is_finished());
    }
}
