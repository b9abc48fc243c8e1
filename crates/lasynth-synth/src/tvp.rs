//! Time-variant pitch: base pitch, pitch envelope, LFO and bend.
//!
//! Pitches are log frequencies, 4096 units per octave. A partial's pitch is
//!
//! ```text
//! base   = wave base + key * keyfollow + coarse + fine + patch fine tune
//! pitch  = base + envelope + LFO + master tune (+ bend if enabled)
//! ```
//!
//! clamped to `0..=MAX_PITCH`. The envelope is a chain of linear segments in
//! level space (50 = no offset) whose times are log coded like the TVA's.

use crate::tables::MathTables;
use crate::timbre::PartialParam;
use crate::tva::key_time_subtraction;

/// Highest pitch the oscillators accept.
pub const MAX_PITCH: i32 = 59392;
/// Base pitch of a square wave at key 60.
pub const SQUARE_BASE_PITCH: i32 = 37133;
/// Base pitch of a sawtooth at key 60 (the saw generator runs an octave up).
pub const SAW_BASE_PITCH: i32 = 33037;

/// Key follow multipliers in Q13, indexed by the 0-16 key follow parameter.
/// The last two are slightly stretched tunings.
const PITCH_KEYFOLLOW_MULT: [i32; 17] = [
    -8192, -4096, -2048, 0, 1024, 2048, 3072, 4096, 5120, 6144, 7168, 8192, 10240, 12288, 16384,
    8198, 8226,
];

/// Envelope pitch units per level step, Q4, indexed by depth 0-10.
const PITCH_ENV_DEPTH: [i32; 11] = [0, 26, 52, 105, 210, 419, 839, 1311, 1678, 2097, 2621];

/// LFO phase increment per rate step.
const LFO_RATE_STEP: u32 = 13422;

/// Pitch offset of a key relative to 60.
#[inline]
pub fn key_to_pitch(key: u8) -> i32 {
    (i32::from(key) - 60) * 4096 / 12
}

/// Pitch offset of a coarse tune value (36 = unison).
#[inline]
pub fn coarse_to_pitch(coarse: u8) -> i32 {
    (i32::from(coarse) - 36) * 4096 / 12
}

/// Pitch offset of a fine tune value in cents (50 = unison).
#[inline]
pub fn fine_to_pitch(fine: u8) -> i32 {
    (i32::from(fine) - 50) * 4096 / 1200
}

/// Master tune offset (64 = A440, about half a semitone either way).
#[inline]
pub fn master_tune_to_pitch(tune: u8) -> i32 {
    ((i32::from(tune.min(127)) - 64) * 171) >> 6
}

/// Pitch bend offset for a 14-bit bend value and a range in semitones.
#[inline]
pub fn bend_to_pitch(raw: u16, range: u8) -> i32 {
    ((i32::from(raw.min(0x3FFF)) - 8192) * i32::from(range.min(24)) * 683) >> 14
}

/// Segment length in samples for a 0-100 time value.
pub fn env_time_to_samples(math: &MathTables, time: i32) -> u32 {
    let time = time.clamp(0, 100) as u32;
    (math.exp2_mantissa((time & 7) << 9) << (time >> 3)) >> 7
}

/// Pitch of a partial before envelopes, bend and master tune.
pub fn base_pitch(param: &PartialParam, wave_pitch: i32, key: u8, fine_tune: u8) -> i32 {
    let mult = PITCH_KEYFOLLOW_MULT[usize::from(param.wg.keyfollow.min(16))];
    wave_pitch
        + ((key_to_pitch(key) * mult) >> 13)
        + coarse_to_pitch(param.wg.coarse)
        + fine_to_pitch(param.wg.fine)
        + fine_to_pitch(fine_tune)
}

/// Live controls read every sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PitchControls {
    /// Bend offset from [`bend_to_pitch`].
    pub bend: i32,
    /// Master tune offset from [`master_tune_to_pitch`].
    pub master_tune: i32,
    /// Modulation wheel, 0-127.
    pub modulation: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Segment {
    #[default]
    Attack,
    Decay,
    Approach,
    Sustain,
    Release,
    Done,
}

/// Pitch generator of one partial.
#[derive(Debug, Clone, Default)]
pub struct Tvp {
    base: i32,
    bender: bool,
    levels: [u8; 5],
    times: [u32; 4],
    depth_mult: i32,
    segment: Segment,
    /// Current level, Q8.
    level: i32,
    segment_target: i32,
    step: i32,
    remaining: u32,
    lfo_phase: u32,
    lfo_increment: u32,
    lfo_depth: u8,
    lfo_mod_sens: u8,
}

impl Tvp {
    /// An idle generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start for a new note.
    pub fn reset(&mut self, math: &MathTables, param: &PartialParam, base: i32, key: u8, velocity: u8) {
        let env = &param.pitch_env;
        let key_sub = key_time_subtraction(env.time_keyfollow, key);
        self.base = base;
        self.bender = param.wg.bender;
        self.levels = env.level;
        for (dst, &t) in self.times.iter_mut().zip(&env.time) {
            *dst = env_time_to_samples(math, i32::from(t) - key_sub);
        }
        let velo_factor = 128 - i32::from(env.velo_sens.min(3)) * (127 - i32::from(velocity.min(127))) / 3;
        self.depth_mult = (PITCH_ENV_DEPTH[usize::from(env.depth.min(10))] * velo_factor) >> 7;

        self.level = i32::from(self.levels[0]) << 8;
        self.enter(Segment::Attack);

        self.lfo_phase = 0;
        self.lfo_increment = u32::from(param.pitch_lfo.rate.min(100)) * LFO_RATE_STEP;
        self.lfo_depth = param.pitch_lfo.depth.min(100);
        self.lfo_mod_sens = param.pitch_lfo.mod_sens.min(100);
    }

    fn enter(&mut self, segment: Segment) {
        let (target, samples) = match segment {
            Segment::Attack => (self.levels[1], self.times[0]),
            Segment::Decay => (self.levels[2], self.times[1]),
            Segment::Approach => (self.levels[3], self.times[2]),
            Segment::Release => (self.levels[4], self.times[3]),
            Segment::Sustain | Segment::Done => {
                self.segment = segment;
                self.step = 0;
                self.remaining = 0;
                return;
            }
        };
        self.segment = segment;
        let samples = samples.max(1);
        self.step = ((i32::from(target) << 8) - self.level) / samples as i32;
        self.remaining = samples;
        self.segment_target = i32::from(target) << 8;
    }

    /// Move to the release segment.
    pub fn start_decay(&mut self) {
        if !matches!(self.segment, Segment::Release | Segment::Done) {
            self.enter(Segment::Release);
        }
    }

    fn advance_envelope(&mut self) {
        if self.remaining == 0 {
            return;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.level = self.segment_target;
            let next = match self.segment {
                Segment::Attack => Segment::Decay,
                Segment::Decay => Segment::Approach,
                Segment::Approach => Segment::Sustain,
                Segment::Release | Segment::Sustain | Segment::Done => Segment::Done,
            };
            self.enter(next);
        } else {
            self.level += self.step;
        }
    }

    /// Envelope offset in pitch units.
    #[inline]
    pub fn envelope_offset(&self) -> i32 {
        ((self.level - (50 << 8)) * self.depth_mult) >> 12
    }

    fn lfo_offset(&mut self, modulation: u8) -> i32 {
        let depth = (i32::from(self.lfo_depth)
            + ((i32::from(modulation.min(127)) * i32::from(self.lfo_mod_sens)) >> 7))
            .min(100);
        if depth == 0 || self.lfo_increment == 0 {
            return 0;
        }
        self.lfo_phase = self.lfo_phase.wrapping_add(self.lfo_increment);
        let p = (self.lfo_phase >> 18) as i32;
        let tri = (if p < 8192 { p } else { 16383 - p }) * 2 - 8192;
        (tri * depth) >> 10
    }

    /// Advance one sample and return the pitch.
    #[inline]
    pub fn next_pitch(&mut self, controls: &PitchControls) -> u16 {
        self.advance_envelope();
        let mut pitch = self.base + self.envelope_offset() + controls.master_tune;
        pitch += self.lfo_offset(controls.modulation);
        if self.bender {
            pitch += controls.bend;
        }
        pitch.clamp(0, MAX_PITCH) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_conversions() {
        assert_eq!(key_to_pitch(60), 0);
        assert_eq!(key_to_pitch(72), 4096);
        assert_eq!(key_to_pitch(48), -4096);
        assert_eq!(coarse_to_pitch(48), 4096);
        assert_eq!(fine_to_pitch(50), 0);
        assert_eq!(fine_to_pitch(100), 170);
        assert_eq!(master_tune_to_pitch(64), 0);
        assert_eq!(master_tune_to_pitch(127), 168);
        assert_eq!(master_tune_to_pitch(0), -171);
    }

    #[test]
    fn test_bend_range() {
        assert_eq!(bend_to_pitch(8192, 12), 0);
        let up = bend_to_pitch(0x3FFF, 12);
        assert!((4090..=4100).contains(&up), "{up}");
        let down = bend_to_pitch(0, 2);
        assert!((-684..=-680).contains(&down), "{down}");
        assert_eq!(bend_to_pitch(0x3FFF, 0), 0);
    }

    #[test]
    fn test_keyfollow() {
        let mut p = PartialParam::default();
        assert_eq!(base_pitch(&p, SQUARE_BASE_PITCH, 72, 50), SQUARE_BASE_PITCH + 4096);
        p.wg.keyfollow = 3;
        assert_eq!(base_pitch(&p, SQUARE_BASE_PITCH, 72, 50), SQUARE_BASE_PITCH);
        p.wg.keyfollow = 14;
        assert_eq!(base_pitch(&p, SQUARE_BASE_PITCH, 72, 50), SQUARE_BASE_PITCH + 8192);
    }

    #[test]
    fn test_env_times_grow() {
        let math = MathTables::new();
        assert_eq!(env_time_to_samples(&math, 0), 32);
        let mut last = 0;
        for t in 0..=100 {
            let n = env_time_to_samples(&math, t);
            assert!(n >= last);
            last = n;
        }
        assert!(last > 150_000);
    }

    #[test]
    fn test_flat_envelope_holds_base() {
        let math = MathTables::new();
        let p = PartialParam::default();
        let mut tvp = Tvp::new();
        tvp.reset(&math, &p, 30000, 60, 100);
        for _ in 0..1000 {
            assert_eq!(tvp.next_pitch(&PitchControls::default()), 30000);
        }
    }

    #[test]
    fn test_envelope_moves_and_settles() {
        let math = MathTables::new();
        let mut p = PartialParam::default();
        p.pitch_env.depth = 10;
        p.pitch_env.time = [5, 5, 5, 5];
        p.pitch_env.level = [100, 50, 50, 50, 0];
        let mut tvp = Tvp::new();
        tvp.reset(&math, &p, 30000, 60, 127);
        let first = tvp.next_pitch(&PitchControls::default());
        assert!(first > 30000);
        for _ in 0..10_000 {
            tvp.next_pitch(&PitchControls::default());
        }
        assert_eq!(tvp.next_pitch(&PitchControls::default()), 30000);
        tvp.start_decay();
        for _ in 0..10_000 {
            tvp.next_pitch(&PitchControls::default());
        }
        assert!(tvp.next_pitch(&PitchControls::default()) < 30000);
    }

    #[test]
    fn test_bender_switch() {
        let math = MathTables::new();
        let mut p = PartialParam::default();
        let controls = PitchControls {
            bend: 500,
            ..PitchControls::default()
        };
        let mut tvp = Tvp::new();
        tvp.reset(&math, &p, 30000, 60, 100);
        assert_eq!(tvp.next_pitch(&controls), 30500);
        p.wg.bender = false;
        tvp.reset(&math, &p, 30000, 60, 100);
        assert_eq!(tvp.next_pitch(&controls), 30000);
    }

    #[test]
    fn test_lfo_follows_modulation() {
        let math = MathTables::new();
        let mut p = PartialParam::default();
        p.pitch_lfo.rate = 50;
        p.pitch_lfo.mod_sens = 100;
        let mut tvp = Tvp::new();
        tvp.reset(&math, &p, 30000, 60, 100);
        let still: Vec<u16> = (0..2000)
            .map(|_| tvp.next_pitch(&PitchControls::default()))
            .collect();
        assert!(still.iter().all(|&v| v == 30000));
        let wheel = PitchControls {
            modulation: 127,
            ..PitchControls::default()
        };
        let moving: Vec<u16> = (0..8000).map(|_| tvp.next_pitch(&wheel)).collect();
        assert!(moving.iter().any(|&v| v > 30000));
        assert!(moving.iter().any(|&v| v < 30000));
    }

    #[test]
    fn test_clamped() {
        let math = MathTables::new();
        let p = PartialParam::default();
        let mut tvp = Tvp::new();
        tvp.reset(&math, &p, MAX_PITCH + 5000, 60, 100);
        assert_eq!(i32::from(tvp.next_pitch(&PitchControls::default())), MAX_PITCH);
        tvp.reset(&math, &p, -100, 60, 100);
        assert_eq!(tvp.next_pitch(&PitchControls::default()), 0);
    }
}
