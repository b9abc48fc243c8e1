//! Time-variant amplifier.
//!
//! The TVA drives a [`La32Ramp`] through eight phases:
//!
//! | Phase | Ramp target |
//! |-------|-------------|
//! | `Basic` | base amp (levels, bias, velocity) |
//! | `Attack` .. `Phase4` | base amp + `env_level[0..3]` |
//! | `Sustain` | base amp + `env_level[3]`, held |
//! | `Release` | 0 |
//! | `Dead` | partial finished |
//!
//! The ramp value is an 8-bit log amplitude; [`Tva::attenuation`] turns it
//! into the attenuation the wave generator adds to its own log output.
//! Times are log coded as well: a segment's ramp increment is the log of
//! its distance minus the time parameter.

use crate::ramp::{La32Ramp, TARGET_SHIFTS};
use crate::tables::MathTables;
use crate::timbre::TvaParam;

/// Amplitude subtraction per unit of distance from a bias point, indexed by bias level.
const BIAS_LEVEL_TO_AMP_SUBTRACTION_COEFF: [u8; 13] =
    [255, 187, 137, 100, 74, 54, 40, 29, 21, 15, 10, 5, 0];

/// Largest base amp.
const MAX_BASIC_AMP: i32 = 155;

/// Envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TvaPhase {
    /// Ramping to the base amp.
    #[default]
    Basic = 0,
    /// First envelope segment.
    Attack = 1,
    /// Second segment.
    Phase2 = 2,
    /// Third segment.
    Phase3 = 3,
    /// Fourth segment.
    Phase4 = 4,
    /// Holding the sustain level.
    Sustain = 5,
    /// Falling to silence.
    Release = 6,
    /// Finished.
    Dead = 7,
}

impl TvaPhase {
    fn next(self) -> Self {
        match self {
            Self::Basic => Self::Attack,
            Self::Attack => Self::Phase2,
            Self::Phase2 => Self::Phase3,
            Self::Phase3 => Self::Phase4,
            Self::Phase4 => Self::Sustain,
            Self::Sustain => Self::Release,
            Self::Release | Self::Dead => Self::Dead,
        }
    }
}

/// Part and system levels that scale a partial, all 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmpLevels {
    /// Master volume.
    pub master_volume: u8,
    /// Part volume (CC7).
    pub volume: u8,
    /// Patch output level trim.
    pub patch_level: u8,
    /// Expression (CC11).
    pub expression: u8,
    /// Rhythm key output level, for rhythm part partials.
    pub rhythm_level: Option<u8>,
}

impl Default for AmpLevels {
    fn default() -> Self {
        Self {
            master_volume: 100,
            volume: 100,
            patch_level: 100,
            expression: 100,
            rhythm_level: None,
        }
    }
}

/// Fixed note data the TVA needs at start.
#[derive(Debug, Clone, Copy)]
pub struct TvaSetup {
    /// Amplifier parameters.
    pub param: TvaParam,
    /// Filter resonance, which costs amplitude.
    pub resonance: u8,
    /// Key after shifting.
    pub key: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// The partial only feeds a ring modulator.
    pub ring_slave: bool,
    /// The timbre decays without sustaining.
    pub no_sustain: bool,
}

/// Amplitude subtraction for velocity.
pub fn velo_amp_subtraction(velo_sens: u8, velocity: u8) -> i32 {
    let mult = i32::from(velo_sens) - 50;
    let scaled = (mult * (i32::from(velocity) - 64)) << 2;
    mult.abs() - (scaled >> 8)
}

/// Amplitude subtraction for distance from one bias point.
pub fn bias_amp_subtraction(bias_point: u8, bias_level: u8, key: u8) -> i32 {
    let coeff = i32::from(BIAS_LEVEL_TO_AMP_SUBTRACTION_COEFF[usize::from(bias_level.min(12))]);
    let point = i32::from(bias_point);
    let key = i32::from(key);
    let distance = if bias_point & 0x40 == 0 {
        (point + 33 - key).max(0)
    } else {
        (key - (point - 31)).max(0)
    };
    (distance * coeff) >> 5
}

/// Combined subtraction of both bias points, capped at 255.
pub fn bias_amp_subtractions(param: &TvaParam, key: u8) -> i32 {
    let b1 = bias_amp_subtraction(param.bias_point1, param.bias_level1, key);
    let b2 = bias_amp_subtraction(param.bias_point2, param.bias_level2, key);
    (b1 + b2).min(255)
}

/// Envelope time shortening for keys above middle C.
pub fn key_time_subtraction(keyfollow: u8, key: u8) -> i32 {
    if keyfollow == 0 {
        return 0;
    }
    (i32::from(key) - 60) >> (5 - keyfollow.min(4))
}

/// Amplitude envelope state.
#[derive(Debug, Clone, Default)]
pub struct Tva {
    ramp: La32Ramp,
    phase: TvaPhase,
    target: i32,
    playing: bool,
    param: Option<TvaSetup>,
    bias_amp_subtraction: i32,
    velo_amp_subtraction: i32,
    key_time_subtraction: i32,
}

impl Tva {
    /// An idle TVA.
    pub fn new() -> Self {
        Self::default()
    }

    fn basic_amp(&self, math: &MathTables, setup: &TvaSetup, levels: &AmpLevels) -> i32 {
        let mut amp = MAX_BASIC_AMP;
        let subtract = |amount: i32, amp: &mut i32| {
            *amp -= amount;
            *amp >= 0
        };
        let level = |v: u8| i32::from(math.level_to_amp_subtraction[usize::from(v.min(100))]);

        if !setup.ring_slave {
            let master =
                i32::from(math.master_vol_to_amp_subtraction[usize::from(levels.master_volume.min(100))]);
            if !subtract(master, &mut amp)
                || !subtract(level(levels.volume), &mut amp)
                || !subtract(level(levels.patch_level), &mut amp)
                || !subtract(level(levels.expression), &mut amp)
            {
                return 0;
            }
            if let Some(rhythm) = levels.rhythm_level {
                if !subtract(level(rhythm), &mut amp) {
                    return 0;
                }
            }
        }
        if !subtract(self.bias_amp_subtraction, &mut amp)
            || !subtract(level(setup.param.level), &mut amp)
            || !subtract(self.velo_amp_subtraction, &mut amp)
        {
            return 0;
        }
        amp = amp.min(MAX_BASIC_AMP);
        (amp - i32::from(setup.resonance >> 1)).max(0)
    }

    /// Start the envelope for a new note.
    pub fn reset(&mut self, math: &MathTables, setup: TvaSetup, levels: &AmpLevels) {
        self.playing = true;
        self.bias_amp_subtraction = bias_amp_subtractions(&setup.param, setup.key);
        self.velo_amp_subtraction = velo_amp_subtraction(setup.param.velo_sens, setup.velocity);
        self.key_time_subtraction =
            key_time_subtraction(setup.param.env_time_keyfollow, setup.key);

        let mut target = self.basic_amp(math, &setup, levels);
        let phase = if setup.param.env_time[0] == 0 {
            // Jump straight to the attack level; the first timed segment heads for level 1.
            target += i32::from(setup.param.env_level[0]);
            TvaPhase::Attack
        } else {
            TvaPhase::Basic
        };
        self.param = Some(setup);
        self.ramp.reset();
        // Downward at full speed from zero lands on the target at once.
        self.start_ramp(math, target, 0x80 | 127, phase);
    }

    fn start_ramp(&mut self, math: &MathTables, target: i32, increment: u8, phase: TvaPhase) {
        let target = target.clamp(0, 255);
        self.target = target;
        self.phase = phase;
        self.ramp.start(math, target as u8, increment);
    }

    /// Force a fast fade, used when the partial is stolen.
    pub fn start_abort(&mut self, math: &MathTables) {
        self.start_ramp(math, 64, 0x80 | 127, TvaPhase::Release);
    }

    /// Enter the release segment (note off).
    pub fn start_decay(&mut self, math: &MathTables) {
        if self.phase >= TvaPhase::Release {
            return;
        }
        let increment = self.release_increment();
        self.start_ramp(math, 0, increment, TvaPhase::Release);
    }

    fn release_increment(&self) -> u8 {
        match self.param.map_or(0, |p| p.param.env_time[4]) {
            // Upwards towards zero: lands at once and raises the interrupt.
            0 => 1,
            time => time.wrapping_neg(),
        }
    }

    /// Follow a volume or expression change while sustaining.
    pub fn recalc_sustain(&mut self, math: &MathTables, levels: &AmpLevels) {
        let Some(setup) = self.param else {
            return;
        };
        if self.phase != TvaPhase::Sustain || setup.param.env_level[3] == 0 {
            return;
        }
        let new_target = self.basic_amp(math, &setup, levels) + i32::from(setup.param.env_level[3]);
        let delta = new_target - self.target;
        let descending = delta < 0;
        let log_time = math.env_log_time[delta.unsigned_abs().min(255) as usize] - 2;
        let mut increment = if descending { log_time | 0x80 } else { log_time };
        // Correct the direction if an unfinished ramp already passed the new target.
        if descending != self.ramp.is_below_current(new_target.clamp(0, 255) as u8) {
            increment ^= 0x80;
        }
        self.start_ramp(math, new_target, increment, TvaPhase::Phase4);
    }

    fn next_phase(&mut self, math: &MathTables, levels: &AmpLevels) {
        let Some(setup) = self.param else {
            self.end(TvaPhase::Dead);
            return;
        };
        if self.phase >= TvaPhase::Dead || !self.playing {
            return;
        }
        let mut new_phase = self.phase.next();
        if new_phase == TvaPhase::Dead {
            self.end(new_phase);
            return;
        }
        let levels_param = &setup.param.env_level;
        let all_zero_from_now = levels_param[3] == 0
            && (new_phase == TvaPhase::Phase4
                || (levels_param[2] == 0
                    && (new_phase == TvaPhase::Phase3
                        || (levels_param[1] == 0
                            && (new_phase == TvaPhase::Phase2
                                || (levels_param[0] == 0 && new_phase == TvaPhase::Attack))))));

        let point = self.phase as usize;
        let mut new_target;
        let mut increment: i32 = 0;
        let sustain_or_release = matches!(new_phase, TvaPhase::Sustain | TvaPhase::Release);
        if all_zero_from_now {
            new_target = 0;
        } else {
            new_target = self.basic_amp(math, &setup, levels);
            if sustain_or_release {
                if levels_param[3] == 0 {
                    self.end(new_phase);
                    return;
                }
                if setup.no_sustain {
                    new_phase = TvaPhase::Release;
                    new_target = 0;
                    increment = i32::from(self.release_increment());
                } else {
                    new_target += i32::from(levels_param[3]);
                }
            } else {
                new_target += i32::from(levels_param[point]);
            }
        }

        if !sustain_or_release || all_zero_from_now {
            let param_time = i32::from(setup.param.env_time[point.min(4)]);
            let mut time = param_time;
            if new_phase == TvaPhase::Attack {
                let shift = 6 - setup.param.env_time_velo_sens.min(4);
                time -= (i32::from(setup.velocity) - 64) >> shift;
                if time <= 0 && param_time != 0 {
                    time = 1;
                }
            } else {
                time -= self.key_time_subtraction;
            }
            increment = if time > 0 {
                let mut delta = new_target - self.target;
                if delta <= 0 {
                    if delta == 0 {
                        // An increment needs a distance to raise its interrupt.
                        delta = -1;
                        new_target -= 1;
                        if new_target < 0 {
                            delta = 1;
                            new_target = -new_target;
                        }
                    }
                    let log_time = i32::from(math.env_log_time[delta.unsigned_abs().min(255) as usize]);
                    (log_time - time).max(1) | 0x80
                } else {
                    let log_time = i32::from(math.env_log_time[delta.min(255) as usize]);
                    (log_time - time).max(1)
                }
            } else if new_target >= self.target {
                0x80 | 127
            } else {
                127
            };
            if increment == 0 {
                increment = 1;
            }
        }
        self.start_ramp(math, new_target, increment as u8, new_phase);
    }

    fn end(&mut self, phase: TvaPhase) {
        self.phase = phase;
        self.playing = false;
    }

    /// Advance one sample and return the ramp value (8.18 fixed point log amp).
    #[inline]
    pub fn next_amp(&mut self, math: &MathTables, levels: &AmpLevels) -> u32 {
        let value = self.ramp.next_value();
        if self.ramp.check_interrupt() {
            self.next_phase(math, levels);
        }
        value
    }

    /// Log attenuation (1/4096 octave) of a ramp value.
    #[inline]
    pub fn attenuation(amp: u32) -> u32 {
        ((256 << TARGET_SHIFTS) - amp.min(255 << TARGET_SHIFTS)) >> 10
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> TvaPhase {
        self.phase
    }

    /// Whether the envelope still produces sound.
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current ramp value without advancing.
    #[inline]
    pub fn current(&self) -> u32 {
        self.ramp.current()
    }
}
