//! Time-variant filter.
//!
//! The LA32 has no separate filter stage: the TVF output is a cutoff value
//! the wave generator uses to shape its edges and resonance. The value is a
//! static base cutoff (from the cutoff parameter, key follow and bias) plus a
//! modifier driven through an [`La32Ramp`] by the filter envelope:
//!
//! ```text
//! cutoff = base_cutoff << 18 + ramp
//! ```
//!
//! Envelope levels are scaled by a velocity and key dependent depth before
//! they become ramp targets.

use crate::ramp::{La32Ramp, TARGET_SHIFTS};
use crate::tables::MathTables;
use crate::timbre::PartialParam;

/// Cutoff bias per key of distance, indexed by bias level 0-14.
const BIAS_LEVEL_TO_BIAS_MULT: [i32; 15] = [85, 42, 21, 16, 10, 5, 2, 0, -2, -5, -10, -16, -21, -74, -85];

/// Key follow factors in 21sts, indexed by the 0-16 key follow parameter.
const KEYFOLLOW_MULT_21: [i32; 17] = [-21, -10, -5, 0, 2, 5, 8, 10, 13, 16, 18, 21, 26, 32, 42, 21, 21];

/// Filter envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TvfPhase {
    /// Heading for level 0.
    #[default]
    Attack,
    /// Heading for level 1.
    Phase2,
    /// Heading for the sustain level.
    Phase3,
    /// Holding the sustain level.
    Sustain,
    /// Falling to zero.
    Release,
    /// Finished, modifier at zero.
    Done,
}

/// Static cutoff for a partial, 0-255.
pub fn base_cutoff(param: &PartialParam, base_pitch: i32, key: u8) -> u8 {
    let key = i32::from(key);
    let mut cutoff = KEYFOLLOW_MULT_21[usize::from(param.tvf.keyfollow.min(16))]
        - KEYFOLLOW_MULT_21[usize::from(param.wg.keyfollow.min(16))];
    cutoff *= key - 60;

    let point = i32::from(param.tvf.bias_point);
    let bias_mult = BIAS_LEVEL_TO_BIAS_MULT[usize::from(param.tvf.bias_level.min(14))];
    if point & 0x40 == 0 {
        let bias = point + 33 - key;
        if bias > 0 {
            cutoff -= bias * bias_mult;
        }
    } else {
        let bias = point - 31 - key;
        if bias < 0 {
            cutoff += bias * bias_mult;
        }
    }

    cutoff += (i32::from(param.tvf.cutoff) << 4) - 800;
    if cutoff >= 0 {
        // High notes cannot open the filter past the pitch-dependent ceiling.
        let over = (base_pitch >> 4) + cutoff - 3584;
        if over > 0 {
            cutoff -= over;
        }
    } else {
        cutoff = cutoff.max(-2048);
    }
    ((cutoff + 2056) >> 4).clamp(0, 255) as u8
}

/// Filter envelope state.
#[derive(Debug, Clone, Default)]
pub struct Tvf {
    ramp: La32Ramp,
    phase: TvfPhase,
    target: i32,
    base_cutoff: u8,
    level_mult: i32,
    key_time_subtraction: i32,
    env_time: [u8; 4],
    env_level: [u8; 3],
    can_sustain: bool,
}

impl Tvf {
    /// An idle filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start for a new note.
    pub fn reset(
        &mut self,
        math: &MathTables,
        param: &PartialParam,
        base_pitch: i32,
        key: u8,
        velocity: u8,
        can_sustain: bool,
    ) {
        let tvf = &param.tvf;
        let key_offset = i32::from(key) - 60;
        self.base_cutoff = base_cutoff(param, base_pitch, key);
        self.env_time = tvf.env_time;
        self.env_level = tvf.env_level;
        self.can_sustain = can_sustain;

        let velo_sens = i32::from(tvf.env_velo_sens);
        let mut mult = ((i32::from(velocity) * velo_sens) >> 6) + 109 - velo_sens;
        mult += key_offset >> (4 - tvf.env_depth_keyfollow.min(4));
        mult = (mult.max(0) * i32::from(tvf.env_depth)) >> 6;
        self.level_mult = mult.min(255);
        self.key_time_subtraction = if tvf.env_time_keyfollow == 0 {
            0
        } else {
            key_offset >> (5 - tvf.env_time_keyfollow.min(4))
        };

        let target = (self.level_mult * i32::from(self.env_level[0])) >> 8;
        let time = i32::from(self.env_time[0]) - self.key_time_subtraction;
        let increment = if time <= 0 {
            0x80 | 127
        } else {
            (i32::from(math.env_log_time[target as usize]) - time).max(1)
        };
        self.ramp.reset();
        self.start_ramp(math, target, increment as u8, TvfPhase::Attack);
    }

    fn start_ramp(&mut self, math: &MathTables, target: i32, increment: u8, phase: TvfPhase) {
        let target = target.clamp(0, 255);
        self.target = target;
        self.phase = phase;
        self.ramp.start(math, target as u8, increment);
    }

    /// Enter the release segment.
    pub fn start_decay(&mut self, math: &MathTables) {
        if self.phase >= TvfPhase::Release {
            return;
        }
        let increment = match self.env_time[3] {
            0 => 1,
            time => time.wrapping_neg(),
        };
        self.start_ramp(math, 0, increment, TvfPhase::Release);
    }

    fn next_phase(&mut self, math: &MathTables) {
        let (point, phase) = match self.phase {
            TvfPhase::Attack => (1, TvfPhase::Phase2),
            TvfPhase::Phase2 => (2, TvfPhase::Phase3),
            TvfPhase::Phase3 | TvfPhase::Sustain => {
                if self.can_sustain {
                    let target = (self.level_mult * i32::from(self.env_level[2])) >> 8;
                    self.start_ramp(math, target, 0, TvfPhase::Sustain);
                } else {
                    self.phase = TvfPhase::Phase3;
                    self.start_decay(math);
                }
                return;
            }
            TvfPhase::Release | TvfPhase::Done => {
                self.start_ramp(math, 0, 0, TvfPhase::Done);
                return;
            }
        };
        let time = i32::from(self.env_time[point]) - self.key_time_subtraction;
        let mut target = (self.level_mult * i32::from(self.env_level[point])) >> 8;
        let increment = if time > 0 {
            let mut delta = target - self.target;
            if delta == 0 {
                if target == 0 {
                    delta = 1;
                    target = 1;
                } else {
                    delta = -1;
                    target -= 1;
                }
            }
            let inc = (i32::from(math.env_log_time[delta.unsigned_abs().min(255) as usize]) - time).max(1);
            if delta < 0 { inc | 0x80 } else { inc }
        } else if target >= self.target {
            0x80 | 127
        } else {
            127
        };
        self.start_ramp(math, target, increment as u8, phase);
    }

    /// Advance one sample and return the cutoff value.
    #[inline]
    pub fn next_cutoff(&mut self, math: &MathTables) -> u32 {
        let modifier = self.ramp.next_value();
        if self.ramp.check_interrupt() {
            self.next_phase(math);
        }
        (u32::from(self.base_cutoff) << TARGET_SHIFTS) + modifier
    }

    /// Static part of the cutoff.
    #[inline]
    pub fn base(&self) -> u8 {
        self.base_cutoff
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> TvfPhase {
        self.phase
    }
}
