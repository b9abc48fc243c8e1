//! The reverb unit: mode selection, parameter mapping and per-sample processing.

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

use alloc::vec::Vec;

use lasynth_core::{clip_i16, serial_mul};

use crate::filters::{AllpassStage, CombStage};
use crate::settings::{
    MAX_TIME_LEVEL, ModeSettings, ReverbMode, TAP_DELAY_PROCESS_DELAY, max_allpass_size,
    max_comb_size,
};

const ALLPASS_COUNT: usize = 3;
const COMB_COUNT: usize = 4;

/// Peak level at or below which the delay network counts as silent.
///
/// Integer feedback loops can idle in a small limit cycle instead of
/// reaching zero.
pub const TAIL_FLOOR: u16 = 32;

/// Integer delay-network reverb.
///
/// All delay memory is allocated in [`ReverbModel::new`] at the size the
/// largest mode needs, so switching mode, time or level never allocates and
/// never clears the network. Only [`ReverbModel::reset`] clears it.
///
/// Input is the stereo reverb send; output is the wet signal only.
///
/// # Example
///
/// ```rust
/// use lasynth_reverb::{ReverbMode, ReverbModel};
///
/// let mut reverb = ReverbModel::new();
/// reverb.configure(ReverbMode::Hall, 5, 3);
///
/// let (l, r) = reverb.process(8000, 8000);
/// // The first output precedes any echo.
/// assert_eq!((l, r), (0, 0));
/// ```
#[derive(Debug, Clone)]
pub struct ReverbModel {
    allpasses: Vec<AllpassStage>,
    combs: Vec<CombStage>,
    mode: ReverbMode,
    time: u8,
    level: u8,
    dry_amp: u8,
    wet_level: u8,
    tap_l: usize,
    tap_r: usize,
}

impl Default for ReverbModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ReverbModel {
    /// Allocate the network and select Room, time 5, level 3.
    pub fn new() -> Self {
        let allpasses = (0..ALLPASS_COUNT)
            .map(|i| AllpassStage::new(max_allpass_size(i)))
            .collect();
        let combs = (0..COMB_COUNT)
            .map(|i| CombStage::new(max_comb_size(i)))
            .collect();
        let mut model = Self {
            allpasses,
            combs,
            mode: ReverbMode::Room,
            time: 5,
            level: 3,
            dry_amp: 0,
            wet_level: 0,
            tap_l: 0,
            tap_r: 0,
        };
        model.apply();
        model
    }

    /// Current mode.
    pub fn mode(&self) -> ReverbMode {
        self.mode
    }

    /// Current time step (0-7).
    pub fn time(&self) -> u8 {
        self.time
    }

    /// Current level step (0-7).
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Select mode, time and level in one step. Out-of-range time and level
    /// clamp to 7. The delay memory is left as is.
    pub fn configure(&mut self, mode: ReverbMode, time: u8, level: u8) {
        self.mode = mode;
        self.time = time.min(MAX_TIME_LEVEL);
        self.level = level.min(MAX_TIME_LEVEL);
        self.apply();
    }

    /// Select the mode, keeping time and level.
    pub fn set_mode(&mut self, mode: ReverbMode) {
        self.configure(mode, self.time, self.level);
    }

    /// Set time and level, keeping the mode.
    pub fn set_parameters(&mut self, time: u8, level: u8) {
        self.configure(self.mode, time, level);
    }

    fn settings(&self) -> &'static ModeSettings {
        self.mode.settings()
    }

    fn apply(&mut self) {
        let s = self.settings();
        let time = usize::from(self.time);
        let level = usize::from(self.level);

        for (i, ap) in self.allpasses.iter_mut().enumerate() {
            ap.set_len(s.allpass_sizes.get(i).copied().unwrap_or(1));
        }
        for (i, comb) in self.combs.iter_mut().enumerate() {
            comb.set_len(s.comb_sizes.get(i).copied().unwrap_or(1));
            comb.set_filter_factor(s.filter_factors.get(i).copied().unwrap_or(0));
        }

        if s.tap_delay {
            self.tap_l = s.out_l[time] + TAP_DELAY_PROCESS_DELAY;
            self.tap_r = s.out_r[time] + TAP_DELAY_PROCESS_DELAY;
            let feedback = if self.level < 3 || self.time < 6 { 0 } else { 1 };
            self.combs[0].set_feedback_factor(s.feedback_factors[feedback]);
        } else {
            for comb in &mut self.combs[1..] {
                comb.set_feedback_factor(s.feedback_factors[time]);
            }
        }

        if self.time == 0 && self.level == 0 {
            self.dry_amp = 0;
            self.wet_level = 0;
        } else {
            let quirk = s.tap_delay && (self.time == 0 || (self.time == 1 && self.level == 1));
            self.dry_amp = if quirk {
                s.dry_amps[level + 8]
            } else {
                s.dry_amps[level]
            };
            self.wet_level = s.wet_levels[level];
        }
    }

    /// Clear all delay memory.
    pub fn reset(&mut self) {
        for ap in &mut self.allpasses {
            ap.clear();
        }
        for comb in &mut self.combs {
            comb.clear();
        }
    }

    /// True while any delay line still holds signal above [`TAIL_FLOOR`].
    pub fn is_active(&self) -> bool {
        self.allpasses.iter().any(|a| a.peak() > TAIL_FLOOR)
            || self.combs.iter().any(|c| c.peak() > TAIL_FLOOR)
    }

    /// Process one stereo sample of the reverb send and return the wet output.
    pub fn process(&mut self, in_l: i16, in_r: i16) -> (i16, i16) {
        let s = self.settings();
        let dry = (i32::from(in_l) >> 1) + (i32::from(in_r) >> 1);
        let dry = serial_mul(dry, self.dry_amp, 0xFF);

        if s.tap_delay {
            let comb = &mut self.combs[0];
            comb.process_tap(dry, self.tap_l);
            let l = serial_mul(comb.output_at(self.tap_l), self.wet_level, 0xFF);
            let r = serial_mul(comb.output_at(self.tap_r), self.wet_level, 0xFF);
            return (clip_i16(l), clip_i16(r));
        }

        // Read the entrance delay before it is overwritten.
        let mut link = self.combs[0].output_at(s.comb_sizes[0] - 1);
        self.combs[0].process_lowpass(dry, s.lpf_amp);

        for ap in &mut self.allpasses {
            link = ap.process(link);
        }

        let out_l1 = self.combs[1].output_at(s.out_l[0] - 1);

        for comb in &mut self.combs[1..] {
            comb.process(link);
        }

        let out_l2 = self.combs[2].output_at(s.out_l[1]);
        let out_l3 = self.combs[3].output_at(s.out_l[2]);
        let out_r1 = self.combs[1].output_at(s.out_r[0]);
        let out_r2 = self.combs[2].output_at(s.out_r[1]);
        let out_r3 = self.combs[3].output_at(s.out_r[2]);

        let l = serial_mul(mix_combs(out_l1, out_l2, out_l3), self.wet_level, 0xFF);
        let r = serial_mul(mix_combs(out_r1, out_r2, out_r3), self.wet_level, 0xFF);
        (clip_i16(l), clip_i16(r))
    }
}

/// Sum three comb taps with the first weighted by 1.5.
#[inline]
fn mix_combs(out1: i32, out2: i32, out3: i32) -> i32 {
    out1 + (out1 >> 1) + out2 + out3
}
