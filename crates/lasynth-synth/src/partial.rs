//! One partial: a wave generator driven by its TVP, TVF and TVA.
//!
//! ```text
//!            ┌─────┐ pitch
//!            │ TVP ├────────┐
//!            └─────┘        ▼
//!            ┌─────┐     ┌──────┐   raw     pair     pan
//!            │ TVF ├────►│ WAVE ├─────► combine ─► L/R bus
//!            └─────┘     └──────┘
//!            ┌─────┐ att    ▲
//!            │ TVA ├────────┘
//!            └─────┘
//! ```
//!
//! Lifecycle:
//!
//! | State | Entered by | Left by |
//! |-------|------------|---------|
//! | `Idle` | free | allocation |
//! | `Attack` | note on | TVA reaching sustain |
//! | `Sustain` | TVA sustain phase | note off |
//! | `Release` | note off or a no-sustain envelope | envelope end |
//! | `StolenFade` | reclamation | envelope end |

use crate::config::PcmInterpolation;
use crate::rom::PcmWaveDescriptor;
use crate::structure::PairMix;
use crate::tables::MathTables;
use crate::timbre::PartialParam;
use crate::tva::{AmpLevels, Tva, TvaPhase, TvaSetup};
use crate::tvf::Tvf;
use crate::tvp::{PitchControls, SAW_BASE_PITCH, SQUARE_BASE_PITCH, Tvp, base_pitch};
use crate::wave::{WaveGenerator, WaveKind};

/// Pan gain in eighths over the 15 pan steps (0 = hard left).
pub const PAN_GAIN: [i32; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7, 7];
/// Centre pan step.
pub const PAN_CENTER: u8 = 7;

/// Lifecycle state of a partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PartialState {
    /// In the free pool.
    #[default]
    Idle,
    /// Envelope rising towards sustain.
    Attack,
    /// Holding at the sustain level.
    Sustain,
    /// Decaying after note off.
    Release,
    /// Fading out after being reclaimed.
    StolenFade,
}

impl PartialState {
    /// Whether the partial holds a pool slot.
    #[inline]
    pub fn is_active(self) -> bool {
        self != Self::Idle
    }
}

/// Which part, poly and timbre partial slot own a partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartialOwner {
    /// Part index, 0-8.
    pub part: usize,
    /// Poly index within the part.
    pub poly: usize,
    /// Timbre partial slot, 0-3.
    pub slot: usize,
}

/// Link between the two partials of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairLink {
    /// Pool index of the other partial.
    pub partner: usize,
    /// This partial is the pair's master (first partial).
    pub master: bool,
    /// How the pair combines.
    pub mix: PairMix,
}

impl PairLink {
    /// Whether the pair is ring modulated and must live and die together.
    #[inline]
    pub fn is_ring(&self) -> bool {
        matches!(self.mix, PairMix::Ring | PairMix::RingMixed)
    }
}

/// Everything needed to start a partial.
#[derive(Debug, Clone, Copy)]
pub struct PartialStart {
    /// Timbre partial parameters.
    pub param: PartialParam,
    /// PCM wave for PCM partials, `None` for synth partials.
    pub pcm: Option<PcmWaveDescriptor>,
    /// Key after shifting and folding.
    pub key: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// Patch fine tune, 0-100.
    pub fine_tune: u8,
    /// Pan offset from the part pan, in pan steps.
    pub pan_offset: i8,
    /// Route to the reverb bus.
    pub reverb: bool,
    /// This partial only feeds a ring modulator.
    pub ring_slave: bool,
    /// Decay without sustaining.
    pub no_sustain: bool,
    /// Rhythm key output level, for rhythm part partials.
    pub rhythm_level: Option<u8>,
}

/// One sound-generating unit.
#[derive(Debug, Clone, Default)]
pub struct Partial {
    state: PartialState,
    owner: Option<PartialOwner>,
    age: u64,
    pair: Option<PairLink>,
    tvp: Tvp,
    tvf: Tvf,
    tva: Tva,
    wave: WaveGenerator,
    pcm: bool,
    key: u8,
    pan_offset: i8,
    reverb: bool,
    rhythm_level: Option<u8>,
    finished: bool,
}

impl Partial {
    /// An idle partial.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the partial for a note. It stays silent until [`Partial::start`].
    pub(crate) fn claim(&mut self, owner: PartialOwner, age: u64) {
        self.state = PartialState::Attack;
        self.owner = Some(owner);
        self.age = age;
        self.pair = None;
        self.finished = false;
    }

    /// Start all generators.
    pub fn start(&mut self, math: &MathTables, start: &PartialStart, levels: &AmpLevels) {
        let param = &start.param;
        self.pcm = start.pcm.is_some();
        self.key = start.key;
        self.pan_offset = start.pan_offset;
        self.reverb = start.reverb;
        self.rhythm_level = start.rhythm_level;
        self.finished = false;
        self.state = PartialState::Attack;

        let (wave_pitch, kind) = match start.pcm {
            Some(wave) => (i32::from(wave.pitch), WaveKind::Pcm(wave)),
            None => {
                let saw = param.is_saw();
                let base = if saw { SAW_BASE_PITCH } else { SQUARE_BASE_PITCH };
                let pw = i32::from(math.pulse_width_100_to_255[usize::from(param.wg.pulse_width.min(100))]);
                let sens = i32::from(param.wg.pw_velo_sens.min(14)) - 7;
                let pw = (pw + (((i32::from(start.velocity) - 64) * sens) >> 2)).clamp(0, 255);
                (
                    base,
                    WaveKind::Synth {
                        saw,
                        pulse_width: pw as u8,
                        resonance: param.tvf.resonance.min(30),
                    },
                )
            }
        };
        let pitch = base_pitch(param, wave_pitch, start.key, start.fine_tune);
        self.tvp.reset(math, param, pitch, start.key, start.velocity);
        self.tvf
            .reset(math, param, pitch, start.key, start.velocity, !start.no_sustain);
        let resonance = if self.pcm { 0 } else { param.tvf.resonance };
        self.tva.reset(
            math,
            TvaSetup {
                param: param.tva,
                resonance,
                key: start.key,
                velocity: start.velocity,
                ring_slave: start.ring_slave,
                no_sustain: start.no_sustain,
            },
            &self.levels(levels),
        );
        self.wave.start(kind);
    }

    fn levels(&self, part: &AmpLevels) -> AmpLevels {
        AmpLevels {
            rhythm_level: self.rhythm_level,
            ..*part
        }
    }

    /// Note off: move every envelope to its release segment.
    pub fn start_decay(&mut self, math: &MathTables) {
        if !matches!(self.state, PartialState::Attack | PartialState::Sustain) {
            return;
        }
        self.state = PartialState::Release;
        self.tva.start_decay(math);
        self.tvf.start_decay(math);
        self.tvp.start_decay();
    }

    /// Reclaim: fade out quickly.
    pub fn start_abort(&mut self, math: &MathTables) {
        if !self.state.is_active() || self.state == PartialState::StolenFade {
            return;
        }
        self.state = PartialState::StolenFade;
        self.tva.start_abort(math);
    }

    /// Follow a part level change while sustaining.
    pub fn recalc_sustain(&mut self, math: &MathTables, levels: &AmpLevels) {
        if self.state.is_active() {
            let levels = self.levels(levels);
            self.tva.recalc_sustain(math, &levels);
        }
    }

    /// Advance one sample and return the raw (pre-pair, pre-pan) output.
    #[inline]
    pub fn next_sample(
        &mut self,
        math: &MathTables,
        pcm: &[i16],
        controls: &PitchControls,
        levels: &AmpLevels,
        interpolation: PcmInterpolation,
    ) -> i32 {
        if !self.state.is_active() || self.finished {
            return 0;
        }
        let levels = self.levels(levels);
        let pitch = self.tvp.next_pitch(controls);
        let amp = self.tva.next_amp(math, &levels);
        let cutoff = if self.pcm { 0 } else { self.tvf.next_cutoff(math) };
        let sample = self
            .wave
            .next_sample(math, pcm, pitch, Tva::attenuation(amp), cutoff, interpolation);

        match (self.state, self.tva.phase()) {
            (PartialState::Attack, TvaPhase::Sustain) => self.state = PartialState::Sustain,
            (PartialState::Attack | PartialState::Sustain, TvaPhase::Release) => {
                self.state = PartialState::Release;
            }
            _ => {}
        }
        if !self.tva.is_playing() || self.wave.is_finished() {
            self.finished = true;
        }
        sample
    }

    /// Return to the free pool.
    pub(crate) fn free(&mut self) {
        self.state = PartialState::Idle;
        self.owner = None;
        self.pair = None;
        self.finished = false;
    }

    pub(crate) fn set_pair(&mut self, link: Option<PairLink>) {
        self.pair = link;
    }

    /// Lifecycle state.
    #[inline]
    pub fn state(&self) -> PartialState {
        self.state
    }

    /// Whether the partial holds a pool slot.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// The envelope or wave has ended; the partial is ready to be freed.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state.is_active() && self.finished
    }

    /// Owner while active.
    #[inline]
    pub fn owner(&self) -> Option<PartialOwner> {
        self.owner
    }

    /// Allocation serial, larger is younger.
    #[inline]
    pub fn age(&self) -> u64 {
        self.age
    }

    /// Pair link, if the partial is paired.
    #[inline]
    pub fn pair(&self) -> Option<PairLink> {
        self.pair
    }

    /// Plays PCM rather than synthesis.
    #[inline]
    pub fn is_pcm(&self) -> bool {
        self.pcm
    }

    /// Key the partial was started with.
    #[inline]
    pub fn key(&self) -> u8 {
        self.key
    }

    /// Pan step for a part pan step.
    #[inline]
    pub fn pan(&self, part_pan: u8) -> u8 {
        (i32::from(part_pan) + i32::from(self.pan_offset)).clamp(0, 14) as u8
    }

    /// Routed to the reverb bus.
    #[inline]
    pub fn reverb(&self) -> bool {
        self.reverb
    }
}

/// Left and right contributions of a sample at a pan step.
#[inline]
pub fn pan_sample(sample: i32, pan: u8) -> (i32, i32) {
    let pan = usize::from(pan.min(14));
    ((sample * PAN_GAIN[14 - pan]) >> 3, (sample * PAN_GAIN[pan]) >> 3)
}
