//! Per-channel state and note handling.
//!
//! Eight melodic parts follow a program-selected [`Patch`]; the rhythm part
//! picks a timbre per key from the rhythm setup and ignores program changes.
//! A note on resolves the timbre, claims one partial per enabled timbre
//! partial and groups them in a [`Poly`].
//!
//! | Controller | Effect |
//! |------------|--------|
//! | 1 | modulation (pitch LFO depth) |
//! | 6, 100, 101 | RPN 0: bender range |
//! | 7 | volume |
//! | 10 | pan |
//! | 11 | expression |
//! | 64 | hold pedal |
//! | 120 | all sound off |
//! | 121 | reset controllers |
//! | 123-127 | all notes off |

use crate::bank::{SoundBank, TimbreSlot};
use crate::partial::{PAN_CENTER, PartialOwner, PartialStart};
use crate::partial_manager::PartialManager;
use crate::patch::Patch;
use crate::poly::{Poly, PolyState};
use crate::rom::PcmWaveDescriptor;
use crate::structure::{PairMix, STEREO_MASTER_PAN, STEREO_SLAVE_PAN, Structure};
use crate::tables::ControlTables;
use crate::tva::AmpLevels;
use crate::tvp::{PitchControls, bend_to_pitch, master_tune_to_pitch};

/// Lowest key after key shift folding.
pub const MIN_FOLDED_KEY: i32 = 12;
/// Highest key after key shift folding.
pub const MAX_FOLDED_KEY: i32 = 108;
/// Centre pitch bend value.
pub const BEND_CENTER: u16 = 8192;

const RPN_NULL: u8 = 127;

/// Stand-in for a PCM wave number missing from the wave map. It plays
/// nothing and ends its partial at once.
const MISSING_WAVE: PcmWaveDescriptor = PcmWaveDescriptor {
    start: 0,
    len: 0,
    looped: false,
    pitch: 0,
};

/// Coarse part state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PartState {
    /// No note sounding.
    Idle,
    /// At least one note sounding.
    Active,
}

/// What became of a note on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteOutcome {
    /// The note started.
    Played,
    /// Partials are being reclaimed; retry once the fade completes.
    Deferred,
    /// The note cannot play (no timbre, no partials, oversized structure).
    Dropped,
}

/// Live controller values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartControls {
    /// Volume, 0-100.
    pub volume: u8,
    /// Expression, 0-100.
    pub expression: u8,
    /// Pan step, 0-14.
    pub pan: u8,
    /// Modulation wheel, 0-127.
    pub modulation: u8,
    /// Pitch bend, 14-bit.
    pub bend: u16,
    /// Bender range in semitones.
    pub bender_range: u8,
    /// Hold pedal down.
    pub hold: bool,
    rpn: (u8, u8),
}

impl Default for PartControls {
    fn default() -> Self {
        Self {
            volume: 100,
            expression: 100,
            pan: PAN_CENTER,
            modulation: 0,
            bend: BEND_CENTER,
            bender_range: 12,
            hold: false,
            rpn: (RPN_NULL, RPN_NULL),
        }
    }
}

/// Shared engine state a part works against.
pub struct PartContext<'a> {
    /// Immutable tables.
    pub tables: &'a ControlTables,
    /// Session sound bank.
    pub bank: &'a SoundBank,
    /// The partial pool.
    pub manager: &'a mut PartialManager,
}

struct NotePlan {
    slot: TimbreSlot,
    key: u8,
    fine_tune: u8,
    reverb: bool,
    pan_offset: i8,
    rhythm_level: Option<u8>,
    single_assign: bool,
}

/// Scale a 0-127 controller value to 0-100.
#[inline]
fn cc_to_percent(value: u8) -> u8 {
    ((u16::from(value.min(127)) * 100 + 63) / 127) as u8
}

/// Fold a shifted key into the playable range by octaves.
pub fn fold_key(key: i32) -> u8 {
    let mut key = key;
    while key < MIN_FOLDED_KEY {
        key += 12;
    }
    while key > MAX_FOLDED_KEY {
        key -= 12;
    }
    key as u8
}

/// One MIDI part.
#[derive(Debug, Clone)]
pub struct Part {
    index: usize,
    rhythm: bool,
    program: u8,
    patch: Patch,
    controls: PartControls,
    master_volume: u8,
    master_tune: u8,
    levels: AmpLevels,
    pitch: PitchControls,
    polys: Vec<Poly>,
    serial: u64,
}

impl Part {
    /// A part with room for `max_polys` simultaneous notes.
    pub fn new(index: usize, rhythm: bool, patch: Patch, max_polys: usize) -> Self {
        let mut part = Self {
            index,
            rhythm,
            program: 0,
            patch,
            controls: PartControls::default(),
            master_volume: 100,
            master_tune: 64,
            levels: AmpLevels::default(),
            pitch: PitchControls::default(),
            polys: vec![Poly::default(); max_polys],
            serial: 0,
        };
        part.controls.bender_range = patch.bender_range;
        part.update_levels();
        part.update_pitch();
        part
    }

    fn update_levels(&mut self) {
        self.levels = AmpLevels {
            master_volume: self.master_volume,
            volume: self.controls.volume,
            patch_level: self.patch.level,
            expression: self.controls.expression,
            rhythm_level: None,
        };
    }

    fn update_pitch(&mut self) {
        self.pitch = PitchControls {
            bend: bend_to_pitch(self.controls.bend, self.controls.bender_range),
            master_tune: master_tune_to_pitch(self.master_tune),
            modulation: self.controls.modulation,
        };
    }

    fn recalc_sustain(&mut self, ctx: &mut PartContext<'_>) {
        self.update_levels();
        let math = ctx.tables.math();
        for id in self.polys.iter().filter(|p| p.is_active()).flat_map(Poly::partial_ids) {
            if let Some(partial) = ctx.manager.get_mut(id) {
                partial.recalc_sustain(math, &self.levels);
            }
        }
    }

    /// Select a program. The rhythm part ignores this.
    pub fn program_change(&mut self, bank: &SoundBank, program: u8) {
        if self.rhythm {
            return;
        }
        self.program = program & 0x7F;
        self.set_patch(*bank.patch(self.program));
    }

    /// Replace the current patch (sounding notes keep their timbre).
    pub fn set_patch(&mut self, patch: Patch) {
        self.patch = patch;
        self.controls.bender_range = patch.bender_range;
        self.update_levels();
        self.update_pitch();
    }

    fn plan(&self, ctx: &PartContext<'_>, midi_key: u8) -> Option<NotePlan> {
        if self.rhythm {
            let setting = ctx.bank.rhythm_key(midi_key)?;
            let slot = ctx.bank.rhythm_slot(midi_key, ctx.tables)?;
            Some(NotePlan {
                slot,
                key: midi_key,
                fine_tune: 50,
                reverb: setting.reverb,
                pan_offset: setting.pan.min(14) as i8 - PAN_CENTER as i8,
                rhythm_level: Some(setting.level),
                single_assign: true,
            })
        } else {
            Some(NotePlan {
                slot: ctx.bank.patch_slot(&self.patch, ctx.tables),
                key: fold_key(i32::from(midi_key) + self.patch.key_shift_semitones()),
                fine_tune: self.patch.fine_tune,
                reverb: self.patch.reverb,
                pan_offset: 0,
                rhythm_level: None,
                single_assign: self.patch.is_single_assign(),
            })
        }
    }

    /// Start a note.
    pub fn note_on(&mut self, ctx: &mut PartContext<'_>, midi_key: u8, velocity: u8) -> NoteOutcome {
        let Some(plan) = self.plan(ctx, midi_key) else {
            return NoteOutcome::Dropped;
        };
        let (tables, bank) = (ctx.tables, ctx.bank);
        let timbre = bank.timbre(plan.slot, tables);
        let needed = timbre.enabled_count();
        if needed == 0 {
            return NoteOutcome::Dropped;
        }
        if needed > ctx.manager.capacity() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "part {}: key {midi_key} needs {needed} partials, pool holds {}",
                self.index,
                ctx.manager.capacity()
            );
            return NoteOutcome::Dropped;
        }
        let math = tables.math();
        if plan.single_assign {
            for poly in self.polys.iter_mut().filter(|p| p.is_active() && p.midi_key == midi_key) {
                for id in poly.partial_ids() {
                    ctx.manager.abort(id, math);
                }
                poly.state = PolyState::Releasing;
            }
        }
        if ctx.manager.free_count() < needed {
            ctx.manager.reclaim(needed, math);
            return NoteOutcome::Deferred;
        }
        let Some(poly_index) = self.polys.iter().position(|p| !p.is_active()) else {
            return NoteOutcome::Dropped;
        };

        self.serial += 1;
        let mut poly = Poly {
            midi_key,
            key: plan.key,
            velocity,
            state: PolyState::Playing,
            partials: [None; 4],
            age: self.serial,
        };
        for pair in 0..2 {
            let structure = Structure::from_code(if pair == 0 {
                timbre.structure12
            } else {
                timbre.structure34
            });
            let both = timbre.partial_enabled(pair * 2) && timbre.partial_enabled(pair * 2 + 1);
            let mut ids = [None; 2];
            for member in 0..2 {
                let slot = pair * 2 + member;
                if !timbre.partial_enabled(slot) {
                    continue;
                }
                let owner = PartialOwner {
                    part: self.index,
                    poly: poly_index,
                    slot,
                };
                let Some(id) = ctx.manager.allocate(owner) else {
                    continue;
                };
                let param = timbre.partials[slot];
                let pcm = structure.is_pcm(member == 1).then(|| {
                    tables
                        .pcm_wave(param.pcm_index())
                        .copied()
                        .unwrap_or(MISSING_WAVE)
                });
                let stereo = if both && structure.mix() == PairMix::Stereo {
                    if member == 0 { STEREO_MASTER_PAN } else { STEREO_SLAVE_PAN }
                } else {
                    0
                };
                let start = PartialStart {
                    param,
                    pcm,
                    key: plan.key,
                    velocity,
                    fine_tune: plan.fine_tune,
                    pan_offset: plan.pan_offset + stereo,
                    reverb: plan.reverb,
                    ring_slave: member == 1 && both && structure.is_ring(),
                    no_sustain: timbre.no_sustain,
                    rhythm_level: plan.rhythm_level,
                };
                if let Some(partial) = ctx.manager.get_mut(id) {
                    partial.start(math, &start, &self.levels);
                }
                ids[member] = Some(id);
                poly.partials[slot] = Some(id);
            }
            if let [Some(master), Some(slave)] = ids {
                ctx.manager.link_pair(master, slave, structure.mix());
            }
        }
        self.polys[poly_index] = poly;
        NoteOutcome::Played
    }

    fn release_poly(poly: &mut Poly, ctx: &mut PartContext<'_>) {
        let math = ctx.tables.math();
        for id in poly.partial_ids() {
            if let Some(partial) = ctx.manager.get_mut(id) {
                partial.start_decay(math);
            }
        }
        poly.state = PolyState::Releasing;
    }

    /// Release a key, or mark it held while the pedal is down.
    pub fn note_off(&mut self, ctx: &mut PartContext<'_>, midi_key: u8) {
        let hold = self.controls.hold;
        for poly in self
            .polys
            .iter_mut()
            .filter(|p| p.state == PolyState::Playing && p.midi_key == midi_key)
        {
            if hold {
                poly.state = PolyState::Held;
            } else {
                Self::release_poly(poly, ctx);
            }
        }
    }

    fn set_hold(&mut self, ctx: &mut PartContext<'_>, hold: bool) {
        self.controls.hold = hold;
        if !hold {
            for poly in self.polys.iter_mut().filter(|p| p.state == PolyState::Held) {
                Self::release_poly(poly, ctx);
            }
        }
    }

    /// Release every key (the hold pedal still applies).
    pub fn all_notes_off(&mut self, ctx: &mut PartContext<'_>) {
        let hold = self.controls.hold;
        for poly in self.polys.iter_mut().filter(|p| p.state == PolyState::Playing) {
            if hold {
                poly.state = PolyState::Held;
            } else {
                Self::release_poly(poly, ctx);
            }
        }
    }

    /// Fade out everything at once.
    pub fn all_sound_off(&mut self, ctx: &mut PartContext<'_>) {
        let math = ctx.tables.math();
        for poly in self.polys.iter_mut().filter(|p| p.is_active()) {
            for id in poly.partial_ids() {
                ctx.manager.abort(id, math);
            }
            poly.state = PolyState::Releasing;
        }
    }

    fn reset_controllers(&mut self, ctx: &mut PartContext<'_>) {
        self.controls.modulation = 0;
        self.controls.bend = BEND_CENTER;
        self.controls.expression = 100;
        self.controls.rpn = (RPN_NULL, RPN_NULL);
        self.set_hold(ctx, false);
        self.update_pitch();
        self.recalc_sustain(ctx);
    }

    /// Handle a control change.
    pub fn control_change(&mut self, ctx: &mut PartContext<'_>, controller: u8, value: u8) {
        match controller {
            1 => {
                self.controls.modulation = value;
                self.update_pitch();
            }
            6 => {
                if self.controls.rpn == (0, 0) {
                    self.controls.bender_range = value.min(24);
                    self.update_pitch();
                }
            }
            7 => {
                self.controls.volume = cc_to_percent(value);
                self.recalc_sustain(ctx);
            }
            10 => self.controls.pan = ((u16::from(value.min(127)) * 14 + 63) / 127) as u8,
            11 => {
                self.controls.expression = cc_to_percent(value);
                self.recalc_sustain(ctx);
            }
            64 => self.set_hold(ctx, value >= 64),
            100 => self.controls.rpn.1 = value,
            101 => self.controls.rpn.0 = value,
            120 => self.all_sound_off(ctx),
            121 => self.reset_controllers(ctx),
            123..=127 => self.all_notes_off(ctx),
            _ => {}
        }
    }

    /// Set the pitch bend.
    pub fn pitch_bend(&mut self, value: u16) {
        self.controls.bend = value.min(0x3FFF);
        self.update_pitch();
    }

    /// Follow a master volume change.
    pub fn set_master_volume(&mut self, ctx: &mut PartContext<'_>, volume: u8) {
        self.master_volume = volume.min(100);
        self.recalc_sustain(ctx);
    }

    /// Follow a master tune change.
    pub fn set_master_tune(&mut self, tune: u8) {
        self.master_tune = tune.min(127);
        self.update_pitch();
    }

    /// A member partial was returned to the pool.
    pub fn partial_freed(&mut self, owner: PartialOwner) {
        if let Some(poly) = self.polys.get_mut(owner.poly) {
            poly.partial_freed(owner.slot);
        }
    }

    /// Forget every note and controller (the partials must be freed by the
    /// caller).
    pub fn reset(&mut self, patch: Patch) {
        self.polys.fill(Poly::default());
        self.controls = PartControls::default();
        self.program = 0;
        self.serial = 0;
        self.set_patch(patch);
    }

    /// Part index.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this is the rhythm part.
    #[inline]
    pub fn is_rhythm(&self) -> bool {
        self.rhythm
    }

    /// Current program.
    #[inline]
    pub fn program(&self) -> u8 {
        self.program
    }

    /// Current patch.
    #[inline]
    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// Controller values.
    #[inline]
    pub fn controls(&self) -> &PartControls {
        &self.controls
    }

    /// Levels fed to the TVAs of this part.
    #[inline]
    pub fn levels(&self) -> &AmpLevels {
        &self.levels
    }

    /// Pitch controls fed to the TVPs of this part.
    #[inline]
    pub fn pitch_controls(&self) -> &PitchControls {
        &self.pitch
    }

    /// Pan step of the part.
    #[inline]
    pub fn pan(&self) -> u8 {
        self.controls.pan
    }

    /// Idle or active.
    pub fn state(&self) -> PartState {
        if self.polys.iter().any(Poly::is_active) {
            PartState::Active
        } else {
            PartState::Idle
        }
    }

    /// Keys currently held down (or held by the pedal), oldest first.
    pub fn playing_keys(&self) -> Vec<u8> {
        let mut polys: Vec<&Poly> = self.polys.iter().filter(|p| p.is_sounding_key()).collect();
        polys.sort_by_key(|p| p.age);
        polys.into_iter().map(|p| p.midi_key).collect()
    }

    /// All note slots.
    pub fn polys(&self) -> &[Poly] {
        &self.polys
    }
}
