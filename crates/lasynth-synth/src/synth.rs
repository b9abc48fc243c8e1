//! The synthesis session: owns every piece of mutable engine state and
//! renders audio.
//!
//! A [`Synth`] is opened against shared [`ControlTables`] and a
//! [`SynthConfig`]. It hands back a [`MidiSender`] for the sequencer thread;
//! everything else happens on the caller of the `render_*` methods.
//!
//! Per output frame, native 32 kHz frames are pulled through the rate
//! converter. Each native frame:
//!
//! 1. applies every MIDI event due by its position on the output clock
//!    (queue and immediate backlog, in frame order)
//! 2. advances all partials, combines pairs and pans onto the dry and reverb
//!    buses
//! 3. frees finished partials, runs the reverb and soft-saturates
//!
//! Timestamps are output frames. At other rates than 32 kHz an event stamped
//! `t` takes effect on the first native frame at or after `t * 32000 / rate`.
//!
//! A note on that has to steal partials is deferred: the victims fade out,
//! and the note together with every later event waits until the fade is
//! over. The pool therefore never holds more than its capacity.
//!
//! # Example
//!
//! ```rust
//! use lasynth_synth::{ControlTables, MidiMessage, Synth, SynthConfig, TimedMidi};
//!
//! let tables = ControlTables::factory().unwrap();
//! let (mut synth, mut midi) = Synth::open(tables, SynthConfig::default()).unwrap();
//!
//! midi.send(TimedMidi::new(0, MidiMessage::NoteOn { channel: 0, key: 60, velocity: 100 }))
//!     .unwrap();
//!
//! let mut buffer = vec![0i16; 2 * 4096];
//! synth.render_i16(&mut buffer);
//! assert!(buffer.iter().any(|&s| s != 0));
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use lasynth_core::{clip_i16, i16_to_f32, soft_saturate};
use lasynth_reverb::{ReverbMode, ReverbModel};

use crate::bank::SoundBank;
use crate::config::{NATIVE_SAMPLE_RATE, ReverbConfig, SynthConfig};
use crate::error::Result;
use crate::midi::{MidiMessage, MidiReceiver, MidiSender, PART_COUNT, RHYTHM_PART, TimedMidi, midi_queue};
use crate::part::{NoteOutcome, Part, PartContext, PartState};
use crate::partial::{PartialOwner, PartialState, pan_sample};
use crate::partial_manager::PartialManager;
use crate::patch::{Patch, RhythmKey};
use crate::resample::RateConverter;
use crate::rom::{ControlRom, PcmRom};
use crate::structure::combine;
use crate::tables::ControlTables;

/// Snapshot of one pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialInfo {
    /// Pool index.
    pub id: usize,
    /// Lifecycle state.
    pub state: PartialState,
    /// Owner while active.
    pub owner: Option<PartialOwner>,
    /// Allocation serial, larger is younger.
    pub age: u64,
    /// Plays PCM rather than synthesis.
    pub pcm: bool,
    /// Key the partial was started with.
    pub key: u8,
}

/// One synthesis session.
#[derive(Debug)]
pub struct Synth {
    tables: Arc<ControlTables>,
    config: SynthConfig,
    bank: SoundBank,
    manager: PartialManager,
    parts: Vec<Part>,
    reverb: ReverbModel,
    reverb_enabled: bool,
    receiver: MidiReceiver,
    backlog: VecDeque<TimedMidi>,
    deferred: Option<TimedMidi>,
    clock: u64,
    /// Native frames rendered so far.
    native_clock: u64,
    converter: RateConverter,
    /// Raw partial outputs of the current native frame, by pool index.
    scratch: Vec<i32>,
    usable: bool,
}

impl Synth {
    /// Open a session. Returns the session and the sending half of its MIDI
    /// queue.
    pub fn open(tables: Arc<ControlTables>, config: SynthConfig) -> Result<(Self, MidiSender)> {
        config.validate()?;
        let config = config.clamped();
        let (sender, receiver) = midi_queue(config.midi_queue_capacity);
        let bank = SoundBank::new(&tables);
        let parts = Self::initial_parts(&bank, config.partial_count);

        let mut reverb = ReverbModel::new();
        reverb.configure(config.reverb.mode, config.reverb.time, config.reverb.level);

        let mut synth = Self {
            manager: PartialManager::new(config.partial_count),
            scratch: vec![0; config.partial_count],
            backlog: VecDeque::with_capacity(config.midi_queue_capacity),
            converter: RateConverter::new(config.sample_rate),
            reverb_enabled: config.reverb.enabled,
            tables,
            bank,
            parts,
            reverb,
            receiver,
            deferred: None,
            clock: 0,
            native_clock: 0,
            usable: true,
            config,
        };
        synth.apply_master_controls();

        #[cfg(feature = "tracing")]
        tracing::info!(
            "session opened: {} Hz, {} partials, reverb {}",
            synth.config.sample_rate,
            synth.config.partial_count,
            if synth.reverb_enabled { "on" } else { "off" }
        );

        Ok((synth, sender))
    }

    fn initial_parts(bank: &SoundBank, max_polys: usize) -> Vec<Part> {
        (0..PART_COUNT)
            .map(|index| {
                let rhythm = index == RHYTHM_PART;
                let patch = if rhythm { Patch::default() } else { *bank.patch(0) };
                Part::new(index, rhythm, patch, max_polys)
            })
            .collect()
    }

    fn apply_master_controls(&mut self) {
        let (volume, tune) = (self.config.master_volume, self.config.master_tune);
        let mut ctx = PartContext {
            tables: &self.tables,
            bank: &self.bank,
            manager: &mut self.manager,
        };
        for part in &mut self.parts {
            part.set_master_volume(&mut ctx, volume);
            part.set_master_tune(tune);
        }
    }

    // --- MIDI ---

    /// Apply a message to its part. Returns true when a note on was
    /// deferred.
    fn dispatch(&mut self, message: MidiMessage) -> bool {
        let Some(part) = self
            .config
            .channel_map
            .part(message.channel())
            .and_then(|index| self.parts.get_mut(index))
        else {
            return false;
        };
        let mut ctx = PartContext {
            tables: &self.tables,
            bank: &self.bank,
            manager: &mut self.manager,
        };
        match message {
            MidiMessage::NoteOff { key, .. } => part.note_off(&mut ctx, key),
            MidiMessage::NoteOn { key, velocity, .. } => {
                return part.note_on(&mut ctx, key, velocity) == NoteOutcome::Deferred;
            }
            MidiMessage::ControlChange {
                controller, value, ..
            } => part.control_change(&mut ctx, controller, value),
            MidiMessage::ProgramChange { program, .. } => part.program_change(&self.bank, program),
            MidiMessage::PitchBend { value, .. } => part.pitch_bend(value),
        }
        false
    }

    /// Latest output frame that lies at or before native frame `native`.
    fn output_frame_at(&self, native: u64) -> u64 {
        let rate = u128::from(self.config.sample_rate);
        (u128::from(native) * rate / u128::from(NATIVE_SAMPLE_RATE)) as u64
    }

    /// First native frame at or after output frame `frame`.
    fn native_frame_at(&self, frame: u64) -> u64 {
        let rate = u128::from(self.config.sample_rate.max(1));
        (u128::from(frame) * u128::from(NATIVE_SAMPLE_RATE)).div_ceil(rate) as u64
    }

    /// Next event stamped at or before `due`, backlog first on equal frames.
    fn pop_due(&mut self, due: u64) -> Option<TimedMidi> {
        let queued = self.receiver.peek_frame().filter(|f| *f <= due);
        let backlog = self.backlog.front().map(|e| e.frame).filter(|f| *f <= due);
        match (backlog, queued) {
            (Some(b), Some(q)) if q < b => self.receiver.pop(),
            (Some(_), _) => self.backlog.pop_front(),
            (None, Some(_)) => self.receiver.pop(),
            (None, None) => None,
        }
    }

    fn process_events(&mut self, due: u64) {
        if !self.usable {
            while self.pop_due(due).is_some() {}
            return;
        }
        if let Some(event) = self.deferred {
            if self.manager.is_reclaiming() {
                return;
            }
            self.deferred = None;
            #[cfg(feature = "tracing")]
            tracing::debug!("retrying deferred {:?}", event.message);
            if self.dispatch(event.message) {
                self.deferred = Some(event);
                return;
            }
        }
        while let Some(event) = self.pop_due(due) {
            if self.dispatch(event.message) {
                #[cfg(feature = "tracing")]
                tracing::debug!("deferring {:?} at frame {}", event.message, self.clock);
                self.deferred = Some(event);
                return;
            }
        }
    }

    /// Apply a message now, from the rendering thread. If earlier messages
    /// are still waiting on a deferred note, the message queues behind them.
    /// Returns false when the backlog is full and the message was dropped.
    pub fn play_msg_now(&mut self, message: MidiMessage) -> bool {
        if !self.usable {
            return true;
        }
        if self.deferred.is_none() && self.backlog.is_empty() {
            if self.dispatch(message) {
                self.deferred = Some(TimedMidi::new(self.clock, message));
            }
            return true;
        }
        if self.backlog.len() == self.backlog.capacity() {
            #[cfg(feature = "tracing")]
            tracing::debug!("backlog full, dropping {:?}", message);
            return false;
        }
        self.backlog.push_back(TimedMidi::new(self.clock, message));
        true
    }

    /// Parse raw bytes and apply them now. Malformed bytes are ignored and
    /// count as played.
    pub fn play_bytes_now(&mut self, bytes: &[u8]) -> bool {
        match MidiMessage::parse(bytes) {
            Some(message) => self.play_msg_now(message),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!("ignoring malformed MIDI {:02X?}", bytes);
                true
            }
        }
    }

    // --- rendering ---

    fn render_native_frame(&mut self) -> (i16, i16) {
        let due = self.output_frame_at(self.native_clock);
        self.native_clock += 1;
        self.process_events(due);
        if !self.usable {
            return (0, 0);
        }
        let tables = &*self.tables;
        let math = tables.math();
        let pcm = tables.pcm_samples();
        let interpolation = self.config.pcm_interpolation;

        for (partial, raw) in self.manager.partials_mut().iter_mut().zip(&mut self.scratch) {
            *raw = match partial.owner().and_then(|o| self.parts.get(o.part)) {
                Some(part) => partial.next_sample(
                    math,
                    pcm,
                    part.pitch_controls(),
                    part.levels(),
                    interpolation,
                ),
                None => 0,
            };
        }

        let (mut dry_l, mut dry_r, mut send_l, mut send_r) = (0i32, 0i32, 0i32, 0i32);
        for (id, partial) in self.manager.partials().iter().enumerate() {
            let Some(part) = partial.owner().and_then(|o| self.parts.get(o.part)) else {
                continue;
            };
            let raw = self.scratch[id];
            let sample = match partial.pair() {
                Some(link) if link.master => combine(link.mix, raw, self.scratch[link.partner]).0,
                Some(link) => combine(link.mix, self.scratch[link.partner], raw).1,
                None => raw,
            };
            if sample == 0 {
                continue;
            }
            let (l, r) = pan_sample(sample, partial.pan(part.pan()));
            if partial.reverb() {
                send_l += l;
                send_r += r;
            } else {
                dry_l += l;
                dry_r += r;
            }
        }

        for id in 0..self.manager.capacity() {
            if self.manager.get(id).is_some_and(|p| p.is_finished()) {
                for owner in self.manager.release(id).into_iter().flatten() {
                    if let Some(part) = self.parts.get_mut(owner.part) {
                        part.partial_freed(owner);
                    }
                }
            }
        }

        let (mut left, mut right) = (dry_l + send_l, dry_r + send_r);
        if self.reverb_enabled {
            let (wet_l, wet_r) = self.reverb.process(clip_i16(send_l), clip_i16(send_r));
            left += i32::from(wet_l);
            right += i32::from(wet_r);
        }
        (soft_saturate(left), soft_saturate(right))
    }

    fn next_output_frame(&mut self) -> (i16, i16) {
        let mut converter = self.converter;
        let (l, r) = converter.next_frame(|| self.render_native_frame());
        self.converter = converter;
        self.clock += 1;
        if self.config.reversed_stereo { (r, l) } else { (l, r) }
    }

    /// Render interleaved stereo 16-bit frames. A trailing odd sample is
    /// zeroed.
    pub fn render_i16(&mut self, output: &mut [i16]) {
        let mut frames = output.chunks_exact_mut(2);
        for frame in &mut frames {
            let (l, r) = self.next_output_frame();
            frame[0] = l;
            frame[1] = r;
        }
        frames.into_remainder().fill(0);
    }

    /// Render interleaved stereo float frames in `[-1.0, 1.0)`. A trailing
    /// odd sample is zeroed.
    pub fn render_f32(&mut self, output: &mut [f32]) {
        let mut frames = output.chunks_exact_mut(2);
        for frame in &mut frames {
            let (l, r) = self.next_output_frame();
            frame[0] = i16_to_f32(l);
            frame[1] = i16_to_f32(r);
        }
        frames.into_remainder().fill(0.0);
    }

    // --- settings ---

    /// Enable or disable the reverb. Disabling clears its memory.
    pub fn set_reverb_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.reverb.reset();
        }
        self.reverb_enabled = enabled;
    }

    /// Change reverb mode, time and level without clearing its memory.
    pub fn configure_reverb(&mut self, mode: ReverbMode, time: u8, level: u8) {
        self.reverb.configure(mode, time, level);
    }

    /// Current reverb settings.
    pub fn reverb_config(&self) -> ReverbConfig {
        ReverbConfig {
            enabled: self.reverb_enabled,
            mode: self.reverb.mode(),
            time: self.reverb.time(),
            level: self.reverb.level(),
        }
    }

    /// Set the master volume (0-100).
    pub fn set_master_volume(&mut self, volume: u8) {
        self.config.master_volume = volume.min(100);
        self.apply_master_controls();
    }

    /// Set the master tune (0-127, 64 = A440).
    pub fn set_master_tune(&mut self, tune: u8) {
        self.config.master_tune = tune.min(127);
        self.apply_master_controls();
    }

    /// Replace a patch. Parts currently on that program pick it up for their
    /// next notes.
    pub fn set_patch(&mut self, program: u8, patch: Patch) {
        let program = program & 0x7F;
        self.bank.set_patch(program, patch);
        for part in self
            .parts
            .iter_mut()
            .filter(|p| !p.is_rhythm() && p.program() == program)
        {
            part.set_patch(patch);
        }
    }

    /// Overwrite a memory timbre from a raw timbre block. Out-of-range bytes
    /// clamp. Returns false for an index outside the memory bank.
    pub fn set_memory_timbre(&mut self, index: usize, raw: &[u8]) -> bool {
        self.bank.set_memory_timbre(index, raw)
    }

    /// Replace the rhythm setting of a key. Returns false outside the rhythm
    /// key range.
    pub fn set_rhythm_key(&mut self, key: u8, setting: RhythmKey) -> bool {
        self.bank.set_rhythm_key(key, setting)
    }

    /// Silence everything and return all parts to power-on state. The clock
    /// keeps running and the sound bank keeps its edits.
    pub fn reset(&mut self) {
        self.manager.reset();
        self.scratch.fill(0);
        for part in &mut self.parts {
            let patch = if part.is_rhythm() {
                Patch::default()
            } else {
                *self.bank.patch(0)
            };
            part.reset(patch);
        }
        self.reverb.reset();
        self.backlog.clear();
        self.deferred = None;
        self.converter.reset();
        self.native_clock = self.native_frame_at(self.clock);
        self.apply_master_controls();
    }

    /// Swap in new ROM data. On failure the session goes silent and ignores
    /// MIDI until a later reload succeeds.
    pub fn reload(&mut self, control: &ControlRom, pcm: &PcmRom) -> Result<()> {
        match ControlTables::load(control, pcm) {
            Ok(tables) => {
                self.bank = SoundBank::new(&tables);
                self.tables = tables;
                self.usable = true;
                self.reset();
                #[cfg(feature = "tracing")]
                tracing::info!("session reloaded");
                Ok(())
            }
            Err(e) => {
                self.usable = false;
                self.reset();
                Err(e)
            }
        }
    }

    // --- introspection ---

    /// Whether the session has valid ROM data.
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// Output frames rendered so far. MIDI timestamps refer to this clock.
    #[inline]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// The session configuration (with levels clamped).
    #[inline]
    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// The tables the session plays from.
    #[inline]
    pub fn tables(&self) -> &Arc<ControlTables> {
        &self.tables
    }

    /// Size of the partial pool.
    #[inline]
    pub fn partial_count(&self) -> usize {
        self.manager.capacity()
    }

    /// Partials currently holding a pool slot.
    pub fn active_partial_count(&self) -> usize {
        self.manager.active_count()
    }

    /// Snapshot of a pool entry.
    pub fn partial_info(&self, id: usize) -> Option<PartialInfo> {
        self.manager.get(id).map(|p| PartialInfo {
            id,
            state: p.state(),
            owner: p.owner(),
            age: p.age(),
            pcm: p.is_pcm(),
            key: p.key(),
        })
    }

    /// State of a part (0-8).
    pub fn part_state(&self, part: usize) -> Option<PartState> {
        self.parts.get(part).map(Part::state)
    }

    /// Keys held on a part, oldest first.
    pub fn playing_keys(&self, part: usize) -> Vec<u8> {
        self.parts.get(part).map(Part::playing_keys).unwrap_or_default()
    }

    /// A part, for inspection.
    pub fn part(&self, part: usize) -> Option<&Part> {
        self.parts.get(part)
    }

    /// Whether output may still be non-silent: partials sounding, a reverb
    /// tail, or messages waiting on a deferred note.
    pub fn is_active(&self) -> bool {
        self.usable
            && (self.manager.active_count() > 0
                || self.deferred.is_some()
                || !self.backlog.is_empty()
                || (self.reverb_enabled && self.reverb.is_active()))
    }
}
