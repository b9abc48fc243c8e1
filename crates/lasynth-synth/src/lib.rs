//! lasynth Synth - LA synthesis engine
//!
//! Emulation of a linear-arithmetic synthesizer chip and the sound module
//! around it: partials built from a wave generator and three time-variant
//! envelopes (TVP, TVF, TVA), a fixed partial pool with voice stealing,
//! nine MIDI parts, the reverb unit and the DAC stage.
//!
//! # Core Components
//!
//! ## Resources
//!
//! - [`ControlRom`] / [`PcmRom`] - In-memory ROM images (loading files is the
//!   host's job)
//! - [`ControlTables`] - Validated, immutable tables shared by every session
//! - [`Timbre`], [`Patch`], [`RhythmKey`] - Parsed sound definitions
//!
//! ## Voices
//!
//! - [`Partial`] - One wave generator with its envelopes
//! - [`PartialManager`] - The fixed pool and its reclamation order
//! - [`Part`] - Per-channel state and note handling
//!
//! ## Session
//!
//! - [`Synth`] - Owns all mutable state and renders audio
//! - [`SynthConfig`] - Settings fixed at open
//! - [`MidiSender`] / [`TimedMidi`] - Cross-thread event queue
//!
//! ```rust
//! use lasynth_synth::{ControlTables, MidiMessage, Synth, SynthConfig};
//!
//! let tables = ControlTables::factory().unwrap();
//! let (mut synth, _midi) = Synth::open(tables, SynthConfig::default().with_sample_rate(48000)).unwrap();
//!
//! synth.play_msg_now(MidiMessage::ProgramChange { channel: 0, program: 3 });
//! synth.play_msg_now(MidiMessage::NoteOn { channel: 0, key: 64, velocity: 90 });
//!
//! let mut buffer = vec![0.0f32; 2 * 1024];
//! synth.render_f32(&mut buffer);
//! assert!(buffer.iter().all(|s| (-1.0..1.0).contains(s)));
//! ```
//!
//! # Features
//!
//! - `tracing` - Log session lifecycle, voice stealing and dropped messages
//! - `serde` - Serialize configuration and sound definitions

pub mod bank;
pub mod config;
pub mod error;
pub mod midi;
pub mod part;
pub mod partial;
pub mod partial_manager;
pub mod patch;
pub mod poly;
pub mod ramp;
pub mod resample;
pub mod rom;
pub mod structure;
pub mod synth;
pub mod tables;
pub mod timbre;
pub mod tva;
pub mod tvf;
pub mod tvp;
pub mod wave;

pub use bank::{SoundBank, TimbreSlot};
pub use config::{
    DEFAULT_PARTIAL_COUNT, MAX_PARTIAL_COUNT, NATIVE_SAMPLE_RATE, PcmInterpolation, ReverbConfig,
    SynthConfig,
};
pub use error::{InitError, Result, SendError};
pub use midi::{ChannelMap, MidiMessage, MidiSender, PART_COUNT, RHYTHM_PART, TimedMidi};
pub use part::{NoteOutcome, Part, PartControls, PartState};
pub use partial::{Partial, PartialOwner, PartialState};
pub use partial_manager::PartialManager;
pub use patch::{Patch, RhythmKey, TimbreGroup};
pub use poly::{Poly, PolyState};
pub use rom::{ControlRom, PcmRom, PcmWaveDescriptor};
pub use structure::{PairMix, Structure};
pub use synth::{PartialInfo, Synth};
pub use tables::{ControlTables, MathTables};
pub use timbre::{PartialParam, Timbre};

// Reverb types appear in the configuration.
pub use lasynth_reverb::ReverbMode;
