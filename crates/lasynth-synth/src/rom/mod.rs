//! In-memory ROM images.
//!
//! Reading dump files is the host's job. The engine only consumes the two
//! images below, already split into their tables:
//!
//! | Image | Content |
//! |-------|---------|
//! | [`ControlRom`] | timbre blocks, patch table, rhythm setup, PCM wave map |
//! | [`PcmRom`] | signed 16-bit sample memory |
//!
//! Both are validated by [`ControlTables::load`](crate::ControlTables::load).
//! [`ControlRom::factory`] and [`PcmRom::factory`] build a complete synthetic
//! set for hosts that have no original dumps.

mod factory;

/// Bytes per raw timbre block (14 common + 4 x 58 partial).
pub const TIMBRE_BLOCK_SIZE: usize = 246;
/// Bytes per raw patch.
pub const PATCH_BLOCK_SIZE: usize = 8;
/// Number of programs in the patch table.
pub const PATCH_COUNT: usize = 128;
/// Bytes per raw rhythm key setting.
pub const RHYTHM_BLOCK_SIZE: usize = 4;
/// Number of keys covered by the rhythm setup.
pub const RHYTHM_KEY_COUNT: usize = 85;
/// MIDI key of the first rhythm setup entry.
pub const RHYTHM_FIRST_KEY: u8 = 24;
/// Smallest accepted PCM ROM, in samples.
pub const MIN_PCM_SAMPLES: usize = 512;
/// Pitch at which a PCM wave plays back at its recorded rate (one sample per tick).
pub const PCM_NATIVE_PITCH: u16 = 36864;

/// Location and tuning of one PCM wave inside the sample ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmWaveDescriptor {
    /// First sample.
    pub start: u32,
    /// Number of samples.
    pub len: u32,
    /// Whole-wave loop. A one-shot wave ends its partial when played out.
    pub looped: bool,
    /// Base pitch that makes key 60 sound at the recorded note.
    pub pitch: u16,
}

/// Control ROM image, split into tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlRom {
    /// Concatenated raw timbre blocks. Blocks 0-127 are the melodic banks,
    /// blocks from 128 on are rhythm timbres.
    pub timbres: Vec<u8>,
    /// Raw patch table.
    pub patches: Vec<u8>,
    /// Raw rhythm setup.
    pub rhythm: Vec<u8>,
    /// PCM wave map.
    pub pcm_waves: Vec<PcmWaveDescriptor>,
}

/// PCM sample ROM image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcmRom {
    /// Signed 16-bit samples.
    pub samples: Vec<i16>,
}

impl ControlRom {
    /// Number of complete timbre blocks in the image.
    pub fn timbre_count(&self) -> usize {
        self.timbres.len() / TIMBRE_BLOCK_SIZE
    }

    /// Synthetic control ROM matching [`PcmRom::factory`].
    pub fn factory() -> Self {
        factory::control_rom()
    }
}

impl PcmRom {
    /// Synthetic sample ROM: generated loops, noise and one-shot drums.
    pub fn factory() -> Self {
        factory::pcm_rom()
    }
}
