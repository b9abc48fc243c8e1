//! Error types for session setup and the MIDI handoff.
//!
//! Only initialization problems are reported as errors. Everything that can
//! go wrong while rendering (malformed MIDI, dangling timbre references, a
//! full partial pool) is absorbed by the engine.

use thiserror::Error;

use crate::midi::TimedMidi;

/// Reasons a session cannot be opened or reloaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    /// The control ROM holds no timbre blocks at all.
    #[error("timbre bank is empty")]
    TimbreBankEmpty,

    /// The timbre blob ends in a partial block.
    #[error("timbre bank length {len} is not a multiple of {block} bytes")]
    TimbreBankTruncated {
        /// Length of the timbre blob in bytes.
        len: usize,
        /// Size of one timbre block.
        block: usize,
    },

    /// The patch table is shorter than the full program range.
    #[error("patch table has {len} bytes, expected {expected}")]
    PatchTableTruncated {
        /// Length of the patch blob in bytes.
        len: usize,
        /// Required length in bytes.
        expected: usize,
    },

    /// The rhythm table does not cover every rhythm key.
    #[error("rhythm table has {len} bytes, expected {expected}")]
    RhythmTableTruncated {
        /// Length of the rhythm blob in bytes.
        len: usize,
        /// Required length in bytes.
        expected: usize,
    },

    /// The PCM ROM is too small to hold any usable wave.
    #[error("PCM ROM holds {len} samples, at least {min} required")]
    PcmRomTooSmall {
        /// Number of samples supplied.
        len: usize,
        /// Minimum accepted number of samples.
        min: usize,
    },

    /// A PCM wave descriptor has zero length.
    #[error("PCM wave {index} has zero length")]
    PcmWaveEmpty {
        /// Index of the descriptor.
        index: usize,
    },

    /// A PCM wave descriptor points past the end of the sample ROM.
    #[error("PCM wave {index} ends at sample {end}, beyond ROM length {rom_len}")]
    PcmWaveOutOfRange {
        /// Index of the descriptor.
        index: usize,
        /// One past the last sample the wave would read.
        end: u64,
        /// Number of samples in the PCM ROM.
        rom_len: usize,
    },

    /// Output sample rate outside the supported range.
    #[error("unsupported sample rate {rate} Hz")]
    InvalidSampleRate {
        /// The rejected rate.
        rate: u32,
    },

    /// Partial pool size outside the supported range.
    #[error("partial count {count} outside 1..={max}")]
    InvalidPartialCount {
        /// The rejected count.
        count: usize,
        /// Largest supported pool.
        max: usize,
    },

    /// The MIDI queue must hold at least one event.
    #[error("MIDI queue capacity {capacity} is invalid")]
    InvalidQueueCapacity {
        /// The rejected capacity.
        capacity: usize,
    },
}

/// Result alias for setup operations.
pub type Result<T> = std::result::Result<T, InitError>;

/// A timed MIDI event could not be queued because the renderer has not
/// drained the queue. The event is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("MIDI queue full, event for frame {} rejected", .0.frame)]
pub struct SendError(pub TimedMidi);

impl InitError {
    /// Create an error for a timbre blob that ends mid-block.
    pub fn truncated_timbres(len: usize) -> Self {
        Self::TimbreBankTruncated {
            len,
            block: crate::rom::TIMBRE_BLOCK_SIZE,
        }
    }

    /// True for errors caused by the ROM data rather than the configuration.
    pub fn is_rom_error(&self) -> bool {
        !matches!(
            self,
            Self::InvalidSampleRate { .. }
                | Self::InvalidPartialCount { .. }
                | Self::InvalidQueueCapacity { .. }
        )
    }
}
