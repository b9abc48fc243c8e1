//! Session configuration.
//!
//! [`SynthConfig`] is a plain value: build it with `Default` and the
//! `with_*` methods, then hand it to [`Synth::open`](crate::Synth::open),
//! which calls [`SynthConfig::validate`].
//!
//! | Field | Default | Accepted |
//! |-------|---------|----------|
//! | `sample_rate` | 32000 | 8000-192000 |
//! | `partial_count` | 32 | 1-256 |
//! | `midi_queue_capacity` | 1024 | >= 1 |
//! | `master_volume` | 100 | 0-100 (clamped) |
//! | `master_tune` | 64 | 0-127 (clamped) |

use lasynth_reverb::{MAX_TIME_LEVEL, ReverbMode};

use crate::error::{InitError, Result};
use crate::midi::ChannelMap;

/// Native synthesis rate of the LA32.
pub const NATIVE_SAMPLE_RATE: u32 = 32_000;
/// Lowest accepted output rate.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest accepted output rate.
pub const MAX_SAMPLE_RATE: u32 = 192_000;
/// Default partial pool size, as on the hardware.
pub const DEFAULT_PARTIAL_COUNT: usize = 32;
/// Largest accepted partial pool.
pub const MAX_PARTIAL_COUNT: usize = 256;

/// PCM playback interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PcmInterpolation {
    /// Nearest sample.
    Nearest,
    /// Linear between neighbouring samples.
    #[default]
    Linear,
}

/// Reverb settings at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReverbConfig {
    /// Whether the reverb runs at all.
    pub enabled: bool,
    /// Reverb algorithm.
    pub mode: ReverbMode,
    /// Time, 0-7.
    pub time: u8,
    /// Level, 0-7.
    pub level: u8,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ReverbMode::Room,
            time: 5,
            level: 3,
        }
    }
}

/// Everything fixed when a session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SynthConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Size of the partial pool.
    pub partial_count: usize,
    /// Initial reverb state.
    pub reverb: ReverbConfig,
    /// PCM interpolation quality.
    pub pcm_interpolation: PcmInterpolation,
    /// Capacity of the cross-thread MIDI queue, also the size of the
    /// immediate-message backlog.
    pub midi_queue_capacity: usize,
    /// MIDI channel to part assignment.
    pub channel_map: ChannelMap,
    /// Master volume, 0-100.
    pub master_volume: u8,
    /// Master tune, 0-127 (64 = A440).
    pub master_tune: u8,
    /// Swap the output channels.
    pub reversed_stereo: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: NATIVE_SAMPLE_RATE,
            partial_count: DEFAULT_PARTIAL_COUNT,
            reverb: ReverbConfig::default(),
            pcm_interpolation: PcmInterpolation::default(),
            midi_queue_capacity: 1024,
            channel_map: ChannelMap::default(),
            master_volume: 100,
            master_tune: 64,
            reversed_stereo: false,
        }
    }
}

impl SynthConfig {
    /// Set the output sample rate.
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the partial pool size.
    pub fn with_partial_count(mut self, count: usize) -> Self {
        self.partial_count = count;
        self
    }

    /// Set the initial reverb state.
    pub fn with_reverb(mut self, reverb: ReverbConfig) -> Self {
        self.reverb = reverb;
        self
    }

    /// Enable or disable the reverb.
    pub fn with_reverb_enabled(mut self, enabled: bool) -> Self {
        self.reverb.enabled = enabled;
        self
    }

    /// Set the PCM interpolation.
    pub fn with_pcm_interpolation(mut self, interpolation: PcmInterpolation) -> Self {
        self.pcm_interpolation = interpolation;
        self
    }

    /// Set the MIDI queue capacity.
    pub fn with_midi_queue_capacity(mut self, capacity: usize) -> Self {
        self.midi_queue_capacity = capacity;
        self
    }

    /// Set the channel map.
    pub fn with_channel_map(mut self, map: ChannelMap) -> Self {
        self.channel_map = map;
        self
    }

    /// Set the master volume (0-100).
    pub fn with_master_volume(mut self, volume: u8) -> Self {
        self.master_volume = volume;
        self
    }

    /// Set the master tune (0-127).
    pub fn with_master_tune(mut self, tune: u8) -> Self {
        self.master_tune = tune;
        self
    }

    /// Swap left and right.
    pub fn with_reversed_stereo(mut self, reversed: bool) -> Self {
        self.reversed_stereo = reversed;
        self
    }

    /// Reject settings the engine cannot run with. Level-type values are
    /// clamped instead.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(InitError::InvalidSampleRate {
                rate: self.sample_rate,
            });
        }
        if self.partial_count == 0 || self.partial_count > MAX_PARTIAL_COUNT {
            return Err(InitError::InvalidPartialCount {
                count: self.partial_count,
                max: MAX_PARTIAL_COUNT,
            });
        }
        if self.midi_queue_capacity == 0 {
            return Err(InitError::InvalidQueueCapacity {
                capacity: self.midi_queue_capacity,
            });
        }
        Ok(())
    }

    /// Copy with every level-type value clamped into range.
    pub(crate) fn clamped(&self) -> Self {
        let mut config = self.clone();
        config.master_volume = config.master_volume.min(100);
        config.master_tune = config.master_tune.min(127);
        config.reverb.time = config.reverb.time.min(MAX_TIME_LEVEL);
        config.reverb.level = config.reverb.level.min(MAX_TIME_LEVEL);
        config
    }
}
