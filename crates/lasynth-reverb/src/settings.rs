//! Reverb modes and their fixed delay-network tunings.
//!
//! Each mode is a complete set of delay lengths (in samples at 32 kHz),
//! output tap positions and 8-bit coefficients. The tables are static; the
//! model only selects which row applies for the current time and level.
//!
//! | Mode | Network | Time parameter selects |
//! |------|---------|------------------------|
//! | Room | LPF delay, 3 allpasses, 3 combs | comb feedback |
//! | Hall | LPF delay, 3 allpasses, 3 combs | comb feedback |
//! | Plate | delay, 3 allpasses, 3 combs | comb feedback |
//! | Tap Delay | single tapped comb | left/right tap positions |

/// Largest accepted time or level value.
pub const MAX_TIME_LEVEL: u8 = 7;

/// Reverb algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReverbMode {
    /// Small, bright room.
    #[default]
    Room,
    /// Large hall with a long diffuse tail.
    Hall,
    /// Dense plate with no entrance filtering.
    Plate,
    /// Stereo tapped echo.
    TapDelay,
}

impl ReverbMode {
    /// All modes in register order.
    pub const ALL: [ReverbMode; 4] = [
        ReverbMode::Room,
        ReverbMode::Hall,
        ReverbMode::Plate,
        ReverbMode::TapDelay,
    ];

    /// Decode a mode register value. Values above 3 wrap, matching the
    /// two-bit register of the hardware.
    pub fn from_register(value: u8) -> Self {
        Self::ALL[usize::from(value & 3)]
    }

    /// Register value of this mode.
    pub fn register(self) -> u8 {
        self as u8
    }

    /// Static tuning for this mode.
    pub fn settings(self) -> &'static ModeSettings {
        match self {
            ReverbMode::Room => &ROOM,
            ReverbMode::Hall => &HALL,
            ReverbMode::Plate => &PLATE,
            ReverbMode::TapDelay => &TAP_DELAY,
        }
    }
}

/// Fixed tuning of one reverb mode.
#[derive(Debug)]
pub struct ModeSettings {
    /// Allpass delay lengths (empty in tap delay mode).
    pub allpass_sizes: &'static [usize],
    /// Comb delay lengths; slot 0 is the entrance delay.
    pub comb_sizes: &'static [usize],
    /// Left output taps. One per comb, or one per time step in tap delay mode.
    pub out_l: &'static [usize],
    /// Right output taps, laid out like `out_l`.
    pub out_r: &'static [usize],
    /// Low-pass coefficient per comb.
    pub filter_factors: &'static [u8],
    /// Comb feedback by time step, or the two tap delay feedback values.
    pub feedback_factors: &'static [u8],
    /// Input gain into the network, indexed by level (16 entries in tap delay mode).
    pub dry_amps: &'static [u8],
    /// Output gain, indexed by level.
    pub wet_levels: &'static [u8],
    /// Gain applied after the entrance low-pass.
    pub lpf_amp: u8,
    /// True for the single tapped comb network.
    pub tap_delay: bool,
}

/// Extra slots kept past the longest tap delay position.
pub const TAP_DELAY_PROCESS_DELAY: usize = 2;

static ROOM: ModeSettings = ModeSettings {
    allpass_sizes: &[994, 729, 78],
    comb_sizes: &[706, 2349, 2839, 3632],
    out_l: &[2349, 141, 1960],
    out_r: &[1174, 1570, 145],
    filter_factors: &[0xA0, 0x60, 0x60, 0x60],
    feedback_factors: &[0x28, 0x48, 0x60, 0x78, 0x80, 0x88, 0x90, 0x98],
    dry_amps: &[0xA0, 0xA0, 0xA0, 0xA0, 0xB0, 0xB0, 0xB0, 0xD0],
    wet_levels: &[10, 30, 50, 70, 99, 132, 165, 195],
    lpf_amp: 0x60,
    tap_delay: false,
};

static HALL: ModeSettings = ModeSettings {
    allpass_sizes: &[1324, 809, 176],
    comb_sizes: &[962, 2619, 3545, 4519],
    out_l: &[2618, 1760, 4518],
    out_r: &[1300, 3532, 2274],
    filter_factors: &[0x80, 0x60, 0x60, 0x60],
    feedback_factors: &[0x28, 0x48, 0x60, 0x70, 0x78, 0x80, 0x90, 0x98],
    dry_amps: &[0xA0, 0xA0, 0xA0, 0xA0, 0xB0, 0xB0, 0xB0, 0xD0],
    wet_levels: &[10, 30, 55, 77, 99, 132, 165, 210],
    lpf_amp: 0x60,
    tap_delay: false,
};

static PLATE: ModeSettings = ModeSettings {
    allpass_sizes: &[969, 644, 157],
    comb_sizes: &[117, 2259, 2839, 3539],
    out_l: &[2259, 718, 1769],
    out_r: &[1136, 2128, 1],
    filter_factors: &[0x00, 0x20, 0x20, 0x20],
    feedback_factors: &[0x30, 0x58, 0x78, 0x88, 0xA0, 0xB8, 0xC0, 0xD0],
    dry_amps: &[0xA0, 0xA0, 0xA0, 0xA0, 0xB0, 0xB0, 0xB0, 0xD0],
    wet_levels: &[10, 30, 55, 77, 99, 132, 180, 210],
    lpf_amp: 0x80,
    tap_delay: false,
};

static TAP_DELAY: ModeSettings = ModeSettings {
    allpass_sizes: &[],
    comb_sizes: &[16000 + 3],
    out_l: &[400, 624, 960, 1488, 2256, 3472, 5280, 8000],
    out_r: &[800, 1248, 1920, 2976, 4512, 6944, 10560, 16000],
    filter_factors: &[0x68],
    feedback_factors: &[0x68, 0x60],
    dry_amps: &[
        0x20, 0x50, 0x50, 0x50, 0x50, 0x50, 0x50, 0x50, 0x20, 0x50, 0x50, 0x50, 0x50, 0x50, 0x50,
        0x50,
    ],
    wet_levels: &[10, 30, 55, 77, 99, 132, 165, 210],
    lpf_amp: 0,
    tap_delay: true,
};

/// Capacity each allpass slot needs to host every mode.
pub(crate) fn max_allpass_size(slot: usize) -> usize {
    ReverbMode::ALL
        .iter()
        .filter_map(|m| m.settings().allpass_sizes.get(slot).copied())
        .max()
        .unwrap_or(1)
}

/// Capacity each comb slot needs to host every mode.
pub(crate) fn max_comb_size(slot: usize) -> usize {
    ReverbMode::ALL
        .iter()
        .filter_map(|m| m.settings().comb_sizes.get(slot).copied())
        .max()
        .unwrap_or(1)
}
