//! Partial pair structures.
//!
//! A timbre's four partials form two pairs (1 & 2, 3 & 4). Each pair has one
//! of 13 structure codes that decides which member plays PCM and how the two
//! outputs combine:
//!
//! | Code | Variant | Partials | Combination |
//! |------|---------|----------|-------------|
//! | 0 | `SynthSynth` | S + S | mix |
//! | 1 | `SynthSynthRingMix` | S + S | master + ring |
//! | 2 | `SynthPcm` | S + P | mix |
//! | 3 | `SynthPcmRingMix` | S + P | master + ring |
//! | 4 | `PcmSynthRingMix` | P + S | master + ring |
//! | 5 | `PcmPcm` | P + P | mix |
//! | 6 | `PcmPcmRingMix` | P + P | master + ring |
//! | 7 | `SynthSynthStereo` | S + S | stereo |
//! | 8 | `PcmPcmStereo` | P + P | stereo |
//! | 9 | `SynthSynthRing` | S + S | ring only |
//! | 10 | `SynthPcmRing` | S + P | ring only |
//! | 11 | `PcmSynthRing` | P + S | ring only |
//! | 12 | `PcmPcmRing` | P + P | ring only |
//!
//! Combination goes through the [`COMBINERS`] function table, indexed by
//! [`PairMix`], so the per-sample path has no branching on structure beyond
//! one table lookup.

/// Structure code of a partial pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Structure {
    /// Two synth partials, mixed.
    #[default]
    SynthSynth,
    /// Two synth partials, master plus ring product.
    SynthSynthRingMix,
    /// Synth and PCM, mixed.
    SynthPcm,
    /// Synth and PCM, master plus ring product.
    SynthPcmRingMix,
    /// PCM and synth, master plus ring product.
    PcmSynthRingMix,
    /// Two PCM partials, mixed.
    PcmPcm,
    /// Two PCM partials, master plus ring product.
    PcmPcmRingMix,
    /// Two synth partials panned apart.
    SynthSynthStereo,
    /// Two PCM partials panned apart.
    PcmPcmStereo,
    /// Two synth partials, ring product only.
    SynthSynthRing,
    /// Synth and PCM, ring product only.
    SynthPcmRing,
    /// PCM and synth, ring product only.
    PcmSynthRing,
    /// Two PCM partials, ring product only.
    PcmPcmRing,
}

/// How a pair's outputs combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairMix {
    /// Both partials play independently into the same pan position.
    Mix = 0,
    /// Master output plus the ring product.
    RingMixed = 1,
    /// Ring product only.
    Ring = 2,
    /// Both partials play, spread left and right.
    Stereo = 3,
}

/// Pan offset of the master in a stereo pair, in 0-14 pan steps.
pub const STEREO_MASTER_PAN: i8 = -7;
/// Pan offset of the slave in a stereo pair.
pub const STEREO_SLAVE_PAN: i8 = 7;

const ALL: [Structure; 13] = [
    Structure::SynthSynth,
    Structure::SynthSynthRingMix,
    Structure::SynthPcm,
    Structure::SynthPcmRingMix,
    Structure::PcmSynthRingMix,
    Structure::PcmPcm,
    Structure::PcmPcmRingMix,
    Structure::SynthSynthStereo,
    Structure::PcmPcmStereo,
    Structure::SynthSynthRing,
    Structure::SynthPcmRing,
    Structure::PcmSynthRing,
    Structure::PcmPcmRing,
];

/// PCM flags per code: bit 0 = first partial, bit 1 = second partial.
const PCM_FLAGS: [u8; 13] = [0, 0, 2, 2, 1, 3, 3, 0, 3, 0, 2, 1, 3];

const MIX: [PairMix; 13] = [
    PairMix::Mix,
    PairMix::RingMixed,
    PairMix::Mix,
    PairMix::RingMixed,
    PairMix::RingMixed,
    PairMix::Mix,
    PairMix::RingMixed,
    PairMix::Stereo,
    PairMix::Stereo,
    PairMix::Ring,
    PairMix::Ring,
    PairMix::Ring,
    PairMix::Ring,
];

impl Structure {
    /// Decode a structure code, clamping to 0-12.
    pub fn from_code(code: u8) -> Self {
        ALL[usize::from(code.min(12))]
    }

    /// The numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the first (`second = false`) or second partial plays PCM.
    #[inline]
    pub fn is_pcm(self, second: bool) -> bool {
        PCM_FLAGS[self as usize] & (1 << u8::from(second)) != 0
    }

    /// How the pair combines.
    #[inline]
    pub fn mix(self) -> PairMix {
        MIX[self as usize]
    }

    /// Whether the pair's outputs are multiplied together.
    #[inline]
    pub fn is_ring(self) -> bool {
        matches!(self.mix(), PairMix::Ring | PairMix::RingMixed)
    }
}

/// Ring product of two partial samples.
#[inline]
pub fn ring_modulate(master: i32, slave: i32) -> i32 {
    (master * slave) >> 13
}

/// Pair combiner: `(master, slave) -> (master output, slave output)`.
pub type Combiner = fn(i32, i32) -> (i32, i32);

fn combine_mix(master: i32, slave: i32) -> (i32, i32) {
    (master, slave)
}

fn combine_ring_mixed(master: i32, slave: i32) -> (i32, i32) {
    (master + ring_modulate(master, slave), 0)
}

fn combine_ring(master: i32, slave: i32) -> (i32, i32) {
    (ring_modulate(master, slave), 0)
}

/// Combination functions indexed by [`PairMix`].
pub const COMBINERS: [Combiner; 4] = [combine_mix, combine_ring_mixed, combine_ring, combine_mix];

/// Combine one sample of a pair.
#[inline]
pub fn combine(mix: PairMix, master: i32, slave: i32) -> (i32, i32) {
    COMBINERS[mix as usize](master, slave)
}
