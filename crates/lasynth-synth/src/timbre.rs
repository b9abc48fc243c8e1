//! Timbre definitions and their raw block format.
//!
//! A timbre combines up to four partials. Raw blocks are 246 bytes:
//!
//! | Offset | Size | Section |
//! |--------|------|---------|
//! | 0 | 10 | name (ASCII, space padded) |
//! | 10 | 1 | structure of partials 1 & 2 (0-12) |
//! | 11 | 1 | structure of partials 3 & 4 (0-12) |
//! | 12 | 1 | partial enable mask, bit n = partial n+1 |
//! | 13 | 1 | envelope mode (1 = no sustain) |
//! | 14 | 4 x 58 | partial sections |
//!
//! Each partial section is WG (8), pitch envelope (12), pitch LFO (3),
//! TVF (16) and TVA (19) bytes. The last two TVA bytes are reserved: they
//! are skipped on read and written as zero. Whether a partial plays PCM or a synth wave
//! is decided by the structure code, not by the partial itself.
//!
//! Parsing never fails: every byte is clamped to its legal range and missing
//! bytes read as zero.

use crate::rom::TIMBRE_BLOCK_SIZE;

/// Bytes in one partial section.
pub const PARTIAL_PARAM_SIZE: usize = 58;
/// Bytes in the common section.
pub const COMMON_PARAM_SIZE: usize = 14;
/// Length of a timbre name.
pub const NAME_LEN: usize = 10;
/// Reserved bytes closing each TVA section.
const TVA_RESERVED: usize = 2;

/// Sequential clamping reader over a raw block.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn byte(&mut self, max: u8) -> u8 {
        let value = self.bytes.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        value.min(max)
    }

    fn skip(&mut self, count: usize) {
        self.pos += count;
    }

    fn flag(&mut self) -> bool {
        self.byte(1) != 0
    }

    fn array<const N: usize>(&mut self, max: u8) -> [u8; N] {
        let mut out = [0u8; N];
        for v in &mut out {
            *v = self.byte(max);
        }
        out
    }
}

/// Wave generator parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WaveParam {
    /// Coarse pitch, 0-96 semitones (36 = unison).
    pub coarse: u8,
    /// Fine pitch, 0-100 (50 = unison, one step = one cent).
    pub fine: u8,
    /// Pitch key follow index, 0-16.
    pub keyfollow: u8,
    /// Whether pitch bend reaches this partial.
    pub bender: bool,
    /// Bit 0: sawtooth instead of square (synth partials).
    /// Bit 1: upper PCM bank (PCM partials).
    pub waveform: u8,
    /// PCM wave number within the bank, 0-127.
    pub pcm_wave: u8,
    /// Pulse width, 0-100.
    pub pulse_width: u8,
    /// Pulse width velocity sensitivity, 0-14 (7 = none).
    pub pw_velo_sens: u8,
}

/// Pitch envelope parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PitchEnvParam {
    /// Envelope depth, 0-10.
    pub depth: u8,
    /// Velocity sensitivity of the depth, 0-3.
    pub velo_sens: u8,
    /// Segment time key follow, 0-4.
    pub time_keyfollow: u8,
    /// Segment times, 0-100. The last one is the release.
    pub time: [u8; 4],
    /// Levels, 0-100 (50 = no offset). `level[3]` is the sustain level,
    /// `level[4]` the release end point.
    pub level: [u8; 5],
}

/// Pitch LFO parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PitchLfoParam {
    /// Rate, 0-100.
    pub rate: u8,
    /// Static depth, 0-100.
    pub depth: u8,
    /// Depth added by the modulation wheel, 0-100.
    pub mod_sens: u8,
}

/// Time-variant filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TvfParam {
    /// Cutoff, 0-100.
    pub cutoff: u8,
    /// Resonance, 0-30.
    pub resonance: u8,
    /// Cutoff key follow index, 0-16.
    pub keyfollow: u8,
    /// Bias point, 0-127 (bit 6 = above the point, bits 0-5 = key offset).
    pub bias_point: u8,
    /// Bias level, 0-14 (7 = none).
    pub bias_level: u8,
    /// Envelope depth, 0-100.
    pub env_depth: u8,
    /// Velocity sensitivity of the envelope depth, 0-100.
    pub env_velo_sens: u8,
    /// Envelope depth key follow, 0-4.
    pub env_depth_keyfollow: u8,
    /// Envelope time key follow, 0-4.
    pub env_time_keyfollow: u8,
    /// Segment times, 0-100. The last one is the release.
    pub env_time: [u8; 4],
    /// Levels, 0-100. `env_level[2]` is the sustain level.
    pub env_level: [u8; 3],
}

/// Time-variant amplifier parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TvaParam {
    /// Output level, 0-100.
    pub level: u8,
    /// Velocity sensitivity, 0-100 (50 = none).
    pub velo_sens: u8,
    /// First bias point, 0-127.
    pub bias_point1: u8,
    /// First bias level, 0-12.
    pub bias_level1: u8,
    /// Second bias point, 0-127.
    pub bias_point2: u8,
    /// Second bias level, 0-12.
    pub bias_level2: u8,
    /// Envelope time key follow, 0-4.
    pub env_time_keyfollow: u8,
    /// Envelope time velocity follow, 0-4.
    pub env_time_velo_sens: u8,
    /// Segment times, 0-100. `env_time[4]` is the release.
    pub env_time: [u8; 5],
    /// Levels, 0-100. `env_level[3]` is the sustain level.
    pub env_level: [u8; 4],
}

/// All parameters of one partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartialParam {
    /// Wave generator.
    pub wg: WaveParam,
    /// Pitch envelope.
    pub pitch_env: PitchEnvParam,
    /// Pitch LFO.
    pub pitch_lfo: PitchLfoParam,
    /// Filter.
    pub tvf: TvfParam,
    /// Amplifier.
    pub tva: TvaParam,
}

/// A parsed timbre.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timbre {
    /// Raw name bytes.
    pub name: [u8; NAME_LEN],
    /// Structure code of partials 1 & 2, 0-12.
    pub structure12: u8,
    /// Structure code of partials 3 & 4, 0-12.
    pub structure34: u8,
    /// Enabled partials, bit n = partial n+1.
    pub partial_mask: u8,
    /// Every partial decays without holding a sustain level.
    pub no_sustain: bool,
    /// Partial parameters.
    pub partials: [PartialParam; 4],
}

impl PartialParam {
    fn read(r: &mut Reader<'_>) -> Self {
        let wg = WaveParam {
            coarse: r.byte(96),
            fine: r.byte(100),
            keyfollow: r.byte(16),
            bender: r.flag(),
            waveform: r.byte(3),
            pcm_wave: r.byte(127),
            pulse_width: r.byte(100),
            pw_velo_sens: r.byte(14),
        };
        let pitch_env = PitchEnvParam {
            depth: r.byte(10),
            velo_sens: r.byte(3),
            time_keyfollow: r.byte(4),
            time: r.array(100),
            level: r.array(100),
        };
        let pitch_lfo = PitchLfoParam {
            rate: r.byte(100),
            depth: r.byte(100),
            mod_sens: r.byte(100),
        };
        let tvf = TvfParam {
            cutoff: r.byte(100),
            resonance: r.byte(30),
            keyfollow: r.byte(16),
            bias_point: r.byte(127),
            bias_level: r.byte(14),
            env_depth: r.byte(100),
            env_velo_sens: r.byte(100),
            env_depth_keyfollow: r.byte(4),
            env_time_keyfollow: r.byte(4),
            env_time: r.array(100),
            env_level: r.array(100),
        };
        let tva = TvaParam {
            level: r.byte(100),
            velo_sens: r.byte(100),
            bias_point1: r.byte(127),
            bias_level1: r.byte(12),
            bias_point2: r.byte(127),
            bias_level2: r.byte(12),
            env_time_keyfollow: r.byte(4),
            env_time_velo_sens: r.byte(4),
            env_time: r.array(100),
            env_level: r.array(100),
        };
        r.skip(TVA_RESERVED);
        Self {
            wg,
            pitch_env,
            pitch_lfo,
            tvf,
            tva,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        let wg = &self.wg;
        out.extend_from_slice(&[
            wg.coarse,
            wg.fine,
            wg.keyfollow,
            u8::from(wg.bender),
            wg.waveform,
            wg.pcm_wave,
            wg.pulse_width,
            wg.pw_velo_sens,
        ]);
        let env = &self.pitch_env;
        out.extend_from_slice(&[env.depth, env.velo_sens, env.time_keyfollow]);
        out.extend_from_slice(&env.time);
        out.extend_from_slice(&env.level);
        let lfo = &self.pitch_lfo;
        out.extend_from_slice(&[lfo.rate, lfo.depth, lfo.mod_sens]);
        let tvf = &self.tvf;
        out.extend_from_slice(&[
            tvf.cutoff,
            tvf.resonance,
            tvf.keyfollow,
            tvf.bias_point,
            tvf.bias_level,
            tvf.env_depth,
            tvf.env_velo_sens,
            tvf.env_depth_keyfollow,
            tvf.env_time_keyfollow,
        ]);
        out.extend_from_slice(&tvf.env_time);
        out.extend_from_slice(&tvf.env_level);
        let tva = &self.tva;
        out.extend_from_slice(&[
            tva.level,
            tva.velo_sens,
            tva.bias_point1,
            tva.bias_level1,
            tva.bias_point2,
            tva.bias_level2,
            tva.env_time_keyfollow,
            tva.env_time_velo_sens,
        ]);
        out.extend_from_slice(&tva.env_time);
        out.extend_from_slice(&tva.env_level);
        out.extend_from_slice(&[0; TVA_RESERVED]);
    }

    /// True when a synth partial plays a sawtooth.
    #[inline]
    pub fn is_saw(&self) -> bool {
        self.wg.waveform & 1 != 0
    }

    /// Index into the PCM wave map (upper bank adds 128).
    #[inline]
    pub fn pcm_index(&self) -> usize {
        usize::from(self.wg.pcm_wave) + if self.wg.waveform & 2 != 0 { 128 } else { 0 }
    }
}

impl Default for PartialParam {
    /// Plain square wave at unison pitch with an organ-like envelope.
    fn default() -> Self {
        Self {
            wg: WaveParam {
                coarse: 36,
                fine: 50,
                keyfollow: 11,
                bender: true,
                waveform: 0,
                pcm_wave: 0,
                pulse_width: 0,
                pw_velo_sens: 7,
            },
            pitch_env: PitchEnvParam {
                depth: 0,
                velo_sens: 0,
                time_keyfollow: 0,
                time: [0; 4],
                level: [50; 5],
            },
            pitch_lfo: PitchLfoParam {
                rate: 0,
                depth: 0,
                mod_sens: 0,
            },
            tvf: TvfParam {
                cutoff: 100,
                resonance: 0,
                keyfollow: 3,
                bias_point: 64,
                bias_level: 7,
                env_depth: 0,
                env_velo_sens: 0,
                env_depth_keyfollow: 0,
                env_time_keyfollow: 0,
                env_time: [0; 4],
                env_level: [100; 3],
            },
            tva: TvaParam {
                level: 100,
                velo_sens: 50,
                bias_point1: 64,
                bias_level1: 12,
                bias_point2: 64,
                bias_level2: 12,
                env_time_keyfollow: 0,
                env_time_velo_sens: 0,
                env_time: [10, 20, 20, 20, 40],
                env_level: [100, 100, 100, 100],
            },
        }
    }
}

impl Timbre {
    /// Parse a raw block, clamping every field.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut r = Reader::new(bytes);
        let name = r.array(0xFF);
        let structure12 = r.byte(12);
        let structure34 = r.byte(12);
        let partial_mask = r.byte(0x0F);
        let no_sustain = r.flag();
        let partials = core::array::from_fn(|_| PartialParam::read(&mut r));
        Self {
            name,
            structure12,
            structure34,
            partial_mask,
            no_sustain,
            partials,
        }
    }

    /// Serialize to a raw block.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TIMBRE_BLOCK_SIZE);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&[
            self.structure12,
            self.structure34,
            self.partial_mask,
            u8::from(self.no_sustain),
        ]);
        for p in &self.partials {
            p.write(&mut out);
        }
        out
    }

    /// Name with trailing padding removed; non-ASCII bytes are replaced.
    pub fn name(&self) -> String {
        self.name
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    /// Build a timbre with the given name and partials.
    pub fn named(name: &str) -> Self {
        let mut timbre = Self::default();
        timbre.name = [b' '; NAME_LEN];
        for (dst, src) in timbre.name.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        timbre
    }

    /// Whether partial `index` (0-3) is enabled.
    #[inline]
    pub fn partial_enabled(&self, index: usize) -> bool {
        self.partial_mask & (1 << index) != 0
    }

    /// Number of enabled partials.
    pub fn enabled_count(&self) -> usize {
        self.partial_mask.count_ones() as usize
    }
}

impl Default for Timbre {
    /// Fallback timbre: a single square partial.
    fn default() -> Self {
        Self {
            name: *b"Default   ",
            structure12: 0,
            structure34: 0,
            partial_mask: 0b0001,
            no_sustain: false,
            partials: [PartialParam::default(); 4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_sizes() {
        let mut out = Vec::new();
        PartialParam::default().write(&mut out);
        assert_eq!(out.len(), PARTIAL_PARAM_SIZE);
        assert_eq!(COMMON_PARAM_SIZE + 4 * PARTIAL_PARAM_SIZE, TIMBRE_BLOCK_SIZE);
        assert_eq!(Timbre::default().to_bytes().len(), TIMBRE_BLOCK_SIZE);
    }

    #[test]
    fn test_parse_preserves_legal_block() {
        let mut timbre = Timbre::named("Brass 1");
        timbre.structure12 = 5;
        timbre.structure34 = 11;
        timbre.partial_mask = 0b1011;
        timbre.partials[2].tva.env_time = [1, 2, 3, 4, 5];
        timbre.partials[3].wg.waveform = 3;
        let parsed = Timbre::from_bytes(&timbre.to_bytes());
        assert_eq!(parsed, timbre);
        assert_eq!(parsed.name(), "Brass 1");
    }

    #[test]
    fn test_block_stride_keeps_partials_apart() {
        let mut timbre = Timbre::named("Stride");
        for (i, p) in timbre.partials.iter_mut().enumerate() {
            p.wg.coarse = 30 + i as u8;
            p.tva.env_level = [90 - i as u8; 4];
        }
        let bytes = timbre.to_bytes();
        assert_eq!(bytes.len(), TIMBRE_BLOCK_SIZE);
        for i in 0..4 {
            let base = COMMON_PARAM_SIZE + i * PARTIAL_PARAM_SIZE;
            assert_eq!(bytes[base], 30 + i as u8);
        }
        let parsed = Timbre::from_bytes(&bytes);
        assert_eq!(parsed, timbre);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_factory_timbres_round_trip_at_block_size() {
        let rom = crate::ControlRom::factory();
        assert!(rom.timbre_count() > 0);
        for block in rom.timbres.chunks_exact(TIMBRE_BLOCK_SIZE) {
            assert_eq!(Timbre::from_bytes(block).to_bytes(), block);
        }
    }

    #[test]
    fn test_reserved_tva_bytes_are_ignored() {
        let mut bytes = Timbre::default().to_bytes();
        let tail = COMMON_PARAM_SIZE + PARTIAL_PARAM_SIZE - TVA_RESERVED;
        bytes[tail] = 0x55;
        bytes[tail + 1] = 0x66;
        let parsed = Timbre::from_bytes(&bytes);
        assert_eq!(parsed, Timbre::default());
        assert_eq!(parsed.to_bytes(), Timbre::default().to_bytes());
    }

    #[test]
    fn test_out_of_range_bytes_clamp() {
        let block = [0xFFu8; TIMBRE_BLOCK_SIZE];
        let t = Timbre::from_bytes(&block);
        assert_eq!(t.structure12, 12);
        assert_eq!(t.structure34, 12);
        assert_eq!(t.partial_mask, 0x0F);
        assert!(t.no_sustain);
        for p in &t.partials {
            assert_eq!(p.wg.coarse, 96);
            assert_eq!(p.wg.keyfollow, 16);
            assert_eq!(p.pitch_env.depth, 10);
            assert_eq!(p.tvf.resonance, 30);
            assert_eq!(p.tva.bias_level1, 12);
            assert_eq!(p.tva.env_level, [100; 4]);
        }
    }

    #[test]
    fn test_short_block_reads_zero() {
        let t = Timbre::from_bytes(&[b'A', b'B']);
        assert_eq!(t.partial_mask, 0);
        assert_eq!(t.enabled_count(), 0);
        assert_eq!(t.partials[0].tva.level, 0);
    }

    #[test]
    fn test_pcm_index_banks() {
        let mut p = PartialParam::default();
        assert!(!p.is_saw());
        p.wg.pcm_wave = 5;
        assert_eq!(p.pcm_index(), 5);
        p.wg.waveform = 1;
        assert!(p.is_saw());
        assert_eq!(p.pcm_index(), 5);
        p.wg.waveform = 2;
        assert_eq!(p.pcm_index(), 133);
    }

    #[test]
    fn test_name_sanitized() {
        let mut t = Timbre::default();
        t.name = *b"Pi\x01no     ";
        assert_eq!(t.name(), "Pi?no");
    }
}
