//! Control tables: fixed-point conversion tables and the validated ROM data.
//!
//! Two layers live here:
//!
//! - [`MathTables`] - the exponential, log-sine and envelope tables the LA32
//!   uses instead of floating-point math. They are pure functions of their
//!   index and are computed once per [`ControlTables`].
//! - [`ControlTables`] - the math tables plus everything loaded from the
//!   control and PCM ROMs, validated and parsed. Built once, then shared
//!   read-only between sessions through an [`Arc`].
//!
//! # Units
//!
//! | Quantity | Unit |
//! |----------|------|
//! | Log attenuation | 1/4096 octave (4096 = -6.02 dB) |
//! | Pitch | 1/4096 octave, 37133 = middle C square |
//! | Linear magnitude | 13-bit, 8191 = full scale |

use std::sync::Arc;

use libm::{ceil, exp2, log2, log10, sin};

use crate::error::{InitError, Result};
use crate::patch::{Patch, RhythmKey};
use crate::rom::{
    ControlRom, MIN_PCM_SAMPLES, PATCH_BLOCK_SIZE, PATCH_COUNT, PcmRom, PcmWaveDescriptor,
    RHYTHM_BLOCK_SIZE, RHYTHM_KEY_COUNT, TIMBRE_BLOCK_SIZE,
};
use crate::timbre::Timbre;

/// Attenuation at or above which [`MathTables::unlog`] returns zero.
pub const SILENT_ATTENUATION: u32 = 14 << 12;

/// Fixed-point conversion tables.
#[derive(Debug, Clone)]
pub struct MathTables {
    /// `8192 * 2^(-i/512)`, capped at 8191. Linear magnitude of one 1/512-octave step.
    pub exp9: [u16; 512],
    /// `-log2(sin((i + 0.5) * pi / 1024)) * 4096`. Log attenuation of a quarter sine.
    pub logsin9: [u16; 512],
    /// Envelope time base for a ramp of `i` target units.
    pub env_log_time: [u8; 256],
    /// Amplitude subtraction for a 0-100 level.
    pub level_to_amp_subtraction: [u8; 101],
    /// Amplitude subtraction for a 0-100 master volume.
    pub master_vol_to_amp_subtraction: [u8; 101],
    /// Pulse width parameter (0-100) rescaled to 0-255.
    pub pulse_width_100_to_255: [u8; 101],
    /// Per-sample resonance decay rate, indexed by `resonance >> 2`.
    pub res_amp_decay_factor: [u8; 8],
}

impl Default for MathTables {
    fn default() -> Self {
        Self::new()
    }
}

impl MathTables {
    /// Compute every table.
    pub fn new() -> Self {
        let mut exp9 = [0u16; 512];
        let mut logsin9 = [0u16; 512];
        for i in 0..512 {
            let lin = 8192.0 * exp2(-(i as f64) / 512.0);
            exp9[i] = (lin + 0.5).min(8191.0) as u16;
            let s = sin((i as f64 + 0.5) * core::f64::consts::PI / 1024.0);
            logsin9[i] = (-log2(s) * 4096.0 + 0.5) as u16;
        }

        let mut env_log_time = [0u8; 256];
        env_log_time[0] = 64;
        for i in 1..256 {
            env_log_time[i] = ceil(64.0 + log2(i as f64) * 8.0) as u8;
        }

        let mut level_to_amp_subtraction = [0u8; 101];
        let mut master_vol_to_amp_subtraction = [0u8; 101];
        let mut pulse_width_100_to_255 = [0u8; 101];
        master_vol_to_amp_subtraction[0] = 255;
        for i in 0..=100 {
            let v = (2.0 - log10(i as f64 + 1.0)) * 128.0;
            level_to_amp_subtraction[i] = ((v + 1.0) as i32).clamp(0, 255) as u8;
            if i > 0 {
                master_vol_to_amp_subtraction[i] =
                    (106.31 - 16.0 * log2(i as f64)).max(0.0) as u8;
            }
            pulse_width_100_to_255[i] = (i as f64 * 255.0 / 100.0 + 0.5) as u8;
        }

        Self {
            exp9,
            logsin9,
            env_log_time,
            level_to_amp_subtraction,
            master_vol_to_amp_subtraction,
            pulse_width_100_to_255,
            res_amp_decay_factor: [31, 16, 12, 8, 5, 3, 2, 1],
        }
    }

    /// Linear magnitude (0-8191) of a log attenuation.
    #[inline]
    pub fn unlog(&self, attenuation: u32) -> i32 {
        if attenuation >= SILENT_ATTENUATION {
            return 0;
        }
        i32::from(self.exp9[((attenuation & 4095) >> 3) as usize]) >> (attenuation >> 12)
    }

    /// `2^(frac / 4096)` in Q12 (4096..8191), for `frac` in 0..4096.
    #[inline]
    pub fn exp2_mantissa(&self, frac: u32) -> u32 {
        let frac = frac & 4095;
        if frac == 0 {
            4096
        } else {
            u32::from(self.exp9[((4096 - frac) >> 3) as usize])
        }
    }

    /// Log attenuation of `|sin(x)|` where `index` spans a quarter period in 512 steps.
    #[inline]
    pub fn logsin(&self, index: usize) -> u32 {
        u32::from(self.logsin9[index & 511])
    }
}

/// Immutable engine data: math tables plus the parsed ROMs.
///
/// # Example
///
/// ```rust
/// use lasynth_synth::{ControlRom, ControlTables, PcmRom};
///
/// let tables = ControlTables::load(&ControlRom::factory(), &PcmRom::factory()).unwrap();
/// assert!(tables.timbre_count() >= 128);
/// ```
#[derive(Debug, Clone)]
pub struct ControlTables {
    math: MathTables,
    pcm_samples: Vec<i16>,
    pcm_waves: Vec<PcmWaveDescriptor>,
    timbres: Vec<Timbre>,
    patches: Vec<Patch>,
    rhythm: Vec<RhythmKey>,
}

impl ControlTables {
    /// Validate and parse both ROMs.
    ///
    /// Structural problems (short tables, waves outside the sample ROM) are
    /// errors. Out-of-range parameter bytes inside otherwise well-formed
    /// blocks are clamped, not rejected.
    pub fn load(control: &ControlRom, pcm: &PcmRom) -> Result<Arc<Self>> {
        let result = Self::parse(control, pcm);
        #[cfg(feature = "tracing")]
        match &result {
            Ok(tables) => tracing::info!(
                "control tables loaded: {} timbres, {} PCM waves, {} PCM samples",
                tables.timbres.len(),
                tables.pcm_waves.len(),
                tables.pcm_samples.len()
            ),
            Err(e) => tracing::warn!("control tables rejected: {e}"),
        }
        result.map(Arc::new)
    }

    /// Load the built-in factory ROM set.
    pub fn factory() -> Result<Arc<Self>> {
        Self::load(&ControlRom::factory(), &PcmRom::factory())
    }

    fn parse(control: &ControlRom, pcm: &PcmRom) -> Result<Self> {
        if control.timbres.is_empty() {
            return Err(InitError::TimbreBankEmpty);
        }
        if control.timbres.len() % TIMBRE_BLOCK_SIZE != 0 {
            return Err(InitError::truncated_timbres(control.timbres.len()));
        }
        let patch_len = PATCH_COUNT * PATCH_BLOCK_SIZE;
        if control.patches.len() < patch_len {
            return Err(InitError::PatchTableTruncated {
                len: control.patches.len(),
                expected: patch_len,
            });
        }
        let rhythm_len = RHYTHM_KEY_COUNT * RHYTHM_BLOCK_SIZE;
        if control.rhythm.len() < rhythm_len {
            return Err(InitError::RhythmTableTruncated {
                len: control.rhythm.len(),
                expected: rhythm_len,
            });
        }
        if pcm.samples.len() < MIN_PCM_SAMPLES {
            return Err(InitError::PcmRomTooSmall {
                len: pcm.samples.len(),
                min: MIN_PCM_SAMPLES,
            });
        }
        for (index, wave) in control.pcm_waves.iter().enumerate() {
            if wave.len == 0 {
                return Err(InitError::PcmWaveEmpty { index });
            }
            let end = u64::from(wave.start) + u64::from(wave.len);
            if end > pcm.samples.len() as u64 {
                return Err(InitError::PcmWaveOutOfRange {
                    index,
                    end,
                    rom_len: pcm.samples.len(),
                });
            }
        }

        let timbres = control
            .timbres
            .chunks_exact(TIMBRE_BLOCK_SIZE)
            .map(Timbre::from_bytes)
            .collect();
        let patches = control.patches[..patch_len]
            .chunks_exact(PATCH_BLOCK_SIZE)
            .map(Patch::from_bytes)
            .collect();
        let rhythm = control.rhythm[..rhythm_len]
            .chunks_exact(RHYTHM_BLOCK_SIZE)
            .map(RhythmKey::from_bytes)
            .collect();

        Ok(Self {
            math: MathTables::new(),
            pcm_samples: pcm.samples.clone(),
            pcm_waves: control.pcm_waves.clone(),
            timbres,
            patches,
            rhythm,
        })
    }

    /// Conversion tables.
    #[inline]
    pub fn math(&self) -> &MathTables {
        &self.math
    }

    /// The whole PCM sample ROM.
    #[inline]
    pub fn pcm_samples(&self) -> &[i16] {
        &self.pcm_samples
    }

    /// Descriptor of PCM wave `index`, if the ROM has one.
    pub fn pcm_wave(&self, index: usize) -> Option<&PcmWaveDescriptor> {
        self.pcm_waves.get(index)
    }

    /// Number of PCM wave descriptors.
    pub fn pcm_wave_count(&self) -> usize {
        self.pcm_waves.len()
    }

    /// ROM timbre `index`, if present.
    pub fn rom_timbre(&self, index: usize) -> Option<&Timbre> {
        self.timbres.get(index)
    }

    /// Number of ROM timbres.
    pub fn timbre_count(&self) -> usize {
        self.timbres.len()
    }

    /// The power-on patch table (128 entries).
    pub fn default_patches(&self) -> &[Patch] {
        &self.patches
    }

    /// The power-on rhythm setup, one entry per rhythm key.
    pub fn default_rhythm(&self) -> &[RhythmKey] {
        &self.rhythm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exp9_endpoints() {
        let t = MathTables::new();
        assert_eq!(t.exp9[0], 8191);
        // Half an octave down is 1/sqrt(2).
        assert_eq!(t.exp9[256], 5793);
        assert!(t.exp9[511] >= 4096 && t.exp9[511] < 4110);
        assert!(t.exp9.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_logsin9_shape() {
        let t = MathTables::new();
        // Near the zero crossing the attenuation is large, at the peak near zero.
        assert!(t.logsin9[0] > 36000);
        assert!(t.logsin9[511] < 4);
        assert!(t.logsin9.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_env_log_time() {
        let t = MathTables::new();
        assert_eq!(t.env_log_time[0], 64);
        assert_eq!(t.env_log_time[1], 64);
        assert_eq!(t.env_log_time[2], 72);
        assert_eq!(t.env_log_time[255], 128);
    }

    #[test]
    fn test_level_tables() {
        let t = MathTables::new();
        assert_eq!(t.level_to_amp_subtraction[0], 255);
        assert_eq!(t.level_to_amp_subtraction[100], 0);
        assert_eq!(t.master_vol_to_amp_subtraction[0], 255);
        assert_eq!(t.master_vol_to_amp_subtraction[100], 0);
        assert_eq!(t.pulse_width_100_to_255[0], 0);
        assert_eq!(t.pulse_width_100_to_255[50], 128);
        assert_eq!(t.pulse_width_100_to_255[100], 255);
    }

    #[test]
    fn test_unlog() {
        let t = MathTables::new();
        assert_eq!(t.unlog(0), 8191);
        assert_eq!(t.unlog(4096), 4095);
        assert_eq!(t.unlog(SILENT_ATTENUATION), 0);
        assert_eq!(t.unlog(u32::MAX), 0);
    }

    #[test]
    fn test_exp2_mantissa() {
        let t = MathTables::new();
        assert_eq!(t.exp2_mantissa(0), 4096);
        // 2^0.5 * 4096
        assert_eq!(t.exp2_mantissa(2048), 5793);
        assert!(t.exp2_mantissa(4095) > 8180);
    }

    #[test]
    fn test_load_factory() {
        let tables = ControlTables::factory().unwrap();
        assert!(tables.timbre_count() >= 128);
        assert_eq!(tables.default_patches().len(), PATCH_COUNT);
        assert_eq!(tables.default_rhythm().len(), RHYTHM_KEY_COUNT);
        assert!(tables.pcm_wave_count() > 0);
        for i in 0..tables.pcm_wave_count() {
            let w = tables.pcm_wave(i).unwrap();
            assert!((w.start + w.len) as usize <= tables.pcm_samples().len());
        }
    }

    #[test]
    fn test_load_rejects_empty_timbres() {
        let mut rom = ControlRom::factory();
        rom.timbres.clear();
        let err = ControlTables::load(&rom, &PcmRom::factory()).unwrap_err();
        assert_eq!(err, InitError::TimbreBankEmpty);
    }

    #[test]
    fn test_load_rejects_truncated_timbres() {
        let mut rom = ControlRom::factory();
        rom.timbres.pop();
        let err = ControlTables::load(&rom, &PcmRom::factory()).unwrap_err();
        assert!(matches!(err, InitError::TimbreBankTruncated { .. }));
    }

    #[test]
    fn test_load_rejects_short_patch_table() {
        let mut rom = ControlRom::factory();
        rom.patches.truncate(100);
        let err = ControlTables::load(&rom, &PcmRom::factory()).unwrap_err();
        assert_eq!(
            err,
            InitError::PatchTableTruncated {
                len: 100,
                expected: 1024
            }
        );
    }

    #[test]
    fn test_load_rejects_short_rhythm_table() {
        let mut rom = ControlRom::factory();
        rom.rhythm.truncate(8);
        let err = ControlTables::load(&rom, &PcmRom::factory()).unwrap_err();
        assert!(matches!(err, InitError::RhythmTableTruncated { len: 8, .. }));
    }

    #[test]
    fn test_load_rejects_small_pcm() {
        let pcm = PcmRom {
            samples: vec![0; 16],
        };
        let err = ControlTables::load(&ControlRom::factory(), &pcm).unwrap_err();
        assert!(matches!(err, InitError::PcmRomTooSmall { len: 16, .. }));
    }

    #[test]
    fn test_load_rejects_wave_out_of_range() {
        let mut rom = ControlRom::factory();
        let pcm = PcmRom::factory();
        rom.pcm_waves[0].start = pcm.samples.len() as u32;
        let err = ControlTables::load(&rom, &pcm).unwrap_err();
        assert!(matches!(err, InitError::PcmWaveOutOfRange { index: 0, .. }));
    }

    #[test]
    fn test_load_rejects_empty_wave() {
        let mut rom = ControlRom::factory();
        rom.pcm_waves[1].len = 0;
        let err = ControlTables::load(&rom, &PcmRom::factory()).unwrap_err();
        assert_eq!(err, InitError::PcmWaveEmpty { index: 1 });
    }
}
