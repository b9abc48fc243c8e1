//! Synthetic factory ROM set.
//!
//! Generates a small but complete resource set: looped and one-shot PCM
//! waves, 128 melodic timbres that cover every structure family, 30 rhythm
//! timbres, and full patch and rhythm tables. Everything is a pure function
//! of the code, so two builds always produce identical ROMs.

use core::f64::consts::TAU;

use libm::{exp, log2, sin};

use super::{
    ControlRom, PCM_NATIVE_PITCH, PATCH_COUNT, PcmRom, PcmWaveDescriptor, RHYTHM_FIRST_KEY,
    RHYTHM_KEY_COUNT,
};
use crate::patch::{Patch, RHYTHM_TIMBRE_OFF, RhythmKey};
use crate::timbre::{PartialParam, Timbre};

/// Number of melodic ROM timbres.
const MELODIC_TIMBRES: usize = 128;
/// Number of ROM rhythm timbres.
const RHYTHM_TIMBRES: u8 = 30;
/// Middle C, the note a looped wave is tuned to at key 60.
const MIDDLE_C_HZ: f64 = 261.625_565;
const NATIVE_RATE: f64 = 32000.0;

/// Factory PCM wave numbers.
mod wave {
    pub const SINE: u8 = 0;
    pub const SAW: u8 = 1;
    pub const ORGAN: u8 = 2;
    pub const NOISE: u8 = 3;
    pub const KICK: u8 = 4;
    pub const SNARE: u8 = 5;
    pub const HIHAT: u8 = 6;
    pub const TOM: u8 = 7;
    pub const PLUCK: u8 = 8;
    pub const CLAP: u8 = 9;
}

struct GeneratedWave {
    samples: Vec<i16>,
    looped: bool,
    pitch: u16,
}

/// Deterministic 32-bit LCG noise in -1..1.
struct Noise(u32);

impl Noise {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        f64::from((self.0 >> 16) as u16 as i16) / 32768.0
    }
}

fn to_i16(x: f64) -> i16 {
    (x * 24000.0).clamp(-32767.0, 32767.0) as i16
}

/// Pitch that plays a loop of `period` samples at middle C on key 60.
fn loop_pitch(period: usize) -> u16 {
    let ratio = MIDDLE_C_HZ * period as f64 / NATIVE_RATE;
    (f64::from(PCM_NATIVE_PITCH) + 4096.0 * log2(ratio)).round() as u16
}

fn single_cycle(period: usize, f: impl Fn(f64) -> f64) -> GeneratedWave {
    let samples = (0..period)
        .map(|i| to_i16(f(i as f64 / period as f64)))
        .collect();
    GeneratedWave {
        samples,
        looped: true,
        pitch: loop_pitch(period),
    }
}

fn one_shot(len: usize, mut f: impl FnMut(f64) -> f64) -> GeneratedWave {
    let samples = (0..len).map(|i| to_i16(f(i as f64 / NATIVE_RATE))).collect();
    GeneratedWave {
        samples,
        looped: false,
        pitch: PCM_NATIVE_PITCH,
    }
}

fn generate_waves() -> Vec<GeneratedWave> {
    let mut noise = Noise(0x1234_5678);
    let mut waves = vec![
        single_cycle(256, |x| sin(TAU * x)),
        single_cycle(256, |x| 1.0 - 2.0 * x),
        single_cycle(256, |x| {
            0.6 * sin(TAU * x) + 0.3 * sin(2.0 * TAU * x) + 0.15 * sin(4.0 * TAU * x)
        }),
    ];
    let noise_loop: Vec<i16> = (0..4096).map(|_| to_i16(noise.next() * 0.8)).collect();
    waves.push(GeneratedWave {
        samples: noise_loop,
        looped: true,
        pitch: PCM_NATIVE_PITCH,
    });
    waves.push(one_shot(4000, |t| {
        let freq = 50.0 + 120.0 * exp(-t * 40.0);
        sin(TAU * freq * t) * exp(-t * 12.0)
    }));
    waves.push(one_shot(4000, |t| {
        0.5 * sin(TAU * 190.0 * t) * exp(-t * 30.0) + 0.6 * noise.next() * exp(-t * 18.0)
    }));
    let mut last = 0.0;
    waves.push(one_shot(2000, |t| {
        let n = noise.next();
        let hp = n - last;
        last = n;
        0.7 * hp * exp(-t * 60.0)
    }));
    waves.push(one_shot(5000, |t| {
        let freq = 110.0 + 40.0 * exp(-t * 20.0);
        sin(TAU * freq * t) * exp(-t * 8.0)
    }));
    waves.push(one_shot(3000, |t| {
        let f = MIDDLE_C_HZ;
        (sin(TAU * f * t) + 0.5 * sin(2.0 * TAU * f * t) * exp(-t * 20.0)) * 0.6 * exp(-t * 6.0)
    }));
    waves.push(one_shot(3000, |t| {
        let burst = if (t * 1000.0) as u32 % 10 < 2 { 1.0 } else { 0.4 };
        0.8 * noise.next() * burst * exp(-t * 25.0)
    }));
    waves
}

pub(super) fn pcm_rom() -> PcmRom {
    let samples = generate_waves()
        .into_iter()
        .flat_map(|w| w.samples)
        .collect();
    PcmRom { samples }
}

fn wave_map() -> Vec<PcmWaveDescriptor> {
    let mut start = 0u32;
    generate_waves()
        .into_iter()
        .map(|w| {
            let len = w.samples.len() as u32;
            let desc = PcmWaveDescriptor {
                start,
                len,
                looped: w.looped,
                pitch: w.pitch,
            };
            start += len;
            desc
        })
        .collect()
}

/// Synth partial tuned for melodic use.
fn synth_partial(saw: bool, seed: usize) -> PartialParam {
    let mut p = PartialParam::default();
    p.wg.waveform = u8::from(saw);
    p.wg.pulse_width = ((seed * 13) % 80) as u8;
    p.wg.pw_velo_sens = 7 + (seed % 4) as u8;
    p.tvf.cutoff = 40 + ((seed * 7) % 60) as u8;
    p.tvf.resonance = ((seed * 3) % 20) as u8;
    p.tvf.env_depth = ((seed * 11) % 70) as u8;
    p.tvf.env_time = [5, 30, 40, 30];
    p.tvf.env_level = [100, 70, 50];
    p.tva.env_time = [
        2 + (seed % 20) as u8,
        30,
        40,
        50,
        30 + (seed % 30) as u8,
    ];
    p.tva.env_level = [100, 90, 80, 70];
    p
}

fn pcm_partial(wave_num: u8) -> PartialParam {
    let mut p = PartialParam::default();
    p.wg.pcm_wave = wave_num;
    p.tva.env_time = [1, 20, 30, 40, 35];
    p.tva.env_level = [100, 95, 90, 85];
    p
}

fn melodic_timbre(index: usize) -> Timbre {
    const FAMILIES: [&str; 8] = [
        "Square", "Detune", "Layer", "Ring", "PCM Pad", "Wide", "Quad", "Metal",
    ];
    let family = index % 8;
    let mut t = Timbre::named(&format!("{} {}", FAMILIES[family], index / 8 + 1));
    let saw = index % 16 >= 8;
    match family {
        0 => {
            t.partial_mask = 0b0001;
            t.partials[0] = synth_partial(saw, index);
            if index == 0 {
                // Program 0: plain square with a simple organ envelope.
                t.partials[0] = PartialParam::default();
                t.partials[0].tva.env_level = [100, 90, 80, 80];
            }
        }
        1 => {
            t.partial_mask = 0b0011;
            t.partials[0] = synth_partial(saw, index);
            t.partials[1] = synth_partial(!saw, index + 1);
            t.partials[1].wg.fine = 56;
        }
        2 => {
            t.structure12 = 2;
            t.partial_mask = 0b0011;
            t.partials[0] = synth_partial(saw, index);
            t.partials[1] = pcm_partial([wave::SINE, wave::ORGAN, wave::SAW][index % 3]);
        }
        3 => {
            t.structure12 = 9;
            t.partial_mask = 0b0011;
            t.partials[0] = synth_partial(false, index);
            t.partials[1] = synth_partial(false, index + 3);
            t.partials[1].wg.coarse = 43;
        }
        4 => {
            t.structure12 = 5;
            t.partial_mask = 0b0011;
            t.partials[0] = pcm_partial(wave::ORGAN);
            t.partials[1] = pcm_partial(wave::SINE);
            t.partials[1].wg.coarse = 48;
            t.partials[1].pitch_lfo.rate = 40;
            t.partials[1].pitch_lfo.mod_sens = 50;
        }
        5 => {
            t.structure12 = 7;
            t.partial_mask = 0b0011;
            t.partials[0] = synth_partial(saw, index);
            t.partials[1] = synth_partial(saw, index + 5);
            t.partials[1].wg.fine = 44;
        }
        6 => {
            t.structure12 = 1;
            t.structure34 = 0;
            t.partial_mask = 0b1111;
            for (n, p) in t.partials.iter_mut().enumerate() {
                *p = synth_partial(n % 2 == 1, index + n);
            }
            t.partials[1].wg.coarse = 48;
            t.partials[3].pitch_env.depth = 4;
            t.partials[3].pitch_env.time = [10, 30, 30, 30];
            t.partials[3].pitch_env.level = [70, 40, 55, 50, 50];
        }
        _ => {
            t.structure12 = 4;
            t.partial_mask = 0b0011;
            t.partials[0] = pcm_partial(wave::PLUCK);
            t.partials[1] = synth_partial(true, index);
            t.partials[1].wg.coarse = 55;
        }
    }
    if index % 5 == 4 {
        t.no_sustain = true;
    }
    t
}

fn rhythm_timbre(index: u8) -> Timbre {
    const DRUMS: [(u8, &str, u8); 6] = [
        (wave::KICK, "Kick", 3),
        (wave::SNARE, "Snare", 3),
        (wave::HIHAT, "Hi-Hat", 3),
        (wave::TOM, "Tom", 8),
        (wave::CLAP, "Clap", 3),
        (wave::NOISE, "Crash", 3),
    ];
    let (wave_num, name, keyfollow) = DRUMS[usize::from(index) % DRUMS.len()];
    let mut t = Timbre::named(&format!("{name} {}", index / 6 + 1));
    t.structure12 = 5;
    t.partial_mask = 0b0001;
    t.no_sustain = true;
    let p = &mut t.partials[0];
    *p = pcm_partial(wave_num);
    p.wg.keyfollow = keyfollow;
    p.wg.bender = false;
    p.tva.env_time = [0, 20, 30, 60, 20];
    p.tva.env_level = [100, 80, 50, 0];
    t
}

pub(super) fn control_rom() -> ControlRom {
    let mut timbres = Vec::new();
    for i in 0..MELODIC_TIMBRES {
        timbres.extend_from_slice(&melodic_timbre(i).to_bytes());
    }
    for i in 0..RHYTHM_TIMBRES {
        timbres.extend_from_slice(&rhythm_timbre(i).to_bytes());
    }

    let patches = (0..PATCH_COUNT as u8)
        .flat_map(|p| Patch::for_program(p).to_bytes())
        .collect();

    let rhythm = (0..RHYTHM_KEY_COUNT as u8)
        .flat_map(|i| {
            let key = RHYTHM_FIRST_KEY + i;
            let setting = if (35..=81).contains(&key) {
                RhythmKey {
                    timbre: 64 + (key - 35) % RHYTHM_TIMBRES,
                    level: 100,
                    pan: ((u16::from(key) * 5) % 15) as u8,
                    reverb: key % 3 != 0,
                }
            } else {
                RhythmKey {
                    timbre: RHYTHM_TIMBRE_OFF,
                    ..RhythmKey::default()
                }
            };
            setting.to_bytes()
        })
        .collect();

    ControlRom {
        timbres,
        patches,
        rhythm,
        pcm_waves: wave_map(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::{PATCH_BLOCK_SIZE, RHYTHM_BLOCK_SIZE, TIMBRE_BLOCK_SIZE};

    #[test]
    fn test_factory_sizes() {
        let rom = control_rom();
        assert_eq!(rom.timbres.len() % TIMBRE_BLOCK_SIZE, 0);
        assert_eq!(rom.timbre_count(), 158);
        assert_eq!(rom.patches.len(), PATCH_COUNT * PATCH_BLOCK_SIZE);
        assert_eq!(rom.rhythm.len(), RHYTHM_KEY_COUNT * RHYTHM_BLOCK_SIZE);
    }

    #[test]
    fn test_wave_map_is_contiguous() {
        let map = wave_map();
        let pcm = pcm_rom();
        let mut expected = 0;
        for w in &map {
            assert_eq!(w.start, expected);
            expected += w.len;
        }
        assert_eq!(expected as usize, pcm.samples.len());
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(pcm_rom(), pcm_rom());
        assert_eq!(control_rom(), control_rom());
    }

    #[test]
    fn test_loop_pitch() {
        assert!(loop_pitch(256) > PCM_NATIVE_PITCH);
        let p = loop_pitch(256);
        assert!((41200..41260).contains(&p), "{p}");
    }

    #[test]
    fn test_drum_waves_are_one_shots() {
        let map = wave_map();
        assert!(map[usize::from(wave::SINE)].looped);
        assert!(!map[usize::from(wave::KICK)].looped);
        assert!(!map[usize::from(wave::HIHAT)].looped);
    }

    #[test]
    fn test_program_zero_is_single_square() {
        let t = melodic_timbre(0);
        assert_eq!(t.partial_mask, 0b0001);
        assert_eq!(t.structure12, 0);
        assert!(!t.partials[0].is_saw());
        assert!(!t.no_sustain);
    }
}
