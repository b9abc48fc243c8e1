//! Patches and rhythm key settings.
//!
//! A patch maps a program number to a timbre plus tuning, bend range,
//! assign mode and reverb routing. The rhythm part has no patch; each key
//! has its own [`RhythmKey`] instead.

/// Timbre group a patch points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimbreGroup {
    /// ROM timbres 0-63.
    A,
    /// ROM timbres 64-127.
    B,
    /// Session memory timbres.
    Memory,
    /// ROM rhythm timbres from 128.
    Rhythm,
}

impl TimbreGroup {
    /// Decode a raw group byte (clamped to 0-3).
    pub fn from_raw(value: u8) -> Self {
        match value.min(3) {
            0 => Self::A,
            1 => Self::B,
            2 => Self::Memory,
            _ => Self::Rhythm,
        }
    }

    /// Raw group byte.
    pub fn raw(self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::Memory => 2,
            Self::Rhythm => 3,
        }
    }
}

/// One entry of the patch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Patch {
    /// Timbre group.
    pub timbre_group: TimbreGroup,
    /// Timbre number within the group, 0-63.
    pub timbre_num: u8,
    /// Key shift, 0-48 (24 = none).
    pub key_shift: u8,
    /// Fine tune, 0-100 (50 = none).
    pub fine_tune: u8,
    /// Pitch bend range in semitones, 0-24.
    pub bender_range: u8,
    /// Assign mode, 0-3. Modes 0 and 1 are single assign.
    pub assign_mode: u8,
    /// Route the part to the reverb bus.
    pub reverb: bool,
    /// Output level trim, 0-100.
    pub level: u8,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            timbre_group: TimbreGroup::A,
            timbre_num: 0,
            key_shift: 24,
            fine_tune: 50,
            bender_range: 12,
            assign_mode: 0,
            reverb: true,
            level: 100,
        }
    }
}

impl Patch {
    /// Parse an 8-byte raw patch. Missing bytes read as zero; the level trim
    /// is not part of the raw format and starts at 100.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let at = |i: usize, max: u8| bytes.get(i).copied().unwrap_or(0).min(max);
        Self {
            timbre_group: TimbreGroup::from_raw(at(0, 3)),
            timbre_num: at(1, 63),
            key_shift: at(2, 48),
            fine_tune: at(3, 100),
            bender_range: at(4, 24),
            assign_mode: at(5, 3),
            reverb: at(6, 1) != 0,
            level: 100,
        }
    }

    /// Raw 8-byte form.
    pub fn to_bytes(&self) -> [u8; 8] {
        [
            self.timbre_group.raw(),
            self.timbre_num,
            self.key_shift,
            self.fine_tune,
            self.bender_range,
            self.assign_mode,
            u8::from(self.reverb),
            0,
        ]
    }

    /// Patch for program `program` in the power-on table layout.
    pub fn for_program(program: u8) -> Self {
        let program = program & 0x7F;
        Self {
            timbre_group: if program < 64 {
                TimbreGroup::A
            } else {
                TimbreGroup::B
            },
            timbre_num: program & 63,
            ..Self::default()
        }
    }

    /// Single-assign modes replace a sounding note on the same key.
    #[inline]
    pub fn is_single_assign(&self) -> bool {
        self.assign_mode & 2 == 0
    }

    /// Key shift in semitones, -24..=24.
    #[inline]
    pub fn key_shift_semitones(&self) -> i32 {
        i32::from(self.key_shift) - 24
    }
}

/// First raw rhythm timbre value that means "key off".
pub const RHYTHM_TIMBRE_OFF: u8 = 94;

/// Settings of one rhythm key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RhythmKey {
    /// 0-63 memory timbre, 64-93 ROM rhythm timbre `128 + (n - 64)`, 94+ off.
    pub timbre: u8,
    /// Output level, 0-100.
    pub level: u8,
    /// Pan, 0-14 (0 = left, 7 = centre).
    pub pan: u8,
    /// Route to the reverb bus.
    pub reverb: bool,
}

impl Default for RhythmKey {
    fn default() -> Self {
        Self {
            timbre: RHYTHM_TIMBRE_OFF,
            level: 100,
            pan: 7,
            reverb: true,
        }
    }
}

impl RhythmKey {
    /// Parse a 4-byte raw setting.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let at = |i: usize, max: u8| bytes.get(i).copied().unwrap_or(0).min(max);
        Self {
            timbre: at(0, RHYTHM_TIMBRE_OFF),
            level: at(1, 100),
            pan: at(2, 14),
            reverb: at(3, 1) != 0,
        }
    }

    /// Raw 4-byte form.
    pub fn to_bytes(&self) -> [u8; 4] {
        [self.timbre, self.level, self.pan, u8::from(self.reverb)]
    }

    /// Whether the key plays anything.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.timbre < RHYTHM_TIMBRE_OFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_clamps() {
        let p = Patch::from_bytes(&[9, 200, 99, 255, 30, 7, 5, 0]);
        assert_eq!(p.timbre_group, TimbreGroup::Rhythm);
        assert_eq!(p.timbre_num, 63);
        assert_eq!(p.key_shift, 48);
        assert_eq!(p.fine_tune, 100);
        assert_eq!(p.bender_range, 24);
        assert_eq!(p.assign_mode, 3);
        assert!(p.reverb);
        assert_eq!(p.level, 100);
    }

    #[test]
    fn test_patch_bytes_preserved() {
        let p = Patch {
            timbre_group: TimbreGroup::Memory,
            timbre_num: 17,
            key_shift: 12,
            fine_tune: 40,
            bender_range: 2,
            assign_mode: 2,
            reverb: false,
            level: 100,
        };
        assert_eq!(Patch::from_bytes(&p.to_bytes()), p);
    }

    #[test]
    fn test_for_program() {
        assert_eq!(Patch::for_program(5).timbre_group, TimbreGroup::A);
        let p = Patch::for_program(70);
        assert_eq!(p.timbre_group, TimbreGroup::B);
        assert_eq!(p.timbre_num, 6);
        assert_eq!(p.key_shift_semitones(), 0);
    }

    #[test]
    fn test_single_assign() {
        let mut p = Patch::default();
        for (mode, single) in [(0, true), (1, true), (2, false), (3, false)] {
            p.assign_mode = mode;
            assert_eq!(p.is_single_assign(), single);
        }
    }

    #[test]
    fn test_rhythm_key() {
        let k = RhythmKey::from_bytes(&[200, 150, 20, 1]);
        assert_eq!(k.timbre, RHYTHM_TIMBRE_OFF);
        assert!(!k.is_enabled());
        assert_eq!(k.level, 100);
        assert_eq!(k.pan, 14);
        let k = RhythmKey::from_bytes(&[70, 80, 3, 0]);
        assert!(k.is_enabled());
        assert!(!k.reverb);
        assert_eq!(RhythmKey::from_bytes(&k.to_bytes()), k);
    }
}
