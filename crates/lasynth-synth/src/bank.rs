//! Session sound bank: writable patch table, rhythm setup and memory timbres.
//!
//! The ROM tables in [`ControlTables`] are read-only; each session copies the
//! power-on patch and rhythm tables into a [`SoundBank`] so hosts can edit
//! them. Timbre references are resolved through [`TimbreSlot`]; anything that
//! does not exist resolves to the built-in default timbre.

use crate::patch::{Patch, RHYTHM_TIMBRE_OFF, RhythmKey, TimbreGroup};
use crate::rom::{PATCH_COUNT, RHYTHM_FIRST_KEY, RHYTHM_KEY_COUNT};
use crate::tables::ControlTables;
use crate::timbre::Timbre;

/// Number of writable memory timbres.
pub const MEMORY_TIMBRE_COUNT: usize = 64;
/// ROM index of the first rhythm timbre.
pub const ROM_RHYTHM_BASE: usize = 128;

/// Where a timbre comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimbreSlot {
    /// ROM timbre bank.
    Rom(usize),
    /// Session memory.
    Memory(usize),
    /// The fallback timbre.
    Default,
}

/// Writable per-session sound data.
#[derive(Debug, Clone)]
pub struct SoundBank {
    patches: Vec<Patch>,
    rhythm: Vec<RhythmKey>,
    memory: Vec<Timbre>,
    fallback: Timbre,
}

impl SoundBank {
    /// Copy the power-on tables.
    pub fn new(tables: &ControlTables) -> Self {
        let mut patches = tables.default_patches().to_vec();
        patches.resize(PATCH_COUNT, Patch::default());
        let mut rhythm = tables.default_rhythm().to_vec();
        rhythm.resize(RHYTHM_KEY_COUNT, RhythmKey::default());
        Self {
            patches,
            rhythm,
            memory: vec![Timbre::default(); MEMORY_TIMBRE_COUNT],
            fallback: Timbre::default(),
        }
    }

    /// Patch for a program number (masked to 0-127).
    pub fn patch(&self, program: u8) -> &Patch {
        &self.patches[usize::from(program & 0x7F)]
    }

    /// Replace a patch.
    pub fn set_patch(&mut self, program: u8, patch: Patch) {
        self.patches[usize::from(program & 0x7F)] = patch;
    }

    /// Rhythm setting of a MIDI key, `None` outside the rhythm key range.
    pub fn rhythm_key(&self, key: u8) -> Option<&RhythmKey> {
        let index = usize::from(key.checked_sub(RHYTHM_FIRST_KEY)?);
        self.rhythm.get(index)
    }

    /// Replace a rhythm setting. Returns false for keys outside the range.
    pub fn set_rhythm_key(&mut self, key: u8, setting: RhythmKey) -> bool {
        let Some(index) = key.checked_sub(RHYTHM_FIRST_KEY) else {
            return false;
        };
        match self.rhythm.get_mut(usize::from(index)) {
            Some(slot) => {
                *slot = setting;
                true
            }
            None => false,
        }
    }

    /// Overwrite a memory timbre from a raw block. Returns false when the
    /// index is out of range.
    pub fn set_memory_timbre(&mut self, index: usize, raw: &[u8]) -> bool {
        match self.memory.get_mut(index) {
            Some(slot) => {
                *slot = Timbre::from_bytes(raw);
                true
            }
            None => false,
        }
    }

    /// Memory timbre `index`, if in range.
    pub fn memory_timbre(&self, index: usize) -> Option<&Timbre> {
        self.memory.get(index)
    }

    /// Where a patch's timbre lives.
    pub fn patch_slot(&self, patch: &Patch, tables: &ControlTables) -> TimbreSlot {
        let num = usize::from(patch.timbre_num);
        let rom = match patch.timbre_group {
            TimbreGroup::A => num,
            TimbreGroup::B => 64 + num,
            TimbreGroup::Memory => return TimbreSlot::Memory(num),
            TimbreGroup::Rhythm => ROM_RHYTHM_BASE + num,
        };
        Self::rom_slot(rom, tables)
    }

    /// Where a rhythm key's timbre lives. Disabled keys and keys outside the
    /// rhythm range have no slot.
    pub fn rhythm_slot(&self, key: u8, tables: &ControlTables) -> Option<TimbreSlot> {
        let setting = self.rhythm_key(key)?;
        match setting.timbre {
            t if t < 64 => Some(TimbreSlot::Memory(usize::from(t))),
            t if t < RHYTHM_TIMBRE_OFF => Some(Self::rom_slot(
                ROM_RHYTHM_BASE + usize::from(t - 64),
                tables,
            )),
            _ => None,
        }
    }

    fn rom_slot(index: usize, tables: &ControlTables) -> TimbreSlot {
        if index < tables.timbre_count() {
            TimbreSlot::Rom(index)
        } else {
            TimbreSlot::Default
        }
    }

    /// The timbre in a slot. Dangling slots give the fallback timbre.
    pub fn timbre<'a>(&'a self, slot: TimbreSlot, tables: &'a ControlTables) -> &'a Timbre {
        match slot {
            TimbreSlot::Rom(i) => tables.rom_timbre(i).unwrap_or(&self.fallback),
            TimbreSlot::Memory(i) => self.memory.get(i).unwrap_or(&self.fallback),
            TimbreSlot::Default => &self.fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> (SoundBank, std::sync::Arc<ControlTables>) {
        let tables = ControlTables::factory().unwrap();
        (SoundBank::new(&tables), tables)
    }

    #[test]
    fn test_patch_groups_resolve() {
        let (bank, tables) = bank();
        let mut p = Patch::default();
        p.timbre_num = 3;
        assert_eq!(bank.patch_slot(&p, &tables), TimbreSlot::Rom(3));
        p.timbre_group = TimbreGroup::B;
        assert_eq!(bank.patch_slot(&p, &tables), TimbreSlot::Rom(67));
        p.timbre_group = TimbreGroup::Memory;
        assert_eq!(bank.patch_slot(&p, &tables), TimbreSlot::Memory(3));
        p.timbre_group = TimbreGroup::Rhythm;
        assert_eq!(bank.patch_slot(&p, &tables), TimbreSlot::Rom(131));
    }

    #[test]
    fn test_dangling_rom_reference_falls_back() {
        let (bank, tables) = bank();
        let mut p = Patch::default();
        p.timbre_group = TimbreGroup::Rhythm;
        p.timbre_num = 63;
        let slot = bank.patch_slot(&p, &tables);
        assert_eq!(slot, TimbreSlot::Default);
        assert_eq!(bank.timbre(slot, &tables), &Timbre::default());
    }

    #[test]
    fn test_rhythm_range() {
        let (bank, tables) = bank();
        assert!(bank.rhythm_key(23).is_none());
        assert!(bank.rhythm_key(24).is_some());
        assert!(bank.rhythm_key(108).is_some());
        assert!(bank.rhythm_key(109).is_none());
        assert!(bank.rhythm_slot(10, &tables).is_none());
    }

    #[test]
    fn test_rhythm_key_edit() {
        let (mut bank, tables) = bank();
        let setting = RhythmKey {
            timbre: 5,
            level: 90,
            pan: 3,
            reverb: false,
        };
        assert!(bank.set_rhythm_key(40, setting));
        assert!(!bank.set_rhythm_key(120, setting));
        assert_eq!(bank.rhythm_slot(40, &tables), Some(TimbreSlot::Memory(5)));
        let off = RhythmKey {
            timbre: RHYTHM_TIMBRE_OFF,
            ..setting
        };
        bank.set_rhythm_key(40, off);
        assert_eq!(bank.rhythm_slot(40, &tables), None);
    }

    #[test]
    fn test_memory_timbre_write() {
        let (mut bank, tables) = bank();
        let mut t = Timbre::named("Custom");
        t.partial_mask = 0b0011;
        assert!(bank.set_memory_timbre(7, &t.to_bytes()));
        assert!(!bank.set_memory_timbre(MEMORY_TIMBRE_COUNT, &t.to_bytes()));
        assert_eq!(bank.timbre(TimbreSlot::Memory(7), &tables).name(), "Custom");
    }
}
