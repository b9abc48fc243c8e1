//! A sounding note: up to four partials sharing key and release state.

/// Maximum partials per note.
pub const MAX_POLY_PARTIALS: usize = 4;

/// Note state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PolyState {
    /// Slot unused.
    #[default]
    Inactive,
    /// Key held.
    Playing,
    /// Key released while the hold pedal is down.
    Held,
    /// Partials are releasing (or fading after a steal).
    Releasing,
}

/// One note instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poly {
    /// Incoming MIDI key, used to match note off.
    pub midi_key: u8,
    /// Key after shift and folding.
    pub key: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// Note state.
    pub state: PolyState,
    /// Pool indices of the member partials, by timbre partial slot.
    pub partials: [Option<usize>; MAX_POLY_PARTIALS],
    /// Start serial, larger is younger.
    pub age: u64,
}

impl Poly {
    /// Whether the slot holds a note.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != PolyState::Inactive
    }

    /// Whether the key is still down (or held by the pedal).
    #[inline]
    pub fn is_sounding_key(&self) -> bool {
        matches!(self.state, PolyState::Playing | PolyState::Held)
    }

    /// Member partial ids.
    pub fn partial_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.partials.iter().flatten().copied()
    }

    /// Drop a member partial; the poly goes inactive with its last member.
    pub fn partial_freed(&mut self, slot: usize) {
        if let Some(entry) = self.partials.get_mut(slot) {
            *entry = None;
        }
        if self.partials.iter().all(Option::is_none) {
            *self = Self::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poly_ends_with_last_partial() {
        let mut poly = Poly {
            midi_key: 60,
            key: 60,
            velocity: 100,
            state: PolyState::Playing,
            partials: [Some(3), None, Some(7), None],
            age: 1,
        };
        assert!(poly.is_active());
        assert_eq!(poly.partial_ids().collect::<Vec<_>>(), vec![3, 7]);
        poly.partial_freed(0);
        assert!(poly.is_active());
        poly.partial_freed(2);
        assert!(!poly.is_active());
        assert_eq!(poly.state, PolyState::Inactive);
    }

    #[test]
    fn test_sounding_key() {
        let mut poly = Poly::default();
        assert!(!poly.is_sounding_key());
        poly.state = PolyState::Held;
        assert!(poly.is_sounding_key());
        poly.state = PolyState::Releasing;
        assert!(!poly.is_sounding_key());
    }
}
