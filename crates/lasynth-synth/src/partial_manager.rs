//! Fixed partial pool with priority-based reclamation.
//!
//! Partials live in a flat arena and are addressed by index. Ownership is
//! plain data on each partial ([`PartialOwner`]), so nothing points at
//! anything and freeing is a state change.
//!
//! Reclamation order when the pool is full:
//!
//! 1. partials already releasing, oldest first
//! 2. any other sounding partial, oldest first
//!
//! A victim takes its whole note with it: every partial of the same poly
//! fades, so a note never keeps sounding with members missing. Victims are
//! not cut: they enter a short fade and free their slot when it completes.
//! Ring-modulated pairs are freed together.

use crate::partial::{PairLink, Partial, PartialOwner, PartialState};
use crate::structure::PairMix;
use crate::tables::MathTables;

/// The partial pool.
#[derive(Debug, Clone)]
pub struct PartialManager {
    partials: Vec<Partial>,
    serial: u64,
}

impl PartialManager {
    /// A pool of `capacity` idle partials.
    pub fn new(capacity: usize) -> Self {
        Self {
            partials: vec![Partial::new(); capacity],
            serial: 0,
        }
    }

    /// Pool size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.partials.len()
    }

    /// Number of idle partials.
    pub fn free_count(&self) -> usize {
        self.partials.iter().filter(|p| !p.is_active()).count()
    }

    /// Number of partials holding a slot.
    pub fn active_count(&self) -> usize {
        self.capacity() - self.free_count()
    }

    /// Whether any reclaimed partial is still fading.
    pub fn is_reclaiming(&self) -> bool {
        self.partials
            .iter()
            .any(|p| p.state() == PartialState::StolenFade)
    }

    /// Claim the lowest-numbered idle partial.
    pub fn allocate(&mut self, owner: PartialOwner) -> Option<usize> {
        let id = self.partials.iter().position(|p| !p.is_active())?;
        self.serial += 1;
        self.partials[id].claim(owner, self.serial);
        Some(id)
    }

    /// Link two partials as a pair.
    pub fn link_pair(&mut self, master: usize, slave: usize, mix: PairMix) {
        if master == slave || master >= self.capacity() || slave >= self.capacity() {
            return;
        }
        self.partials[master].set_pair(Some(PairLink {
            partner: slave,
            master: true,
            mix,
        }));
        self.partials[slave].set_pair(Some(PairLink {
            partner: master,
            master: false,
            mix,
        }));
    }

    /// Start the fade of a partial and its ring partner.
    pub fn abort(&mut self, id: usize, math: &MathTables) {
        let Some(partial) = self.partials.get_mut(id) else {
            return;
        };
        partial.start_abort(math);
        if let Some(link) = partial.pair().filter(PairLink::is_ring) {
            self.partials[link.partner].start_abort(math);
        }
    }

    /// Free a partial, and its ring partner with it. Returns the owners of
    /// the partials freed.
    pub fn release(&mut self, id: usize) -> [Option<PartialOwner>; 2] {
        let Some(partial) = self.partials.get_mut(id) else {
            return [None, None];
        };
        if !partial.is_active() {
            return [None, None];
        }
        let owner = partial.owner();
        let link = partial.pair();
        partial.free();
        let mut freed = [owner, None];
        if let Some(link) = link {
            let partner = &mut self.partials[link.partner];
            if link.is_ring() && partner.is_active() {
                freed[1] = partner.owner();
                partner.free();
            } else {
                partner.set_pair(None);
            }
        }
        freed
    }

    /// Make room for `needed` partials by fading out victim notes. Partials
    /// already fading count towards the goal. Returns how many partials
    /// were put into the fade.
    pub fn reclaim(&mut self, needed: usize, math: &MathTables) -> usize {
        let mut victims = 0;
        loop {
            let incoming = self
                .partials
                .iter()
                .filter(|p| !p.is_active() || p.state() == PartialState::StolenFade)
                .count();
            if incoming >= needed {
                break;
            }
            let Some(victim) = self.pick_victim() else {
                break;
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "reclaiming partial {victim} ({:?}, age {})",
                self.partials[victim].state(),
                self.partials[victim].age()
            );
            victims += self.abort_poly(victim, math);
        }
        victims
    }

    /// Fade every sounding partial that shares a note with `id`.
    fn abort_poly(&mut self, id: usize, math: &MathTables) -> usize {
        let Some(owner) = self.partials.get(id).and_then(Partial::owner) else {
            return 0;
        };
        let mut aborted = 0;
        for member in 0..self.partials.len() {
            let partial = &self.partials[member];
            let same_note = partial
                .owner()
                .is_some_and(|o| o.part == owner.part && o.poly == owner.poly);
            if same_note && partial.is_active() && partial.state() != PartialState::StolenFade {
                self.abort(member, math);
                aborted += 1;
            }
        }
        aborted
    }

    fn pick_victim(&self) -> Option<usize> {
        let oldest = |state: fn(PartialState) -> bool| {
            self.partials
                .iter()
                .enumerate()
                .filter(|(_, p)| state(p.state()))
                .min_by_key(|(_, p)| p.age())
                .map(|(i, _)| i)
        };
        oldest(|s| s == PartialState::Release)
            .or_else(|| oldest(|s| matches!(s, PartialState::Attack | PartialState::Sustain)))
    }

    /// Shared access to a partial.
    #[inline]
    pub fn get(&self, id: usize) -> Option<&Partial> {
        self.partials.get(id)
    }

    /// Mutable access to a partial.
    #[inline]
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Partial> {
        self.partials.get_mut(id)
    }

    /// All partials in pool order.
    #[inline]
    pub fn partials(&self) -> &[Partial] {
        &self.partials
    }

    /// All partials, mutable.
    #[inline]
    pub fn partials_mut(&mut self) -> &mut [Partial] {
        &mut self.partials
    }

    /// Free everything at once.
    pub fn reset(&mut self) {
        for partial in &mut self.partials {
            partial.free();
        }
        self.serial = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PcmInterpolation;
    use crate::partial::PartialStart;
    use crate::timbre::PartialParam;
    use crate::tva::AmpLevels;
    use crate::tvp::PitchControls;

    fn owner(poly: usize) -> PartialOwner {
        PartialOwner {
            part: 0,
            poly,
            slot: 0,
        }
    }

    fn play(manager: &mut PartialManager, math: &MathTables, poly: usize) -> usize {
        let id = manager.allocate(owner(poly)).unwrap();
        let start = PartialStart {
            param: PartialParam::default(),
            pcm: None,
            key: 60,
            velocity: 100,
            fine_tune: 50,
            pan_offset: 0,
            reverb: false,
            ring_slave: false,
            no_sustain: false,
            rhythm_level: None,
        };
        manager
            .get_mut(id)
            .unwrap()
            .start(math, &start, &AmpLevels::default());
        id
    }

    fn tick(manager: &mut PartialManager, math: &MathTables) {
        for id in 0..manager.capacity() {
            let p = manager.get_mut(id).unwrap();
            p.next_sample(
                math,
                &[],
                &PitchControls::default(),
                &AmpLevels::default(),
                PcmInterpolation::Linear,
            );
            if p.is_finished() {
                manager.release(id);
            }
        }
    }

    #[test]
    fn test_allocates_lowest_free_first() {
        let math = MathTables::new();
        let mut m = PartialManager::new(4);
        assert_eq!(play(&mut m, &math, 0), 0);
        assert_eq!(play(&mut m, &math, 1), 1);
        m.release(0);
        assert_eq!(m.free_count(), 3);
        assert_eq!(play(&mut m, &math, 2), 0);
        assert_eq!(m.active_count(), 2);
    }

    #[test]
    fn test_full_pool_refuses() {
        let math = MathTables::new();
        let mut m = PartialManager::new(2);
        play(&mut m, &math, 0);
        play(&mut m, &math, 1);
        assert_eq!(m.allocate(owner(2)), None);
        assert_eq!(m.active_count(), 2);
    }

    #[test]
    fn test_reclaims_oldest_active() {
        let math = MathTables::new();
        let mut m = PartialManager::new(3);
        for poly in 0..3 {
            play(&mut m, &math, poly);
        }
        assert_eq!(m.reclaim(1, &math), 1);
        assert_eq!(m.get(0).unwrap().state(), PartialState::StolenFade);
        assert!(m.is_reclaiming());
        // The fading partial already counts: nothing more to do.
        assert_eq!(m.reclaim(1, &math), 0);
        let mut n = 0;
        while m.is_reclaiming() {
            tick(&mut m, &math);
            n += 1;
            assert!(n < 2000);
        }
        assert_eq!(m.free_count(), 1);
        assert_eq!(m.get(1).unwrap().owner(), Some(owner(1)));
    }

    #[test]
    fn test_reclaims_whole_note() {
        let math = MathTables::new();
        let mut m = PartialManager::new(5);
        for _ in 0..3 {
            play(&mut m, &math, 0);
        }
        play(&mut m, &math, 1);
        play(&mut m, &math, 1);
        assert_eq!(m.reclaim(1, &math), 3);
        for id in 0..3 {
            assert_eq!(m.get(id).unwrap().state(), PartialState::StolenFade);
        }
        assert_eq!(m.get(3).unwrap().state(), PartialState::Attack);
        assert_eq!(m.get(4).unwrap().state(), PartialState::Attack);
    }

    #[test]
    fn test_prefers_releasing_victims() {
        let math = MathTables::new();
        let mut m = PartialManager::new(3);
        for poly in 0..3 {
            play(&mut m, &math, poly);
        }
        m.get_mut(2).unwrap().start_decay(&math);
        m.get_mut(1).unwrap().start_decay(&math);
        m.reclaim(1, &math);
        // Partial 1 is the oldest of the releasing ones.
        assert_eq!(m.get(1).unwrap().state(), PartialState::StolenFade);
        assert_eq!(m.get(0).unwrap().state(), PartialState::Attack);
        assert_eq!(m.get(2).unwrap().state(), PartialState::Release);
    }

    #[test]
    fn test_ring_pair_freed_together() {
        let math = MathTables::new();
        let mut m = PartialManager::new(4);
        let a = play(&mut m, &math, 0);
        let b = play(&mut m, &math, 0);
        m.link_pair(a, b, PairMix::Ring);
        let freed = m.release(b);
        assert_eq!(freed, [Some(owner(0)), Some(owner(0))]);
        assert_eq!(m.free_count(), 4);

        let a = play(&mut m, &math, 1);
        let b = play(&mut m, &math, 1);
        m.link_pair(a, b, PairMix::RingMixed);
        m.abort(a, &math);
        assert_eq!(m.get(b).unwrap().state(), PartialState::StolenFade);
    }

    #[test]
    fn test_mix_pair_freed_independently() {
        let math = MathTables::new();
        let mut m = PartialManager::new(4);
        let a = play(&mut m, &math, 0);
        let b = play(&mut m, &math, 0);
        m.link_pair(a, b, PairMix::Stereo);
        m.release(a);
        assert!(m.get(b).unwrap().is_active());
        assert_eq!(m.get(b).unwrap().pair(), None);
    }

    #[test]
    fn test_reset_frees_all() {
        let math = MathTables::new();
        let mut m = PartialManager::new(4);
        play(&mut m, &math, 0);
        play(&mut m, &math, 1);
        m.reset();
        assert_eq!(m.free_count(), 4);
        assert!(!m.is_reclaiming());
    }
}
