//! Per-viewer slot bindings.

/// A slot bound to one remote player, with its transmission state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Id of the bound player.
    pub player: u32,
    /// A full payload has gone out for this binding.
    pub has_sent_full: bool,
    /// The last full payload was acknowledged.
    pub acked: bool,
    /// Outgoing sequence carrying the last full payload.
    pub pending_seq: u16,
    /// Datagrams received since the last full payload without acknowledging it.
    pub missed_acks: u32,
    /// Vehicle revision of the player at the last payload sent.
    pub last_sent_revision: Option<u64>,
}

impl Slot {
    pub fn new(player: u32) -> Self {
        Self {
            player,
            has_sent_full: false,
            acked: false,
            pending_seq: 0,
            missed_acks: 0,
            last_sent_revision: None,
        }
    }

    /// Waiting for the client to acknowledge a full payload.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.has_sent_full && !self.acked
    }
}

/// Old vs new target player sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotDiff {
    pub kept: Vec<u32>,
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
}

impl SlotDiff {
    /// Diff two player lists. `kept` and `added` follow `new`'s order,
    /// `removed` follows `old`'s.
    pub fn compute(old: &[u32], new: &[u32]) -> Self {
        let mut diff = Self::default();
        for &player in new {
            if old.contains(&player) {
                diff.kept.push(player);
            } else {
                diff.added.push(player);
            }
        }
        diff.removed = old.iter().copied().filter(|p| !new.contains(p)).collect();
        diff
    }
}

/// What [`SlotTable::apply_diff`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffApplied {
    Nothing,
    Removed(usize),
    Added(usize),
}

/// Fixed-length array of optional slot bindings.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Box<[Option<Slot>]>,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Slot>> {
        self.slots.iter().map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = Option<&mut Slot>> {
        self.slots.iter_mut().map(Option::as_mut)
    }

    /// Bound player ids in slot order.
    pub fn bound_players(&self) -> Vec<u32> {
        self.slots.iter().flatten().map(|s| s.player).collect()
    }

    pub fn contains(&self, player: u32) -> bool {
        self.slots.iter().flatten().any(|s| s.player == player)
    }

    /// Apply one side of `diff`: removals if there are any, otherwise
    /// additions into the lowest free slots. Never both in one call.
    pub fn apply_diff(&mut self, diff: &SlotDiff) -> DiffApplied {
        if !diff.removed.is_empty() {
            let mut removed = 0;
            for slot in self.slots.iter_mut() {
                if slot.as_ref().is_some_and(|s| diff.removed.contains(&s.player)) {
                    *slot = None;
                    removed += 1;
                }
            }
            return DiffApplied::Removed(removed);
        }

        if !diff.added.is_empty() {
            let mut added = 0;
            for &player in &diff.added {
                if self.contains(player) {
                    continue;
                }
                let Some(free) = self.slots.iter_mut().find(|s| s.is_none()) else {
                    break;
                };
                *free = Some(Slot::new(player));
                added += 1;
            }
            return DiffApplied::Added(added);
        }

        DiffApplied::Nothing
    }

    /// Diff the current bindings against `target` and apply it.
    pub fn retarget(&mut self, target: &[u32]) -> DiffApplied {
        let diff = SlotDiff::compute(&self.bound_players(), target);
        self.apply_diff(&diff)
    }

    /// Record the server sequence echoed by the client. Slots waiting on
    /// exactly that sequence become acknowledged; other pending slots count
    /// a miss.
    pub fn acknowledge(&mut self, echoed_seq: u16) {
        for slot in self.slots.iter_mut().flatten() {
            if !slot.is_pending() {
                continue;
            }
            if slot.pending_seq == echoed_seq {
                slot.acked = true;
            } else {
                slot.missed_acks = slot.missed_acks.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::seq::SliceRandom;

    #[test]
    fn test_diff() {
        let diff = SlotDiff::compute(&[1, 2, 3], &[3, 4, 1]);
        assert_eq!(diff.kept, vec![3, 1]);
        assert_eq!(diff.added, vec![4]);
        assert_eq!(diff.removed, vec![2]);
    }

    #[test]
    fn test_removals_before_additions() {
        let mut table = SlotTable::new(4);
        assert_eq!(table.retarget(&[10, 11, 12]), DiffApplied::Added(3));
        assert_eq!(table.bound_players(), vec![10, 11, 12]);

        // 11 leaves, 13 arrives: only the removal happens this round.
        assert_eq!(table.retarget(&[10, 12, 13]), DiffApplied::Removed(1));
        assert!(table.get(1).is_none());
        assert!(!table.contains(13));

        // 13 fills the lowest free index.
        assert_eq!(table.retarget(&[10, 12, 13]), DiffApplied::Added(1));
        assert_eq!(table.get(1).map(|s| s.player), Some(13));
        assert_eq!(table.retarget(&[10, 12, 13]), DiffApplied::Nothing);
    }

    #[test]
    fn test_capacity_is_fixed() {
        let mut table = SlotTable::new(2);
        assert_eq!(table.retarget(&[1, 2, 3]), DiffApplied::Added(2));
        assert_eq!(table.capacity(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_acknowledge() {
        let mut table = SlotTable::new(3);
        table.retarget(&[1, 2, 3]);
        for (i, slot) in table.iter_mut().flatten().enumerate() {
            if i < 2 {
                slot.has_sent_full = true;
                slot.pending_seq = 40 + i as u16;
            }
        }

        table.acknowledge(40);
        let s0 = table.get(0).unwrap();
        assert!(s0.acked);
        assert_eq!(s0.missed_acks, 0);
        let s1 = table.get(1).unwrap();
        assert!(!s1.acked);
        assert_eq!(s1.missed_acks, 1);
        // Never sent a full payload, nothing to miss.
        assert_eq!(table.get(2).unwrap().missed_acks, 0);

        // Acknowledged slots stop counting.
        table.acknowledge(99);
        assert_eq!(table.get(0).unwrap().missed_acks, 0);
        assert_eq!(table.get(1).unwrap().missed_acks, 2);
    }

    #[test]
    fn test_random_retargets_keep_invariants() {
        let mut rng = rand::rng();
        let mut table = SlotTable::new(14);
        let mut population: Vec<u32> = (0..40).collect();

        for _ in 0..500 {
            population.shuffle(&mut rng);
            let take = rng.random_range(0..=14);
            let target = &population[..take];

            let before = table.bound_players();
            let applied = table.retarget(target);
            let after = table.bound_players();

            assert!(after.len() <= table.capacity());
            let mut unique = after.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), after.len());

            match applied {
                DiffApplied::Removed(_) => assert!(after.iter().all(|p| before.contains(p))),
                DiffApplied::Added(_) => assert!(before.iter().all(|p| after.contains(p))),
                DiffApplied::Nothing => assert_eq!(before, after),
            }
        }
    }
}
