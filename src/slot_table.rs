//! Lock-free coherence protocol gating near-cache admission.
//!
//! Each key hashes to a fixed slot. A slot carries three sequentially
//! consistent counters: `owner_token` (who currently holds admit rights),
//! `active_ops` (how many operations are pinning the slot right now), and
//! `completed_ops` (a monotonic generation counter). A value fetched from the
//! authoritative store may only be admitted into the near-cache if nothing
//! else touched the slot between acquisition and admission — see
//! [`SlotTable::can_admit`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Error;

/// Sentinel returned by [`SlotTable::try_own`] when ownership was not
/// acquired. Never equal to a real token, since tokens are captured
/// `completedOps` values and zero is reserved as well.
pub const NOT_OWNER: i64 = -1;

struct Slot {
    owner_token: AtomicU64,
    active_ops: AtomicU64,
    completed_ops: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            owner_token: AtomicU64::new(0),
            active_ops: AtomicU64::new(0),
            completed_ops: AtomicU64::new(0),
        }
    }
}

/// Fixed-size array of per-slot coherence counters.
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Build a table with `slot_count` slots. `slot_count` must be a
    /// power of two.
    pub fn new(slot_count: usize) -> Result<Self, Error> {
        if slot_count == 0 || !slot_count.is_power_of_two() {
            return Err(Error::Configuration(format!(
                "slot_table.slot_count must be a power of two, got {slot_count}"
            )));
        }
        let slots = (0..slot_count).map(|_| Slot::new()).collect();
        Ok(Self { slots })
    }

    /// Deterministic hash of `key` modulo the slot count. Collisions across
    /// keys are expected and harmless: they cause extra contention aborts,
    /// never incorrectness.
    pub fn slot_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (self.slots.len() - 1)
    }

    /// Attempt to claim exclusive admit rights for `slot`. Always pins the
    /// slot (increments `active_ops`) regardless of whether ownership was
    /// won, so the caller must always pair this with a [`Self::release`].
    pub fn try_own(&self, slot: usize) -> i64 {
        let s = &self.slots[slot];
        let captured = s.completed_ops.load(Ordering::SeqCst);
        // owner_token's CAS target must never be 0 itself, or a slot whose
        // completed_ops is still 0 would let a second caller's CAS(0, 0)
        // "succeed" too. The returned token is still the true captured value.
        let token = match s
            .owner_token
            .compare_exchange(0, captured.max(1), Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => captured as i64,
            Err(_) => NOT_OWNER,
        };
        s.active_ops.fetch_add(1, Ordering::SeqCst);
        token
    }

    /// Pin every slot. Used to quiesce the whole table before a `clear()`.
    pub fn own_all(&self) {
        for s in &self.slots {
            s.active_ops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Release a previously pinned slot. Always bumps `completed_ops` and
    /// unpins it; if `token` indicates this caller held ownership, resets
    /// `owner_token` to 0.
    pub fn release(&self, slot: usize, token: i64) {
        let s = &self.slots[slot];
        s.completed_ops.fetch_add(1, Ordering::SeqCst);
        s.active_ops.fetch_sub(1, Ordering::SeqCst);
        if token != NOT_OWNER {
            s.owner_token.store(0, Ordering::SeqCst);
        }
    }

    /// Mirror of [`Self::own_all`].
    pub fn release_all(&self) {
        for s in &self.slots {
            s.completed_ops.fetch_add(1, Ordering::SeqCst);
            s.active_ops.fetch_sub(1, Ordering::SeqCst);
            s.owner_token.store(0, Ordering::SeqCst);
        }
    }

    /// True iff `token` is a valid ownership token, no other operation is
    /// concurrently touching the slot, and nothing has completed against it
    /// since acquisition.
    pub fn can_admit(&self, slot: usize, token: i64) -> bool {
        if token == NOT_OWNER {
            return false;
        }
        let s = &self.slots[slot];
        s.active_ops.load(Ordering::SeqCst) == 1
            && s.completed_ops.load(Ordering::SeqCst) == token as u64
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        assert!(SlotTable::new(1000).is_err());
        assert!(SlotTable::new(0).is_err());
    }

    #[test]
    fn accepts_power_of_two() {
        assert!(SlotTable::new(1024).is_ok());
        assert!(SlotTable::new(1).is_ok());
    }

    #[test]
    fn solo_owner_can_admit() {
        let table = SlotTable::new(16).unwrap();
        let token = table.try_own(0);
        assert_ne!(token, NOT_OWNER);
        assert!(table.can_admit(0, token));
        table.release(0, token);
    }

    #[test]
    fn second_owner_is_refused_while_first_holds_slot() {
        let table = SlotTable::new(16).unwrap();
        let t1 = table.try_own(0);
        assert_ne!(t1, NOT_OWNER);
        let t2 = table.try_own(0);
        assert_eq!(t2, NOT_OWNER);
        // second caller still pinned the slot, so the first can't admit either
        assert!(!table.can_admit(0, t1));
        table.release(0, t2);
        table.release(0, t1);
    }

    #[test]
    fn invalidation_between_acquire_and_admit_aborts() {
        let table = SlotTable::new(16).unwrap();
        let token = table.try_own(0);

        // simulate a racing invalidation: pin + release bumps completed_ops
        let invalidation_token = table.try_own(0);
        assert_eq!(invalidation_token, NOT_OWNER); // already owned
        table.release(0, invalidation_token);

        assert!(!table.can_admit(0, token));
        table.release(0, token);
    }

    #[test]
    fn own_all_blocks_admission_everywhere() {
        let table = SlotTable::new(4).unwrap();
        let token = table.try_own(0);
        table.own_all();
        assert!(!table.can_admit(0, token));
        table.release_all();
        table.release(0, token);
    }

    #[test]
    fn completed_ops_never_decreases_across_releases() {
        let table = SlotTable::new(4).unwrap();
        for _ in 0..5 {
            let token = table.try_own(1);
            table.release(1, token);
        }
        let token = table.try_own(1);
        assert!(table.can_admit(1, token));
    }
}
