// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity free list of [`BufferSlot`]s.

use std::collections::VecDeque;

use tracing::debug;
use uuid::Uuid;

use crate::{BufferSlot, Error, Result};

/// Pool of pre-allocated slots.
///
/// Every slot taken with [`Self::try_acquire`] must come back exactly once
/// through [`Self::release`]. The pool remembers the generation of each
/// outstanding checkout, so a slot that is not currently checked out from
/// this pool is rejected instead of corrupting the free list.
pub struct SlotPool {
    id: Uuid,
    free: VecDeque<BufferSlot>,
    /// Generation of the live checkout per slot index, `None` while free.
    checkouts: Vec<Option<u64>>,
    next_generation: u64,
}

impl SlotPool {
    /// Allocates `capacity` empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Allocation(
                "slot pool capacity must be larger than zero.".to_string(),
            ));
        }
        let id = Uuid::new_v4();
        let free = (0..capacity).map(|i| BufferSlot::empty(id, i)).collect();
        debug!(%id, capacity, "Created slot pool");
        Ok(Self {
            id,
            free,
            checkouts: vec![None; capacity],
            next_generation: 1,
        })
    }

    /// Unique identifier of this pool.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.checkouts.len()
    }

    /// Number of slots currently in the free list.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of slots currently held outside the pool.
    pub fn checked_out(&self) -> usize {
        self.checkouts.iter().filter(|c| c.is_some()).count()
    }

    /// Pops the head of the free list, or `None` when the pool is exhausted.
    pub fn try_acquire(&mut self) -> Option<BufferSlot> {
        let mut slot = self.free.pop_front()?;
        slot.id.generation = self.next_generation;
        self.next_generation += 1;
        self.checkouts[slot.id.index] = Some(slot.id.generation);
        Some(slot)
    }

    /// Clears `slot` and pushes it back onto the free list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the slot belongs to another pool or
    /// is not the live checkout of its index. The pool is left unchanged.
    pub fn release(&mut self, mut slot: BufferSlot) -> Result<()> {
        let id = slot.id;
        if id.pool != self.id {
            return Err(Error::InvalidState(format!(
                "slot {} belongs to pool {}, not {}.",
                id.index, id.pool, self.id
            )));
        }
        match self.checkouts.get(id.index) {
            Some(Some(generation)) if *generation == id.generation => {}
            _ => {
                return Err(Error::InvalidState(format!(
                    "slot {} (generation {}) is not checked out.",
                    id.index, id.generation
                )));
            }
        }
        self.checkouts[id.index] = None;
        slot.clear();
        self.free.push_back(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_an_allocation_error() {
        assert!(matches!(SlotPool::new(0), Err(Error::Allocation(_))));
    }

    #[test]
    fn conservation_holds_across_acquire_release() {
        let mut pool = SlotPool::new(3).unwrap();
        let mut held = Vec::new();
        for step in 0..12 {
            if step % 3 == 2 {
                if let Some(slot) = held.pop() {
                    pool.release(slot).unwrap();
                }
            } else if let Some(slot) = pool.try_acquire() {
                held.push(slot);
            }
            assert_eq!(pool.available() + pool.checked_out(), pool.capacity());
            assert_eq!(pool.checked_out(), held.len());
        }
    }

    #[test]
    fn exhausted_pool_returns_none() {
        let mut pool = SlotPool::new(1).unwrap();
        let slot = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        pool.release(slot).unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn stale_generation_is_rejected() {
        let mut pool = SlotPool::new(2).unwrap();
        let slot = pool.try_acquire().unwrap();
        let stale = BufferSlot::empty(pool.id(), slot.id.index);
        pool.release(slot).unwrap();

        let err = pool.release(stale).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.checked_out(), 0);
    }

    #[test]
    fn double_release_of_a_duplicated_slot_is_rejected() {
        let mut pool = SlotPool::new(2).unwrap();
        let slot = pool.try_acquire().unwrap();
        let mut duplicate = BufferSlot::empty(pool.id(), slot.id.index);
        duplicate.id.generation = slot.id.generation;

        pool.release(slot).unwrap();
        assert!(matches!(
            pool.release(duplicate),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn foreign_slot_is_rejected() {
        let mut first = SlotPool::new(1).unwrap();
        let mut second = SlotPool::new(1).unwrap();
        let foreign = second.try_acquire().unwrap();
        assert!(matches!(first.release(foreign), Err(Error::InvalidState(_))));
        assert_eq!(first.available(), 1);
    }
}
