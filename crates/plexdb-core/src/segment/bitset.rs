//! Fixed bitsets and the pooled visited-set supplier.
//!
//! Traversals mark visited nodes in a dense bitset — one bit per
//! internal id keeps the working set small enough to stay in cache.
//! Bitsets are pooled so concurrent searches reuse cleared sets instead
//! of allocating per call.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Dense fixed-capacity bitset over internal ids.
#[derive(Debug, Clone)]
pub struct FixedBitset {
    words: Vec<u64>,
    bits: usize,
}

impl FixedBitset {
    /// Creates a bitset able to hold `bits` ids, all unset.
    #[must_use]
    pub fn new(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64)],
            bits,
        }
    }

    /// Number of ids this bitset can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bits
    }

    /// Sets `bit`, returning `true` if it was previously unset.
    pub fn insert(&mut self, bit: usize) -> bool {
        debug_assert!(bit < self.bits, "bit {bit} out of range {}", self.bits);
        let word = &mut self.words[bit / 64];
        let mask = 1u64 << (bit % 64);
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    /// Returns whether `bit` is set.
    #[must_use]
    pub fn contains(&self, bit: usize) -> bool {
        debug_assert!(bit < self.bits, "bit {bit} out of range {}", self.bits);
        self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    /// Unsets `bit`.
    pub fn remove(&mut self, bit: usize) {
        debug_assert!(bit < self.bits, "bit {bit} out of range {}", self.bits);
        self.words[bit / 64] &= !(1u64 << (bit % 64));
    }

    /// Unsets every bit.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }
}

/// Pool of visited bitsets shared by every traversal of a segment.
///
/// Sibling segments of one index may share a pool through an `Arc`, as
/// long as the pool is sized for the largest of them.
#[derive(Debug)]
pub struct BitsetPool {
    bits: usize,
    free: Mutex<Vec<FixedBitset>>,
}

impl BitsetPool {
    /// Creates a pool handing out bitsets sized for `bits` ids.
    #[must_use]
    pub fn new(bits: usize) -> Self {
        Self {
            bits,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Capacity of the bitsets this pool hands out.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bits
    }

    /// Takes a cleared bitset from the pool, allocating if none is free.
    ///
    /// The bitset flows back into the pool when the returned handle is
    /// dropped, on every exit path.
    #[must_use]
    pub fn acquire(&self) -> PooledBitset<'_> {
        let set = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| FixedBitset::new(self.bits));
        PooledBitset {
            pool: self,
            set: Some(set),
        }
    }
}

/// RAII handle over a pooled bitset; clears and returns it on drop.
#[derive(Debug)]
pub struct PooledBitset<'a> {
    pool: &'a BitsetPool,
    set: Option<FixedBitset>,
}

impl Deref for PooledBitset<'_> {
    type Target = FixedBitset;

    fn deref(&self) -> &FixedBitset {
        self.set.as_ref().expect("bitset present until drop")
    }
}

impl DerefMut for PooledBitset<'_> {
    fn deref_mut(&mut self) -> &mut FixedBitset {
        self.set.as_mut().expect("bitset present until drop")
    }
}

impl Drop for PooledBitset<'_> {
    fn drop(&mut self) {
        if let Some(mut set) = self.set.take() {
            set.clear();
            self.pool.free.lock().push(set);
        }
    }
}
