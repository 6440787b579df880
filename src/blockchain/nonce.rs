//! Sequence allocation for chain nonces and bridge nonces.
//!
//! The authoritative floor comes from chain state (fetched by the caller
//! outside any lock); the allocator merges it with what this process has
//! already handed out, inside one short critical section per key.
//!
//! A nonce handed back while later ones are still outstanding becomes a gap
//! that the next allocation fills first. `next` never moves below the highest
//! outstanding nonce, so an in-flight nonce is never issued twice.

use std::collections::BTreeSet;
use std::hash::Hash;

use dashmap::DashMap;

#[derive(Debug, Default)]
struct Sequence {
    next: u64,
    gaps: BTreeSet<u64>,
}

/// Hands out sequence numbers per key without ever repeating an outstanding one.
#[derive(Debug)]
pub struct NonceAllocator<K: Eq + Hash> {
    sequences: DashMap<K, Sequence>,
}

impl<K: Eq + Hash> Default for NonceAllocator<K> {
    fn default() -> Self {
        Self {
            sequences: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> NonceAllocator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the lowest released gap at or above `floor`, otherwise
    /// `max(floor, next)`.
    ///
    /// Gaps below `floor` are dropped: the chain has moved past them.
    pub fn allocate(&self, key: &K, floor: u64) -> u64 {
        let mut entry = self
            .sequences
            .entry(key.clone())
            .or_insert_with(|| Sequence {
                next: floor,
                gaps: BTreeSet::new(),
            });
        let seq = &mut *entry;

        let kept = seq.gaps.split_off(&floor);
        seq.gaps = kept;
        if let Some(gap) = seq.gaps.pop_first() {
            return gap;
        }

        let allocated = seq.next.max(floor);
        seq.next = allocated + 1;
        allocated
    }

    /// Give back a nonce whose transaction never reached the chain.
    pub fn release(&self, key: &K, nonce: u64) {
        let Some(mut entry) = self.sequences.get_mut(key) else {
            return;
        };
        let seq = &mut *entry;
        if nonce >= seq.next {
            return;
        }
        if nonce + 1 == seq.next {
            seq.next = nonce;
            // Trailing gaps collapse into the new tip.
            while let Some(below) = seq.next.checked_sub(1) {
                if !seq.gaps.remove(&below) {
                    break;
                }
                seq.next = below;
            }
        } else {
            seq.gaps.insert(nonce);
        }
    }

    /// Next fresh value this process would hand out, ignoring gaps and chain state.
    pub fn peek(&self, key: &K) -> Option<u64> {
        self.sequences.get(key).map(|seq| seq.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sequential_allocation_is_strictly_increasing() {
        let allocator = NonceAllocator::new();
        let key = (1u64, "alice");

        // Chain keeps reporting a stale pending count of 5.
        let allocated: Vec<u64> = (0..4).map(|_| allocator.allocate(&key, 5)).collect();
        assert_eq!(allocated, vec![5, 6, 7, 8]);
        assert_eq!(allocator.peek(&key), Some(9));
    }

    #[test]
    fn test_chain_floor_moves_ahead() {
        let allocator = NonceAllocator::new();
        let key = 1u64;
        assert_eq!(allocator.allocate(&key, 0), 0);
        // Transactions sent elsewhere advanced the account.
        assert_eq!(allocator.allocate(&key, 10), 10);
        assert_eq!(allocator.allocate(&key, 3), 11);
    }

    #[test]
    fn test_release_latest_rolls_back() {
        let allocator = NonceAllocator::new();
        let key = 7u64;
        let n = allocator.allocate(&key, 4);
        allocator.release(&key, n);
        assert_eq!(allocator.allocate(&key, 4), 4);
    }

    #[test]
    fn test_released_gap_is_reused_without_repeating_outstanding() {
        let allocator = NonceAllocator::new();
        let key = 7u64;
        let first = allocator.allocate(&key, 4);
        let second = allocator.allocate(&key, 4);
        assert_eq!((first, second), (4, 5));

        allocator.release(&key, first);

        // The gap is filled first; 5 is still in flight and must not come back.
        assert_eq!(allocator.allocate(&key, 4), 4);
        assert_eq!(allocator.allocate(&key, 4), 6);
        assert_eq!(allocator.peek(&key), Some(7));
    }

    #[test]
    fn test_gaps_below_chain_floor_are_dropped() {
        let allocator = NonceAllocator::new();
        let key = 7u64;
        let first = allocator.allocate(&key, 0);
        let _second = allocator.allocate(&key, 0);
        allocator.release(&key, first);

        // The chain already counts nonce 0 as used.
        assert_eq!(allocator.allocate(&key, 1), 2);
    }

    #[test]
    fn test_release_of_tip_collapses_trailing_gaps() {
        let allocator = NonceAllocator::new();
        let key = 7u64;
        let a = allocator.allocate(&key, 0);
        let b = allocator.allocate(&key, 0);
        let c = allocator.allocate(&key, 0);
        allocator.release(&key, b);
        allocator.release(&key, c);
        assert_eq!(allocator.peek(&key), Some(1));
        allocator.release(&key, a);
        assert_eq!(allocator.peek(&key), Some(0));
        assert_eq!(allocator.allocate(&key, 0), 0);
    }

    #[test]
    fn test_release_unknown_or_unissued_is_ignored() {
        let allocator = NonceAllocator::new();
        let key = 7u64;
        allocator.release(&key, 3);
        assert_eq!(allocator.peek(&key), None);

        allocator.allocate(&key, 0);
        allocator.release(&key, 9);
        assert_eq!(allocator.allocate(&key, 0), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let allocator = NonceAllocator::new();
        assert_eq!(allocator.allocate(&(1u64, 1u64), 0), 0);
        assert_eq!(allocator.allocate(&(56u64, 1u64), 0), 0);
        assert_eq!(allocator.allocate(&(1u64, 1u64), 0), 1);
    }

    #[test]
    fn test_concurrent_allocations_never_repeat() {
        let allocator = Arc::new(NonceAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| allocator.allocate(&"sender", 0))
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        let expected: Vec<u64> = (0..800).collect();
        assert_eq!(all, expected);
    }
}
