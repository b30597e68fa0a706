//! Request sequence numbers.

use rand::Rng;
use shared_types::Seq;
use std::sync::atomic::{AtomicI32, Ordering};

/// Upper bound (exclusive) of the random seed.
pub const SEED_RANGE: i32 = 1 << 30;

/// Monotonic `seq` source. Values stay positive: after `i32::MAX` the
/// counter wraps to 1.
///
/// The random seed keeps two client instances (or one client across page
/// reloads) from reusing the same numbers against one device.
#[derive(Debug)]
pub struct SequenceGenerator {
    last: AtomicI32,
}

impl SequenceGenerator {
    /// Seed from a random value in `[0, 2^30)`.
    pub fn random() -> Self {
        Self::starting_after(rand::thread_rng().gen_range(0..SEED_RANGE))
    }

    /// The first value handed out is `seed + 1` (or 1 when `seed` is
    /// `i32::MAX`).
    pub fn starting_after(seed: i32) -> Self {
        Self {
            last: AtomicI32::new(seed),
        }
    }

    pub fn next(&self) -> Seq {
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some(successor(cur)))
            .unwrap_or_else(|cur| cur);
        successor(previous)
    }
}

fn successor(seq: Seq) -> Seq {
    if seq >= i32::MAX || seq < 0 {
        1
    } else {
        seq + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let seq = SequenceGenerator::starting_after(100);
        assert_eq!(seq.next(), 101);
        assert_eq!(seq.next(), 102);
    }

    #[test]
    fn test_wraps_to_one() {
        let seq = SequenceGenerator::starting_after(i32::MAX - 1);
        assert_eq!(seq.next(), i32::MAX);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
    }

    #[test]
    fn test_random_seed_in_range() {
        for _ in 0..100 {
            let first = SequenceGenerator::random().next();
            assert!(first >= 1 && first <= SEED_RANGE);
        }
    }
}
