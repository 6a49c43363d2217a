//! Lazily allocated bucket directory.
//!
//! A four-level tree with fanout 64: the root level is embedded in the table,
//! two segment levels below it, and leaf arrays of bucket heads at the
//! bottom. The 24-bit bucket index is consumed as four 6-bit digits, most
//! significant first. Every child pointer is installed at most once by CAS
//! from null; a loser frees its allocation and adopts the winner's. Only the
//! paths actually touched are ever allocated.
//!
//! A contiguous array would force a stop-the-world copy to grow; this shape
//! grows by installing new paths while readers keep walking old ones.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::node::Node;

/// Children per tree level.
pub(crate) const SEGMENT_FANOUT: usize = 64;
/// Tree depth, root level included.
pub(crate) const SEGMENT_LEVELS: usize = 4;

const DIGIT_BITS: usize = SEGMENT_FANOUT.trailing_zeros() as usize;

/// Bucket indices are at most `SEGMENT_LEVELS` digits wide, which caps table
/// growth at `2^MAX_POWER` buckets.
pub(crate) const MAX_POWER: usize = DIGIT_BITS * SEGMENT_LEVELS;

/// 6-bit digit of `bucket` at `level` (level 0 = leaf).
#[inline]
fn digit(bucket: usize, level: usize) -> usize {
    (bucket >> (DIGIT_BITS * level)) & (SEGMENT_FANOUT - 1)
}

struct SegmentL2<K, V> {
    slots: [AtomicPtr<SegmentL3<K, V>>; SEGMENT_FANOUT],
}

struct SegmentL3<K, V> {
    slots: [AtomicPtr<BucketArray<K, V>>; SEGMENT_FANOUT],
}

struct BucketArray<K, V> {
    heads: [AtomicPtr<Node<K, V>>; SEGMENT_FANOUT],
}

fn null_slots<T>() -> [AtomicPtr<T>; SEGMENT_FANOUT] {
    std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut()))
}

/// Load the child at `slot`, installing a freshly allocated one if the slot
/// is still null. The loser of the install race frees its allocation and
/// adopts the winner's.
fn install<T>(slot: &AtomicPtr<T>, alloc: impl FnOnce() -> Box<T>) -> &T {
    let mut child = slot.load(Ordering::Acquire);
    if child.is_null() {
        let fresh = Box::into_raw(alloc());
        match slot.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => child = fresh,
            Err(winner) => {
                // SAFETY: the CAS failed, so `fresh` was never published.
                unsafe { drop(Box::from_raw(fresh)) };
                child = winner;
            }
        }
    }
    // SAFETY: installed children are immutable and live as long as the
    // directory.
    unsafe { &*child }
}

/// The directory root, embedded in the table.
pub(crate) struct BucketDir<K, V> {
    root: [AtomicPtr<SegmentL2<K, V>>; SEGMENT_FANOUT],
}

impl<K, V> BucketDir<K, V> {
    pub(crate) fn new() -> Self {
        Self { root: null_slots() }
    }

    /// Head pointer for `bucket`, or null if any segment on the path (or the
    /// head itself) has not been installed. Never allocates.
    pub(crate) fn lookup(&self, bucket: usize) -> *mut Node<K, V> {
        let l2 = self.root[digit(bucket, 3)].load(Ordering::Acquire);
        if l2.is_null() {
            return ptr::null_mut();
        }
        // SAFETY: non-null children are install-once and immutable.
        let l3 = unsafe { &*l2 }.slots[digit(bucket, 2)].load(Ordering::Acquire);
        if l3.is_null() {
            return ptr::null_mut();
        }
        let leaf = unsafe { &*l3 }.slots[digit(bucket, 1)].load(Ordering::Acquire);
        if leaf.is_null() {
            return ptr::null_mut();
        }
        unsafe { &*leaf }.heads[digit(bucket, 0)].load(Ordering::Acquire)
    }

    /// The head slot for `bucket`, allocating any missing segments on the
    /// path.
    pub(crate) fn head_slot(&self, bucket: usize) -> &AtomicPtr<Node<K, V>> {
        let l2 = install(&self.root[digit(bucket, 3)], || {
            Box::new(SegmentL2 {
                slots: null_slots(),
            })
        });
        let l3 = install(&l2.slots[digit(bucket, 2)], || {
            Box::new(SegmentL3 {
                slots: null_slots(),
            })
        });
        let leaf = install(&l3.slots[digit(bucket, 1)], || {
            Box::new(BucketArray {
                heads: null_slots(),
            })
        });
        &leaf.heads[digit(bucket, 0)]
    }
}

impl<K, V> Drop for BucketDir<K, V> {
    fn drop(&mut self) {
        // Frees the segment and bucket arrays only. Bucket heads are views
        // into the list; the table walks and frees the nodes itself.
        for slot in &mut self.root {
            let l2 = *slot.get_mut();
            if l2.is_null() {
                continue;
            }
            // SAFETY: exclusive access; children were allocated by `install`
            // and never freed elsewhere.
            let mut l2 = unsafe { Box::from_raw(l2) };
            for slot in &mut l2.slots {
                let l3 = *slot.get_mut();
                if l3.is_null() {
                    continue;
                }
                let mut l3 = unsafe { Box::from_raw(l3) };
                for slot in &mut l3.slots {
                    let leaf = *slot.get_mut();
                    if !leaf.is_null() {
                        unsafe { drop(Box::from_raw(leaf)) };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_cover_the_index() {
        let bucket = 0b101010_110011_000111_111000usize;
        assert_eq!(digit(bucket, 3), 0b101010);
        assert_eq!(digit(bucket, 2), 0b110011);
        assert_eq!(digit(bucket, 1), 0b000111);
        assert_eq!(digit(bucket, 0), 0b111000);
        assert_eq!(MAX_POWER, 24);
    }

    #[test]
    fn lookup_misses_until_installed() {
        let dir: BucketDir<u64, u64> = BucketDir::new();
        assert!(dir.lookup(12345).is_null());

        let head = Box::into_raw(Node::<u64, u64>::dummy(12345));
        dir.head_slot(12345).store(head, Ordering::Release);
        assert_eq!(dir.lookup(12345), head);
        // Sibling bucket in the same leaf is still unset.
        assert!(dir.lookup(12344).is_null());

        // The directory only frees its arrays; reclaim the node by hand.
        unsafe { drop(Box::from_raw(head)) };
    }

    #[test]
    fn distinct_buckets_get_distinct_slots() {
        let dir: BucketDir<u64, u64> = BucketDir::new();
        let a = dir.head_slot(0) as *const _;
        let b = dir.head_slot(1) as *const _;
        let c = dir.head_slot(64) as *const _;
        let d = dir.head_slot(1 << 23) as *const _;
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(b, c);
    }
}
