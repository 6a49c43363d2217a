//! List nodes.
//!
//! Every entry in the table lives in one sorted singly-linked list. Two node
//! variants share a single header:
//!
//! - *Dummy* nodes mark a bucket's entry point into the list. Their sort key
//!   is the bit-reversed bucket index, so its least-significant bit is 0.
//! - *Regular* nodes carry a key and an atomically replaceable value pointer.
//!   Their sort key is the bit-reversed hash with the top bit forced on, so
//!   its least-significant bit is 1.
//!
//! The variant is therefore recoverable from one bit of the sort key that
//! every comparison already touches; no vtable needed. The low bit of the
//! `next` pointer is the Harris deletion mark.

use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::bitrev;

/// Forced onto the hash before reversal for regular nodes, which gives their
/// sort key LSB 1 and orders every regular node after the dummy of any bucket
/// it can ever map to.
pub(crate) const REGULAR_TAG: u64 = 1 << 63;

pub(crate) enum NodeKind<K, V> {
    Dummy,
    Regular { key: K, value: AtomicPtr<V> },
}

pub(crate) struct Node<K, V> {
    /// For regular nodes the full key hash; for dummies the bucket index.
    pub(crate) hash: u64,
    /// Sort key: bit-reversed `hash` (dummy) or `hash | REGULAR_TAG`
    /// (regular). Immutable.
    pub(crate) reverse_hash: u64,
    /// Successor pointer; low bit set means this node is logically deleted.
    pub(crate) next: AtomicUsize,
    pub(crate) kind: NodeKind<K, V>,
}

impl<K, V> Node<K, V> {
    pub(crate) fn dummy(bucket: u64) -> Box<Self> {
        Box::new(Self {
            hash: bucket,
            reverse_hash: bitrev::reverse(bucket),
            next: AtomicUsize::new(0),
            kind: NodeKind::Dummy,
        })
    }

    pub(crate) fn regular(hash: u64, key: K, value: V) -> Box<Self> {
        Box::new(Self {
            hash,
            reverse_hash: bitrev::reverse(hash | REGULAR_TAG),
            next: AtomicUsize::new(0),
            kind: NodeKind::Regular {
                key,
                value: AtomicPtr::new(Box::into_raw(Box::new(value))),
            },
        })
    }

    #[inline]
    pub(crate) fn is_dummy(&self) -> bool {
        self.reverse_hash & 1 == 0
    }

    #[inline]
    pub(crate) fn key(&self) -> &K {
        match &self.kind {
            NodeKind::Regular { key, .. } => key,
            NodeKind::Dummy => unreachable!("dummy nodes carry no key"),
        }
    }

    #[inline]
    pub(crate) fn value(&self) -> &AtomicPtr<V> {
        match &self.kind {
            NodeKind::Regular { value, .. } => value,
            NodeKind::Dummy => unreachable!("dummy nodes carry no value"),
        }
    }
}

impl<K, V> Drop for Node<K, V> {
    fn drop(&mut self) {
        if let NodeKind::Regular { value, .. } = &mut self.kind {
            let ptr = *value.get_mut();
            if !ptr.is_null() {
                // SAFETY: a regular node exclusively owns its current value
                // pointer; whoever swaps a value out takes the old pointer
                // with it.
                unsafe { drop(Box::from_raw(ptr)) };
            }
        }
    }
}

/// Free function fed to the reclaimer for retired list nodes.
pub(crate) unsafe fn drop_node<K, V>(ptr: *mut u8) {
    // SAFETY: retired nodes were allocated with `Box::into_raw` and are
    // dropped exactly once by the reclaimer.
    unsafe { drop(Box::from_raw(ptr as *mut Node<K, V>)) };
}

/// Free function fed to the reclaimer for displaced value pointers.
pub(crate) unsafe fn drop_value<V>(ptr: *mut u8) {
    // SAFETY: as above, for the `Box<V>` behind a replaced value pointer.
    unsafe { drop(Box::from_raw(ptr as *mut V)) };
}

/// Read the value behind a regular node, publishing the value pointer in the
/// scratch hazard slot so a concurrent replacement cannot free it mid-read.
pub(crate) fn read_value<V: Clone>(value: &AtomicPtr<V>, scratch_slot: usize) -> V {
    loop {
        let ptr = value.load(Ordering::Acquire);
        petek::protect(scratch_slot, ptr.cast());
        if value.load(Ordering::Acquire) == ptr {
            // SAFETY: the pointer is published and still installed, so the
            // replacement path cannot have freed it.
            break unsafe { (*ptr).clone() };
        }
    }
}
