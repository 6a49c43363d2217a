//! Process-wide hazard-slot registry.
//!
//! A single append-only singly-linked list of hazard slots shared by every
//! thread in the process. Threads claim slots with a test-and-set busy flag
//! and hand them back on exit; slot records themselves are never deallocated,
//! so a scanner can walk the list without any synchronization beyond acquire
//! loads.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use once_cell::race::OnceBox;

/// One hazard slot: a busy flag plus the published pointer.
pub(crate) struct HazardSlot {
    /// Set while some thread owns this slot.
    active: AtomicBool,
    /// Address the owning thread may dereference next; 0 when idle.
    protected: AtomicUsize,
    /// Next record in the registry. Written during the push CAS loop and
    /// immutable once the record is published.
    next: AtomicPtr<HazardSlot>,
}

impl HazardSlot {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            protected: AtomicUsize::new(0),
            next: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Publish `ptr` in this slot. Release so that a scanner that does not
    /// observe the publish cannot observe any later load through the pointer
    /// either.
    #[inline]
    pub(crate) fn set(&self, ptr: usize) {
        self.protected.store(ptr, Ordering::Release);
    }

    /// Read back the published pointer.
    #[inline]
    pub(crate) fn get(&self) -> usize {
        self.protected.load(Ordering::Acquire)
    }
}

/// The registry: list head plus a slot count that drives the reclamation
/// threshold.
pub(crate) struct HazardRegistry {
    head: AtomicPtr<HazardSlot>,
    len: AtomicUsize,
}

impl HazardRegistry {
    fn new() -> Self {
        Self {
            head: AtomicPtr::new(std::ptr::null_mut()),
            len: AtomicUsize::new(0),
        }
    }

    /// Claim an idle slot, or allocate and push a fresh one if every existing
    /// slot is busy. The returned reference is `'static`: records live for
    /// the rest of the process.
    pub(crate) fn acquire(&self) -> &'static HazardSlot {
        let mut p = self.head.load(Ordering::Acquire);
        while !p.is_null() {
            // SAFETY: records are never deallocated.
            let slot = unsafe { &*p };
            if !slot.active.swap(true, Ordering::AcqRel) {
                return slot;
            }
            p = slot.next.load(Ordering::Acquire);
        }

        // No idle slot; push a new record at the head.
        let slot: &'static HazardSlot = Box::leak(Box::new(HazardSlot::new()));
        self.len.fetch_add(1, Ordering::Relaxed);
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            slot.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                slot as *const HazardSlot as *mut HazardSlot,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return slot,
                Err(observed) => head = observed,
            }
        }
    }

    /// Hand a slot back: clear the published pointer, then the busy flag.
    pub(crate) fn release(&self, slot: &HazardSlot) {
        slot.protected.store(0, Ordering::Release);
        slot.active.store(false, Ordering::Release);
    }

    /// Snapshot every non-null published pointer into `live`.
    pub(crate) fn snapshot<S: std::hash::BuildHasher>(&self, live: &mut HashSet<usize, S>) {
        live.clear();
        let mut p = self.head.load(Ordering::Acquire);
        while !p.is_null() {
            // SAFETY: records are never deallocated.
            let slot = unsafe { &*p };
            let ptr = slot.protected.load(Ordering::Acquire);
            if ptr != 0 {
                live.insert(ptr);
            }
            p = slot.next.load(Ordering::Acquire);
        }
    }

    /// Is `ptr` currently published in any slot? Linear walk; used only on
    /// the reclaimer teardown path.
    pub(crate) fn is_hazard(&self, ptr: usize) -> bool {
        let mut p = self.head.load(Ordering::Acquire);
        while !p.is_null() {
            // SAFETY: records are never deallocated.
            let slot = unsafe { &*p };
            if slot.protected.load(Ordering::Acquire) == ptr {
                return true;
            }
            p = slot.next.load(Ordering::Acquire);
        }
        false
    }

    /// Number of slots ever allocated.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

/// Global singleton instance.
static GLOBAL: OnceBox<HazardRegistry> = OnceBox::new();

/// Get a reference to the process-wide registry.
#[inline]
pub(crate) fn global() -> &'static HazardRegistry {
    GLOBAL.get_or_init(|| Box::new(HazardRegistry::new()))
}
