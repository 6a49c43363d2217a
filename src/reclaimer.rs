//! Per-thread reclaimer.
//!
//! Each thread lazily instantiates one `Reclaimer` holding three hazard
//! slots claimed from the global registry, a map of retired pointers, and a
//! pool of spare retire records. Retirement is purely thread-local; `collect`
//! scans the registry once the retire map outgrows a multiple of the global
//! slot count, which bounds both the scan cost (amortized O(1) per retire)
//! and the number of retired-but-unfreed pointers per thread.
//!
//! On thread exit the reclaimer hands its slots back, then spin-yields each
//! remaining retired pointer until no slot anywhere publishes it, and frees
//! it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::registry::{self, HazardSlot};
use crate::retired::{DropFn, RetireRecord};

/// Hazard slots claimed per thread: two for list traversal (current and
/// predecessor) plus one scratch slot that keeps both alive across a
/// mid-traversal swap.
pub const HAZARDS_PER_THREAD: usize = 3;

/// `collect` scans only once the retire map holds at least this multiple of
/// the registry's slot count.
const RECLAIM_THRESHOLD_MULTIPLIER: f32 = 4.25;

type FoldState = foldhash::fast::RandomState;

struct Reclaimer {
    slots: [&'static HazardSlot; HAZARDS_PER_THREAD],
    /// Retired pointer -> record. Keyed by address so a scan snapshot can be
    /// intersected directly.
    retired: RefCell<HashMap<usize, Box<RetireRecord>, FoldState>>,
    /// Recycled records, so steady-state retirement allocates nothing.
    spare: RefCell<Vec<Box<RetireRecord>>>,
    /// Snapshot scratch space reused across collect cycles.
    scratch: RefCell<HashSet<usize, FoldState>>,
}

impl Reclaimer {
    fn new() -> Self {
        let registry = registry::global();
        Self {
            slots: std::array::from_fn(|_| registry.acquire()),
            retired: RefCell::new(HashMap::default()),
            spare: RefCell::new(Vec::new()),
            scratch: RefCell::new(HashSet::default()),
        }
    }

    #[inline]
    fn mark_hazard(&self, index: usize, ptr: usize) {
        debug_assert!(index < HAZARDS_PER_THREAD);
        self.slots[index].set(ptr);
    }

    #[inline]
    fn get_hazard(&self, index: usize) -> usize {
        debug_assert!(index < HAZARDS_PER_THREAD);
        self.slots[index].get()
    }

    fn retire(&self, ptr: usize, drop_fn: DropFn) {
        let record = match self.spare.borrow_mut().pop() {
            Some(mut record) => {
                record.reset(ptr, drop_fn);
                record
            }
            None => RetireRecord::new(ptr, drop_fn),
        };
        let prev = self.retired.borrow_mut().insert(ptr, record);
        debug_assert!(prev.is_none(), "pointer retired twice");
    }

    /// Free every retired pointer no slot currently publishes. Unless
    /// `force`, returns early below the threshold so reclamation stays
    /// amortized O(1) per retire.
    fn collect(&self, force: bool) {
        let registry = registry::global();
        let drained = {
            let mut retired = self.retired.borrow_mut();
            let threshold = RECLAIM_THRESHOLD_MULTIPLIER * registry.len() as f32;
            if !force && (retired.len() as f32) < threshold {
                return;
            }
            std::mem::take(&mut *retired)
        };

        let mut live = self.scratch.take();
        registry.snapshot(&mut live);

        // Borrows are re-taken per record: a destructor is free to retire
        // further pointers through this same reclaimer.
        for (ptr, record) in drained {
            if live.contains(&ptr) {
                self.retired.borrow_mut().insert(ptr, record);
            } else {
                // SAFETY: `ptr` was handed to `retire` with exclusive
                // ownership and no slot publishes it in the snapshot taken
                // after it became unreachable.
                unsafe { (record.drop_fn)(ptr as *mut u8) };
                self.spare.borrow_mut().push(record);
            }
        }

        *self.scratch.borrow_mut() = live;
    }

    fn retired_len(&self) -> usize {
        self.retired.borrow().len()
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        let registry = registry::global();

        // Hand the slots back first; our own slots can no longer pin our own
        // retired pointers, and other threads may reuse them immediately.
        for slot in self.slots {
            registry.release(slot);
        }

        // Drain the retire map. A pointer we retired can still be published
        // by another thread's slot, so wait each one out.
        for (ptr, record) in self.retired.get_mut().drain() {
            while registry.is_hazard(ptr) {
                std::thread::yield_now();
            }
            // SAFETY: ownership was transferred at retire time and no slot
            // publishes the pointer any more.
            unsafe { (record.drop_fn)(ptr as *mut u8) };
        }
    }
}

thread_local! {
    static RECLAIMER: Reclaimer = Reclaimer::new();
}

/// Publish `ptr` in hazard slot `index` of the calling thread.
///
/// A published pointer is never freed by any reclaimer until the slot is
/// overwritten or cleared. Callers must re-validate the source location after
/// publishing: the publish only protects a pointer that is still reachable.
#[inline]
pub fn protect(index: usize, ptr: *mut u8) {
    // During thread teardown TLS may already be destroyed; there is nothing
    // left on this thread that could dereference the pointer then.
    let _ = RECLAIMER.try_with(|r| r.mark_hazard(index, ptr as usize));
}

/// Read back the pointer currently published in slot `index`.
#[inline]
pub fn protected(index: usize) -> *mut u8 {
    RECLAIMER
        .try_with(|r| r.get_hazard(index) as *mut u8)
        .unwrap_or(std::ptr::null_mut())
}

/// Clear hazard slot `index`.
#[inline]
pub fn clear(index: usize) {
    protect(index, std::ptr::null_mut());
}

/// Hand a no-longer-reachable pointer to the reclaimer.
///
/// The pointer stays alive until a later [`collect`] (or thread exit) proves
/// no hazard slot publishes it, then `drop_fn` runs exactly once.
///
/// # Safety
///
/// - `ptr` must be owned by the caller and unreachable for new readers (only
///   threads that already published it may still dereference it).
/// - `ptr` must not be retired twice.
/// - `drop_fn` must be valid for `ptr`, and the caller must not access `*ptr`
///   after this call.
#[inline]
pub unsafe fn retire(ptr: *mut u8, drop_fn: DropFn) {
    // During thread teardown TLS may already be destroyed. Leak the pointer;
    // process memory is reclaimed by the OS on exit.
    let _ = RECLAIMER.try_with(|r| r.retire(ptr as usize, drop_fn));
}

/// Retire a pointer obtained from [`Box::into_raw`], dropping the box once no
/// hazard slot publishes it.
///
/// # Safety
///
/// Same contract as [`retire`], and `ptr` must have come from
/// `Box::into_raw::<T>`.
#[inline]
pub unsafe fn retire_boxed<T: 'static>(ptr: *mut T) {
    unsafe fn drop_box<T>(ptr: *mut u8) {
        // SAFETY: `retire_boxed` is only called with a `Box::into_raw::<T>`
        // pointer, and the reclaimer invokes this exactly once.
        unsafe { drop(Box::from_raw(ptr as *mut T)) };
    }
    // SAFETY: forwarded caller contract.
    unsafe { retire(ptr as *mut u8, drop_box::<T>) };
}

/// Scan the registry and free every retired pointer no slot publishes.
///
/// Cheap to call after every retirement: it returns immediately unless the
/// calling thread's retire map has reached the reclamation threshold.
#[inline]
pub fn collect() {
    let _ = RECLAIMER.try_with(|r| r.collect(false));
}

/// Scan unconditionally, ignoring the reclamation threshold.
///
/// Frees every pointer this thread has retired that no slot currently
/// publishes. Pointers still published elsewhere stay queued; they are picked
/// up by a later scan or by thread exit. Useful before tearing down a data
/// structure or at the end of a test.
pub fn flush() {
    let _ = RECLAIMER.try_with(|r| r.collect(true));
}

/// Number of hazard slots ever allocated in the process.
pub fn hazard_count() -> usize {
    registry::global().len()
}

/// Number of pointers the calling thread has retired but not yet freed.
pub fn retired_count() -> usize {
    RECLAIMER.try_with(|r| r.retired_len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protect_roundtrip() {
        let ptr = 0x1000 as *mut u8;
        protect(0, ptr);
        assert_eq!(protected(0), ptr);
        clear(0);
        assert!(protected(0).is_null());
    }

    #[test]
    fn collect_below_threshold_is_a_no_op() {
        let before = retired_count();
        unsafe { retire_boxed(Box::into_raw(Box::new(7u32))) };
        assert_eq!(retired_count(), before + 1);
        // One retirement cannot reach the threshold: this thread alone holds
        // three slots, so the bar is at least 3 * 4.25 entries.
        collect();
        assert_eq!(retired_count(), before + 1);
    }
}
