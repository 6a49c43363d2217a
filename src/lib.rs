//! Petek: hazard-pointer memory reclamation for lock-free data structures.
//!
//! Petek implements Michael's hazard-pointer scheme: a reader publishes the
//! address it is about to dereference into one of its thread-local slots, and
//! any thread that wants to free that address defers the free until no slot
//! anywhere in the process holds it.
//!
//! # Key properties
//!
//! - **Publish-before-dereference**: a pointer published in a slot is never
//!   freed while the slot holds it
//! - **Lock-free retirement**: retiring a pointer is a thread-local append;
//!   no thread ever blocks another
//! - **Amortized O(1) reclamation**: scans run only once the retire list
//!   outgrows a multiple of the slot count
//! - **Process-lifetime slots**: hazard slots are allocated once and recycled
//!   across threads, never deallocated
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicPtr, Ordering};
//!
//! let shared = AtomicPtr::new(Box::into_raw(Box::new(42u64)));
//!
//! // Reader: publish before dereferencing, re-validate after.
//! let ptr = shared.load(Ordering::Acquire);
//! petek::protect(0, ptr.cast());
//! if shared.load(Ordering::Acquire) == ptr {
//!     let value = unsafe { *ptr };
//!     assert_eq!(value, 42);
//! }
//! petek::clear(0);
//!
//! // Writer: detach, then hand the node to the reclaimer.
//! let old = shared.swap(std::ptr::null_mut(), Ordering::AcqRel);
//! unsafe { petek::retire_boxed(old) };
//! petek::collect();
//! ```

#![warn(missing_docs)]

mod reclaimer;
mod registry;
mod retired;

pub use reclaimer::{
    clear, collect, flush, hazard_count, protect, protected, retire, retire_boxed, retired_count,
    HAZARDS_PER_THREAD,
};
pub use retired::DropFn;
