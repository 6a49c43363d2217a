//! Lock-free split-ordered hash map with hazard-pointer reclamation.
//!
//! All entries live in one singly-linked list sorted by bit-reversed hash
//! (Shalev–Shavit split ordering); buckets are dummy nodes marking entry
//! points into it. Doubling the table adds entry points — data never moves.
//! The list itself is Harris' ordered list: logical deletion tags the
//! outgoing edge, physical unlink swings the predecessor past the victim, and
//! [petek](petek) hazard pointers keep readers safe from reclamation.
//!
//! # Guarantees
//!
//! - **Lock-free**: no operation ever blocks another; some operation
//!   completes whenever CASes are being won
//! - **Last-writer-wins** value replacement on duplicate insert
//! - **Pause-free growth**: the bucket count doubles in a single CAS while
//!   queries and mutations continue
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use petek_map::SplitOrderedMap;
//!
//! let map = Arc::new(SplitOrderedMap::new());
//! let handles: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 0..100u64 {
//!                 map.insert(t * 100 + i, i);
//!             }
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! assert_eq!(map.len(), 400);
//! ```

#![warn(missing_docs)]

mod bitrev;
mod list;
mod map;
mod node;
mod segment;

pub use map::{InsertOutcome, SplitOrderedMap};
