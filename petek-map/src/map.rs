//! Lock-free split-ordered hash map.
//!
//! The Shalev–Shavit construction: all entries live in one list sorted by
//! bit-reversed hash, and buckets are just entry points into that list,
//! realised as dummy nodes. Growing the table never moves a single entry —
//! it only doubles the bucket count, and each new bucket lazily splits its
//! parent by linking one more dummy into the list. Insert, lookup and delete
//! are lock-free end to end; memory is reclaimed through petek hazard
//! pointers.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::list::{OrderedList, Probe};
use crate::node::{Node, REGULAR_TAG};
use crate::segment::{BucketDir, MAX_POWER};
use crate::bitrev;

/// Grow once the entry count exceeds this fraction of the bucket count.
const LOAD_FACTOR: f32 = 0.5;

/// What an insert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was new; the map holds one more entry.
    Inserted,
    /// The key was present; its value was replaced, last writer wins.
    Replaced,
}

/// A concurrent hash map that can be inserted into, queried and deleted from
/// by any number of threads without ever holding a lock.
///
/// # Examples
///
/// ```
/// use petek_map::SplitOrderedMap;
///
/// let map = SplitOrderedMap::new();
/// map.insert(1, "one");
/// assert_eq!(map.get(&1), Some("one"));
/// assert!(map.remove(&1));
/// assert!(map.get(&1).is_none());
/// ```
pub struct SplitOrderedMap<K, V, S = RandomState> {
    /// Current bucket count is `1 << power_of_2`.
    power_of_2: AtomicUsize,
    list: OrderedList<K, V>,
    dir: BucketDir<K, V>,
    hasher: S,
}

impl<K, V> SplitOrderedMap<K, V, RandomState>
where
    K: Hash + Ord + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty map with a randomly seeded hasher.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V> Default for SplitOrderedMap<K, V, RandomState>
where
    K: Hash + Ord + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> SplitOrderedMap<K, V, S>
where
    K: Hash + Ord + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher,
{
    /// Create an empty map using `hasher` to hash keys.
    pub fn with_hasher(hasher: S) -> Self {
        let map = Self {
            power_of_2: AtomicUsize::new(1),
            list: OrderedList::new(),
            dir: BucketDir::new(),
            hasher,
        };
        // Bucket 0's dummy anchors the whole list and is installed eagerly;
        // every other bucket chains back to it through its parents.
        let head = Box::into_raw(Node::dummy(0));
        map.dir.head_slot(0).store(head, Ordering::Release);
        map
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// True when the map holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current number of buckets. Non-decreasing over the map's lifetime.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        1 << self.power_of_2.load(Ordering::Acquire)
    }

    /// The hasher this map was built with.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Insert `value` under `key`, replacing (last-writer-wins) any value the
    /// key already maps to. May double the bucket count.
    pub fn insert(&self, key: K, value: V) -> InsertOutcome {
        let hash = self.hasher.hash_one(&key);
        let node = Node::regular(hash, key, value);
        let head = self.bucket_head(hash);
        let (outcome, size) = self.list.insert_regular(head, node);
        if outcome == InsertOutcome::Inserted {
            self.try_grow(size);
        }
        outcome
    }

    /// Clone out the value under `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Ord + ?Sized,
        V: Clone,
    {
        let hash = self.hasher.hash_one(key);
        let head = self.bucket_head(hash);
        let probe = Self::probe(hash, key);
        self.list.find(head, &probe)
    }

    /// True if `key` is present. Does not touch the value.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Ord + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let head = self.bucket_head(hash);
        let probe = Self::probe(hash, key);
        self.list.contains(head, &probe)
    }

    /// Remove `key`. Returns whether an entry was removed; removing an absent
    /// key is a no-op.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Ord + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let head = self.bucket_head(hash);
        let probe = Self::probe(hash, key);
        self.list.delete(head, &probe)
    }

    #[inline]
    fn probe<Q: ?Sized>(hash: u64, key: &Q) -> Probe<'_, Q> {
        Probe {
            reverse_hash: bitrev::reverse(hash | REGULAR_TAG),
            key: Some(key),
        }
    }

    /// Bucket head for `hash`, initialising the bucket on first touch.
    fn bucket_head(&self, hash: u64) -> *mut Node<K, V> {
        let bucket = (hash as usize) & (self.bucket_count() - 1);
        let head = self.dir.lookup(bucket);
        if head.is_null() {
            self.init_bucket(bucket)
        } else {
            head
        }
    }

    /// Install the dummy node for `bucket`: make sure the parent bucket
    /// exists, link a dummy into the list starting from the parent's head,
    /// and publish it in the directory. Concurrent initialisers race on the
    /// list insert; the loser adopts the winner's dummy.
    fn init_bucket(&self, bucket: usize) -> *mut Node<K, V> {
        debug_assert!(bucket > 0, "bucket 0 is installed at construction");
        let parent = parent_bucket(bucket);
        let mut parent_head = self.dir.lookup(parent);
        if parent_head.is_null() {
            parent_head = self.init_bucket(parent);
        }
        debug_assert!(unsafe { &*parent_head }.is_dummy());

        let slot = self.dir.head_slot(bucket);
        let head = slot.load(Ordering::Acquire);
        if !head.is_null() {
            return head;
        }

        let dummy = Node::dummy(bucket as u64);
        match self.list.insert_dummy(parent_head, dummy) {
            Ok(node) => {
                // Only the list-insert winner publishes, so the slot is
                // written once.
                slot.store(node, Ordering::Release);
                node
            }
            Err(existing) => {
                debug_assert_eq!(unsafe { &*existing }.hash, bucket as u64);
                existing
            }
        }
    }

    /// After a successful insert: double the bucket count if the load factor
    /// is exceeded. Only one of any set of concurrent growers wins the CAS;
    /// the rest observe the new power. Bucket allocation stays lazy.
    fn try_grow(&self, size: usize) {
        let power = self.power_of_2.load(Ordering::Acquire);
        if power < MAX_POWER && ((1usize << power) as f32) * LOAD_FACTOR < size as f32 {
            let _ = self.power_of_2.compare_exchange(
                power,
                power + 1,
                Ordering::Release,
                Ordering::Relaxed,
            );
        }
    }
}

// SAFETY: all shared mutation goes through atomics; keys and values cross
// threads both by reference (readers) and by ownership (the reclaimer drops
// them on whichever thread frees the node).
unsafe impl<K, V, S> Send for SplitOrderedMap<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Send,
{
}

// SAFETY: as above.
unsafe impl<K, V, S> Sync for SplitOrderedMap<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Sync,
{
}

impl<K, V, S> Drop for SplitOrderedMap<K, V, S> {
    fn drop(&mut self) {
        // Exclusive access: walk the whole list from the bucket-0 anchor and
        // free every node still linked, marked or not. Nodes already retired
        // are owned by some thread's reclaimer, not by this chain.
        let mut cur = self.dir.lookup(0);
        while !cur.is_null() {
            // SAFETY: nodes in the chain are exclusively ours now.
            let node = unsafe { Box::from_raw(cur) };
            cur = (node.next.load(Ordering::Relaxed) & !1) as *mut Node<K, V>;
        }
        // The directory's own drop frees the segment and bucket arrays.
    }
}

/// Parent of `bucket`: the index with its most significant set bit cleared.
/// When the table doubles from `2^k` to `2^(k+1)` buckets, bucket
/// `b + 2^k` takes over part of bucket `b`'s chain; the parent is always
/// initialised first.
#[inline]
fn parent_bucket(bucket: usize) -> usize {
    debug_assert!(bucket > 0);
    bucket & !(1usize << (usize::BITS - 1 - bucket.leading_zeros()))
}
