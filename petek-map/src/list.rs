//! Sorted lock-free linked list (Harris' algorithm with hazard pointers).
//!
//! A single singly-linked list of all entries, sorted ascending by
//! `(reverse_hash, key)`. Deletion is two-phase: the victim's *outgoing*
//! `next` pointer is tagged in its low bit (logical delete), then the
//! predecessor's `next` is CAS-swung past it (physical unlink). Every
//! traversal helps complete unlinks it encounters and hands the unlinked node
//! to the reclaimer.
//!
//! Hazard discipline across every suspension point: slot 0 protects `cur`,
//! slot 1 protects `prev`, and slot 2 is scratch so both stay published while
//! the slots rotate on advance. Whoever wins the physical-unlink CAS retires
//! the victim and decrements `size`, so the count moves exactly once per
//! removal no matter which thread finishes the job.

use std::borrow::Borrow;
use std::cmp::Ordering as CmpOrdering;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::map::InsertOutcome;
use crate::node::{drop_node, drop_value, read_value, Node, NodeKind};

/// Hazard slot indices. `petek` hands every thread exactly three.
pub(crate) const HP_CUR: usize = 0;
pub(crate) const HP_PREV: usize = 1;
pub(crate) const HP_SPARE: usize = 2;

const MARK: usize = 1;

#[inline]
fn is_marked(p: usize) -> bool {
    p & MARK != 0
}

#[inline]
fn marked(p: usize) -> usize {
    p | MARK
}

#[inline]
fn unmarked(p: usize) -> usize {
    p & !MARK
}

/// What a traversal is looking for: a sort key, plus the key itself when the
/// target is a regular node. Dummy targets carry no key; two dummies with
/// equal sort keys are the same bucket.
pub(crate) struct Probe<'a, Q: ?Sized> {
    pub(crate) reverse_hash: u64,
    pub(crate) key: Option<&'a Q>,
}

/// A `(prev, cur)` witness returned by `search`: `prev` precedes `cur`, and
/// `cur` is null or the first node whose sort position is `>=` the probe.
/// Both pointers are hazard-protected by the calling thread on return.
pub(crate) struct Window<K, V> {
    pub(crate) prev: *mut Node<K, V>,
    pub(crate) cur: *mut Node<K, V>,
}

#[inline]
fn probe_cmp<K, V, Q>(node: &Node<K, V>, probe: &Probe<'_, Q>) -> CmpOrdering
where
    K: Borrow<Q>,
    Q: Ord + ?Sized,
{
    match node.reverse_hash.cmp(&probe.reverse_hash) {
        CmpOrdering::Equal => match (&node.kind, probe.key) {
            (NodeKind::Regular { key, .. }, Some(probe_key)) => key.borrow().cmp(probe_key),
            // Equal sort keys with a dummy on either side can only be
            // dummy-vs-dummy: the variant bit lives in the sort key.
            _ => {
                debug_assert!(node.is_dummy() && probe.key.is_none());
                CmpOrdering::Equal
            }
        },
        ord => ord,
    }
}

/// Clear every hazard slot this thread holds. Called on return from each
/// public list operation.
#[inline]
pub(crate) fn clear_hazards() {
    petek::clear(HP_CUR);
    petek::clear(HP_PREV);
    petek::clear(HP_SPARE);
}

/// The sorted list. Owns the count of regular nodes; bucket heads into the
/// list are owned by the table's bucket directory.
pub(crate) struct OrderedList<K, V> {
    size: AtomicUsize,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> OrderedList<K, V>
where
    K: Ord + 'static,
    V: 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            size: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Traverse from `head` until null or the first node `>=` the probe.
    ///
    /// Returns the window plus whether `cur` equals the probe. Helps complete
    /// any logical deletion encountered on the way: the marked node is
    /// unlinked, retired, and counted out here. Restarts from `head` whenever
    /// a validation read shows `prev` no longer points at `cur`.
    pub(crate) fn search<Q>(&self, head: *mut Node<K, V>, probe: &Probe<'_, Q>) -> (Window<K, V>, bool)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        'restart: loop {
            let mut prev = head;
            // `head` is a dummy and dummies are never deleted, so this load
            // carries no mark.
            let mut cur = unsafe { &*prev }.next.load(Ordering::Acquire);
            loop {
                petek::protect(HP_CUR, cur as *mut u8);
                // `cur` is only safely published if `prev` still points at
                // it; otherwise it may already be retired.
                if unsafe { &*prev }.next.load(Ordering::Acquire) != cur {
                    continue 'restart;
                }

                if cur == 0 {
                    return (
                        Window {
                            prev,
                            cur: ptr::null_mut(),
                        },
                        false,
                    );
                }

                let cur_node = unsafe { &*(cur as *mut Node<K, V>) };
                let next = cur_node.next.load(Ordering::Acquire);

                if is_marked(next) {
                    // Help finish the deletion: swing prev past cur.
                    if unsafe { &*prev }
                        .next
                        .compare_exchange(cur, unmarked(next), Ordering::Release, Ordering::Acquire)
                        .is_err()
                    {
                        continue 'restart;
                    }
                    self.size.fetch_sub(1, Ordering::Release);
                    // SAFETY: the unlink CAS succeeded, so this thread is the
                    // unique owner of the victim; readers that still hold it
                    // have it published.
                    unsafe { petek::retire(cur as *mut u8, drop_node::<K, V>) };
                    petek::collect();
                    cur = unmarked(next);
                    continue;
                }

                if unsafe { &*prev }.next.load(Ordering::Acquire) != cur {
                    continue 'restart;
                }

                match probe_cmp(cur_node, probe) {
                    CmpOrdering::Less => {
                        // Advance. Rotate the slots through the scratch slot
                        // so the node becoming `prev` stays published the
                        // whole time.
                        let hp_cur = petek::protected(HP_CUR);
                        let hp_prev = petek::protected(HP_PREV);
                        petek::protect(HP_SPARE, hp_cur);
                        petek::protect(HP_CUR, hp_prev);
                        petek::protect(HP_PREV, hp_cur);
                        petek::clear(HP_SPARE);

                        prev = cur as *mut Node<K, V>;
                        cur = next;
                    }
                    ord => {
                        return (
                            Window {
                                prev,
                                cur: cur as *mut Node<K, V>,
                            },
                            ord == CmpOrdering::Equal,
                        );
                    }
                }
            }
        }
    }

    /// Insert a regular node, or replace the value of an existing node with
    /// the same key. Returns the outcome plus the size observed after a
    /// successful insert (0 on replace, where the size does not move).
    pub(crate) fn insert_regular(
        &self,
        head: *mut Node<K, V>,
        new_node: Box<Node<K, V>>,
    ) -> (InsertOutcome, usize) {
        let node_ptr = Box::into_raw(new_node);
        let node_ref = unsafe { &*node_ptr };
        let probe = Probe {
            reverse_hash: node_ref.reverse_hash,
            key: Some(node_ref.key()),
        };

        loop {
            let (window, found) = self.search(head, &probe);
            if found {
                // Same key already present: swap the value pointer on the
                // existing node and retire the displaced value. Readers may
                // still be cloning it; the reclaimer waits them out.
                let cur = unsafe { &*window.cur };
                let new_value = node_ref.value().swap(ptr::null_mut(), Ordering::AcqRel);
                let old_value = cur.value().swap(new_value, Ordering::AcqRel);
                // SAFETY: the swap detached `old_value` from the node; no new
                // reader can reach it.
                unsafe { petek::retire(old_value as *mut u8, drop_value::<V>) };
                petek::collect();
                // SAFETY: our node never entered the list and its value was
                // detached above.
                unsafe { drop(Box::from_raw(node_ptr)) };
                clear_hazards();
                return (InsertOutcome::Replaced, 0);
            }

            node_ref.next.store(window.cur as usize, Ordering::Release);
            if unsafe { &*window.prev }
                .next
                .compare_exchange_weak(
                    window.cur as usize,
                    node_ptr as usize,
                    Ordering::Release,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                clear_hazards();
                let size = self.size.fetch_add(1, Ordering::Release) + 1;
                return (InsertOutcome::Inserted, size);
            }
        }
    }

    /// Insert a bucket's dummy node starting from its parent bucket's head.
    ///
    /// On collision (another thread already linked a dummy for this bucket)
    /// the caller's node is discarded and the observed one adopted, so every
    /// bucket has exactly one dummy in the list.
    pub(crate) fn insert_dummy(
        &self,
        parent_head: *mut Node<K, V>,
        dummy: Box<Node<K, V>>,
    ) -> Result<*mut Node<K, V>, *mut Node<K, V>> {
        let node_ptr = Box::into_raw(dummy);
        let probe: Probe<'_, K> = Probe {
            reverse_hash: unsafe { &*node_ptr }.reverse_hash,
            key: None,
        };

        loop {
            let (window, found) = self.search(parent_head, &probe);
            if found {
                debug_assert!(unsafe { &*window.cur }.is_dummy());
                // SAFETY: our node never entered the list.
                unsafe { drop(Box::from_raw(node_ptr)) };
                clear_hazards();
                return Err(window.cur);
            }

            unsafe { &*node_ptr }
                .next
                .store(window.cur as usize, Ordering::Release);
            if unsafe { &*window.prev }
                .next
                .compare_exchange_weak(
                    window.cur as usize,
                    node_ptr as usize,
                    Ordering::Release,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                clear_hazards();
                return Ok(node_ptr);
            }
        }
    }

    /// Remove the node matching the probe. Marks the victim's outgoing edge,
    /// then unlinks it; if the unlink CAS loses, a re-search finishes the job
    /// on this or some other thread.
    pub(crate) fn delete<Q>(&self, head: *mut Node<K, V>, probe: &Probe<'_, Q>) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        loop {
            let (window, found) = self.search(head, probe);
            if !found {
                clear_hazards();
                return false;
            }

            let cur = unsafe { &*window.cur };
            let next = cur.next.load(Ordering::Acquire);
            if is_marked(next) {
                // Another deleter got here first; the re-search will help
                // unlink and then report the key gone.
                continue;
            }

            // Logical delete: tag the outgoing edge.
            if cur
                .next
                .compare_exchange_weak(next, marked(next), Ordering::Release, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            // Physical unlink. Losing the CAS is fine: some traversal will
            // complete it, and that traversal does the retire and the count.
            if unsafe { &*window.prev }
                .next
                .compare_exchange(window.cur as usize, next, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                self.size.fetch_sub(1, Ordering::Release);
                // SAFETY: unlinked by this CAS; ownership passes to the
                // reclaimer.
                unsafe { petek::retire(window.cur as *mut u8, drop_node::<K, V>) };
                petek::collect();
            } else {
                let _ = self.search(head, probe);
            }

            clear_hazards();
            return true;
        }
    }

    /// Look up the probe and clone its value under hazard protection.
    pub(crate) fn find<Q>(&self, head: *mut Node<K, V>, probe: &Probe<'_, Q>) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Clone,
    {
        let (window, found) = self.search(head, probe);
        let result = if found {
            let cur = unsafe { &*window.cur };
            Some(read_value(cur.value(), HP_SPARE))
        } else {
            None
        };
        clear_hazards();
        result
    }

    /// Presence check without touching the value.
    pub(crate) fn contains<Q>(&self, head: *mut Node<K, V>, probe: &Probe<'_, Q>) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (_, found) = self.search(head, probe);
        clear_hazards();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_helpers() {
        let p = 0x1000usize;
        assert!(!is_marked(p));
        assert!(is_marked(marked(p)));
        assert_eq!(unmarked(marked(p)), p);
        assert_eq!(marked(marked(p)), marked(p));
    }
}
