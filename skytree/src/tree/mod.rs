/*
 * Created on Thu Jan 09 2025
 *
 * This file is a part of Skytree
 * Skytree is an ordered, thread-safe in-memory index developed by
 * Sayan Nandan ("the Author") with the vision to provide a concurrent
 * B+ tree that does not trade away correctness for scalability.
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The Skytree index
//!
//! A B+ tree in which every node carries its own reader-writer lock;
//! there is no tree-wide lock. Reads descend hand-over-hand (the child
//! is locked before the parent is released, never more than two locks
//! held). Writes descend the same way but hold on to the locks of the
//! ancestors a split or merge could still propagate into, releasing
//! everything above a node that is guaranteed to absorb the change.
//! Leaves are chained left-to-right, which gives ordered range scans
//! without touching the upper tree.
//!
//! The lock protocol keeps every multi-node acquisition either
//! top-down (descents, back-pointer rewrites) or left-to-right (leaf
//! chain hand-offs, sibling pairs during rebalancing), so no cycle of
//! waiters can form.

pub mod bref;
pub mod iter;
mod node;

use self::bref::{Ref, RefMut};
use self::iter::{Iter, Range};
use self::node::{InternalNode, LeafNode, Node, NodeRef, Record, ReadGuard, WriteGuard};
use crate::error::TreeError;
use crate::ord::{Comparator, NaturalOrder};
use core::cmp::Ordering;
use core::fmt;
use core::mem;
use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering::Relaxed;
use log::trace;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// The default branching factor. 32 children per routing node keeps the
/// tree shallow without making node shifts on insert/remove expensive
pub const DEFAULT_ORDER: usize = 32;
/// The smallest legal branching factor
const MIN_ORDER: usize = 3;

/// What a write descent is about to do. Decides when an ancestor's lock
/// can be released early
#[derive(Clone, Copy, PartialEq)]
enum WritePass {
    /// adding a key: a node is safe if it has room for one more
    Insert,
    /// removing a key: a node is safe if it is above its occupancy
    /// minimum
    Remove,
}

/// An ordered, thread-safe in-memory index: a B+ tree mapping keys to
/// single values (duplicates are rejected).
///
/// The three type parameters are the key, the value, and the comparator
/// supplying the total order over keys ([`NaturalOrder`] when `K: Ord`).
/// The branching factor (`order`) is fixed at construction: nodes hold
/// at most `order - 1` keys, non-root leaves at least `⌈(order-1)/2⌉`,
/// non-root routing nodes at least `⌈order/2⌉ - 1`.
///
/// All operations take `&self` and are safe to call from any number of
/// threads. Readers never exclude other readers; writers exclude only
/// on the nodes they actually touch
pub struct Skytree<K, V, C = NaturalOrder> {
    /// the root handle. Swapped only while the outgoing root's write
    /// lock is held; descents re-check it after locking the root node
    root: RwLock<NodeRef<K, V>>,
    order: usize,
    cmp: C,
    len: AtomicUsize,
}

impl<K, V, C> Skytree<K, V, C> {
    fn build(order: usize, cmp: C) -> Self {
        Self {
            root: RwLock::new(node::new_ref(Node::Leaf(LeafNode::empty(order)))),
            order,
            cmp,
            len: AtomicUsize::new(0),
        }
    }
    /// The configured branching factor
    pub const fn order(&self) -> usize {
        self.order
    }
    pub(crate) const fn comparator(&self) -> &C {
        &self.cmp
    }
    /// Number of stored entries. Exact on a quiesced tree; a momentary
    /// figure under concurrent writes
    pub fn len(&self) -> usize {
        self.len.load(Relaxed)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    const fn max_keys(&self) -> usize {
        self.order - 1
    }
    /// minimum keys in a non-root leaf: ⌈(order - 1) / 2⌉
    const fn min_leaf_keys(&self) -> usize {
        self.order / 2
    }
    /// minimum keys in a non-root internal node: ⌈order / 2⌉ - 1
    const fn min_internal_keys(&self) -> usize {
        (self.order - 1) / 2
    }

    /// Lock the root node for reading. A root split or demotion swaps
    /// the handle under the outgoing root's write lock, so after taking
    /// the node lock we confirm the handle still points at it and retry
    /// if the swap won the race
    fn lock_root_read(&self) -> ReadGuard<K, V> {
        loop {
            let root = Arc::clone(&*self.root.read());
            let guard = root.read_arc();
            if Arc::ptr_eq(&*self.root.read(), &root) {
                return guard;
            }
        }
    }
    fn lock_root_write(&self) -> WriteGuard<K, V> {
        loop {
            let root = Arc::clone(&*self.root.read());
            let guard = root.write_arc();
            if Arc::ptr_eq(&*self.root.read(), &root) {
                return guard;
            }
        }
    }

    /// Read-lock the leftmost leaf via hand-over-hand descent
    fn descend_read_leftmost(&self) -> ReadGuard<K, V> {
        let mut guard = self.lock_root_read();
        loop {
            let child = match &*guard {
                Node::Leaf(_) => None,
                Node::Internal(node) => Some(Arc::clone(&node.children[0])),
            };
            match child {
                // the child is locked before the parent guard drops
                Some(child) => guard = child.read_arc(),
                None => return guard,
            }
        }
    }

    /// Levels between the root and the leaves; 1 for a lone leaf root
    pub fn height(&self) -> usize {
        let mut levels = 1;
        let mut guard = self.lock_root_read();
        loop {
            let child = match &*guard {
                Node::Leaf(_) => None,
                Node::Internal(node) => Some(Arc::clone(&node.children[0])),
            };
            match child {
                Some(child) => {
                    levels += 1;
                    guard = child.read_arc();
                }
                None => return levels,
            }
        }
    }

    /// Full ascending scan, leftmost leaf onwards
    pub fn iter(&self) -> Iter<'_, K, V, C> {
        let guard = self.descend_read_leftmost();
        Iter::begin(self, guard)
    }

    /// Drop every entry, leaving an empty leaf root. Takes `&mut self`:
    /// exclusive access makes this trivially race-free
    pub fn clear(&mut self) {
        *self.root.get_mut() = node::new_ref(Node::Leaf(LeafNode::empty(self.order)));
        *self.len.get_mut() = 0;
    }
}

impl<K, V, C: Comparator<K> + Default> Skytree<K, V, C> {
    /// A tree with the default branching factor
    pub fn new() -> Self {
        Self::build(DEFAULT_ORDER, C::default())
    }
    /// A tree with the given branching factor
    pub fn with_order(order: usize) -> Result<Self, TreeError> {
        Self::with_order_and_comparator(order, C::default())
    }
}

impl<K: Ord, V> Default for Skytree<K, V, NaturalOrder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C: Comparator<K>> Skytree<K, V, C> {
    /// A tree with the given branching factor and comparator. The
    /// comparator instance is consulted for every key comparison the
    /// tree ever makes
    pub fn with_order_and_comparator(order: usize, cmp: C) -> Result<Self, TreeError> {
        if order < MIN_ORDER {
            return Err(TreeError::BadOrder(order));
        }
        Ok(Self::build(order, cmp))
    }

    /// Hand-over-hand read descent to the unique leaf whose key range
    /// contains `key`. At most two node locks are held at any point
    fn descend_read(&self, key: &K) -> ReadGuard<K, V> {
        let mut guard = self.lock_root_read();
        loop {
            let child = match &*guard {
                Node::Leaf(_) => None,
                Node::Internal(node) => {
                    Some(Arc::clone(&node.children[node.child_index(&self.cmp, key)]))
                }
            };
            match child {
                Some(child) => guard = child.read_arc(),
                None => return guard,
            }
        }
    }

    /// Whether a structural change in a child of this node stays
    /// contained, allowing every lock above it to be released
    fn is_safe(&self, node: &Node<K, V>, pass: WritePass) -> bool {
        match pass {
            WritePass::Insert => node.key_count() < self.max_keys(),
            WritePass::Remove => {
                let min = if node.is_leaf() {
                    self.min_leaf_keys()
                } else {
                    self.min_internal_keys()
                };
                node.key_count() > min
            }
        }
    }

    /// Write descent with lock coupling. Walks down under write locks,
    /// dropping all retained ancestors as soon as a freshly locked
    /// child is safe for this pass. What remains on return is exactly
    /// the chain a split or merge will propagate through (possibly
    /// empty), plus the target leaf's guard
    fn descend_write(&self, key: &K, pass: WritePass) -> (Vec<WriteGuard<K, V>>, WriteGuard<K, V>) {
        let mut ancestors: Vec<WriteGuard<K, V>> = Vec::new();
        let mut guard = self.lock_root_write();
        loop {
            let child = match &*guard {
                Node::Leaf(_) => None,
                Node::Internal(node) => {
                    Some(Arc::clone(&node.children[node.child_index(&self.cmp, key)]))
                }
            };
            let child = match child {
                Some(child) => child,
                None => return (ancestors, guard),
            };
            let child_guard = child.write_arc();
            ancestors.push(guard);
            if self.is_safe(&child_guard, pass) {
                // nothing below can cascade past this child
                ancestors.clear();
            }
            guard = child_guard;
        }
    }

    /// Point lookup. The returned handle keeps the leaf read-locked, so
    /// the value cannot be removed while it is held; concurrent readers
    /// of the same leaf are unaffected
    pub fn get(&self, key: &K) -> Option<Ref<'_, K, V>> {
        let guard = self.descend_read(key);
        match guard.as_leaf().search(&self.cmp, key) {
            Ok(idx) => Some(Ref::new(guard, idx)),
            Err(_) => None,
        }
    }

    /// Point lookup with in-place update access. Write-locks the leaf
    pub fn get_mut(&self, key: &K) -> Option<RefMut<'_, K, V>> {
        let mut guard = self.lock_root_write();
        loop {
            let child = match &*guard {
                Node::Leaf(_) => None,
                Node::Internal(node) => {
                    Some(Arc::clone(&node.children[node.child_index(&self.cmp, key)]))
                }
            };
            match child {
                Some(child) => guard = child.write_arc(),
                None => break,
            }
        }
        match guard.as_leaf().search(&self.cmp, key) {
            Ok(idx) => Some(RefMut::new(guard, idx)),
            Err(_) => None,
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Ordered scan over `[lo, hi]`, both ends inclusive. An inverted
    /// range (`lo > hi` under the comparator) is empty. Bound the yield
    /// count with [`Iterator::take`]
    pub fn range<'t, 'q>(&'t self, lo: &K, hi: &'q K) -> Range<'t, 'q, K, V, C> {
        if self.cmp.compare(lo, hi) == Ordering::Greater {
            return Range::exhausted(self, hi);
        }
        let guard = self.descend_read(lo);
        let at = guard.as_leaf().lower_bound(&self.cmp, lo);
        Range::begin(self, hi, guard, at)
    }

    /// Insert `key → value`. The tree takes ownership of both iff the
    /// key was absent; on a duplicate the untouched pair is handed back
    /// and the tree is unchanged
    pub fn insert(&self, key: K, value: V) -> Result<(), (K, V)>
    where
        K: Clone,
    {
        let (ancestors, mut leaf_guard) = self.descend_write(&key, WritePass::Insert);
        let leaf = leaf_guard.as_leaf_mut();
        let at = match leaf.search(&self.cmp, &key) {
            Ok(_) => return Err((key, value)),
            Err(at) => at,
        };
        leaf.keys.insert(at, key);
        leaf.records.insert(at, Record::new(value));
        self.len.fetch_add(1, Relaxed);
        if leaf.keys.len() == self.order {
            self.split(ancestors, leaf_guard);
        }
        Ok(())
    }

    /// Split the overflowed node on top of the retained chain, then
    /// push separators upward, growing a new root if the chain runs
    /// out. Every node involved stays locked until it is structurally
    /// consistent again
    fn split(&self, mut ancestors: Vec<WriteGuard<K, V>>, guard: WriteGuard<K, V>)
    where
        K: Clone,
    {
        let mut guard = guard;
        loop {
            debug_assert_eq!(guard.key_count(), self.order);
            let left_ref = Arc::clone(WriteGuard::rwlock(&guard));
            let (sep, right_ref) = match &mut *guard {
                Node::Leaf(leaf) => {
                    // keep ⌈order/2⌉ entries, move the rest into a new
                    // right sibling threaded into the chain. The
                    // separator is a copy of the sibling's first key
                    let at = (self.order + 1) / 2;
                    let keys = leaf.keys.split_off(at);
                    let records = leaf.records.split_off(at);
                    let sep = keys[0].clone();
                    let right = node::new_ref(Node::Leaf(LeafNode {
                        parent: leaf.parent.clone(),
                        keys,
                        records,
                        next: leaf.next.take(),
                    }));
                    leaf.next = Some(Arc::clone(&right));
                    trace!("split: leaf divided at slot {}", at);
                    (sep, right)
                }
                Node::Internal(node) => {
                    // the middle key moves up and is retained by
                    // neither half
                    let at = self.order / 2;
                    let mut keys = node.keys.split_off(at);
                    let sep = keys.remove(0);
                    let children = node.children.split_off(at + 1);
                    let right = node::new_ref(Node::Internal(InternalNode {
                        parent: node.parent.clone(),
                        keys,
                        children,
                    }));
                    // the moved children need their back-pointers
                    // rewritten; the sibling is not yet reachable by
                    // anyone else, so its own lock is uncontended
                    let down = Arc::downgrade(&right);
                    {
                        let right_guard = right.read();
                        for child in right_guard.as_internal().children.iter() {
                            child.write().set_parent(down.clone());
                        }
                    }
                    trace!("split: internal node divided at slot {}", at);
                    (sep, right)
                }
            };
            match ancestors.pop() {
                Some(mut parent_guard) => {
                    let parent = parent_guard.as_internal_mut();
                    let at = parent.position_of(&left_ref);
                    parent.keys.insert(at, sep);
                    parent.children.insert(at + 1, right_ref);
                    drop(guard);
                    if parent.keys.len() == self.order {
                        guard = parent_guard;
                        continue;
                    }
                    return;
                }
                None => {
                    // the chain is spent: the node that split was the
                    // root. Grow a new root and swap the handle while
                    // the old root is still write-locked
                    let new_root = node::new_ref(Node::Internal(InternalNode {
                        parent: Weak::new(),
                        keys: vec![sep],
                        children: vec![Arc::clone(&left_ref), Arc::clone(&right_ref)],
                    }));
                    let down = Arc::downgrade(&new_root);
                    guard.set_parent(down.clone());
                    right_ref.write().set_parent(down);
                    *self.root.write() = new_root;
                    trace!("split: tree height increased");
                    return;
                }
            }
        }
    }

    /// Remove `key`, handing its value back; `None` if the key is
    /// absent. The value reaches the caller (and through it, the
    /// value's destructor) only after the tree is structurally
    /// consistent again
    pub fn remove(&self, key: &K) -> Option<V>
    where
        K: Clone,
    {
        let (ancestors, mut leaf_guard) = self.descend_write(key, WritePass::Remove);
        let leaf = leaf_guard.as_leaf_mut();
        let at = match leaf.search(&self.cmp, key) {
            Ok(at) => at,
            Err(_) => return None,
        };
        leaf.keys.remove(at);
        let record = leaf.records.remove(at);
        self.len.fetch_sub(1, Relaxed);
        // an empty `ancestors` means the leaf is the root (no minimum
        // applies) or was above its minimum before the removal
        if leaf.keys.len() < self.min_leaf_keys() && !ancestors.is_empty() {
            self.rebalance(ancestors, leaf_guard);
        }
        Some(record.into_value())
    }

    /// Restore minimum occupancy after a removal. `guard` holds the
    /// deficient node, `ancestors` the write-locked chain above it.
    /// Redistribution ends the cascade; a merge removes a separator
    /// from the parent, which may leave the parent deficient in turn
    fn rebalance(&self, mut ancestors: Vec<WriteGuard<K, V>>, guard: WriteGuard<K, V>)
    where
        K: Clone,
    {
        let mut guard = guard;
        loop {
            let mut parent_guard = match ancestors.pop() {
                Some(parent_guard) => parent_guard,
                None => {
                    // `guard` is the topmost retained node. If the
                    // root ran out of separators, its lone child takes
                    // over
                    self.try_demote_root(guard);
                    return;
                }
            };
            let deficient = {
                let min = if guard.is_leaf() {
                    self.min_leaf_keys()
                } else {
                    self.min_internal_keys()
                };
                guard.key_count() < min
            };
            if !deficient {
                return;
            }
            let merged = {
                let child_ref = Arc::clone(WriteGuard::rwlock(&guard));
                let parent = parent_guard.as_internal_mut();
                let at = parent.position_of(&child_ref);
                if guard.is_leaf() {
                    self.fix_leaf(parent, at, guard)
                } else {
                    self.fix_internal(parent, at, guard)
                }
            };
            if !merged {
                return;
            }
            guard = parent_guard;
        }
    }

    /// Rebalance the deficient leaf `children[at]` under its parent's
    /// write lock. The immediate left sibling is preferred; an entry is
    /// borrowed from it when it has slack, otherwise the two leaves
    /// merge. Returns whether a separator was removed from the parent
    fn fix_leaf(
        &self,
        parent: &mut InternalNode<K, V>,
        at: usize,
        child_guard: WriteGuard<K, V>,
    ) -> bool
    where
        K: Clone,
    {
        if at > 0 {
            // leaf locks are only ever taken left-to-right (the scan
            // hand-off depends on it), so the deficient leaf unlocks
            // first and relocks after its sibling. The parent's write
            // lock keeps every descent out of both leaves meanwhile
            drop(child_guard);
            let mut left_guard = parent.children[at - 1].write_arc();
            let mut child_guard = parent.children[at].write_arc();
            let left = left_guard.as_leaf_mut();
            let child = child_guard.as_leaf_mut();
            if left.keys.len() > self.min_leaf_keys() {
                // take the sibling's last entry; the boundary moved, so
                // the separator becomes this leaf's new first key
                let key = left.keys.pop().unwrap();
                let record = left.records.pop().unwrap();
                child.keys.insert(0, key);
                child.records.insert(0, record);
                parent.keys[at - 1] = child.keys[0].clone();
                trace!("rebalance: borrowed an entry from the left leaf");
                false
            } else {
                // fold the deficient leaf into its sibling and unhook
                // it from the chain
                left.keys.append(&mut child.keys);
                left.records.append(&mut child.records);
                left.next = child.next.take();
                parent.keys.remove(at - 1);
                parent.children.remove(at);
                trace!("rebalance: merged a leaf into its left sibling");
                true
            }
        } else {
            // no left sibling; work with the right one. We already
            // hold the left member of the pair, so the order stands
            let mut child_guard = child_guard;
            let mut right_guard = parent.children[1].write_arc();
            let child = child_guard.as_leaf_mut();
            let right = right_guard.as_leaf_mut();
            if right.keys.len() > self.min_leaf_keys() {
                let key = right.keys.remove(0);
                let record = right.records.remove(0);
                child.keys.push(key);
                child.records.push(record);
                parent.keys[0] = right.keys[0].clone();
                trace!("rebalance: borrowed an entry from the right leaf");
                false
            } else {
                child.keys.append(&mut right.keys);
                child.records.append(&mut right.records);
                child.next = right.next.take();
                parent.keys.remove(0);
                parent.children.remove(1);
                trace!("rebalance: merged the right leaf into its sibling");
                true
            }
        }
    }

    /// Rebalance the deficient internal node `children[at]`. Same
    /// sibling preference as leaves; the parent separator cycles
    /// through every move so subtree key ranges stay tight. Sibling
    /// locks are taken in the same deterministic left-to-right order
    fn fix_internal(
        &self,
        parent: &mut InternalNode<K, V>,
        at: usize,
        child_guard: WriteGuard<K, V>,
    ) -> bool
    where
        K: Clone,
    {
        if at > 0 {
            drop(child_guard);
            let mut left_guard = parent.children[at - 1].write_arc();
            let mut child_guard = parent.children[at].write_arc();
            let child_down = Arc::downgrade(&parent.children[at]);
            let left_down = Arc::downgrade(&parent.children[at - 1]);
            let left = left_guard.as_internal_mut();
            let child = child_guard.as_internal_mut();
            if left.keys.len() > self.min_internal_keys() {
                // rotate right: the separator drops into the deficient
                // node and the sibling's last key replaces it
                let sep = mem::replace(&mut parent.keys[at - 1], left.keys.pop().unwrap());
                child.keys.insert(0, sep);
                let moved = left.children.pop().unwrap();
                moved.write().set_parent(child_down);
                child.children.insert(0, moved);
                trace!("rebalance: rotated a subtree in from the left");
                false
            } else {
                // the separator and the deficient node both fold into
                // the left sibling
                left.keys.push(parent.keys.remove(at - 1));
                left.keys.append(&mut child.keys);
                for grandchild in child.children.drain(..) {
                    grandchild.write().set_parent(left_down.clone());
                    left.children.push(grandchild);
                }
                parent.children.remove(at);
                trace!("rebalance: merged an internal node into its left sibling");
                true
            }
        } else {
            let mut child_guard = child_guard;
            let mut right_guard = parent.children[1].write_arc();
            let child_down = Arc::downgrade(&parent.children[0]);
            let child = child_guard.as_internal_mut();
            let right = right_guard.as_internal_mut();
            if right.keys.len() > self.min_internal_keys() {
                // rotate left through the separator
                let sep = mem::replace(&mut parent.keys[0], right.keys.remove(0));
                child.keys.push(sep);
                let moved = right.children.remove(0);
                moved.write().set_parent(child_down);
                child.children.push(moved);
                trace!("rebalance: rotated a subtree in from the right");
                false
            } else {
                child.keys.push(parent.keys.remove(0));
                child.keys.append(&mut right.keys);
                for grandchild in right.children.drain(..) {
                    grandchild.write().set_parent(child_down.clone());
                    child.children.push(grandchild);
                }
                parent.children.remove(1);
                trace!("rebalance: merged the right internal node into its sibling");
                true
            }
        }
    }

    /// If the root is an internal node with no separators left, its
    /// single remaining child becomes the new root. The handle swap
    /// happens while the outgoing root is still write-locked
    fn try_demote_root(&self, mut guard: WriteGuard<K, V>) {
        let new_root = match &mut *guard {
            Node::Internal(node) if node.keys.is_empty() => {
                debug_assert!(
                    node.parent.upgrade().is_none(),
                    "only the root may run out of separators"
                );
                // exactly one child by the separator/child invariant
                node.children.pop().unwrap()
            }
            _ => return,
        };
        new_root.write().set_parent(Weak::new());
        *self.root.write() = new_root;
        trace!("rebalance: tree height decreased");
    }
}

impl<K, V, C> FromIterator<(K, V)> for Skytree<K, V, C>
where
    K: Clone,
    C: Comparator<K> + Default,
{
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (K, V)>,
    {
        let tree = Skytree::new();
        iter.into_iter().for_each(|(k, v)| {
            let _ = tree.insert(k, v);
        });
        tree
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for Skytree<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        let mut guard = Some(self.descend_read_leftmost());
        while let Some(current) = guard.take() {
            let leaf = current.as_leaf();
            for (key, record) in leaf.keys.iter().zip(leaf.records.iter()) {
                map.entry(key, record.value());
            }
            let next = leaf.next.as_ref().map(Arc::clone);
            if let Some(next) = next {
                // same forward hand-off as a scan
                let next_guard = next.read_arc();
                drop(current);
                guard = Some(next_guard);
            }
        }
        map.finish()
    }
}
