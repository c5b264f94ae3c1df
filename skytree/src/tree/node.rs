/*
 * Created on Wed Jan 08 2025
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

use crate::ord::Comparator;
use core::cmp::Ordering;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// A shared handle to a node. Children and the leaf chain hold these
pub(crate) type NodeRef<K, V> = Arc<RwLock<Node<K, V>>>;
/// A parent back-pointer. Weak, so the node graph stays acyclic and the
/// tree remains the sole strong owner of every node
pub(crate) type NodeWeak<K, V> = Weak<RwLock<Node<K, V>>>;
/// An owning read guard: keeps its node alive and read-locked while held
pub(crate) type ReadGuard<K, V> = ArcRwLockReadGuard<RawRwLock, Node<K, V>>;
/// An owning write guard on a node
pub(crate) type WriteGuard<K, V> = ArcRwLockWriteGuard<RawRwLock, Node<K, V>>;

pub(crate) fn new_ref<K, V>(node: Node<K, V>) -> NodeRef<K, V> {
    Arc::new(RwLock::new(node))
}

/// A tree node. Every node sits behind its own rwlock; the two variants
/// carry separate arrays so a leaf never pays for child pointers and an
/// internal node never pays for record slots
pub(crate) enum Node<K, V> {
    Leaf(LeafNode<K, V>),
    Internal(InternalNode<K, V>),
}

/// A terminal node: `keys[i]` pairs with `records[i]`, both sorted under
/// the tree comparator. Leaves are chained left-to-right through `next`
/// in ascending key order
pub(crate) struct LeafNode<K, V> {
    pub parent: NodeWeak<K, V>,
    pub keys: Vec<K>,
    pub records: Vec<Record<V>>,
    pub next: Option<NodeRef<K, V>>,
}

/// A routing node: `children[i]` holds keys strictly below `keys[i]`;
/// `children[i + 1]` holds keys at or above it
pub(crate) struct InternalNode<K, V> {
    pub parent: NodeWeak<K, V>,
    pub keys: Vec<K>,
    pub children: Vec<NodeRef<K, V>>,
}

/// The leaf slot wrapper owning one stored value. Created on insert,
/// destroyed on removal or node teardown; the wrapped value drops with it
pub(crate) struct Record<V> {
    value: V,
}

impl<V> Record<V> {
    pub const fn new(value: V) -> Self {
        Self { value }
    }
    pub const fn value(&self) -> &V {
        &self.value
    }
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }
    pub fn into_value(self) -> V {
        self.value
    }
}

impl<K, V> LeafNode<K, V> {
    /// An empty leaf. Capacity is reserved up front: a node may briefly
    /// hold `order` entries while a split is in flight
    pub fn empty(order: usize) -> Self {
        Self {
            parent: Weak::new(),
            keys: Vec::with_capacity(order),
            records: Vec::with_capacity(order),
            next: None,
        }
    }
    /// Binary search under the tree comparator. `Ok` carries the slot
    /// holding the key, `Err` the insertion point
    pub fn search(&self, cmp: &impl Comparator<K>, key: &K) -> Result<usize, usize> {
        self.keys.binary_search_by(|probe| cmp.compare(probe, key))
    }
    /// Slot of the first key `>= key`: where a range scan enters
    pub fn lower_bound(&self, cmp: &impl Comparator<K>, key: &K) -> usize {
        self.keys
            .partition_point(|probe| cmp.compare(probe, key) == Ordering::Less)
    }
}

impl<K, V> InternalNode<K, V> {
    /// The child to descend into for `key`: the slot of the smallest
    /// separator strictly greater than it, or the last child when every
    /// separator compares `<= key`
    pub fn child_index(&self, cmp: &impl Comparator<K>, key: &K) -> usize {
        self.keys
            .partition_point(|sep| cmp.compare(sep, key) != Ordering::Greater)
    }
    /// Slot of `child` in this node's child array. The caller guarantees
    /// `child` is one of ours
    pub fn position_of(&self, child: &NodeRef<K, V>) -> usize {
        self.children
            .iter()
            .position(|c| Arc::ptr_eq(c, child))
            .unwrap()
    }
}

impl<K, V> Node<K, V> {
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
    pub fn key_count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.keys.len(),
            Node::Internal(node) => node.keys.len(),
        }
    }
    pub fn parent(&self) -> &NodeWeak<K, V> {
        match self {
            Node::Leaf(leaf) => &leaf.parent,
            Node::Internal(node) => &node.parent,
        }
    }
    pub fn set_parent(&mut self, parent: NodeWeak<K, V>) {
        match self {
            Node::Leaf(leaf) => leaf.parent = parent,
            Node::Internal(node) => node.parent = parent,
        }
    }
    pub fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => unreachable!("expected a leaf"),
        }
    }
    pub fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => unreachable!("expected a leaf"),
        }
    }
    pub fn as_internal(&self) -> &InternalNode<K, V> {
        match self {
            Node::Internal(node) => node,
            Node::Leaf(_) => unreachable!("expected an internal node"),
        }
    }
    pub fn as_internal_mut(&mut self) -> &mut InternalNode<K, V> {
        match self {
            Node::Internal(node) => node,
            Node::Leaf(_) => unreachable!("expected an internal node"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ord::NaturalOrder;

    fn leaf_with(keys: &[i32]) -> LeafNode<i32, ()> {
        let mut leaf = LeafNode::empty(8);
        for key in keys {
            leaf.keys.push(*key);
            leaf.records.push(Record::new(()));
        }
        leaf
    }

    #[test]
    fn test_leaf_search() {
        let leaf = leaf_with(&[10, 20, 30]);
        assert_eq!(leaf.search(&NaturalOrder, &20), Ok(1));
        assert_eq!(leaf.search(&NaturalOrder, &25), Err(2));
        assert_eq!(leaf.search(&NaturalOrder, &5), Err(0));
    }

    #[test]
    fn test_leaf_lower_bound() {
        let leaf = leaf_with(&[10, 20, 30]);
        assert_eq!(leaf.lower_bound(&NaturalOrder, &10), 0);
        assert_eq!(leaf.lower_bound(&NaturalOrder, &15), 1);
        assert_eq!(leaf.lower_bound(&NaturalOrder, &31), 3);
    }

    #[test]
    fn test_child_index_routing() {
        let node: InternalNode<i32, ()> = InternalNode {
            parent: Weak::new(),
            keys: vec![10, 20],
            children: vec![
                new_ref(Node::Leaf(leaf_with(&[5]))),
                new_ref(Node::Leaf(leaf_with(&[10, 15]))),
                new_ref(Node::Leaf(leaf_with(&[20, 25]))),
            ],
        };
        // keys below the first separator route left; a key equal to a
        // separator routes right of it
        assert_eq!(node.child_index(&NaturalOrder, &5), 0);
        assert_eq!(node.child_index(&NaturalOrder, &10), 1);
        assert_eq!(node.child_index(&NaturalOrder, &19), 1);
        assert_eq!(node.child_index(&NaturalOrder, &20), 2);
        assert_eq!(node.child_index(&NaturalOrder, &99), 2);
    }
}
