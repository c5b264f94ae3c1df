/*
 * Created on Tue Jan 14 2025
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

use super::node::ReadGuard;
use super::Skytree;
use crate::ord::{Comparator, NaturalOrder};
use core::cmp::Ordering;
use core::marker::PhantomData;
use std::sync::Arc;

/// Hop to the next leaf in the chain. The next leaf is read-locked
/// before the current guard drops (forward hand-off), so a scan holds
/// at most two leaf locks and never observes a half-stitched chain
fn advance<K, V>(guard: ReadGuard<K, V>) -> Option<ReadGuard<K, V>> {
    let next = match guard.as_leaf().next {
        Some(ref next) => Arc::clone(next),
        None => return None,
    };
    let next_guard = next.read_arc();
    drop(guard);
    Some(next_guard)
}

/// An ordered scan over the keys in `[lo, hi]`, both ends inclusive.
///
/// Yields entries in ascending key order by walking the leaf chain with
/// the read-lock hand-off. Results are forward-ordered but not a
/// snapshot: an insert or removal racing the scan may or may not be
/// observed, but whatever is observed comes out strictly ascending
pub struct Range<'t, 'q, K, V, C = NaturalOrder> {
    tree: &'t Skytree<K, V, C>,
    hi: &'q K,
    cur: Option<(ReadGuard<K, V>, usize)>,
}

impl<'t, 'q, K, V, C> Range<'t, 'q, K, V, C> {
    pub(crate) fn exhausted(tree: &'t Skytree<K, V, C>, hi: &'q K) -> Self {
        Self {
            tree,
            hi,
            cur: None,
        }
    }
    pub(crate) fn begin(
        tree: &'t Skytree<K, V, C>,
        hi: &'q K,
        guard: ReadGuard<K, V>,
        at: usize,
    ) -> Self {
        Self {
            tree,
            hi,
            cur: Some((guard, at)),
        }
    }
}

impl<'t, 'q, K, V, C> Iterator for Range<'t, 'q, K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    type Item = (K, V);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (guard, idx) = self.cur.take()?;
            let leaf = guard.as_leaf();
            if idx < leaf.keys.len() {
                let key = &leaf.keys[idx];
                if self.tree.comparator().compare(key, self.hi) == Ordering::Greater {
                    // past the upper bound: the scan is over
                    return None;
                }
                let item = (key.clone(), leaf.records[idx].value().clone());
                self.cur = Some((guard, idx + 1));
                return Some(item);
            }
            match advance(guard) {
                Some(next_guard) => self.cur = Some((next_guard, 0)),
                None => return None,
            }
        }
    }
}

/// A full ascending scan, from the leftmost leaf to the end of the chain
pub struct Iter<'t, K, V, C = NaturalOrder> {
    cur: Option<(ReadGuard<K, V>, usize)>,
    _tree: PhantomData<&'t Skytree<K, V, C>>,
}

impl<'t, K, V, C> Iter<'t, K, V, C> {
    pub(crate) fn begin(_tree: &'t Skytree<K, V, C>, guard: ReadGuard<K, V>) -> Self {
        Self {
            cur: Some((guard, 0)),
            _tree: PhantomData,
        }
    }
}

impl<'t, K, V, C> Iterator for Iter<'t, K, V, C>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (guard, idx) = self.cur.take()?;
            let leaf = guard.as_leaf();
            if idx < leaf.keys.len() {
                let item = (leaf.keys[idx].clone(), leaf.records[idx].value().clone());
                self.cur = Some((guard, idx + 1));
                return Some(item);
            }
            match advance(guard) {
                Some(next_guard) => self.cur = Some((next_guard, 0)),
                None => return None,
            }
        }
    }
}

#[test]
fn test_range_within_a_single_leaf() {
    let tree: Skytree<u64, &str> = Skytree::default();
    for (key, value) in [(1, "a"), (2, "b"), (3, "c")] {
        tree.insert(key, value).unwrap();
    }
    let hits: Vec<_> = tree.range(&2, &3).collect();
    assert_eq!(hits, vec![(2, "b"), (3, "c")]);
}
