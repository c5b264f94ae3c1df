/*
 * Created on Mon Jan 13 2025
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

use super::node::{ReadGuard, WriteGuard};
use core::marker::PhantomData;
use core::ops::Deref;
use core::ops::DerefMut;
use parking_lot::lock_api::ArcRwLockWriteGuard;

/// A borrowed view of one stored entry. The leaf's read lock is held for
/// as long as the `Ref` is alive, so the referenced value cannot be
/// removed from under it; other readers of the same leaf are not blocked
pub struct Ref<'a, K, V> {
    guard: ReadGuard<K, V>,
    idx: usize,
    _tree: PhantomData<&'a ()>,
}

impl<'a, K, V> Ref<'a, K, V> {
    pub(crate) fn new(guard: ReadGuard<K, V>, idx: usize) -> Self {
        Self {
            guard,
            idx,
            _tree: PhantomData,
        }
    }
    pub fn key(&self) -> &K {
        &self.guard.as_leaf().keys[self.idx]
    }
    pub fn value(&self) -> &V {
        self.guard.as_leaf().records[self.idx].value()
    }
    pub fn pair(&self) -> (&K, &V) {
        (self.key(), self.value())
    }
}

impl<'a, K, V> Deref for Ref<'a, K, V> {
    type Target = V;
    fn deref(&self) -> &Self::Target {
        self.value()
    }
}

/// An exclusive view of one stored entry. Holds the leaf's write lock,
/// so the value can be updated in place without a remove/insert cycle.
/// The key is deliberately not mutable: it anchors the entry's slot
pub struct RefMut<'a, K, V> {
    guard: WriteGuard<K, V>,
    idx: usize,
    _tree: PhantomData<&'a ()>,
}

impl<'a, K, V> RefMut<'a, K, V> {
    pub(crate) fn new(guard: WriteGuard<K, V>, idx: usize) -> Self {
        Self {
            guard,
            idx,
            _tree: PhantomData,
        }
    }
    pub fn key(&self) -> &K {
        &self.guard.as_leaf().keys[self.idx]
    }
    pub fn value(&self) -> &V {
        self.guard.as_leaf().records[self.idx].value()
    }
    pub fn value_mut(&mut self) -> &mut V {
        self.guard.as_leaf_mut().records[self.idx].value_mut()
    }
    /// Give up exclusivity but keep the entry pinned for reading
    pub fn downgrade(self) -> Ref<'a, K, V> {
        Ref::new(ArcRwLockWriteGuard::downgrade(self.guard), self.idx)
    }
}

impl<'a, K, V> Deref for RefMut<'a, K, V> {
    type Target = V;
    fn deref(&self) -> &Self::Target {
        self.value()
    }
}

impl<'a, K, V> DerefMut for RefMut<'a, K, V> {
    fn deref_mut(&mut self) -> &mut V {
        self.value_mut()
    }
}
