/*
 * Created on Mon Jan 06 2025
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

//! # Skytree
//!
//! An ordered, thread-safe, in-memory index: a B+ tree with one
//! reader-writer lock per node and a left-to-right leaf chain.
//!
//! - point lookups and scans descend hand-over-hand and hold at most
//!   two node locks; readers never exclude readers
//! - mutations release ancestor locks as soon as a split or merge can
//!   no longer reach them, so writers on disjoint subtrees do not
//!   contend
//! - range scans walk the leaf chain with a forward lock hand-off:
//!   results are strictly ascending, though not a point-in-time
//!   snapshot under concurrent writes
//!
//! ```
//! use skytree::Skytree;
//!
//! let tree: Skytree<u64, &str> = Skytree::default();
//! tree.insert(1, "sayan").unwrap();
//! assert_eq!(*tree.get(&1).unwrap(), "sayan");
//! let all: Vec<_> = tree.range(&0, &100).collect();
//! assert_eq!(all, vec![(1, "sayan")]);
//! ```

pub mod error;
pub mod ord;
pub mod tree;

pub use error::TreeError;
pub use ord::{Comparator, NaturalOrder};
pub use tree::bref::{Ref, RefMut};
pub use tree::iter::{Iter, Range};
pub use tree::{Skytree, DEFAULT_ORDER};
