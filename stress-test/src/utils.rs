/*
 * Created on Mon Jan 20 2025
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

use log::trace;
use skytree::Skytree;

/// Sweep the quiesced tree in order and assert that the scan is
/// strictly ascending, that lookups agree with it, and that it covers
/// exactly `expected` entries
pub fn assert_strictly_ascending(tree: &Skytree<u64, u64>, expected: usize) {
    let mut last: Option<u64> = None;
    let mut seen = 0usize;
    for (key, value) in tree.iter() {
        if let Some(last) = last {
            assert!(last < key, "ordered sweep regressed at key {}", key);
        }
        assert_eq!(
            tree.get(&key).map(|entry| *entry),
            Some(value),
            "lookup disagrees with the sweep"
        );
        last = Some(key);
        seen += 1;
    }
    assert_eq!(seen, expected, "sweep entry count mismatch");
    trace!("verified {} entries in ascending order", seen);
}
