/*
 * Created on Tue Jan 07 2025
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

use core::fmt;

/// Configuration errors raised while building a tree. Operational
/// outcomes (duplicate key, key not found) are encoded in the return
/// types of the operations themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The requested branching factor is below the minimum of 3
    BadOrder(usize),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::BadOrder(order) => {
                write!(f, "tree order must be at least 3 (got {})", order)
            }
        }
    }
}

impl std::error::Error for TreeError {}
