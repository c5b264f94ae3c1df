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

#![deny(unused_crate_dependencies)]
#![deny(unused_imports)]

mod utils;

use log::{info, warn};
use rand::prelude::*;
use skytree::Skytree;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Operations every worker runs per round
pub const DEFAULT_OPS_PER_WORKER: usize = 250_000;
/// The key universe the workers churn in
pub const DEFAULT_KEYSPACE: u64 = 100_000;
/// Branching factors worth hammering: the degenerate minimum, a small
/// node, and the default
pub const ORDERS: [usize; 3] = [3, 8, 32];

#[macro_export]
macro_rules! logstress {
    ($stressid:expr, $extra:expr) => {
        log::info!("Stress ({}): {}", $stressid, $extra);
    };
}

fn main() {
    env_logger::Builder::new()
        .parse_filters(&env::var("SKY_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    warn!("The stress test checks correctness under load and DOES NOT show the true throughput");
    let workers = num_cpus::get() * 2;
    info!(
        "This host has {} logical cores. Will spawn {} workers",
        num_cpus::get(),
        workers
    );
    for order in ORDERS {
        stress_disjoint_churn(order, workers);
        stress_shared_storm(order, workers);
        stress_scans_against_writers(order, workers);
    }
    info!("SUCCESS. Stress test complete!");
}

/// Every worker churns its own congruence class of keys, so each worker
/// carries an exact model of what must survive. After the join, the
/// tree must agree with the union of the models
fn stress_disjoint_churn(order: usize, workers: usize) {
    logstress!(
        "A [DISJOINT]",
        format!("order {}, {} workers on disjoint key classes", order, workers)
    );
    let tree = Arc::new(Skytree::<u64, u64>::with_order(order).unwrap());
    let start = Instant::now();
    let models: Vec<HashMap<u64, u64>> = spawn_and_join(workers, |wid| {
        let tree = Arc::clone(&tree);
        move || {
            let mut rng = rand::thread_rng();
            let mut model: HashMap<u64, u64> = HashMap::new();
            let stride = workers as u64;
            for _ in 0..DEFAULT_OPS_PER_WORKER {
                let key = rng.gen_range(0..DEFAULT_KEYSPACE / stride) * stride + wid as u64;
                if rng.gen_bool(0.6) {
                    let value = rng.gen();
                    if tree.insert(key, value).is_ok() {
                        assert!(model.insert(key, value).is_none(), "tree accepted a dup");
                    } else {
                        assert!(model.contains_key(&key), "tree rejected a fresh key");
                    }
                } else {
                    assert_eq!(tree.remove(&key), model.remove(&key), "removal mismatch");
                }
            }
            model
        }
    });
    let mut survivors = 0usize;
    for model in models {
        for (key, value) in model {
            assert_eq!(
                tree.get(&key).map(|entry| *entry),
                Some(value),
                "a surviving key lost its value"
            );
            survivors += 1;
        }
    }
    assert_eq!(tree.len(), survivors);
    utils::assert_strictly_ascending(&tree, survivors);
    info!(
        "Stress (A): order {} done in {:.2?}: {} survivors",
        order,
        start.elapsed(),
        survivors
    );
}

/// All workers hammer the same narrow key space. No per-key ground
/// truth exists here; what must hold is that the tree never loses its
/// shape: scans stay strictly ascending and lookups agree with scans
fn stress_shared_storm(order: usize, workers: usize) {
    logstress!(
        "B [SHARED]",
        format!("order {}, {} workers on one key class", order, workers)
    );
    let tree = Arc::new(Skytree::<u64, u64>::with_order(order).unwrap());
    let start = Instant::now();
    spawn_and_join(workers, |_| {
        let tree = Arc::clone(&tree);
        move || {
            let mut rng = rand::thread_rng();
            for _ in 0..DEFAULT_OPS_PER_WORKER {
                let key = rng.gen_range(0..512u64);
                match rng.gen_range(0..3u8) {
                    0 => {
                        let _ = tree.insert(key, key ^ 0xCAFE);
                    }
                    1 => {
                        let _ = tree.remove(&key);
                    }
                    _ => {
                        if let Some(entry) = tree.get(&key) {
                            assert_eq!(*entry, key ^ 0xCAFE, "a value detached from its key");
                        }
                    }
                }
            }
        }
    });
    let survivors = tree.len();
    utils::assert_strictly_ascending(&tree, survivors);
    info!(
        "Stress (B): order {} done in {:.2?}: {} survivors",
        order,
        start.elapsed(),
        survivors
    );
}

/// Half the workers scan while the other half write. Scans must come
/// out strictly ascending, and keys nobody touches must never drop out
/// of a full sweep
fn stress_scans_against_writers(order: usize, workers: usize) {
    logstress!(
        "C [SCAN]",
        format!("order {}, scanners racing writers", order)
    );
    let tree = Arc::new(Skytree::<u64, u64>::with_order(order).unwrap());
    // the even backbone stays put for the whole phase
    let backbone_len = (DEFAULT_KEYSPACE as usize + 1) / 2;
    for key in (0..DEFAULT_KEYSPACE).step_by(2) {
        assert!(tree.insert(key, key).is_ok());
    }
    let start = Instant::now();
    spawn_and_join(workers, |wid| {
        let tree = Arc::clone(&tree);
        move || {
            let mut rng = rand::thread_rng();
            if wid % 2 == 0 {
                // writer: churns odd keys only
                for _ in 0..DEFAULT_OPS_PER_WORKER / 4 {
                    let key = rng.gen_range(0..DEFAULT_KEYSPACE / 2) * 2 + 1;
                    if rng.gen_bool(0.5) {
                        let _ = tree.insert(key, key);
                    } else {
                        let _ = tree.remove(&key);
                    }
                }
            } else {
                // scanner: windows plus the occasional full sweep
                for round in 0usize..64 {
                    let (lo, hi) = if round % 8 == 0 {
                        (0, DEFAULT_KEYSPACE)
                    } else {
                        let lo = rng.gen_range(0..DEFAULT_KEYSPACE);
                        (lo, lo + rng.gen_range(1..2048))
                    };
                    let mut last: Option<u64> = None;
                    let mut evens = 0usize;
                    for (key, value) in tree.range(&lo, &hi) {
                        if let Some(last) = last {
                            assert!(last < key, "scan out of order");
                        }
                        assert_eq!(value, key, "scan surfaced a foreign value");
                        evens += (key % 2 == 0) as usize;
                        last = Some(key);
                    }
                    if round % 8 == 0 {
                        assert_eq!(evens, backbone_len, "a full sweep lost backbone keys");
                    }
                }
            }
        }
    });
    utils::assert_strictly_ascending(&tree, tree.len());
    info!("Stress (C): order {} done in {:.2?}", order, start.elapsed());
}

fn spawn_and_join<R, F, W>(workers: usize, mut factory: F) -> Vec<R>
where
    R: Send + 'static,
    W: FnOnce() -> R + Send + 'static,
    F: FnMut(usize) -> W,
{
    let handles: Vec<_> = (0..workers)
        .map(|wid| thread::spawn(factory(wid)))
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().expect("a worker panicked"))
        .collect()
}
