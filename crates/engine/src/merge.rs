//! K-way merge of sharded wide rows
//!
//! A sharded logical key is stored as several physical rows (`key`,
//! `key:a`, `key:b`, ...). Each shard comes back from its own range query
//! already ordered by column name in the scan direction. The merge picks the
//! smallest remaining name across shard heads (largest when descending)
//! until every shard is exhausted.
//!
//! When two shards hold the same column name, only the entry with the later
//! write timestamp survives; the other is skipped. Equal timestamps keep the
//! entry from the lower shard index, so the result is deterministic.

use casio_core::Column;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Physical row key for one shard; an empty suffix is the bare key
pub fn shard_key(key: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        key.to_string()
    } else {
        format!("{key}:{suffix}")
    }
}

/// Merge per-shard column runs into one ordered, duplicate-free run
///
/// # Arguments
/// * `shards` - Column runs, each sorted in scan order without duplicate names
/// * `descending` - Scan order is descending by name
pub fn merge_columns(shards: Vec<Vec<Column>>, descending: bool) -> Vec<Column> {
    let total = shards.iter().map(Vec::len).sum();
    let mut cursors: Vec<VecDeque<Column>> = shards.into_iter().map(VecDeque::from).collect();
    let mut merged = Vec::with_capacity(total);

    loop {
        let mut pick: Option<usize> = None;
        for i in 0..cursors.len() {
            let Some(item) = cursors[i].front() else {
                continue;
            };
            let Some(p) = pick else {
                pick = Some(i);
                continue;
            };
            let Some(best) = cursors[p].front() else {
                pick = Some(i);
                continue;
            };

            let order = item.name.cmp(&best.name);
            let order = if descending { order.reverse() } else { order };
            let later = item.timestamp > best.timestamp;
            match order {
                Ordering::Less => pick = Some(i),
                Ordering::Greater => {}
                Ordering::Equal if later => {
                    cursors[p].pop_front();
                    pick = Some(i);
                }
                Ordering::Equal => {
                    cursors[i].pop_front();
                }
            }
        }

        let Some(p) = pick else {
            break;
        };
        if let Some(column) = cursors[p].pop_front() {
            merged.push(column);
        }
    }

    merged
}
