// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Rank-based (Borda-style) merge of per-space result lists
//!
//! Raw scores from different backends are never combined. Each item gets its
//! 1-based rank in every list; an item absent from a list is ranked one past
//! that list's end. Items are ordered by mean rank, then item id.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::QueryResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedResult {
    pub item_id: String,
    pub mean_rank: f32,
    /// Rank per space name, only for spaces that returned the item
    pub ranks: BTreeMap<String, usize>,
    /// Hit from the space where the item ranked best (raw score kept as-is)
    pub best: QueryResult,
}

/// Merge ranked lists keyed by space name, keeping at most `top_k`
pub fn rank_merge(lists: &[(String, Vec<QueryResult>)], top_k: usize) -> Vec<MergedResult> {
    let ids: BTreeSet<&str> = lists
        .iter()
        .flat_map(|(_, results)| results.iter().map(|r| r.item_id.as_str()))
        .collect();
    if ids.is_empty() {
        return Vec::new();
    }

    let mut merged: Vec<MergedResult> = ids
        .into_iter()
        .filter_map(|id| {
            let mut ranks = BTreeMap::new();
            let mut total = 0usize;
            let mut best: Option<(usize, &QueryResult)> = None;
            for (space, results) in lists {
                match results.iter().position(|r| r.item_id == id) {
                    Some(pos) => {
                        let rank = pos + 1;
                        ranks.insert(space.clone(), rank);
                        total += rank;
                        if best.map_or(true, |(r, _)| rank < r) {
                            best = Some((rank, &results[pos]));
                        }
                    }
                    None => total += results.len() + 1,
                }
            }
            best.map(|(_, hit)| MergedResult {
                item_id: id.to_string(),
                mean_rank: total as f32 / lists.len() as f32,
                ranks,
                best: hit.clone(),
            })
        })
        .collect();

    merged.sort_by(|a, b| {
        a.mean_rank
            .partial_cmp(&b.mean_rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    merged.truncate(top_k);
    merged
}
