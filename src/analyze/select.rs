// src/analyze/select.rs
//! Reduction of a lane's candidates to what actually gets published.
//! Pure functions apart from the oracle call; none of them marks anything
//! seen.

use rand::Rng;
use std::collections::HashMap;

use crate::analyze::oracle::{OracleSelection, RankingOracle};
use crate::ingest::types::Item;

/// Serious feeds never offer the oracle more than this many candidates.
pub const ORACLE_CANDIDATE_CAP: usize = 3;

/// Uniformly random single pick. Empty in, empty out.
pub fn pick_random<R: Rng>(mut candidates: Vec<Item>, rng: &mut R) -> Vec<Item> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let idx = rng.random_range(0..candidates.len());
    vec![candidates.swap_remove(idx)]
}

/// Per-source cap in arrival order, then a stable sort by descending score,
/// then the total cap. Missing scores rank as 0.
pub fn capped_ranked_merge(
    candidates: Vec<Item>,
    per_source_limit: usize,
    total_limit: usize,
) -> Vec<Item> {
    let mut per_source: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Item> = candidates
        .into_iter()
        .filter(|it| {
            let n = per_source.entry(it.source.clone()).or_insert(0);
            if *n < per_source_limit {
                *n += 1;
                true
            } else {
                false
            }
        })
        .collect();

    // `sort_by` is stable: equal scores keep their arrival order.
    kept.sort_by(|a, b| b.score.unwrap_or(0).cmp(&a.score.unwrap_or(0)));
    kept.truncate(total_limit);
    kept
}

/// Newest first (undated last), capped to `max`.
pub fn most_recent(mut candidates: Vec<Item>, max: usize) -> Vec<Item> {
    candidates.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    candidates.truncate(max);
    candidates
}

/// Hand the newest candidates to the oracle and return its pick, if any.
/// An index outside the offered list is treated as no selection.
pub async fn oracle_pick(
    oracle: &dyn RankingOracle,
    candidates: Vec<Item>,
    preferences: &[String],
) -> Option<(Item, OracleSelection)> {
    let mut offered = most_recent(candidates, ORACLE_CANDIDATE_CAP);
    if offered.is_empty() {
        return None;
    }

    let selection = oracle.select_best(&offered, preferences).await?;
    if selection.index >= offered.len() {
        tracing::warn!(
            index = selection.index,
            offered = offered.len(),
            oracle = oracle.provider_name(),
            "oracle index out of range, no selection"
        );
        return None;
    }
    tracing::debug!(
        index = selection.index,
        confidence = selection.confidence,
        topics = ?selection.matched_topics,
        "oracle selection"
    );
    Some((offered.swap_remove(selection.index), selection))
}
