use std::cmp::Ordering;

use crate::models::WineId;

use super::rating_store::RatingStore;

/// Ranks wines by the sum of their present scores
///
/// Unrated cells count as zero here only; they stay unset in the matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct PopularityRanker;

impl PopularityRanker {
    pub fn new() -> Self {
        Self
    }

    /// Wine ids by descending aggregate score, ties by ascending wine id
    pub fn rank(&self, store: &RatingStore) -> Vec<WineId> {
        let mut ranked: Vec<(WineId, f64)> = store
            .wine_ids()
            .iter()
            .copied()
            .zip(store.column_sums())
            .collect();

        ranked.sort_by(|a, b| by_score_desc_then_id(a.1, a.0, b.1, b.0));
        ranked.into_iter().map(|(wine_id, _)| wine_id).collect()
    }
}

/// Descending score, ascending id; `total_cmp` keeps the order total
pub(crate) fn by_score_desc_then_id(a_score: f64, a_id: i64, b_score: f64, b_id: i64) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(&b_id))
}
