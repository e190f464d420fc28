use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    config::{Config, StrategyKind},
    error::{AppError, AppResult},
    models::{UserId, WineId},
};

use super::popularity::by_score_desc_then_id;
use super::rating_store::RatingStore;

/// Scoring model that turns the rating matrix into one user's wine ranking
///
/// Implementations must be deterministic for a fixed matrix and must return every
/// known wine exactly once: a personalized prefix is allowed, with the rest of the
/// wines following in popularity order. A user without ratings gets the popularity
/// order unchanged. An unknown user is a `NotFound` error.
pub trait RecommenderStrategy: Send + Sync {
    fn recommend(
        &self,
        store: &RatingStore,
        popularity: &[WineId],
        user_id: UserId,
    ) -> AppResult<Vec<WineId>>;

    /// Strategy name for logging
    fn name(&self) -> &'static str;
}

/// Builds the strategy selected in configuration
pub fn from_config(config: &Config) -> Arc<dyn RecommenderStrategy> {
    match config.recommender_strategy {
        StrategyKind::Similarity => Arc::new(UserSimilarityStrategy::new(config.recommender_neighbors)),
        StrategyKind::Popularity => Arc::new(PopularityStrategy),
    }
}

/// Serves the global popularity order to everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct PopularityStrategy;

impl RecommenderStrategy for PopularityStrategy {
    fn recommend(
        &self,
        store: &RatingStore,
        popularity: &[WineId],
        user_id: UserId,
    ) -> AppResult<Vec<WineId>> {
        if !store.contains_user(user_id) {
            return Err(unknown_user(user_id));
        }
        Ok(popularity.to_vec())
    }

    fn name(&self) -> &'static str {
        "popularity"
    }
}

/// User-based collaborative filtering
///
/// Finds the `neighbors` users whose rows are most cosine-similar to the target
/// row (unset cells count as zero in the dot products) and scores each wine the
/// target has not rated by the similarity-weighted sum of the neighbours' scores.
/// Wines with a positive score lead the list; everything else follows in
/// popularity order. That tail includes wines the target has already rated, so
/// the result is always a permutation of every wine in the matrix.
#[derive(Debug, Clone)]
pub struct UserSimilarityStrategy {
    neighbors: usize,
}

#[derive(Debug, Clone, Copy)]
struct Neighbor<'a> {
    user_id: UserId,
    similarity: f64,
    row: &'a [Option<f64>],
}

impl UserSimilarityStrategy {
    pub fn new(neighbors: usize) -> Self {
        Self { neighbors }
    }

    fn nearest_neighbors<'a>(
        &self,
        store: &'a RatingStore,
        user_id: UserId,
        target: &[Option<f64>],
    ) -> Vec<Neighbor<'a>> {
        let target_norm = norm(target);
        if target_norm == 0.0 {
            return Vec::new();
        }

        let mut neighbors: Vec<Neighbor<'a>> = store
            .rows()
            .filter(|(other_id, _)| *other_id != user_id)
            .filter_map(|(other_id, row)| {
                let other_norm = norm(row);
                if other_norm == 0.0 {
                    return None;
                }
                let similarity = dot(target, row) / (target_norm * other_norm);
                (similarity > 0.0).then_some(Neighbor {
                    user_id: other_id,
                    similarity,
                    row,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| by_score_desc_then_id(a.similarity, a.user_id, b.similarity, b.user_id));
        neighbors.truncate(self.neighbors);
        neighbors
    }
}

impl RecommenderStrategy for UserSimilarityStrategy {
    fn recommend(
        &self,
        store: &RatingStore,
        popularity: &[WineId],
        user_id: UserId,
    ) -> AppResult<Vec<WineId>> {
        let target = store.row(user_id).ok_or_else(|| unknown_user(user_id))?;

        if target.iter().all(Option::is_none) {
            return Ok(popularity.to_vec());
        }

        let neighbors = self.nearest_neighbors(store, user_id, target);

        let mut predicted = vec![0.0; target.len()];
        for neighbor in &neighbors {
            for (col, cell) in neighbor.row.iter().enumerate() {
                if let (None, Some(score)) = (target[col], cell) {
                    predicted[col] += neighbor.similarity * score;
                }
            }
        }

        let mut personalized: Vec<(WineId, f64)> = store
            .wine_ids()
            .iter()
            .copied()
            .zip(predicted)
            .filter(|(_, score)| *score > 0.0)
            .collect();
        personalized.sort_by(|a, b| by_score_desc_then_id(a.1, a.0, b.1, b.0));

        tracing::debug!(
            user_id,
            neighbors = neighbors.len(),
            personalized = personalized.len(),
            "Scored recommendations"
        );

        let mut ranked: Vec<WineId> = personalized.into_iter().map(|(wine_id, _)| wine_id).collect();
        let mut seen: HashSet<WineId> = ranked.iter().copied().collect();
        for &wine_id in popularity {
            if store.contains_wine(wine_id) && seen.insert(wine_id) {
                ranked.push(wine_id);
            }
        }

        Ok(ranked)
    }

    fn name(&self) -> &'static str {
        "user-similarity"
    }
}

fn unknown_user(user_id: UserId) -> AppError {
    AppError::NotFound(format!("User with id {} does not exist", user_id))
}

fn dot(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.unwrap_or(0.0) * y.unwrap_or(0.0))
        .sum()
}

fn norm(a: &[Option<f64>]) -> f64 {
    a.iter().flatten().map(|x| x * x).sum::<f64>().sqrt()
}
