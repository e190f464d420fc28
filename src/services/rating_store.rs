use std::collections::HashMap;

use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{review::normalized_score, Review, UserId, WineId},
};

/// In-memory user×wine rating matrix
///
/// Rows are users, columns are wines. A cell holds the normalized score of the
/// user's review of that wine, or `None` when the user has not reviewed it.
/// Row and column positions are stable until the next append.
#[derive(Debug, Clone, Default)]
pub struct RatingStore {
    user_ids: Vec<UserId>,
    wine_ids: Vec<WineId>,
    user_index: HashMap<UserId, usize>,
    wine_index: HashMap<WineId, usize>,
    rows: Vec<Vec<Option<f64>>>,
}

/// Owned copy of the matrix for diagnostics
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatrixSnapshot {
    /// Wine ids in column order
    pub columns: Vec<WineId>,
    pub rows: Vec<SnapshotRow>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotRow {
    pub user_id: UserId,
    /// One entry per column, `null` when unrated
    pub scores: Vec<Option<f64>>,
}

impl MatrixSnapshot {
    /// Looks up a cell; `None` covers both unknown ids and unrated cells
    pub fn score(&self, user_id: UserId, wine_id: WineId) -> Option<f64> {
        let col = self.columns.iter().position(|&id| id == wine_id)?;
        self.rows
            .iter()
            .find(|row| row.user_id == user_id)
            .and_then(|row| row.scores[col])
    }
}

impl RatingStore {
    /// Creates an empty matrix
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the matrix from the full record collections
    ///
    /// Columns are laid out in ascending wine id order. Duplicate ids are kept
    /// once. Reviews that cannot be scored or that point at unknown ids are
    /// skipped and leave their cell unset; for repeated pairs the last review wins.
    pub fn bootstrap(users: &[UserId], wines: &[WineId], reviews: &[Review]) -> Self {
        let mut wine_ids = wines.to_vec();
        wine_ids.sort_unstable();
        let before = wine_ids.len();
        wine_ids.dedup();
        if wine_ids.len() != before {
            tracing::warn!(
                skipped = before - wine_ids.len(),
                "Duplicate wine ids in bootstrap input"
            );
        }

        let mut store = Self {
            wine_index: index_of(&wine_ids),
            wine_ids,
            ..Self::default()
        };

        let width = store.wine_ids.len();
        store.user_ids.reserve(users.len());
        store.rows.reserve(users.len());
        for &user_id in users {
            if store.user_index.contains_key(&user_id) {
                tracing::warn!(user_id, "Duplicate user id in bootstrap input");
                continue;
            }
            store.user_index.insert(user_id, store.user_ids.len());
            store.user_ids.push(user_id);
            store.rows.push(vec![None; width]);
        }

        let mut skipped = 0usize;
        for review in reviews {
            if let Err(e) = store.set_rating(
                review.user_id,
                review.wine_id,
                review.rating,
                review.variants,
            ) {
                tracing::warn!(
                    user_id = review.user_id,
                    wine_id = review.wine_id,
                    error = %e,
                    "Skipping review during bootstrap"
                );
                skipped += 1;
            }
        }

        tracing::debug!(
            users = store.user_count(),
            wines = store.wine_count(),
            reviews = reviews.len() - skipped,
            skipped,
            "Rating matrix built"
        );

        store
    }

    /// Appends a row of unset cells for a new user
    pub fn add_user(&mut self, user_id: UserId) -> AppResult<()> {
        if self.user_index.contains_key(&user_id) {
            return Err(AppError::Duplicate(format!("user {}", user_id)));
        }

        self.user_index.insert(user_id, self.user_ids.len());
        self.user_ids.push(user_id);
        self.rows.push(vec![None; self.wine_ids.len()]);
        Ok(())
    }

    /// Appends a column, unset for every existing user, for a new wine
    pub fn add_wine(&mut self, wine_id: WineId) -> AppResult<()> {
        if self.wine_index.contains_key(&wine_id) {
            return Err(AppError::Duplicate(format!("wine {}", wine_id)));
        }

        self.wine_index.insert(wine_id, self.wine_ids.len());
        self.wine_ids.push(wine_id);
        for row in &mut self.rows {
            row.push(None);
        }
        Ok(())
    }

    /// Stores `rating / variants` for the pair, replacing any earlier score
    ///
    /// Nothing is written unless the score is valid and both ids are known.
    pub fn set_rating(
        &mut self,
        user_id: UserId,
        wine_id: WineId,
        rating: f64,
        variants: u32,
    ) -> AppResult<()> {
        let score = normalized_score(rating, variants)?;
        let row = self.require_row(user_id)?;
        let col = self.require_column(wine_id)?;

        self.rows[row][col] = Some(score);
        Ok(())
    }

    /// Fails with `NotFound` unless both ids are present
    pub fn ensure_known(&self, user_id: UserId, wine_id: WineId) -> AppResult<()> {
        self.require_row(user_id)?;
        self.require_column(wine_id)?;
        Ok(())
    }

    pub fn row_index_of(&self, user_id: UserId) -> Option<usize> {
        self.user_index.get(&user_id).copied()
    }

    pub fn column_index_of(&self, wine_id: WineId) -> Option<usize> {
        self.wine_index.get(&wine_id).copied()
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.user_index.contains_key(&user_id)
    }

    pub fn contains_wine(&self, wine_id: WineId) -> bool {
        self.wine_index.contains_key(&wine_id)
    }

    /// User ids in row order
    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    /// Wine ids in column order
    pub fn wine_ids(&self) -> &[WineId] {
        &self.wine_ids
    }

    pub fn user_count(&self) -> usize {
        self.user_ids.len()
    }

    pub fn wine_count(&self) -> usize {
        self.wine_ids.len()
    }

    /// Cells of a user's row in column order
    pub fn row(&self, user_id: UserId) -> Option<&[Option<f64>]> {
        self.row_index_of(user_id).map(|idx| self.rows[idx].as_slice())
    }

    /// Rows paired with their user id, in row order
    pub fn rows(&self) -> impl Iterator<Item = (UserId, &[Option<f64>])> {
        self.user_ids
            .iter()
            .copied()
            .zip(self.rows.iter().map(Vec::as_slice))
    }

    /// Score of a cell, `None` when unrated or when either id is unknown
    pub fn score(&self, user_id: UserId, wine_id: WineId) -> Option<f64> {
        let row = self.row_index_of(user_id)?;
        let col = self.column_index_of(wine_id)?;
        self.rows[row][col]
    }

    /// Number of wines the user has rated
    pub fn rated_count(&self, user_id: UserId) -> usize {
        self.row(user_id)
            .map(|row| row.iter().filter(|cell| cell.is_some()).count())
            .unwrap_or(0)
    }

    /// Sum of present scores per column, in column order
    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.wine_ids.len()];
        for row in &self.rows {
            for (sum, cell) in sums.iter_mut().zip(row) {
                if let Some(score) = cell {
                    *sum += score;
                }
            }
        }
        sums
    }

    pub fn snapshot(&self) -> MatrixSnapshot {
        MatrixSnapshot {
            columns: self.wine_ids.clone(),
            rows: self
                .rows()
                .map(|(user_id, scores)| SnapshotRow {
                    user_id,
                    scores: scores.to_vec(),
                })
                .collect(),
        }
    }

    fn require_row(&self, user_id: UserId) -> AppResult<usize> {
        self.row_index_of(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} does not exist", user_id)))
    }

    fn require_column(&self, wine_id: WineId) -> AppResult<usize> {
        self.column_index_of(wine_id)
            .ok_or_else(|| AppError::NotFound(format!("Wine with id {} does not exist", wine_id)))
    }
}

fn index_of(ids: &[i64]) -> HashMap<i64, usize> {
    ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect()
}
