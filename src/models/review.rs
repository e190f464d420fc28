use serde::{Deserialize, Serialize};

use super::{UserId, WineId};
use crate::error::{AppError, AppResult};

/// A user's review of a wine
///
/// At most one review is effective per (user, wine) pair; a later write for the
/// same pair replaces the earlier one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    #[serde(alias = "user")]
    pub user_id: UserId,
    #[serde(alias = "wine")]
    pub wine_id: WineId,
    /// Raw rating given by the user
    pub rating: f64,
    /// Number of variants the rating was spread over
    pub variants: u32,
}

impl Review {
    pub fn new(user_id: UserId, wine_id: WineId, rating: f64, variants: u32) -> Self {
        Self {
            user_id,
            wine_id,
            rating,
            variants,
        }
    }

    /// Strength of the review, `rating / variants`
    pub fn normalized_score(&self) -> AppResult<f64> {
        normalized_score(self.rating, self.variants)
    }
}

/// Reference to a user or wine in a request body
///
/// A JSON number is the record-store id; a string is the client-side
/// `internal_id` and has to be resolved against the record store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RecordRef {
    Id(i64),
    InternalId(String),
}

/// Body of `POST /reviews`
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    #[serde(alias = "user_id")]
    pub user: RecordRef,
    #[serde(alias = "wine_id")]
    pub wine: RecordRef,
    pub rating: f64,
    pub variants: u32,
}

/// Divides a rating by its variants count, rejecting inputs that have no score
pub fn normalized_score(rating: f64, variants: u32) -> AppResult<f64> {
    if variants == 0 {
        return Err(AppError::Validation(
            "variants must not be zero".to_string(),
        ));
    }
    if !rating.is_finite() {
        return Err(AppError::Validation(format!(
            "rating must be a finite number, got {}",
            rating
        )));
    }
    Ok(rating / variants as f64)
}
