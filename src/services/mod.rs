pub mod matrix_service;
pub mod popularity;
pub mod rating_store;
pub mod strategy;

pub use matrix_service::{MatrixDump, MatrixService, Page};
pub use popularity::PopularityRanker;
pub use rating_store::{MatrixSnapshot, RatingStore};
pub use strategy::{PopularityStrategy, RecommenderStrategy, UserSimilarityStrategy};
