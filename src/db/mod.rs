pub mod memory;
pub mod postgres;

pub use memory::InMemoryRecordStore;
pub use postgres::{create_pool, PgRecordStore};

use crate::{
    error::AppResult,
    models::{NewUser, NewWine, RecordSnapshot, Review, User, Wine},
};

/// Durable store of users, wines and reviews
///
/// The rating matrix is derived from this store: it is read in full at start-up
/// and the API layer writes here before notifying the matrix.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Every user, wine and review; wines in ascending id order
    async fn load_all(&self) -> AppResult<RecordSnapshot>;

    async fn list_users(&self) -> AppResult<Vec<User>>;

    async fn list_wines(&self) -> AppResult<Vec<Wine>>;

    /// Fails with `Duplicate` when the `internal_id` is already taken
    async fn create_user(&self, user: NewUser) -> AppResult<User>;

    /// Fails with `Duplicate` when the `internal_id` is already taken
    async fn create_wine(&self, wine: NewWine) -> AppResult<Wine>;

    /// Fails with `NotFound` when no user carries `internal_id`
    async fn find_user_by_internal_id(&self, internal_id: &str) -> AppResult<User>;

    /// Fails with `NotFound` when no wine carries `internal_id`
    async fn find_wine_by_internal_id(&self, internal_id: &str) -> AppResult<Wine>;

    /// Inserts the review or replaces the existing one for the same pair
    ///
    /// Fails with `NotFound` when the user or wine does not exist.
    async fn upsert_review(&self, review: Review) -> AppResult<Review>;
}
