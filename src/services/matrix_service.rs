use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{
    db::RecordStore,
    error::{AppError, AppResult},
    models::{RecordSnapshot, UserId, WineId},
};

use super::popularity::PopularityRanker;
use super::rating_store::{MatrixSnapshot, RatingStore};
use super::strategy::RecommenderStrategy;

/// Page size used when a query does not give one
pub const DEFAULT_LIMIT: usize = 20;

/// Matrix plus the popularity order computed from it
///
/// The two are only ever replaced together under the write lock.
struct ReadyMatrix {
    store: RatingStore,
    popularity: Vec<WineId>,
    built_at: DateTime<Utc>,
}

enum MatrixState {
    Uninitialized,
    Ready(ReadyMatrix),
}

/// Read-only dump of the live matrix
#[derive(Debug, Clone, Serialize)]
pub struct MatrixDump {
    pub built_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub users: usize,
    pub wines: usize,
    pub popularity: Vec<WineId>,
    pub matrix: MatrixSnapshot,
}

/// Offset/limit window over a ranked list
///
/// Signed so that negative values coming from clients can be rejected rather
/// than wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT as i64,
        }
    }
}

impl Page {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// Returns `[offset, offset + limit)` of `items`, shorter when past the end
    pub fn slice<T: Clone>(&self, items: &[T]) -> AppResult<Vec<T>> {
        if self.offset < 0 {
            return Err(AppError::Validation(format!(
                "offset must not be negative, got {}",
                self.offset
            )));
        }
        if self.limit < 0 {
            return Err(AppError::Validation(format!(
                "limit must not be negative, got {}",
                self.limit
            )));
        }

        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(items.len());
        let len = usize::try_from(self.limit).unwrap_or(usize::MAX);
        let end = start.saturating_add(len).min(items.len());
        Ok(items[start..end].to_vec())
    }
}

/// Owner of the process-wide rating matrix
///
/// Starts `Uninitialized` and becomes ready after a successful bootstrap. Every
/// other operation fails with `Unavailable` until then. Mutations take the write
/// lock for their whole duration, so readers never see a half-applied change.
/// Only `bootstrap` awaits while holding it, and it replaces the state in a
/// single assignment after the await.
pub struct MatrixService {
    state: RwLock<MatrixState>,
    ranker: PopularityRanker,
    strategy: Arc<dyn RecommenderStrategy>,
}

impl MatrixService {
    pub fn new(strategy: Arc<dyn RecommenderStrategy>) -> Self {
        Self {
            state: RwLock::new(MatrixState::Uninitialized),
            ranker: PopularityRanker::new(),
            strategy,
        }
    }

    /// Loads every record from the store and builds the matrix
    ///
    /// The write lock is held from before the read until the swap, so creation
    /// and review events wait for the rebuilt matrix instead of being applied
    /// to the old one and lost. On failure the previous state is kept and
    /// `Unavailable` is returned so the caller can retry.
    pub async fn bootstrap(&self, records: &dyn RecordStore) -> AppResult<()> {
        let mut state = self.state.write().await;

        let snapshot = records.load_all().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to load records for matrix bootstrap");
            AppError::Unavailable(format!("record store unreachable: {}", e))
        })?;

        *state = MatrixState::Ready(self.build(snapshot));
        Ok(())
    }

    /// Builds the matrix from records already in memory and swaps it in
    pub async fn bootstrap_from(&self, snapshot: RecordSnapshot) {
        let ready = self.build(snapshot);
        *self.state.write().await = MatrixState::Ready(ready);
    }

    fn build(&self, snapshot: RecordSnapshot) -> ReadyMatrix {
        let user_ids: Vec<UserId> = snapshot.users.iter().map(|u| u.id).collect();
        let wine_ids: Vec<WineId> = snapshot.wines.iter().map(|w| w.id).collect();

        let store = RatingStore::bootstrap(&user_ids, &wine_ids, &snapshot.reviews);
        let popularity = self.ranker.rank(&store);

        tracing::info!(
            users = store.user_count(),
            wines = store.wine_count(),
            reviews = snapshot.reviews.len(),
            strategy = self.strategy.name(),
            "Rating matrix bootstrapped"
        );

        ReadyMatrix {
            store,
            popularity,
            built_at: Utc::now(),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.read().await, MatrixState::Ready(_))
    }

    /// Fails with `Unavailable` until the matrix has been bootstrapped
    pub async fn ensure_ready(&self) -> AppResult<()> {
        let state = self.state.read().await;
        ready_ref(&state).map(|_| ())
    }

    /// Adds a row for a newly created user
    ///
    /// A user that is already present is a replayed event: it is logged and
    /// ignored. The popularity order does not change.
    pub async fn on_user_created(&self, user_id: UserId) -> AppResult<()> {
        let mut state = self.state.write().await;
        let ready = ready_mut(&mut state)?;

        match ready.store.add_user(user_id) {
            Ok(()) => {
                tracing::info!(user_id, "User added to rating matrix");
                Ok(())
            }
            Err(AppError::Duplicate(what)) => {
                tracing::warn!(user_id, "Ignoring replayed creation of {}", what);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Adds a column for a newly created wine and re-ranks
    pub async fn on_wine_created(&self, wine_id: WineId) -> AppResult<()> {
        let mut state = self.state.write().await;
        let ready = ready_mut(&mut state)?;

        match ready.store.add_wine(wine_id) {
            Ok(()) => {
                ready.popularity = self.ranker.rank(&ready.store);
                tracing::info!(wine_id, "Wine added to rating matrix");
                Ok(())
            }
            Err(AppError::Duplicate(what)) => {
                tracing::warn!(wine_id, "Ignoring replayed creation of {}", what);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Records a created or updated review and re-ranks
    pub async fn on_review_upserted(
        &self,
        user_id: UserId,
        wine_id: WineId,
        rating: f64,
        variants: u32,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let ready = ready_mut(&mut state)?;

        ready.store.set_rating(user_id, wine_id, rating, variants)?;
        ready.popularity = self.ranker.rank(&ready.store);

        tracing::debug!(user_id, wine_id, rating, variants, "Review applied to rating matrix");
        Ok(())
    }

    /// Fails with `NotFound` unless both ids are rows/columns of the matrix
    pub async fn ensure_known(&self, user_id: UserId, wine_id: WineId) -> AppResult<()> {
        let state = self.state.read().await;
        ready_ref(&state)?.store.ensure_known(user_id, wine_id)
    }

    /// Ranked wine ids for a user, windowed by `page`
    pub async fn get_recommendations(&self, user_id: UserId, page: Page) -> AppResult<Vec<WineId>> {
        let state = self.state.read().await;
        let ready = ready_ref(&state)?;

        let ranked = self
            .strategy
            .recommend(&ready.store, &ready.popularity, user_id)?;
        page.slice(&ranked)
    }

    /// Window over the global popularity order
    pub async fn popularity(&self, page: Page) -> AppResult<Vec<WineId>> {
        let state = self.state.read().await;
        page.slice(&ready_ref(&state)?.popularity)
    }

    /// Copy of the matrix for inspection; changes to it never reach the live matrix
    pub async fn dump_matrix(&self) -> AppResult<MatrixDump> {
        let state = self.state.read().await;
        let ready = ready_ref(&state)?;

        Ok(MatrixDump {
            built_at: ready.built_at,
            generated_at: Utc::now(),
            users: ready.store.user_count(),
            wines: ready.store.wine_count(),
            popularity: ready.popularity.clone(),
            matrix: ready.store.snapshot(),
        })
    }
}

fn ready_ref(state: &MatrixState) -> AppResult<&ReadyMatrix> {
    match state {
        MatrixState::Ready(ready) => Ok(ready),
        MatrixState::Uninitialized => Err(not_bootstrapped()),
    }
}

fn ready_mut(state: &mut MatrixState) -> AppResult<&mut ReadyMatrix> {
    match state {
        MatrixState::Ready(ready) => Ok(ready),
        MatrixState::Uninitialized => Err(not_bootstrapped()),
    }
}

fn not_bootstrapped() -> AppError {
    AppError::Unavailable("rating matrix has not been bootstrapped".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryRecordStore, MockRecordStore};
    use crate::models::{NewUser, NewWine, Review, User, Wine};
    use std::time::Duration;
    use tokio::sync::Notify;
    use crate::services::strategy::{PopularityStrategy, UserSimilarityStrategy};

    fn scenario_records() -> RecordSnapshot {
        RecordSnapshot {
            users: vec![
                User::new(1, "anna"),
                User::new(2, "boris"),
            ],
            wines: vec![
                Wine::new(20, "Rioja"),
                Wine::new(10, "Chablis"),
            ],
            reviews: vec![Review::new(1, 10, 4.0, 5)],
        }
    }

    /// Record store whose `load_all` stops after reading until released
    struct PausedLoadStore {
        inner: InMemoryRecordStore,
        loaded: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl RecordStore for PausedLoadStore {
        async fn load_all(&self) -> AppResult<RecordSnapshot> {
            let snapshot = self.inner.load_all().await?;
            self.loaded.notify_one();
            self.release.notified().await;
            Ok(snapshot)
        }

        async fn list_users(&self) -> AppResult<Vec<User>> {
            self.inner.list_users().await
        }

        async fn list_wines(&self) -> AppResult<Vec<Wine>> {
            self.inner.list_wines().await
        }

        async fn create_user(&self, user: NewUser) -> AppResult<User> {
            self.inner.create_user(user).await
        }

        async fn create_wine(&self, wine: NewWine) -> AppResult<Wine> {
            self.inner.create_wine(wine).await
        }

        async fn find_user_by_internal_id(&self, internal_id: &str) -> AppResult<User> {
            self.inner.find_user_by_internal_id(internal_id).await
        }

        async fn find_wine_by_internal_id(&self, internal_id: &str) -> AppResult<Wine> {
            self.inner.find_wine_by_internal_id(internal_id).await
        }

        async fn upsert_review(&self, review: Review) -> AppResult<Review> {
            self.inner.upsert_review(review).await
        }
    }

    async fn ready_service() -> MatrixService {
        let service = MatrixService::new(Arc::new(UserSimilarityStrategy::new(20)));
        service.bootstrap_from(scenario_records()).await;
        service
    }

    #[test]
    fn test_page_slice() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(Page::new(1, 2).slice(&items).unwrap(), vec![2, 3]);
        assert_eq!(Page::new(4, 10).slice(&items).unwrap(), vec![5]);
        assert!(Page::new(9, 3).slice(&items).unwrap().is_empty());
        assert!(Page::new(0, 0).slice(&items).unwrap().is_empty());
        assert_eq!(Page::default().slice(&items).unwrap(), items);
    }

    #[test]
    fn test_page_rejects_negative_values() {
        let items = vec![1, 2, 3];
        assert!(matches!(Page::new(-1, 2).slice(&items), Err(AppError::Validation(_))));
        assert!(matches!(Page::new(0, -2).slice(&items), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_uninitialized_refuses_everything() {
        let service = MatrixService::new(Arc::new(PopularityStrategy));
        assert!(!service.is_ready().await);
        assert!(matches!(service.on_user_created(1).await, Err(AppError::Unavailable(_))));
        assert!(matches!(service.on_wine_created(1).await, Err(AppError::Unavailable(_))));
        assert!(matches!(
            service.on_review_upserted(1, 1, 1.0, 1).await,
            Err(AppError::Unavailable(_))
        ));
        assert!(matches!(
            service.get_recommendations(1, Page::default()).await,
            Err(AppError::Unavailable(_))
        ));
        assert!(matches!(service.dump_matrix().await, Err(AppError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_failure_stays_uninitialized() {
        let mut records = MockRecordStore::new();
        records
            .expect_load_all()
            .returning(|| Err(AppError::Internal("connection refused".to_string())));

        let service = MatrixService::new(Arc::new(PopularityStrategy));
        let result = service.bootstrap(&records).await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));
        assert!(!service.is_ready().await);
    }

    #[tokio::test]
    async fn test_bootstrap_from_record_store() {
        let mut records = MockRecordStore::new();
        records
            .expect_load_all()
            .times(1)
            .returning(|| Ok(scenario_records()));

        let service = MatrixService::new(Arc::new(PopularityStrategy));
        service.bootstrap(&records).await.unwrap();
        assert!(service.is_ready().await);

        let dump = service.dump_matrix().await.unwrap();
        assert_eq!(dump.matrix.columns, vec![10, 20]);
        assert_eq!(dump.popularity, vec![10, 20]);
        assert!((dump.matrix.score(1, 10).unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(dump.matrix.score(1, 20), None);
        assert_eq!(dump.matrix.score(2, 10), None);
    }

    #[tokio::test]
    async fn test_events_during_rebootstrap_are_kept() {
        let records = Arc::new(PausedLoadStore {
            inner: InMemoryRecordStore::with_records(RecordSnapshot {
                users: vec![User::new(1, "anna")],
                wines: vec![Wine::new(10, "Chablis")],
                reviews: vec![],
            }),
            loaded: Notify::new(),
            release: Notify::new(),
        });
        let service = Arc::new(MatrixService::new(Arc::new(PopularityStrategy)));
        service
            .bootstrap_from(records.inner.load_all().await.unwrap())
            .await;

        let rebuild = {
            let (service, records) = (service.clone(), records.clone());
            tokio::spawn(async move { service.bootstrap(records.as_ref()).await })
        };
        records.loaded.notified().await;

        // Created after the snapshot was read, applied while the rebuild is paused.
        let user = records
            .create_user(NewUser { name: "boris".to_string(), internal_id: None })
            .await
            .unwrap();
        let event = {
            let service = service.clone();
            tokio::spawn(async move { service.on_user_created(user.id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        records.release.notify_one();
        rebuild.await.unwrap().unwrap();
        event.await.unwrap().unwrap();

        assert_eq!(
            service.get_recommendations(user.id, Page::default()).await.unwrap(),
            vec![10]
        );
        assert_eq!(service.dump_matrix().await.unwrap().users, 2);
    }

    #[tokio::test]
    async fn test_wine_created_reranks() {
        let service = ready_service().await;
        service.on_wine_created(30).await.unwrap();
        assert_eq!(service.popularity(Page::default()).await.unwrap(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_duplicate_creation_is_ignored() {
        let service = ready_service().await;
        service.on_user_created(1).await.unwrap();
        service.on_wine_created(10).await.unwrap();

        let dump = service.dump_matrix().await.unwrap();
        assert_eq!(dump.users, 2);
        assert_eq!(dump.wines, 2);
    }

    #[tokio::test]
    async fn test_review_upsert_reranks() {
        let service = ready_service().await;
        service.on_review_upserted(2, 20, 3.0, 1).await.unwrap();
        assert_eq!(service.popularity(Page::default()).await.unwrap(), vec![20, 10]);
    }

    #[tokio::test]
    async fn test_review_for_unknown_wine_changes_nothing() {
        let service = ready_service().await;
        let before = service.dump_matrix().await.unwrap();

        let result = service.on_review_upserted(1, 99, 5.0, 1).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let after = service.dump_matrix().await.unwrap();
        assert_eq!(after.matrix, before.matrix);
        assert_eq!(after.popularity, before.popularity);
    }

    #[tokio::test]
    async fn test_review_with_zero_variants_rejected() {
        let service = ready_service().await;
        let result = service.on_review_upserted(1, 20, 5.0, 0).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(service.dump_matrix().await.unwrap().matrix.score(1, 20), None);
    }

    #[tokio::test]
    async fn test_new_user_gets_popularity_order() {
        let service = ready_service().await;
        service.on_user_created(3).await.unwrap();
        let recommendations = service.get_recommendations(3, Page::default()).await.unwrap();
        assert_eq!(recommendations, service.popularity(Page::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_recommendations_for_unknown_user() {
        let service = ready_service().await;
        assert!(matches!(
            service.get_recommendations(77, Page::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recommendation_window_sizes() {
        let service = ready_service().await;
        for wine_id in [30, 40, 50] {
            service.on_wine_created(wine_id).await.unwrap();
        }
        let total = 5i64;

        for offset in 0..7i64 {
            for limit in 0..7i64 {
                let page = service
                    .get_recommendations(1, Page::new(offset, limit))
                    .await
                    .unwrap();
                let expected = limit.min(total - offset).max(0) as usize;
                assert_eq!(page.len(), expected, "offset {} limit {}", offset, limit);

                let mut unique = page.clone();
                unique.sort_unstable();
                unique.dedup();
                assert_eq!(unique.len(), page.len());
            }
        }
    }

    #[tokio::test]
    async fn test_dump_is_detached_from_live_matrix() {
        let service = ready_service().await;
        let mut dump = service.dump_matrix().await.unwrap();
        dump.matrix.rows[1].scores[1] = Some(100.0);
        dump.popularity.clear();

        let fresh = service.dump_matrix().await.unwrap();
        assert_eq!(fresh.matrix.score(2, 20), None);
        assert_eq!(fresh.popularity, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_and_readers() {
        let service = Arc::new(ready_service().await);
        let mut tasks = Vec::new();

        for i in 0..20i64 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                service.on_wine_created(100 + i).await.unwrap();
                service.on_user_created(100 + i).await.unwrap();
                service
                    .on_review_upserted(100 + i, 100 + i, 1.0, 1)
                    .await
                    .unwrap();
                let ranked = service
                    .get_recommendations(1, Page::new(0, 1000))
                    .await
                    .unwrap();
                let mut unique = ranked.clone();
                unique.sort_unstable();
                unique.dedup();
                assert_eq!(unique.len(), ranked.len());

                let dump = service.dump_matrix().await.unwrap();
                assert!(ranked.len() <= dump.wines);
                assert_eq!(dump.popularity.len(), dump.wines);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        let dump = service.dump_matrix().await.unwrap();
        assert_eq!(dump.users, 22);
        assert_eq!(dump.wines, 22);
        assert_eq!(dump.popularity.len(), 22);
        assert!(dump.matrix.rows.iter().all(|row| row.scores.len() == 22));
    }
}
