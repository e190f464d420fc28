use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{NewUser, NewWine, RecordSnapshot, Review, User, UserId, Wine, WineId},
};

use super::RecordStore;

#[derive(Default)]
struct Records {
    users: BTreeMap<UserId, User>,
    wines: BTreeMap<WineId, Wine>,
    reviews: BTreeMap<(UserId, WineId), Review>,
}

/// Record store kept in process memory
///
/// Used by tests and for running the service without a database. Ids are
/// assigned sequentially after the largest id already present.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Records>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing records
    pub fn with_records(snapshot: RecordSnapshot) -> Self {
        let mut records = Records::default();
        for user in snapshot.users {
            records.users.insert(user.id, user);
        }
        for wine in snapshot.wines {
            records.wines.insert(wine.id, wine);
        }
        for review in snapshot.reviews {
            records
                .reviews
                .insert((review.user_id, review.wine_id), review);
        }

        Self {
            records: RwLock::new(records),
        }
    }
}

fn next_id<V>(map: &BTreeMap<i64, V>) -> i64 {
    map.keys().next_back().map_or(1, |last| last + 1)
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load_all(&self) -> AppResult<RecordSnapshot> {
        let records = self.records.read().await;
        Ok(RecordSnapshot {
            users: records.users.values().cloned().collect(),
            wines: records.wines.values().cloned().collect(),
            reviews: records.reviews.values().cloned().collect(),
        })
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.records.read().await.users.values().cloned().collect())
    }

    async fn list_wines(&self) -> AppResult<Vec<Wine>> {
        Ok(self.records.read().await.wines.values().cloned().collect())
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut records = self.records.write().await;
        if let Some(internal_id) = &user.internal_id {
            if records.users.values().any(|u| u.internal_id.as_ref() == Some(internal_id)) {
                return Err(AppError::Duplicate(format!(
                    "user with internal id {}",
                    internal_id
                )));
            }
        }

        let created = User {
            id: next_id(&records.users),
            name: user.name,
            internal_id: user.internal_id,
        };
        records.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn create_wine(&self, wine: NewWine) -> AppResult<Wine> {
        let mut records = self.records.write().await;
        if let Some(internal_id) = &wine.internal_id {
            if records.wines.values().any(|w| w.internal_id.as_ref() == Some(internal_id)) {
                return Err(AppError::Duplicate(format!(
                    "wine with internal id {}",
                    internal_id
                )));
            }
        }

        let created = Wine {
            id: next_id(&records.wines),
            name: wine.name,
            internal_id: wine.internal_id,
        };
        records.wines.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_internal_id(&self, internal_id: &str) -> AppResult<User> {
        let records = self.records.read().await;
        records
            .users
            .values()
            .find(|u| u.internal_id.as_deref() == Some(internal_id))
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("User with internal id {} does not exist", internal_id))
            })
    }

    async fn find_wine_by_internal_id(&self, internal_id: &str) -> AppResult<Wine> {
        let records = self.records.read().await;
        records
            .wines
            .values()
            .find(|w| w.internal_id.as_deref() == Some(internal_id))
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Wine with internal id {} does not exist", internal_id))
            })
    }

    async fn upsert_review(&self, review: Review) -> AppResult<Review> {
        let mut records = self.records.write().await;
        if !records.users.contains_key(&review.user_id) {
            return Err(AppError::NotFound(format!(
                "User with id {} does not exist",
                review.user_id
            )));
        }
        if !records.wines.contains_key(&review.wine_id) {
            return Err(AppError::NotFound(format!(
                "Wine with id {} does not exist",
                review.wine_id
            )));
        }

        records
            .reviews
            .insert((review.user_id, review.wine_id), review.clone());
        Ok(review)
    }
}
