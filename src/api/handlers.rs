use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{NewUser, NewWine, RecordRef, Review, ReviewRequest, User, UserId, Wine, WineId},
    services::{MatrixDump, Page},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub offset: Option<i64>,
    #[serde(alias = "amount")]
    pub limit: Option<i64>,
}

impl PageParams {
    fn page(&self, default_limit: usize) -> Page {
        Page::new(
            self.offset.unwrap_or(0),
            self.limit.unwrap_or(default_limit as i64),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub wine_id: Vec<WineId>,
}

// Handlers

/// Health check endpoint; unavailable until the matrix is bootstrapped
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.matrix.is_ready().await {
        (StatusCode::OK, Json(json!({ "status": "healthy" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "uninitialized" })),
        )
    }
}

/// Get all users
pub async fn get_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.records.list_users().await?))
}

/// Create a new user and give it a matrix row
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    state.matrix.ensure_ready().await?;

    let user = state.records.create_user(request).await?;
    state.matrix.on_user_created(user.id).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Get all wines
pub async fn get_wines(State(state): State<AppState>) -> AppResult<Json<Vec<Wine>>> {
    Ok(Json(state.records.list_wines().await?))
}

/// Create a new wine and give it a matrix column
pub async fn create_wine(
    State(state): State<AppState>,
    Json(request): Json<NewWine>,
) -> AppResult<(StatusCode, Json<Wine>)> {
    state.matrix.ensure_ready().await?;

    let wine = state.records.create_wine(request).await?;
    state.matrix.on_wine_created(wine.id).await?;

    Ok((StatusCode::CREATED, Json(wine)))
}

async fn resolve_user(state: &AppState, user: RecordRef) -> AppResult<UserId> {
    match user {
        RecordRef::Id(id) => Ok(id),
        RecordRef::InternalId(internal_id) => {
            Ok(state.records.find_user_by_internal_id(&internal_id).await?.id)
        }
    }
}

async fn resolve_wine(state: &AppState, wine: RecordRef) -> AppResult<WineId> {
    match wine {
        RecordRef::Id(id) => Ok(id),
        RecordRef::InternalId(internal_id) => {
            Ok(state.records.find_wine_by_internal_id(&internal_id).await?.id)
        }
    }
}

/// Create or update a user's review of a wine
///
/// `user` and `wine` are record ids, or `internal_id` strings.
pub async fn upsert_review(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ReviewRequest>,
) -> AppResult<Json<Value>> {
    let user_id = resolve_user(&state, request.user).await?;
    let wine_id = resolve_wine(&state, request.wine).await?;
    let review = Review::new(user_id, wine_id, request.rating, request.variants);
    review.normalized_score()?;

    let _guard = state.review_writes.lock().await;
    state.matrix.ensure_known(user_id, wine_id).await?;

    let saved = state.records.upsert_review(review).await?;
    state
        .matrix
        .on_review_upserted(saved.user_id, saved.wine_id, saved.rating, saved.variants)
        .await?;

    tracing::info!(
        request_id = %request_id,
        user_id = saved.user_id,
        wine_id = saved.wine_id,
        "Review saved"
    );

    Ok(Json(json!({ "result": "ok" })))
}

/// Ranked wine recommendations for one user
pub async fn get_recommendations(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(user_id): Path<UserId>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<RecommendationResponse>> {
    let page = params.page(state.default_page_size);
    let wine_id = state.matrix.get_recommendations(user_id, page).await?;

    tracing::debug!(
        request_id = %request_id,
        user_id,
        offset = page.offset,
        limit = page.limit,
        returned = wine_id.len(),
        "Served recommendations"
    );

    Ok(Json(RecommendationResponse { wine_id }))
}

/// Recommendations for a user addressed by its `internal_id`
pub async fn get_recommendations_by_internal_id(
    State(state): State<AppState>,
    Path(internal_id): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<RecommendationResponse>> {
    let user = state.records.find_user_by_internal_id(&internal_id).await?;
    let wine_id = state
        .matrix
        .get_recommendations(user.id, params.page(state.default_page_size))
        .await?;
    Ok(Json(RecommendationResponse { wine_id }))
}

/// Most popular wines
pub async fn get_popular_wines(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<RecommendationResponse>> {
    let wine_id = state
        .matrix
        .popularity(params.page(state.default_page_size))
        .await?;
    Ok(Json(RecommendationResponse { wine_id }))
}

/// Diagnostic dump of the rating matrix
pub async fn dump_matrix(State(state): State<AppState>) -> AppResult<Json<MatrixDump>> {
    Ok(Json(state.matrix.dump_matrix().await?))
}

/// Rebuild the matrix from the record store
pub async fn bootstrap(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.matrix.bootstrap(state.records.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
