//! Per-user statistics handler

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use quill_storage::UserId;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct UserPoemStatsResponse {
    pub total_poems: usize,
    pub public_poems: usize,
    pub pull_requests_received: usize,
    pub pending_reviews: usize,
    pub pull_requests_created: usize,
}

/// Document and proposal counts for one user
pub async fn get_user_poem_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserPoemStatsResponse>> {
    let stats = state.query.user_statistics(&UserId::new(user_id)).await?;

    Ok(Json(UserPoemStatsResponse {
        total_poems: stats.total_documents,
        public_poems: stats.public_documents,
        pull_requests_received: stats.proposals_received,
        pending_reviews: stats.pending_received,
        pull_requests_created: stats.proposals_created,
    }))
}
