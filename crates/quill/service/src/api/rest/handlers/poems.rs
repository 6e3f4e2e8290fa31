//! Poem management handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use quill_review::{NewDocument, ANONYMOUS};
use quill_storage::{Document, DocumentId, DocumentPatch, QueryWindow, UserId};
use serde::{Deserialize, Serialize};

/// Poem as exposed over the API
#[derive(Debug, Serialize, Deserialize)]
pub struct PoemResponse {
    pub id: String,
    pub title: String,
    pub content: String,
    pub form: Option<String>,
    pub tone: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Document> for PoemResponse {
    fn from(document: Document) -> Self {
        Self {
            id: document.id.0,
            title: document.title,
            content: document.body,
            form: document.form,
            tone: document.tone,
            author_id: document.owner_id.0,
            author_name: document.owner_name,
            is_public: document.is_public,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePoemRequest {
    pub title: String,
    pub content: String,
    pub form: Option<String>,
    pub tone: Option<String>,
    pub author_id: String,
    #[serde(default = "anonymous")]
    pub author_name: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatePoemResponse {
    pub message: String,
    pub id: String,
    pub is_public: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePoemRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub form: Option<String>,
    pub tone: Option<String>,
    pub is_public: Option<bool>,
}

/// Caller identity, taken from the query string as-is.
#[derive(Debug, Deserialize)]
pub struct CurrentUserQuery {
    pub current_user_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExploreQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DeletePoemResponse {
    pub message: String,
    pub pull_requests_removed: usize,
}

fn anonymous() -> String {
    ANONYMOUS.to_string()
}

fn default_public() -> bool {
    true
}

/// Publish a poem
pub async fn create_poem(
    State(state): State<AppState>,
    Json(request): Json<CreatePoemRequest>,
) -> ApiResult<(StatusCode, Json<CreatePoemResponse>)> {
    let document = state
        .library
        .publish(NewDocument {
            title: request.title,
            body: request.content,
            form: request.form,
            tone: request.tone,
            owner_id: UserId::new(request.author_id),
            owner_name: request.author_name,
            is_public: request.is_public,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePoemResponse {
            message: "Poem created and published successfully".to_string(),
            id: document.id.0,
            is_public: document.is_public,
        }),
    ))
}

/// Public poems, newest first
pub async fn explore_poems(
    State(state): State<AppState>,
    Query(query): Query<ExploreQuery>,
) -> ApiResult<Json<Vec<PoemResponse>>> {
    let window = QueryWindow {
        limit: query.limit.unwrap_or(0),
        offset: query.offset.unwrap_or(0),
    };
    let documents = state.library.explore(window).await?;

    Ok(Json(documents.into_iter().map(PoemResponse::from).collect()))
}

/// A user's library, private poems included
pub async fn list_user_poems(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<PoemResponse>>> {
    let documents = state.library.library_for(&UserId::new(user_id)).await?;

    Ok(Json(documents.into_iter().map(PoemResponse::from).collect()))
}

pub async fn get_poem(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PoemResponse>> {
    let document = state.library.get(&DocumentId::new(id)).await?;

    Ok(Json(document.into()))
}

/// Owner edit; only supplied fields change
pub async fn update_poem(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(caller): Query<CurrentUserQuery>,
    Json(request): Json<UpdatePoemRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let patch = DocumentPatch {
        title: request.title,
        body: request.content,
        form: request.form,
        tone: request.tone,
        is_public: request.is_public,
    };
    state
        .library
        .edit(
            &DocumentId::new(id),
            &UserId::new(caller.current_user_id),
            patch,
        )
        .await?;

    Ok(Json(MessageResponse {
        message: "Poem updated successfully".to_string(),
    }))
}

/// Delete a poem together with its pull requests
pub async fn delete_poem(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(caller): Query<CurrentUserQuery>,
) -> ApiResult<Json<DeletePoemResponse>> {
    let removed = state
        .engine
        .delete_document_cascade(&DocumentId::new(id), &UserId::new(caller.current_user_id))
        .await?;

    Ok(Json(DeletePoemResponse {
        message: "Poem deleted successfully".to_string(),
        pull_requests_removed: removed,
    }))
}
