//! Pull request (edit proposal) handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use quill_review::{CreateProposal, ProposalQueryFilter, ProposalView, ANONYMOUS};
use quill_storage::{DocumentId, ProposalId, ProposalStatus, UserId};
use serde::{Deserialize, Serialize};

/// Pull request as exposed over the API
#[derive(Debug, Serialize, Deserialize)]
pub struct PullRequestResponse {
    pub id: String,
    pub poem_id: String,
    pub original_content: String,
    pub proposed_content: String,
    pub proposed_title: String,
    pub author_id: String,
    pub author_name: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub review_message: Option<String>,
    pub poem_title: Option<String>,
    pub poem_author_name: Option<String>,
}

impl From<ProposalView> for PullRequestResponse {
    fn from(view: ProposalView) -> Self {
        let p = view.proposal;
        Self {
            id: p.id.0,
            poem_id: p.document_id.0,
            original_content: p.original_body,
            proposed_content: p.proposed_body,
            proposed_title: p.proposed_title,
            author_id: p.proposer_id.0,
            author_name: p.proposer_name,
            status: p.status,
            created_at: p.created_at,
            reviewed_at: p.reviewed_at,
            message: p.message,
            review_message: p.review_message,
            poem_title: view.document_title,
            poem_author_name: view.document_owner_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePullRequestRequest {
    pub poem_id: String,
    pub proposed_content: String,
    pub proposed_title: Option<String>,
    pub author_id: String,
    #[serde(default = "anonymous")]
    pub author_name: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePullRequestResponse {
    pub message: String,
    pub id: String,
    pub poem_title: String,
    pub poem_author: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPullRequestsQuery {
    pub status: Option<String>,
    pub poem_author_id: Option<String>,
    pub pr_author_id: Option<String>,
}

/// Reviewer identity, taken from the query string as-is.
#[derive(Debug, Deserialize)]
pub struct ReviewerQuery {
    pub reviewer_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub review_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub message: String,
    pub poem_title: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RejectResponse {
    pub message: String,
    pub review_message: Option<String>,
}

fn anonymous() -> String {
    ANONYMOUS.to_string()
}

/// Open a pull request against someone else's public poem
pub async fn create_pull_request(
    State(state): State<AppState>,
    Json(request): Json<CreatePullRequestRequest>,
) -> ApiResult<(StatusCode, Json<CreatePullRequestResponse>)> {
    let receipt = state
        .engine
        .create_proposal(CreateProposal {
            document_id: DocumentId::new(request.poem_id),
            proposer_id: UserId::new(request.author_id),
            proposer_name: request.author_name,
            proposed_body: request.proposed_content,
            proposed_title: request.proposed_title,
            message: request.message,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePullRequestResponse {
            message: "Pull request submitted successfully".to_string(),
            id: receipt.proposal_id.0,
            poem_title: receipt.document_title,
            poem_author: receipt.document_owner_name,
        }),
    ))
}

/// Pull requests matching every supplied filter, newest first
pub async fn list_pull_requests(
    State(state): State<AppState>,
    Query(query): Query<ListPullRequestsQuery>,
) -> ApiResult<Json<Vec<PullRequestResponse>>> {
    let status = query
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ProposalStatus>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let filter = ProposalQueryFilter {
        status,
        document_owner_id: query.poem_author_id.filter(|s| !s.is_empty()).map(UserId::new),
        proposer_id: query.pr_author_id.filter(|s| !s.is_empty()).map(UserId::new),
    };
    let views = state.query.list_proposals(&filter).await?;

    Ok(Json(views.into_iter().map(PullRequestResponse::from).collect()))
}

/// Pull requests for one poem, newest first
pub async fn list_poem_pull_requests(
    State(state): State<AppState>,
    Path(poem_id): Path<String>,
) -> ApiResult<Json<Vec<PullRequestResponse>>> {
    let views = state
        .query
        .list_for_document(&DocumentId::new(poem_id))
        .await?;

    Ok(Json(views.into_iter().map(PullRequestResponse::from).collect()))
}

pub async fn get_pull_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PullRequestResponse>> {
    let view = state.query.get_proposal(&ProposalId::new(id)).await?;

    Ok(Json(view.into()))
}

/// Approve and merge; poem author only
pub async fn approve_pull_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(reviewer): Query<ReviewerQuery>,
    body: Option<Json<ReviewRequest>>,
) -> ApiResult<Json<ApproveResponse>> {
    let review = body.map(|Json(review)| review).unwrap_or_default();
    let receipt = state
        .engine
        .approve_proposal(
            &ProposalId::new(id),
            &UserId::new(reviewer.reviewer_id),
            review.review_message,
        )
        .await?;

    Ok(Json(ApproveResponse {
        message: "Pull request approved and changes merged successfully".to_string(),
        poem_title: receipt.title,
        updated_at: receipt.updated_at,
    }))
}

/// Reject; poem author only
pub async fn reject_pull_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(reviewer): Query<ReviewerQuery>,
    body: Option<Json<ReviewRequest>>,
) -> ApiResult<Json<RejectResponse>> {
    let review = body.map(|Json(review)| review).unwrap_or_default();
    let receipt = state
        .engine
        .reject_proposal(
            &ProposalId::new(id),
            &UserId::new(reviewer.reviewer_id),
            review.review_message,
        )
        .await?;

    Ok(Json(RejectResponse {
        message: "Pull request rejected".to_string(),
        review_message: receipt.review_message,
    }))
}
