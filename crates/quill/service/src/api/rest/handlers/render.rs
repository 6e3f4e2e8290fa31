//! Image generation pass-through

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateImageResponse {
    /// Base64-encoded PNG
    pub image: String,
}

/// Render a poem through the configured image service
pub async fn generate_image(
    State(state): State<AppState>,
    Json(request): Json<GenerateImageRequest>,
) -> ApiResult<Json<GenerateImageResponse>> {
    let renderer = state.renderer.as_ref().ok_or(ApiError::RenderUnavailable)?;
    let image = renderer.render(&request.title, &request.content).await?;

    Ok(Json(GenerateImageResponse { image }))
}
