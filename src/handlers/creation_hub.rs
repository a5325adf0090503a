use axum::{extract::State, Json};

use super::JsonBody;
use crate::auth::AuthUser;
use crate::creation_hub_service::{self, GenerateImageRequest, GenerateImageResponse};
use crate::error::ApiResult;
use crate::models::GeneratedImage;
use crate::state::AppState;

pub async fn generate(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<GenerateImageRequest>,
) -> ApiResult<Json<GenerateImageResponse>> {
    Ok(Json(creation_hub_service::generate(&state, &user, request).await?))
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<GeneratedImage>>> {
    Ok(Json(creation_hub_service::list_images(&state, &user).await?))
}
