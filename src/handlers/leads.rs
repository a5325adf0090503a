use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::JsonBody;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::lead_service::{self, LeadSearchRequest, LeadSearchResponse, MessageRequest};
use crate::models::{LeadMessage, LeadResult, LeadSearch};
use crate::state::AppState;

pub async fn search(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<LeadSearchRequest>,
) -> ApiResult<Json<LeadSearchResponse>> {
    Ok(Json(lead_service::search(&state, &user, request).await?))
}

pub async fn list_searches(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<LeadSearch>>> {
    Ok(Json(lead_service::list_searches(&state, &user).await?))
}

pub async fn results(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LeadResult>>> {
    Ok(Json(lead_service::search_results(&state, &user, id).await?))
}

// body is optional; `{}` and no body both use the default tone
pub async fn message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    request: Option<JsonBody<MessageRequest>>,
) -> ApiResult<(StatusCode, Json<LeadMessage>)> {
    let request = request.map(|JsonBody(r)| r).unwrap_or_default();
    let message = lead_service::generate_message(&state, &user, id, request).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
