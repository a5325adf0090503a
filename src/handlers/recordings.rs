use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::JsonBody;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::models::{AnalysisResult, AudioRecording};
use crate::recording_service::{self, BatchAnalysisRequest, CreateRecordingRequest, DownloadUrl, ProcessOutcome};
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<CreateRecordingRequest>,
) -> ApiResult<(StatusCode, Json<AudioRecording>)> {
    let recording = recording_service::create(&state, &user, request).await?;
    Ok((StatusCode::CREATED, Json(recording)))
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<AudioRecording>>> {
    Ok(Json(recording_service::list(&state, &user).await?))
}

pub async fn download_url(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DownloadUrl>> {
    Ok(Json(recording_service::download_url(&state, &user, id).await?))
}

pub async fn process(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProcessOutcome>> {
    Ok(Json(recording_service::process(&state, &user, id).await?))
}

pub async fn batch_analysis(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<BatchAnalysisRequest>,
) -> ApiResult<(StatusCode, Json<AnalysisResult>)> {
    let analysis = recording_service::batch_analysis(&state, &user, request).await?;
    Ok((StatusCode::CREATED, Json(analysis)))
}
