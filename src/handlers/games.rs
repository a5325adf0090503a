use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::JsonBody;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::game_service::{self, AnswerOutcome, AnswerRequest, CreateGameRequest, GameStatsView};
use crate::models::GameRoomView;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<CreateGameRequest>,
) -> ApiResult<(StatusCode, Json<GameRoomView>)> {
    let game = game_service::create_game(&state, &user, request).await?;
    Ok((StatusCode::CREATED, Json(game)))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GameRoomView>> {
    Ok(Json(game_service::get_game(&state, &user, id).await?))
}

pub async fn answer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<AnswerRequest>,
) -> ApiResult<Json<AnswerOutcome>> {
    Ok(Json(game_service::submit_answer(&state, &user, id, request).await?))
}

pub async fn stats(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<GameStatsView>> {
    Ok(Json(game_service::stats(&state, &user).await?))
}
