use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use super::JsonBody;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::models::PaymentLink;
use crate::payments::{self, CreatePaymentLinkRequest, RedirectUrl};
use crate::state::AppState;

pub async fn onboard(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<RedirectUrl>> {
    Ok(Json(payments::connect_onboard(&state, &user).await?))
}

pub async fn create_link(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<CreatePaymentLinkRequest>,
) -> ApiResult<(StatusCode, Json<PaymentLink>)> {
    let link = payments::create_payment_link(&state, &user, request).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn list_links(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<PaymentLink>>> {
    Ok(Json(payments::list_payment_links(&state, &user).await?))
}

pub async fn checkout(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<RedirectUrl>> {
    Ok(Json(payments::subscription_checkout(&state, &user).await?))
}

/// Unauthenticated; the signature is the credential.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<Value>> {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());
    payments::receive_webhook(&state, signature, &body).await?;
    Ok(Json(json!({ "received": true })))
}
