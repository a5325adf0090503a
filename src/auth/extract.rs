use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde_json::Value;
use uuid::Uuid;

use super::jwt::verify_token;
use super::types::{AuthError, ACCESS_TOKEN_COOKIE};
use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, resolved from a verified Supabase access token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

fn is_session_cookie(name: &str) -> bool {
    name.starts_with("sb-") && name.ends_with("-auth-token")
}

/// Pulls the access token out of a Supabase session cookie value, which is
/// either the bare JWT, a JSON array whose first element is the token, a JSON
/// session object, or any of those as `base64-` prefixed JSON.
fn token_from_session_cookie(value: &str) -> Option<String> {
    let value = urlencoding::decode(value).map(|v| v.into_owned()).unwrap_or_else(|_| value.to_string());

    let json = match value.strip_prefix("base64-") {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD
                .decode(encoded.trim_end_matches('='))
                .or_else(|_| STANDARD.decode(encoded))
                .ok()?;
            String::from_utf8(bytes).ok()?
        }
        None => value,
    };

    match serde_json::from_str::<Value>(&json) {
        Ok(Value::Array(items)) => items.first().and_then(Value::as_str).map(str::to_string),
        Ok(Value::Object(session)) => session
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string),
        Ok(Value::String(token)) => Some(token),
        _ if json.split('.').count() == 3 => Some(json),
        _ => None,
    }
}

/// Finds the caller's access token: `Authorization: Bearer` first, then the
/// flat cookie, then a project-scoped session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    let session = jar
        .iter()
        .filter(|c| is_session_cookie(c.name()))
        .find_map(|c| token_from_session_cookie(c.value()));
    session
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(AuthError::MissingToken)?;
        let claims = verify_token(&state.config.supabase_jwt_secret, &token)?;

        Ok(AuthUser {
            id: claims.user_id()?,
            email: claims.email,
        })
    }
}
