mod analytics;
mod creation_hub;
mod games;
mod leads;
mod payments;
mod recordings;
mod sse;

pub use sse::SseStream;

use axum::{
    extract::{FromRequest, State},
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::quota::{self, UsageSummary};
use crate::state::AppState;

/// JSON request body whose rejections use the API error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

fn cors(app_url: &str) -> CorsLayer {
    match HeaderValue::from_str(app_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(_) => {
            log::warn!("APP_URL is not a valid origin, CORS is permissive");
            CorsLayer::permissive()
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors(&state.config.app_url);

    let api = Router::new()
        .route("/health", get(health))
        .route("/usage", get(usage))
        .route("/recordings", get(recordings::list).post(recordings::create))
        .route("/recordings/batch-analysis", post(recordings::batch_analysis))
        .route("/recordings/:id/download-url", get(recordings::download_url))
        .route("/recordings/:id/process", post(recordings::process))
        .route("/creation-hub/generate", post(creation_hub::generate))
        .route("/creation-hub/images", get(creation_hub::list))
        .route("/games", post(games::create))
        .route("/games/stats", get(games::stats))
        .route("/games/:id", get(games::get))
        .route("/games/:id/answers", post(games::answer))
        .route("/leads/search", post(leads::search))
        .route("/leads/searches", get(leads::list_searches))
        .route("/leads/searches/:id/results", get(leads::results))
        .route("/leads/results/:id/message", post(leads::message))
        .route("/stripe/connect/onboard", post(payments::onboard))
        .route("/stripe/webhook", post(payments::webhook))
        .route("/payment-links", get(payments::list_links).post(payments::create_link))
        .route("/subscriptions/checkout", post(payments::checkout))
        .route("/analytics/statistical", post(analytics::statistical))
        .route("/analytics/financial", post(analytics::financial))
        .route("/chat", post(sse::chat));

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

async fn usage(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<UsageSummary>> {
    let profile = quota::ensure_profile(state.store.as_ref(), &user).await?;
    Ok(Json(quota::usage_summary(state.store.as_ref(), &profile, Utc::now()).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AnalysisKind, AnalysisResult, AudioRecording, PlanType, RecordingStatus, UserProfile,
    };
    use crate::store::Store;
    use crate::test_support::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let ctx = test_state();
        let (status, body) = send(ctx.app(), Request::get("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let ctx = test_state();
        let (status, body) = send(ctx.app(), Request::get("/api/recordings").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTH_ERROR");
    }

    #[tokio::test]
    async fn exhausted_trial_blocks_new_recordings() {
        let ctx = test_state();
        let user = ctx.user();
        let mut profile = UserProfile::new_trial(user.id, user.email.clone());
        profile.trial_recordings_remaining = 0;
        ctx.store.insert_profile(&profile).await.unwrap();

        let request = post_json(
            "/api/recordings",
            &ctx.token(&user),
            json!({ "fileName": "a.webm", "storagePath": "u/a.webm" }),
        );
        let (status, body) = send(ctx.app(), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");
    }

    #[tokio::test]
    async fn trial_recording_is_created() {
        let ctx = test_state();
        let user = ctx.user();
        let request = post_json(
            "/api/recordings",
            &ctx.token(&user),
            json!({ "fileName": "a.webm", "storagePath": "u/a.webm", "durationSeconds": 12 }),
        );
        let (status, body) = send(ctx.app(), request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");

        let profile = ctx.store.get_profile(user.id).await.unwrap().unwrap();
        assert_eq!(profile.plan_type, PlanType::FreeTrial);
        assert_eq!(profile.trial_recordings_remaining, 2);
    }

    #[tokio::test]
    async fn processed_recording_is_not_reprocessed() {
        let ctx = test_state();
        let user = ctx.user();
        let now = Utc::now();
        let recording = AudioRecording {
            id: Uuid::new_v4(),
            user_id: user.id,
            title: "Call".to_string(),
            file_name: "call.webm".to_string(),
            storage_path: "u/call.webm".to_string(),
            duration_seconds: Some(30),
            status: RecordingStatus::Completed,
            transcript: Some("hello".to_string()),
            error_message: None,
            created_at: now,
        };
        ctx.store.insert_recording(&recording).await.unwrap();
        let analysis = AnalysisResult {
            id: Uuid::new_v4(),
            user_id: user.id,
            recording_id: Some(recording.id),
            kind: AnalysisKind::Recording,
            title: "Call".to_string(),
            summary: "short".to_string(),
            key_points: vec![],
            action_items: vec![],
            topics: vec![],
            sentiment: Some("neutral".to_string()),
            sentiment_score: Some(0.0),
            metrics: None,
            created_at: now,
        };
        ctx.store.insert_analysis(&analysis).await.unwrap();

        let uri = format!("/api/recordings/{}/process", recording.id);
        let (status, body) = send(ctx.app(), post_json(&uri, &ctx.token(&user), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Recording already processed");
        assert_eq!(body["analysis"]["id"], analysis.id.to_string());
    }

    #[tokio::test]
    async fn stats_route_is_not_shadowed_by_game_id() {
        let ctx = test_state();
        let user = ctx.user();
        let request = Request::get("/api/games/stats")
            .header("authorization", format!("Bearer {}", ctx.token(&user)))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(ctx.app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["games_played"], 0);
    }

    #[tokio::test]
    async fn statistical_analytics_over_text_columns_is_rejected() {
        let ctx = test_state();
        let user = ctx.user();
        let token = ctx.token(&user);

        let body = json!({ "data": [{ "name": "a", "score": 3 }], "columns": ["name"] });
        let (status, body) = send(ctx.app(), post_json("/api/analytics/statistical", &token, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");
        assert!(body["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("No numeric columns") && m.contains("name, score")));

        let body = json!({ "data": [{ "name": "a", "score": 3 }, { "name": "b", "score": 5 }] });
        let (status, body) = send(ctx.app(), post_json("/api/analytics/statistical", &token, body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"]["score"]["count"], 2);
        assert_eq!(body["source"], "local");
    }

    #[tokio::test]
    async fn usage_reports_plan_and_features() {
        let ctx = test_state();
        let user = ctx.user();
        let request = Request::get("/api/usage")
            .header("cookie", format!("sb-access-token={}", ctx.token(&user)))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(ctx.app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["plan"], "FREE_TRIAL");
        assert!(body["features"].as_array().is_some_and(|f| !f.is_empty()));
    }
}
