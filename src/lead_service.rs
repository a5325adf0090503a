pub mod sources;

use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::ai::AiError;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{LeadMessage, LeadResult, LeadSearch, LeadSearchStatus};
use crate::quota::{self, Feature};
use crate::state::AppState;
use crate::store::StoreError;

pub use sources::{LeadPost, LeadSource, LeadSourceError, WebLeadSource};

pub const INTENT_THRESHOLD: i32 = 60;
const DEFAULT_MAX_RESULTS: usize = 10;
const MAX_RESULTS_CAP: usize = 50;
const DEFAULT_TONE: &str = "friendly";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSearchRequest {
    pub keywords: String,
    pub description: Option<String>,
    pub platforms: Option<Vec<String>>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LeadSearchResponse {
    pub search: LeadSearch,
    pub results: Vec<LeadResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageRequest {
    pub tone: Option<String>,
}

#[derive(Debug, Error)]
enum SearchFailure {
    #[error("{0}")]
    Source(#[from] LeadSourceError),
    #[error("{0}")]
    Ai(#[from] AiError),
    #[error("{0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct PostScore {
    index: usize,
    intent_score: Value,
    reason: Option<String>,
}

const SCORING_PROMPT: &str = "You qualify sales leads. For every numbered post, rate from 0 to 100 \
how likely its author is actively looking for the described product or service, and give a one \
sentence reason. Respond with JSON: {\"scores\": [{\"index\": 0, \"intent_score\": 0, \"reason\": \"...\"}]}";

fn scoring_input(keywords: &str, description: Option<&str>, posts: &[LeadPost]) -> String {
    let mut input = format!("Keywords: {}\n", keywords);
    if let Some(description) = description {
        input.push_str(&format!("Offering: {}\n", description));
    }
    input.push_str("\nPosts:\n");
    for (i, post) in posts.iter().enumerate() {
        let content: String = post.content.chars().take(600).collect();
        input.push_str(&format!("[{}] ({}) {}\n{}\n\n", i, post.platform, post.title, content));
    }
    input
}

fn score_value(value: &Value) -> i32 {
    let score = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .unwrap_or(0.0);
    score.round().clamp(0.0, 100.0) as i32
}

/// Pairs each post with its model score, dropping anything under the threshold.
fn qualified(posts: Vec<LeadPost>, scores: &Value) -> Vec<(LeadPost, i32, Option<String>)> {
    let scores: Vec<PostScore> = scores
        .get("scores")
        .cloned()
        .and_then(|s| serde_json::from_value(s).ok())
        .unwrap_or_default();

    let mut posts: Vec<Option<LeadPost>> = posts.into_iter().map(Some).collect();
    scores
        .into_iter()
        .filter_map(|s| {
            let score = score_value(&s.intent_score);
            if score < INTENT_THRESHOLD {
                return None;
            }
            let post = posts.get_mut(s.index)?.take()?;
            Some((post, score, s.reason))
        })
        .collect()
}

async fn run_search(
    state: &AppState,
    search: &LeadSearch,
    max_results: usize,
) -> Result<Vec<LeadResult>, SearchFailure> {
    let mut posts = Vec::new();
    for platform in &search.platforms {
        if !state.leads.supports(platform) {
            warn!("Skipping unsupported lead platform '{}'", platform);
            continue;
        }
        posts.extend(state.leads.search(platform, &search.keywords, max_results).await?);
    }
    posts.truncate(max_results);

    if posts.is_empty() {
        return Ok(Vec::new());
    }

    let scores = state
        .ai
        .complete_json(
            SCORING_PROMPT,
            &scoring_input(&search.keywords, search.description.as_deref(), &posts),
            2000,
        )
        .await?;

    let now = Utc::now();
    Ok(qualified(posts, &scores)
        .into_iter()
        .map(|(post, intent_score, reason)| LeadResult {
            id: Uuid::new_v4(),
            search_id: search.id,
            user_id: search.user_id,
            platform: post.platform,
            title: post.title,
            content: post.content,
            author: post.author,
            url: post.url,
            intent_score,
            reason,
            created_at: now,
        })
        .collect())
}

pub async fn search(state: &AppState, user: &AuthUser, request: LeadSearchRequest) -> ApiResult<LeadSearchResponse> {
    let keywords = request.keywords.trim();
    if keywords.is_empty() {
        return Err(ApiError::InvalidRequest("Keywords are required".to_string()));
    }
    let mut platforms: Vec<String> = Vec::new();
    for platform in request.platforms.unwrap_or_default() {
        let platform = platform.trim().to_lowercase();
        if !platform.is_empty() && !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    if platforms.is_empty() {
        platforms.push("reddit".to_string());
    }
    let max_results = request
        .max_results
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_RESULTS_CAP);

    let profile = quota::ensure_profile(state.store.as_ref(), user).await?;
    quota::reserve(state.store.as_ref(), &profile, Feature::LeadSearches, Utc::now()).await?;

    let mut search = LeadSearch {
        id: Uuid::new_v4(),
        user_id: user.id,
        keywords: keywords.to_string(),
        description: request.description.filter(|d| !d.trim().is_empty()),
        platforms,
        status: LeadSearchStatus::Running,
        results_count: 0,
        created_at: Utc::now(),
    };
    state.store.insert_lead_search(&search).await?;
    quota::record_usage(state.store.as_ref(), user.id, Feature::LeadSearches).await;

    let outcome = async {
        let results = run_search(state, &search, max_results).await?;
        state.store.insert_lead_results(&results).await?;
        state
            .store
            .update_lead_search(search.id, LeadSearchStatus::Completed, results.len() as i32)
            .await?;
        Ok::<_, SearchFailure>(results)
    }
    .await;

    let results = match outcome {
        Ok(results) => results,
        Err(e) => {
            error!("Lead search {} failed: {}", search.id, e);
            if let Err(update) = state
                .store
                .update_lead_search(search.id, LeadSearchStatus::Failed, 0)
                .await
            {
                error!("Failed to mark lead search {} as failed: {}", search.id, update);
            }
            return Err(ApiError::GenerationFailed(e.to_string()));
        }
    };
    search.status = LeadSearchStatus::Completed;
    search.results_count = results.len() as i32;

    info!("Lead search {} found {} qualified leads", search.id, results.len());
    Ok(LeadSearchResponse { search, results })
}

pub async fn list_searches(state: &AppState, user: &AuthUser) -> ApiResult<Vec<LeadSearch>> {
    Ok(state.store.list_lead_searches(user.id).await?)
}

pub async fn search_results(state: &AppState, user: &AuthUser, search_id: Uuid) -> ApiResult<Vec<LeadResult>> {
    state
        .store
        .get_lead_search(search_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lead search".to_string()))?;
    Ok(state.store.list_lead_results(search_id, user.id).await?)
}

pub async fn generate_message(
    state: &AppState,
    user: &AuthUser,
    result_id: Uuid,
    request: MessageRequest,
) -> ApiResult<LeadMessage> {
    let lead = state
        .store
        .get_lead_result(result_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lead".to_string()))?;
    let tone = request
        .tone
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TONE.to_string());

    let system = format!(
        "You write short, {} outreach replies to public posts. Be helpful first, never pushy, \
         and do not invent facts about the author.",
        tone
    );
    let prompt = format!(
        "Platform: {}\nPost title: {}\nPost: {}\nWhy this is a lead: {}\n\nWrite a reply under 120 words.",
        lead.platform,
        lead.title,
        lead.content,
        lead.reason.as_deref().unwrap_or("n/a")
    );
    let content = state.ai.complete_text(&system, &prompt, 400).await?;

    let message = LeadMessage {
        id: Uuid::new_v4(),
        lead_result_id: lead.id,
        user_id: user.id,
        tone,
        content: content.trim().to_string(),
        created_at: Utc::now(),
    };
    Ok(state.store.insert_lead_message(&message).await?)
}
