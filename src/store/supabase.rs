use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use postgrest::{Builder, Postgrest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::config::Config;
use crate::models::{
    AnalysisResult, AudioRecording, GameQuestion, GameRoom, GameRoomUpdate, GeneratedImage,
    LeadMessage, LeadResult, LeadSearch, LeadSearchStatus, PaymentLink, ProfileUpdate,
    RecordingUpdate, UserGameStats, UserProfile,
};
use crate::quota::Feature;

// Database functions backing the atomic counters:
//
//   increment_monthly_usage(p_user_id uuid, p_feature text) returns bigint
//     resets monthly_usage when usage_period differs from to_char(now(), 'YYYY-MM'),
//     then increments monthly_usage->>p_feature in a single UPDATE ... RETURNING
//   consume_trial_recording(p_user_id uuid) returns int
//     UPDATE user_profiles SET trial_recordings_remaining = trial_recordings_remaining - 1
//     WHERE id = p_user_id AND trial_recordings_remaining > 0 RETURNING trial_recordings_remaining
//   increment_games_played(p_user_id uuid) returns void
//   record_game_answer(p_user_id uuid, p_correct boolean, p_score int) returns void
//     both upsert into user_game_stats with column = column + 1

pub struct SupabaseStore {
    client: Postgrest,
}

impl SupabaseStore {
    pub fn new(config: &Config) -> Self {
        Self {
            client: crate::supabase::postgrest_client(config),
        }
    }
}

fn request_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Request(e.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_total(content_range: &str) -> Option<i64> {
    content_range.rsplit('/').next()?.trim().parse().ok()
}

async fn send(builder: Builder) -> StoreResult<String> {
    let response = builder.execute().await.map_err(request_error)?;
    let status = response.status();
    let body = response.text().await.map_err(request_error)?;
    if !status.is_success() {
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

async fn rows<T: DeserializeOwned>(builder: Builder) -> StoreResult<Vec<T>> {
    let body = send(builder).await?;
    Ok(serde_json::from_str(&body)?)
}

async fn first<T: DeserializeOwned>(builder: Builder) -> StoreResult<Option<T>> {
    Ok(rows(builder).await?.into_iter().next())
}

async fn insert_returning<T>(builder: Builder, row: &T) -> StoreResult<T>
where
    T: DeserializeOwned + Clone,
{
    Ok(first(builder).await?.unwrap_or_else(|| row.clone()))
}

fn body<T: Serialize + ?Sized>(value: &T) -> StoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

#[async_trait]
impl Store for SupabaseStore {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        first(
            self.client
                .from("user_profiles")
                .select("*")
                .eq("id", user_id.to_string()),
        )
        .await
    }

    async fn insert_profile(&self, profile: &UserProfile) -> StoreResult<UserProfile> {
        match send(self.client.from("user_profiles").insert(body(profile)?)).await {
            Ok(_) => {}
            // a concurrent first request created the row already
            Err(StoreError::Status { status: 409, .. }) => {
                log::debug!("Profile {} already exists", profile.id);
            }
            Err(e) => return Err(e),
        }
        Ok(self
            .get_profile(profile.id)
            .await?
            .unwrap_or_else(|| profile.clone()))
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> StoreResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        send(
            self.client
                .from("user_profiles")
                .update(body(update)?)
                .eq("id", user_id.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn find_profile_by_customer(&self, customer_id: &str) -> StoreResult<Option<UserProfile>> {
        first(
            self.client
                .from("user_profiles")
                .select("*")
                .eq("stripe_customer_id", customer_id),
        )
        .await
    }

    async fn find_profile_by_account(&self, account_id: &str) -> StoreResult<Option<UserProfile>> {
        first(
            self.client
                .from("user_profiles")
                .select("*")
                .eq("stripe_account_id", account_id),
        )
        .await
    }

    async fn count_since(&self, feature: Feature, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<i64> {
        let response = self
            .client
            .from(feature.table())
            .select("id")
            .eq("user_id", user_id.to_string())
            .gte("created_at", timestamp(since))
            .exact_count()
            .limit(1)
            .execute()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_total);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        total.ok_or_else(|| StoreError::Request("missing content-range count".to_string()))
    }

    async fn increment_monthly_usage(&self, user_id: Uuid, feature: Feature) -> StoreResult<i64> {
        let params = json!({ "p_user_id": user_id, "p_feature": feature.as_str() });
        let value: Value = serde_json::from_str(&send(self.client.rpc("increment_monthly_usage", params.to_string())).await?)?;
        value
            .as_i64()
            .ok_or_else(|| StoreError::Request(format!("unexpected usage counter: {}", value)))
    }

    async fn consume_trial_recording(&self, user_id: Uuid) -> StoreResult<Option<i32>> {
        let params = json!({ "p_user_id": user_id });
        let value: Value = serde_json::from_str(&send(self.client.rpc("consume_trial_recording", params.to_string())).await?)?;
        Ok(value.as_i64().map(|remaining| remaining as i32))
    }

    async fn insert_recording(&self, recording: &AudioRecording) -> StoreResult<AudioRecording> {
        insert_returning(self.client.from("audio_recordings").insert(body(recording)?), recording).await
    }

    async fn get_recording(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<AudioRecording>> {
        first(
            self.client
                .from("audio_recordings")
                .select("*")
                .eq("id", id.to_string())
                .eq("user_id", user_id.to_string()),
        )
        .await
    }

    async fn list_recordings(&self, user_id: Uuid) -> StoreResult<Vec<AudioRecording>> {
        rows(
            self.client
                .from("audio_recordings")
                .select("*")
                .eq("user_id", user_id.to_string())
                .order("created_at.desc"),
        )
        .await
    }

    async fn update_recording(&self, id: Uuid, update: &RecordingUpdate) -> StoreResult<()> {
        send(
            self.client
                .from("audio_recordings")
                .update(body(update)?)
                .eq("id", id.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn insert_analysis(&self, analysis: &AnalysisResult) -> StoreResult<AnalysisResult> {
        insert_returning(self.client.from("analysis_results").insert(body(analysis)?), analysis).await
    }

    async fn find_analysis_for_recording(&self, recording_id: Uuid) -> StoreResult<Option<AnalysisResult>> {
        first(
            self.client
                .from("analysis_results")
                .select("*")
                .eq("recording_id", recording_id.to_string())
                .order("created_at.desc")
                .limit(1),
        )
        .await
    }

    async fn insert_image(&self, image: &GeneratedImage) -> StoreResult<GeneratedImage> {
        insert_returning(self.client.from("generated_images").insert(body(image)?), image).await
    }

    async fn list_images(&self, user_id: Uuid) -> StoreResult<Vec<GeneratedImage>> {
        rows(
            self.client
                .from("generated_images")
                .select("*")
                .eq("user_id", user_id.to_string())
                .order("created_at.desc"),
        )
        .await
    }

    async fn insert_lead_search(&self, search: &LeadSearch) -> StoreResult<LeadSearch> {
        insert_returning(self.client.from("ai_lead_searches").insert(body(search)?), search).await
    }

    async fn update_lead_search(&self, id: Uuid, status: LeadSearchStatus, results_count: i32) -> StoreResult<()> {
        let update = json!({ "status": status, "results_count": results_count });
        send(
            self.client
                .from("ai_lead_searches")
                .update(update.to_string())
                .eq("id", id.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn get_lead_search(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<LeadSearch>> {
        first(
            self.client
                .from("ai_lead_searches")
                .select("*")
                .eq("id", id.to_string())
                .eq("user_id", user_id.to_string()),
        )
        .await
    }

    async fn list_lead_searches(&self, user_id: Uuid) -> StoreResult<Vec<LeadSearch>> {
        rows(
            self.client
                .from("ai_lead_searches")
                .select("*")
                .eq("user_id", user_id.to_string())
                .order("created_at.desc"),
        )
        .await
    }

    async fn insert_lead_results(&self, results: &[LeadResult]) -> StoreResult<()> {
        if results.is_empty() {
            return Ok(());
        }
        send(self.client.from("ai_lead_results").insert(body(results)?)).await?;
        Ok(())
    }

    async fn list_lead_results(&self, search_id: Uuid, user_id: Uuid) -> StoreResult<Vec<LeadResult>> {
        rows(
            self.client
                .from("ai_lead_results")
                .select("*")
                .eq("search_id", search_id.to_string())
                .eq("user_id", user_id.to_string())
                .order("intent_score.desc"),
        )
        .await
    }

    async fn get_lead_result(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<LeadResult>> {
        first(
            self.client
                .from("ai_lead_results")
                .select("*")
                .eq("id", id.to_string())
                .eq("user_id", user_id.to_string()),
        )
        .await
    }

    async fn insert_lead_message(&self, message: &LeadMessage) -> StoreResult<LeadMessage> {
        insert_returning(self.client.from("ai_lead_messages").insert(body(message)?), message).await
    }

    async fn insert_payment_link(&self, link: &PaymentLink) -> StoreResult<PaymentLink> {
        insert_returning(self.client.from("payment_links").insert(body(link)?), link).await
    }

    async fn list_payment_links(&self, user_id: Uuid) -> StoreResult<Vec<PaymentLink>> {
        rows(
            self.client
                .from("payment_links")
                .select("*")
                .eq("user_id", user_id.to_string())
                .order("created_at.desc"),
        )
        .await
    }

    async fn insert_game_room(&self, room: &GameRoom) -> StoreResult<GameRoom> {
        insert_returning(self.client.from("game_rooms").insert(body(room)?), room).await
    }

    async fn get_game_room(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<GameRoom>> {
        first(
            self.client
                .from("game_rooms")
                .select("*")
                .eq("id", id.to_string())
                .eq("user_id", user_id.to_string()),
        )
        .await
    }

    async fn update_game_room(&self, id: Uuid, update: &GameRoomUpdate) -> StoreResult<()> {
        send(
            self.client
                .from("game_rooms")
                .update(body(update)?)
                .eq("id", id.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn insert_game_questions(&self, questions: &[GameQuestion]) -> StoreResult<()> {
        if questions.is_empty() {
            return Ok(());
        }
        send(self.client.from("game_questions").insert(body(questions)?)).await?;
        Ok(())
    }

    async fn list_game_questions(&self, room_id: Uuid) -> StoreResult<Vec<GameQuestion>> {
        rows(
            self.client
                .from("game_questions")
                .select("*")
                .eq("room_id", room_id.to_string())
                .order("position.asc"),
        )
        .await
    }

    async fn answer_game_question(&self, question_id: Uuid, selected: i32) -> StoreResult<Option<GameQuestion>> {
        let updated: Option<GameQuestion> = first(
            self.client
                .from("game_questions")
                .update(json!({ "selected_answer": selected }).to_string())
                .eq("id", question_id.to_string())
                .is("selected_answer", "null"),
        )
        .await?;

        if updated.is_some() {
            return Ok(updated);
        }

        let existing: Vec<Value> = rows(
            self.client
                .from("game_questions")
                .select("id")
                .eq("id", question_id.to_string()),
        )
        .await?;
        if existing.is_empty() {
            Err(StoreError::NotFound("Question".to_string()))
        } else {
            Ok(None)
        }
    }

    async fn increment_games_played(&self, user_id: Uuid) -> StoreResult<()> {
        let params = json!({ "p_user_id": user_id });
        send(self.client.rpc("increment_games_played", params.to_string())).await?;
        Ok(())
    }

    async fn record_game_answer(&self, user_id: Uuid, correct: bool, score: i32) -> StoreResult<()> {
        let params = json!({ "p_user_id": user_id, "p_correct": correct, "p_score": score });
        send(self.client.rpc("record_game_answer", params.to_string())).await?;
        Ok(())
    }

    async fn get_game_stats(&self, user_id: Uuid) -> StoreResult<UserGameStats> {
        let stats: Option<UserGameStats> = first(
            self.client
                .from("user_game_stats")
                .select("*")
                .eq("user_id", user_id.to_string()),
        )
        .await?;
        Ok(stats.unwrap_or_else(|| UserGameStats::empty(user_id)))
    }
}
