//! Row persistence. Production rows live in Supabase Postgres behind
//! PostgREST (`SupabaseStore`); `MemoryStore` keeps the same contract in
//! process for tests and local runs.

mod memory;
mod supabase;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AnalysisResult, AudioRecording, GameQuestion, GameRoom, GameRoomUpdate, GeneratedImage,
    LeadMessage, LeadResult, LeadSearch, LeadSearchStatus, PaymentLink, ProfileUpdate,
    RecordingUpdate, UserGameStats, UserProfile,
};
use crate::quota::Feature;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Supabase request failed: {0}")]
    Request(String),

    #[error("Supabase returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>>;
    async fn insert_profile(&self, profile: &UserProfile) -> StoreResult<UserProfile>;
    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> StoreResult<()>;
    async fn find_profile_by_customer(&self, customer_id: &str) -> StoreResult<Option<UserProfile>>;
    async fn find_profile_by_account(&self, account_id: &str) -> StoreResult<Option<UserProfile>>;

    /// Rows of the feature's table created by `user_id` at or after `since`.
    async fn count_since(&self, feature: Feature, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<i64>;
    /// Atomically bumps the feature's usage counter for the current month and
    /// returns the new value.
    async fn increment_monthly_usage(&self, user_id: Uuid, feature: Feature) -> StoreResult<i64>;
    /// Atomically decrements the trial counter when it is positive. Returns the
    /// remaining count, or `None` when nothing was left to consume.
    async fn consume_trial_recording(&self, user_id: Uuid) -> StoreResult<Option<i32>>;

    async fn insert_recording(&self, recording: &AudioRecording) -> StoreResult<AudioRecording>;
    async fn get_recording(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<AudioRecording>>;
    async fn list_recordings(&self, user_id: Uuid) -> StoreResult<Vec<AudioRecording>>;
    async fn update_recording(&self, id: Uuid, update: &RecordingUpdate) -> StoreResult<()>;
    async fn insert_analysis(&self, analysis: &AnalysisResult) -> StoreResult<AnalysisResult>;
    async fn find_analysis_for_recording(&self, recording_id: Uuid) -> StoreResult<Option<AnalysisResult>>;

    async fn insert_image(&self, image: &GeneratedImage) -> StoreResult<GeneratedImage>;
    async fn list_images(&self, user_id: Uuid) -> StoreResult<Vec<GeneratedImage>>;

    async fn insert_lead_search(&self, search: &LeadSearch) -> StoreResult<LeadSearch>;
    async fn update_lead_search(&self, id: Uuid, status: LeadSearchStatus, results_count: i32) -> StoreResult<()>;
    async fn get_lead_search(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<LeadSearch>>;
    async fn list_lead_searches(&self, user_id: Uuid) -> StoreResult<Vec<LeadSearch>>;
    async fn insert_lead_results(&self, results: &[LeadResult]) -> StoreResult<()>;
    async fn list_lead_results(&self, search_id: Uuid, user_id: Uuid) -> StoreResult<Vec<LeadResult>>;
    async fn get_lead_result(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<LeadResult>>;
    async fn insert_lead_message(&self, message: &LeadMessage) -> StoreResult<LeadMessage>;

    async fn insert_payment_link(&self, link: &PaymentLink) -> StoreResult<PaymentLink>;
    async fn list_payment_links(&self, user_id: Uuid) -> StoreResult<Vec<PaymentLink>>;

    async fn insert_game_room(&self, room: &GameRoom) -> StoreResult<GameRoom>;
    async fn get_game_room(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<GameRoom>>;
    async fn update_game_room(&self, id: Uuid, update: &GameRoomUpdate) -> StoreResult<()>;
    async fn insert_game_questions(&self, questions: &[GameQuestion]) -> StoreResult<()>;
    async fn list_game_questions(&self, room_id: Uuid) -> StoreResult<Vec<GameQuestion>>;
    /// Stores the selection only if the question has not been answered yet.
    /// Returns the updated question, or `None` when it was already answered.
    async fn answer_game_question(&self, question_id: Uuid, selected: i32) -> StoreResult<Option<GameQuestion>>;
    async fn increment_games_played(&self, user_id: Uuid) -> StoreResult<()>;
    async fn record_game_answer(&self, user_id: Uuid, correct: bool, score: i32) -> StoreResult<()>;
    async fn get_game_stats(&self, user_id: Uuid) -> StoreResult<UserGameStats>;
}
