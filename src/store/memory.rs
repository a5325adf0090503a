use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::models::{
    AnalysisResult, AudioRecording, GameQuestion, GameRoom, GameRoomUpdate, GeneratedImage,
    LeadMessage, LeadResult, LeadSearch, LeadSearchStatus, PaymentLink, ProfileUpdate,
    RecordingStatus, RecordingUpdate, UserGameStats, UserProfile,
};
use crate::quota::Feature;

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, UserProfile>,
    recordings: Vec<AudioRecording>,
    analyses: Vec<AnalysisResult>,
    images: Vec<GeneratedImage>,
    lead_searches: Vec<LeadSearch>,
    lead_results: Vec<LeadResult>,
    lead_messages: Vec<LeadMessage>,
    payment_links: Vec<PaymentLink>,
    game_rooms: Vec<GameRoom>,
    game_questions: Vec<GameQuestion>,
    game_stats: HashMap<Uuid, UserGameStats>,
}

/// Process-local store. Every operation runs under one lock, which makes the
/// counter operations atomic the same way the database functions are.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failures: Mutex<HashSet<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // a panicked test must not poison the others
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn lead_messages(&self) -> Vec<LeadMessage> {
        self.tables().lead_messages.clone()
    }

    /// Makes every later call of `operation` fail with a 503. Recognised
    /// operations: `insert_lead_results`, `complete_lead_search`,
    /// `complete_recording`.
    pub fn fail_on(&self, operation: &'static str) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).insert(operation);
    }

    fn injected(&self, operation: &str) -> StoreResult<()> {
        if self.failures.lock().unwrap_or_else(|e| e.into_inner()).contains(operation) {
            return Err(StoreError::Status {
                status: 503,
                body: format!("{} unavailable", operation),
            });
        }
        Ok(())
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, created: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    rows.sort_by_key(|row| std::cmp::Reverse(created(row)));
    rows
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        Ok(self.tables().profiles.get(&user_id).cloned())
    }

    async fn insert_profile(&self, profile: &UserProfile) -> StoreResult<UserProfile> {
        let mut tables = self.tables();
        let stored = tables
            .profiles
            .entry(profile.id)
            .or_insert_with(|| profile.clone());
        Ok(stored.clone())
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> StoreResult<()> {
        let mut tables = self.tables();
        let profile = tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound("Profile".to_string()))?;
        update.apply(profile);
        Ok(())
    }

    async fn find_profile_by_customer(&self, customer_id: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self
            .tables()
            .profiles
            .values()
            .find(|p| p.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn find_profile_by_account(&self, account_id: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self
            .tables()
            .profiles
            .values()
            .find(|p| p.stripe_account_id.as_deref() == Some(account_id))
            .cloned())
    }

    async fn count_since(&self, feature: Feature, user_id: Uuid, since: DateTime<Utc>) -> StoreResult<i64> {
        let tables = self.tables();
        let count = match feature {
            Feature::Recordings => tables
                .recordings
                .iter()
                .filter(|r| r.user_id == user_id && r.created_at >= since)
                .count(),
            Feature::Images => tables
                .images
                .iter()
                .filter(|r| r.user_id == user_id && r.created_at >= since)
                .count(),
            Feature::LeadSearches => tables
                .lead_searches
                .iter()
                .filter(|r| r.user_id == user_id && r.created_at >= since)
                .count(),
            Feature::Games => tables
                .game_rooms
                .iter()
                .filter(|r| r.user_id == user_id && r.created_at >= since)
                .count(),
        };
        Ok(count as i64)
    }

    async fn increment_monthly_usage(&self, user_id: Uuid, feature: Feature) -> StoreResult<i64> {
        let mut tables = self.tables();
        let profile = tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound("Profile".to_string()))?;

        let period = Utc::now().format("%Y-%m").to_string();
        if profile.usage_period.as_deref() != Some(period.as_str()) {
            profile.monthly_usage.clear();
            profile.usage_period = Some(period);
        }
        let counter = profile
            .monthly_usage
            .entry(feature.as_str().to_string())
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn consume_trial_recording(&self, user_id: Uuid) -> StoreResult<Option<i32>> {
        let mut tables = self.tables();
        let profile = tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound("Profile".to_string()))?;
        if profile.trial_recordings_remaining <= 0 {
            return Ok(None);
        }
        profile.trial_recordings_remaining -= 1;
        Ok(Some(profile.trial_recordings_remaining))
    }

    async fn insert_recording(&self, recording: &AudioRecording) -> StoreResult<AudioRecording> {
        self.tables().recordings.push(recording.clone());
        Ok(recording.clone())
    }

    async fn get_recording(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<AudioRecording>> {
        Ok(self
            .tables()
            .recordings
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned())
    }

    async fn list_recordings(&self, user_id: Uuid) -> StoreResult<Vec<AudioRecording>> {
        let rows = self
            .tables()
            .recordings
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |r: &AudioRecording| r.created_at))
    }

    async fn update_recording(&self, id: Uuid, update: &RecordingUpdate) -> StoreResult<()> {
        if update.status == Some(RecordingStatus::Completed) {
            self.injected("complete_recording")?;
        }
        let mut tables = self.tables();
        let recording = tables
            .recordings
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound("Recording".to_string()))?;
        update.apply(recording);
        Ok(())
    }

    async fn insert_analysis(&self, analysis: &AnalysisResult) -> StoreResult<AnalysisResult> {
        self.tables().analyses.push(analysis.clone());
        Ok(analysis.clone())
    }

    async fn find_analysis_for_recording(&self, recording_id: Uuid) -> StoreResult<Option<AnalysisResult>> {
        Ok(self
            .tables()
            .analyses
            .iter()
            .filter(|a| a.recording_id == Some(recording_id))
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn insert_image(&self, image: &GeneratedImage) -> StoreResult<GeneratedImage> {
        self.tables().images.push(image.clone());
        Ok(image.clone())
    }

    async fn list_images(&self, user_id: Uuid) -> StoreResult<Vec<GeneratedImage>> {
        let rows = self
            .tables()
            .images
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |i: &GeneratedImage| i.created_at))
    }

    async fn insert_lead_search(&self, search: &LeadSearch) -> StoreResult<LeadSearch> {
        self.tables().lead_searches.push(search.clone());
        Ok(search.clone())
    }

    async fn update_lead_search(&self, id: Uuid, status: LeadSearchStatus, results_count: i32) -> StoreResult<()> {
        if status == LeadSearchStatus::Completed {
            self.injected("complete_lead_search")?;
        }
        let mut tables = self.tables();
        let search = tables
            .lead_searches
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound("Lead search".to_string()))?;
        search.status = status;
        search.results_count = results_count;
        Ok(())
    }

    async fn get_lead_search(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<LeadSearch>> {
        Ok(self
            .tables()
            .lead_searches
            .iter()
            .find(|s| s.id == id && s.user_id == user_id)
            .cloned())
    }

    async fn list_lead_searches(&self, user_id: Uuid) -> StoreResult<Vec<LeadSearch>> {
        let rows = self
            .tables()
            .lead_searches
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |s: &LeadSearch| s.created_at))
    }

    async fn insert_lead_results(&self, results: &[LeadResult]) -> StoreResult<()> {
        self.injected("insert_lead_results")?;
        self.tables().lead_results.extend_from_slice(results);
        Ok(())
    }

    async fn list_lead_results(&self, search_id: Uuid, user_id: Uuid) -> StoreResult<Vec<LeadResult>> {
        let mut rows: Vec<LeadResult> = self
            .tables()
            .lead_results
            .iter()
            .filter(|r| r.search_id == search_id && r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| std::cmp::Reverse(r.intent_score));
        Ok(rows)
    }

    async fn get_lead_result(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<LeadResult>> {
        Ok(self
            .tables()
            .lead_results
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned())
    }

    async fn insert_lead_message(&self, message: &LeadMessage) -> StoreResult<LeadMessage> {
        self.tables().lead_messages.push(message.clone());
        Ok(message.clone())
    }

    async fn insert_payment_link(&self, link: &PaymentLink) -> StoreResult<PaymentLink> {
        self.tables().payment_links.push(link.clone());
        Ok(link.clone())
    }

    async fn list_payment_links(&self, user_id: Uuid) -> StoreResult<Vec<PaymentLink>> {
        let rows = self
            .tables()
            .payment_links
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |l: &PaymentLink| l.created_at))
    }

    async fn insert_game_room(&self, room: &GameRoom) -> StoreResult<GameRoom> {
        self.tables().game_rooms.push(room.clone());
        Ok(room.clone())
    }

    async fn get_game_room(&self, id: Uuid, user_id: Uuid) -> StoreResult<Option<GameRoom>> {
        Ok(self
            .tables()
            .game_rooms
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned())
    }

    async fn update_game_room(&self, id: Uuid, update: &GameRoomUpdate) -> StoreResult<()> {
        let mut tables = self.tables();
        let room = tables
            .game_rooms
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound("Game room".to_string()))?;
        update.apply(room);
        Ok(())
    }

    async fn insert_game_questions(&self, questions: &[GameQuestion]) -> StoreResult<()> {
        self.tables().game_questions.extend_from_slice(questions);
        Ok(())
    }

    async fn list_game_questions(&self, room_id: Uuid) -> StoreResult<Vec<GameQuestion>> {
        let mut rows: Vec<GameQuestion> = self
            .tables()
            .game_questions
            .iter()
            .filter(|q| q.room_id == room_id)
            .cloned()
            .collect();
        rows.sort_by_key(|q| q.position);
        Ok(rows)
    }

    async fn answer_game_question(&self, question_id: Uuid, selected: i32) -> StoreResult<Option<GameQuestion>> {
        let mut tables = self.tables();
        let question = tables
            .game_questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| StoreError::NotFound("Question".to_string()))?;
        if question.is_answered() {
            return Ok(None);
        }
        question.selected_answer = Some(selected);
        Ok(Some(question.clone()))
    }

    async fn increment_games_played(&self, user_id: Uuid) -> StoreResult<()> {
        self.tables()
            .game_stats
            .entry(user_id)
            .or_insert_with(|| UserGameStats::empty(user_id))
            .increment_games_played();
        Ok(())
    }

    async fn record_game_answer(&self, user_id: Uuid, correct: bool, score: i32) -> StoreResult<()> {
        let mut tables = self.tables();
        let stats = tables
            .game_stats
            .entry(user_id)
            .or_insert_with(|| UserGameStats::empty(user_id));
        stats.record_answer(correct);
        stats.record_score(score);
        Ok(())
    }

    async fn get_game_stats(&self, user_id: Uuid) -> StoreResult<UserGameStats> {
        Ok(self
            .tables()
            .game_stats
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserGameStats::empty(user_id)))
    }
}
