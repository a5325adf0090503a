use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

use crate::ai::AiError;
use crate::analytics_service::DataRow;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{AnalysisKind, AnalysisResult, AudioRecording, RecordingStatus, RecordingUpdate};
use crate::quota::{self, Feature};
use crate::state::AppState;

pub const DOWNLOAD_URL_TTL_SECS: u64 = 3600;
pub const MAX_BATCH_SIZE: usize = 20;
const TRANSCRIPT_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordingRequest {
    pub title: Option<String>,
    pub file_name: String,
    pub storage_path: String,
    pub duration_seconds: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnalysisRequest {
    pub document_ids: Vec<Uuid>,
    pub batch_title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrl {
    pub url: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct ProcessOutcome {
    pub message: &'static str,
    pub already_processed: bool,
    pub analysis: AnalysisResult,
}

/// What the model is asked to return for a transcript or a batch.
#[derive(Debug, Deserialize)]
struct AnalysisDraft {
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    sentiment: Option<String>,
    sentiment_score: Option<f64>,
}

impl AnalysisDraft {
    fn from_value(value: Value) -> Result<Self, AiError> {
        serde_json::from_value(value).map_err(|e| AiError::InvalidResponse(format!("analysis: {}", e)))
    }

    fn into_result(
        self,
        user_id: Uuid,
        recording_id: Option<Uuid>,
        kind: AnalysisKind,
        title: String,
        metrics: Option<Value>,
    ) -> AnalysisResult {
        AnalysisResult {
            id: Uuid::new_v4(),
            user_id,
            recording_id,
            kind,
            title,
            summary: self.summary,
            key_points: self.key_points,
            action_items: self.action_items,
            topics: self.topics,
            sentiment: self.sentiment,
            sentiment_score: self.sentiment_score.map(|s| s.clamp(-1.0, 1.0)),
            metrics,
            created_at: Utc::now(),
        }
    }
}

const ANALYSIS_FORMAT: &str = "Respond with JSON: {\"summary\": \"...\", \"key_points\": [\"...\"], \
\"action_items\": [\"...\"], \"topics\": [\"...\"], \"sentiment\": \"positive|neutral|negative\", \
\"sentiment_score\": -1.0 to 1.0}";

pub async fn create(state: &AppState, user: &AuthUser, request: CreateRecordingRequest) -> ApiResult<AudioRecording> {
    if request.file_name.trim().is_empty() || request.storage_path.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "fileName and storagePath are required".to_string(),
        ));
    }

    let profile = quota::ensure_profile(state.store.as_ref(), user).await?;
    quota::reserve(state.store.as_ref(), &profile, Feature::Recordings, Utc::now()).await?;

    let recording = AudioRecording::new(
        user.id,
        request.title,
        request.file_name.trim().to_string(),
        request.storage_path.trim().to_string(),
        request.duration_seconds.filter(|d| *d >= 0),
    );
    let recording = state.store.insert_recording(&recording).await?;
    quota::record_usage(state.store.as_ref(), user.id, Feature::Recordings).await;

    info!("User {} created recording {}", user.id, recording.id);
    Ok(recording)
}

pub async fn list(state: &AppState, user: &AuthUser) -> ApiResult<Vec<AudioRecording>> {
    Ok(state.store.list_recordings(user.id).await?)
}

async fn owned(state: &AppState, user: &AuthUser, id: Uuid) -> ApiResult<AudioRecording> {
    state
        .store
        .get_recording(id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Recording".to_string()))
}

pub async fn download_url(state: &AppState, user: &AuthUser, id: Uuid) -> ApiResult<DownloadUrl> {
    let recording = owned(state, user, id).await?;
    let url = state
        .storage
        .signed_url(&state.config.recordings_bucket, &recording.storage_path, DOWNLOAD_URL_TTL_SECS)
        .await?;
    Ok(DownloadUrl {
        url,
        expires_in: DOWNLOAD_URL_TTL_SECS,
    })
}

async fn transcribe_and_analyse(state: &AppState, recording: &AudioRecording) -> ApiResult<(String, AnalysisResult)> {
    let audio = state
        .storage
        .download(&state.config.recordings_bucket, &recording.storage_path)
        .await?;
    let transcript = state
        .ai
        .transcribe(&recording.file_name, audio)
        .await
        .map_err(|e| ApiError::ProcessingFailed(format!("transcription failed: {}", e)))?;
    if transcript.trim().is_empty() {
        return Err(ApiError::ProcessingFailed("transcript is empty".to_string()));
    }

    let excerpt: String = transcript.chars().take(TRANSCRIPT_PROMPT_CHARS).collect();
    let system = format!(
        "You analyse transcripts of audio recordings and extract what matters. {}",
        ANALYSIS_FORMAT
    );
    let prompt = format!("Title: {}\n\nTranscript:\n{}", recording.title, excerpt);
    let draft = state
        .ai
        .complete_json(&system, &prompt, 1500)
        .await
        .and_then(AnalysisDraft::from_value)
        .map_err(|e| ApiError::ProcessingFailed(format!("analysis failed: {}", e)))?;

    let word_count = transcript.split_whitespace().count();
    let analysis = draft.into_result(
        recording.user_id,
        Some(recording.id),
        AnalysisKind::Recording,
        recording.title.clone(),
        Some(json!({
            "duration_seconds": recording.duration_seconds,
            "word_count": word_count,
        })),
    );
    let analysis = state.store.insert_analysis(&analysis).await?;
    Ok((transcript, analysis))
}

pub async fn process(state: &AppState, user: &AuthUser, id: Uuid) -> ApiResult<ProcessOutcome> {
    let recording = owned(state, user, id).await?;

    if recording.status == RecordingStatus::Completed {
        if let Some(analysis) = state.store.find_analysis_for_recording(recording.id).await? {
            return Ok(ProcessOutcome {
                message: "Recording already processed",
                already_processed: true,
                analysis,
            });
        }
    }

    state
        .store
        .update_recording(recording.id, &RecordingUpdate::status(RecordingStatus::Processing))
        .await?;

    let outcome = async {
        let (transcript, analysis) = transcribe_and_analyse(state, &recording).await?;
        state
            .store
            .update_recording(
                recording.id,
                &RecordingUpdate {
                    status: Some(RecordingStatus::Completed),
                    transcript: Some(transcript),
                    error_message: None,
                },
            )
            .await?;
        Ok::<_, ApiError>(analysis)
    }
    .await;

    match outcome {
        Ok(analysis) => {
            info!("Recording {} processed", recording.id);
            Ok(ProcessOutcome {
                message: "Recording processed",
                already_processed: false,
                analysis,
            })
        }
        Err(e) => {
            error!("Processing recording {} failed: {}", recording.id, e);
            let update = RecordingUpdate {
                status: Some(RecordingStatus::Failed),
                transcript: None,
                error_message: Some(e.to_string()),
            };
            if let Err(store_err) = state.store.update_recording(recording.id, &update).await {
                error!("Failed to mark recording {} as failed: {}", recording.id, store_err);
            }
            Err(match e {
                ApiError::ProcessingFailed(_) => e,
                other => ApiError::ProcessingFailed(other.to_string()),
            })
        }
    }
}

fn metrics_row(recording: &AudioRecording, analysis: &AnalysisResult) -> DataRow {
    let mut row = Map::new();
    if let Some(duration) = recording.duration_seconds {
        row.insert("duration_seconds".to_string(), json!(duration));
    }
    let words = analysis
        .metrics
        .as_ref()
        .and_then(|m| m.get("word_count"))
        .and_then(Value::as_u64)
        .unwrap_or(recording.word_count() as u64);
    row.insert("word_count".to_string(), json!(words));
    if let Some(score) = analysis.sentiment_score {
        row.insert("sentiment_score".to_string(), json!(score));
    }
    row
}

pub async fn batch_analysis(state: &AppState, user: &AuthUser, request: BatchAnalysisRequest) -> ApiResult<AnalysisResult> {
    let mut ids = request.document_ids;
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(*id));
    if ids.is_empty() || ids.len() > MAX_BATCH_SIZE {
        return Err(ApiError::InvalidRequest(format!(
            "documentIds must contain between 1 and {} recordings",
            MAX_BATCH_SIZE
        )));
    }

    let mut sources = Vec::with_capacity(ids.len());
    for id in &ids {
        let recording = owned(state, user, *id).await?;
        let analysis = state
            .store
            .find_analysis_for_recording(recording.id)
            .await?
            .ok_or_else(|| {
                ApiError::InvalidRequest(format!("Recording {} has not been analysed yet", recording.id))
            })?;
        sources.push((recording, analysis));
    }

    let rows: Vec<DataRow> = sources.iter().map(|(r, a)| metrics_row(r, a)).collect();
    let columns = ["duration_seconds", "word_count", "sentiment_score"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let report = state.analytics.statistical(rows, columns).await;

    let mut digest = String::new();
    for (recording, analysis) in &sources {
        digest.push_str(&format!(
            "## {}\nSummary: {}\nKey points: {}\nTopics: {}\nSentiment: {}\n\n",
            recording.title,
            analysis.summary,
            analysis.key_points.join("; "),
            analysis.topics.join(", "),
            analysis.sentiment.as_deref().unwrap_or("unknown"),
        ));
    }
    let system = format!(
        "You synthesise several recording analyses into one report, highlighting common themes, \
         differences and next steps. {}",
        ANALYSIS_FORMAT
    );
    let draft = state
        .ai
        .complete_json(&system, &digest, 2000)
        .await
        .and_then(AnalysisDraft::from_value)?;

    let title = request
        .batch_title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("Batch analysis of {} recordings", sources.len()));
    let metrics = json!({
        "recording_ids": ids,
        "analytics": report,
    });
    let analysis = draft.into_result(user.id, None, AnalysisKind::Batch, title, Some(metrics));

    info!("User {} created batch analysis over {} recordings", user.id, sources.len());
    Ok(state.store.insert_analysis(&analysis).await?)
}
