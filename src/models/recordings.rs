use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioRecording {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub file_name: String,
    pub storage_path: String,
    pub duration_seconds: Option<i32>,
    pub status: RecordingStatus,
    pub transcript: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AudioRecording {
    pub fn new(
        user_id: Uuid,
        title: Option<String>,
        file_name: String,
        storage_path: String,
        duration_seconds: Option<i32>,
    ) -> Self {
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| file_name.clone());
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            file_name,
            storage_path,
            duration_seconds,
            status: RecordingStatus::Pending,
            transcript: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.transcript
            .as_deref()
            .map(|t| t.split_whitespace().count())
            .unwrap_or(0)
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RecordingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RecordingUpdate {
    pub fn status(status: RecordingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(&self, recording: &mut AudioRecording) {
        if let Some(status) = self.status {
            recording.status = status;
        }
        if let Some(transcript) = &self.transcript {
            recording.transcript = Some(transcript.clone());
        }
        if let Some(message) = &self.error_message {
            recording.error_message = Some(message.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Recording,
    Batch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recording_id: Option<Uuid>,
    pub kind: AnalysisKind,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub sentiment: Option<String>,
    pub sentiment_score: Option<f64>,
    pub metrics: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
