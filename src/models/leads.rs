use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadSearchStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadSearch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub keywords: String,
    pub description: Option<String>,
    pub platforms: Vec<String>,
    pub status: LeadSearchStatus,
    pub results_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadResult {
    pub id: Uuid,
    pub search_id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub url: String,
    pub intent_score: i32,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadMessage {
    pub id: Uuid,
    pub lead_result_id: Uuid,
    pub user_id: Uuid,
    pub tone: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
