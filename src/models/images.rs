use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedImage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt: String,
    pub enhanced_prompt: String,
    pub category_id: Option<String>,
    pub image_url: String,
    pub model: String,
    pub size: String,
    pub quality: String,
    pub format: String,
    pub background: String,
    pub compression: Option<u8>,
    pub created_at: DateTime<Utc>,
}
