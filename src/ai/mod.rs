//! Language, image and speech models behind one seam.

mod openai;

pub use openai::OpenAiProvider;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("OpenAI error: {0}")]
    Api(String),

    #[error("Organization verification required for {model}: {message}")]
    OrganizationNotVerified { model: String, message: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<async_openai::error::OpenAIError> for AiError {
    fn from(e: async_openai::error::OpenAIError) -> Self {
        AiError::Api(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageModel {
    #[serde(rename = "gpt-image-1")]
    GptImage1,
    #[serde(rename = "dall-e-3")]
    DallE3,
}

impl ImageModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageModel::GptImage1 => "gpt-image-1",
            ImageModel::DallE3 => "dall-e-3",
        }
    }
}

/// Provider-ready image request; values are already in the model's vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageGenerationRequest {
    pub model: ImageModel,
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub output_format: Option<String>,
    pub background: Option<String>,
    pub output_compression: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageOutput {
    pub url: Option<String>,
    pub b64_json: Option<String>,
    pub revised_prompt: Option<String>,
}

pub type TextStream = BoxStream<'static, Result<String, AiError>>;

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Chat completion in JSON mode, parsed into a JSON value.
    async fn complete_json(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<Value, AiError>;
    async fn complete_text(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String, AiError>;
    /// Streams content deltas of a chat completion.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TextStream, AiError>;
    async fn generate_image(&self, request: &ImageGenerationRequest) -> Result<ImageOutput, AiError>;
    /// Fetches a hosted image result. Hosted URLs expire, so callers copy
    /// the bytes into storage.
    async fn download_image(&self, url: &str) -> Result<Vec<u8>, AiError>;
    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String, AiError>;
}

/// Extract JSON from model output that might be wrapped in a markdown code block.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        let content_start = text[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

pub fn parse_json_content(content: &str) -> Result<Value, AiError> {
    let json = extract_json(content);
    if json.is_empty() {
        return Err(AiError::InvalidResponse("empty response".to_string()));
    }
    serde_json::from_str(json).map_err(|e| {
        AiError::InvalidResponse(format!(
            "{} (response preview: {})",
            e,
            json.chars().take(200).collect::<String>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"key": "value"}"#), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_code_block() {
        let input = "Here you go:\n```json\n{\"questions\": []}\n```";
        assert_eq!(extract_json(input), r#"{"questions": []}"#);
    }

    #[test]
    fn test_parse_json_content_rejects_prose() {
        let err = parse_json_content("I cannot help with that").unwrap_err();
        assert!(matches!(err, AiError::InvalidResponse(_)));
    }
}
