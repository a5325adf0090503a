use async_openai::{
    config::OpenAIConfig,
    types::{
        AudioInput, ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateTranscriptionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{
    parse_json_content, AiError, AiProvider, ChatMessage, ChatRole, ImageGenerationRequest,
    ImageModel, ImageOutput, TextStream,
};

const IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";
const TRANSCRIPTION_MODEL: &str = "whisper-1";

pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_key: String,
    chat_model: String,
}

impl OpenAiProvider {
    const IMAGE_TIMEOUT: Duration = Duration::from_secs(180);

    pub fn new(api_key: &str, chat_model: &str) -> Result<Self, AiError> {
        let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
        let http = reqwest::Client::builder()
            .timeout(Self::IMAGE_TIMEOUT)
            .user_agent(concat!("minato/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            http,
            api_key: api_key.to_string(),
            chat_model: chat_model.to_string(),
        })
    }

    fn request_message(message: ChatMessage) -> Result<ChatCompletionRequestMessage, AiError> {
        Ok(match message.role {
            ChatRole::System => ChatCompletionRequestSystemMessage {
                content: message.content.into(),
                name: None,
            }
            .into(),
            ChatRole::User => ChatCompletionRequestUserMessage {
                content: message.content.into(),
                name: None,
            }
            .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content)
                .build()?
                .into(),
        })
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        json_mode: bool,
    ) -> Result<String, AiError> {
        let request = CreateChatCompletionRequest {
            model: self.chat_model.clone(),
            messages: vec![
                Self::request_message(ChatMessage::system(system))?,
                Self::request_message(ChatMessage::user(prompt))?,
            ],
            response_format: json_mode.then_some(ResponseFormat::JsonObject),
            max_completion_tokens: Some(max_tokens),
            temperature: Some(0.7),
            ..Default::default()
        };

        let response = self.client.chat().create(request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AiError::InvalidResponse("no content in completion".to_string()))
    }
}

#[derive(Serialize)]
struct ImagesApiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    background: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_compression: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
}

impl<'a> From<&'a ImageGenerationRequest> for ImagesApiRequest<'a> {
    fn from(request: &'a ImageGenerationRequest) -> Self {
        let dalle = request.model == ImageModel::DallE3;
        ImagesApiRequest {
            model: request.model.as_str(),
            prompt: &request.prompt,
            n: 1,
            size: &request.size,
            quality: &request.quality,
            // dall-e-3 rejects the gpt-image-1 only parameters
            output_format: if dalle { None } else { request.output_format.as_deref() },
            background: if dalle { None } else { request.background.as_deref() },
            output_compression: if dalle { None } else { request.output_compression },
            response_format: dalle.then_some("url"),
        }
    }
}

#[derive(Deserialize)]
struct ImagesApiResponse {
    data: Vec<ImageOutput>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// gpt-image-1 is only available to verified organizations; the API reports
/// this as a 403 whose message mentions organization verification.
pub(crate) fn is_organization_verification_error(status: u16, message: &str) -> bool {
    let message = message.to_lowercase();
    (status == 403 || status == 400) && message.contains("organization") && message.contains("verif")
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    async fn complete_json(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<Value, AiError> {
        let content = self.complete(system, prompt, max_tokens, true).await?;
        parse_json_content(&content)
    }

    async fn complete_text(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String, AiError> {
        self.complete(system, prompt, max_tokens, false).await
    }

    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TextStream, AiError> {
        let messages = messages
            .into_iter()
            .map(Self::request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequest {
            model: self.chat_model.clone(),
            messages,
            stream: Some(true),
            max_completion_tokens: Some(1000),
            temperature: Some(0.8),
            ..Default::default()
        };

        let stream = self.client.chat().create_stream(request).await?;
        let deltas = stream.filter_map(|chunk| async move {
            match chunk {
                Ok(response) => {
                    let delta: String = response
                        .choices
                        .into_iter()
                        .filter_map(|choice| choice.delta.content)
                        .collect();
                    (!delta.is_empty()).then_some(Ok(delta))
                }
                Err(e) => {
                    error!("Error in streaming response: {}", e);
                    Some(Err(AiError::from(e)))
                }
            }
        });

        Ok(deltas.boxed())
    }

    async fn generate_image(&self, request: &ImageGenerationRequest) -> Result<ImageOutput, AiError> {
        info!(
            "Generating image with {} ({}, {})",
            request.model.as_str(),
            request.size,
            request.quality
        );

        let response = self
            .http
            .post(IMAGES_URL)
            .bearer_auth(&self.api_key)
            .json(&ImagesApiRequest::from(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);

            if is_organization_verification_error(status.as_u16(), &message) {
                return Err(AiError::OrganizationNotVerified {
                    model: request.model.as_str().to_string(),
                    message,
                });
            }
            return Err(AiError::Api(format!("{}: {}", status, message)));
        }

        let parsed: ImagesApiResponse = serde_json::from_str(&body)?;
        parsed
            .data
            .into_iter()
            .next()
            .filter(|image| image.url.is_some() || image.b64_json.is_some())
            .ok_or_else(|| AiError::InvalidResponse("no image in response".to_string()))
    }

    async fn download_image(&self, url: &str) -> Result<Vec<u8>, AiError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Api(format!("image download returned {}", status)));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String, AiError> {
        info!("Transcribing {} ({} bytes)", file_name, audio.len());
        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8(file_name.to_string(), audio))
            .model(TRANSCRIPTION_MODEL)
            .build()?;

        let response = self.client.audio().transcribe(request).await?;
        Ok(response.text)
    }
}
