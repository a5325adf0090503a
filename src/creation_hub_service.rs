use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::ai::{AiError, ImageGenerationRequest, ImageModel, ImageOutput};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::image_optimizer::{self, ImageFormat, ImageOverrides, ImageParams, ImageRequestContext};
use crate::models::GeneratedImage;
use crate::quota::{self, Feature};
use crate::state::AppState;

pub const MAX_PROMPT_CHARS: usize = 4000;
pub const IMAGES_BUCKET: &str = "generated-images";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub prompt: String,
    pub quality: Option<String>,
    pub size: Option<String>,
    pub format: Option<String>,
    pub background: Option<String>,
    pub compression: Option<i64>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub form_values: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub image: GeneratedImage,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

const CATEGORY_PREFIXES: &[(&str, &str)] = &[
    ("logo-brand", "Professional logo design, clean vector style, centered composition:"),
    ("social-media", "Eye-catching social media graphic with a bold focal point:"),
    ("marketing-material", "Polished marketing visual with room for headline copy:"),
    ("product-photo", "Studio product photograph with soft, even lighting:"),
    ("illustration-art", "Expressive digital illustration:"),
    ("ui-mockup", "Clean, modern user interface mockup:"),
    ("sticker-icon", "Die-cut sticker style icon with a thick outline:"),
    ("banner-header", "Wide website banner with a balanced layout:"),
    ("print-poster", "High-resolution poster design:"),
];

// form values that steer parameters rather than content
const TECHNICAL_FIELDS: [&str; 1] = ["optimize_for"];

fn form_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(form_text)
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn form_strings(form_values: &HashMap<String, Value>) -> HashMap<String, String> {
    form_values
        .iter()
        .filter_map(|(k, v)| Some((k.clone(), form_text(v)?)))
        .collect()
}

/// Category prefix, the user's prompt, then the filled-in form fields in a
/// stable order.
pub fn build_prompt(category_id: Option<&str>, prompt: &str, form_values: &HashMap<String, String>) -> String {
    let mut parts = Vec::new();
    if let Some((_, prefix)) = category_id.and_then(|id| CATEGORY_PREFIXES.iter().find(|(c, _)| *c == id)) {
        parts.push(prefix.to_string());
    }
    parts.push(prompt.trim().to_string());

    let details: BTreeMap<&str, &str> = form_values
        .iter()
        .filter(|(k, v)| !TECHNICAL_FIELDS.contains(&k.as_str()) && !v.trim().is_empty())
        .map(|(k, v)| (k.as_str(), v.trim()))
        .collect();
    if !details.is_empty() {
        let rendered: Vec<String> = details
            .iter()
            .map(|(k, v)| format!("{}: {}", k.replace('_', " "), v))
            .collect();
        parts.push(format!("Details: {}.", rendered.join("; ")));
    }

    parts.join(" ")
}

fn validate_prompt(prompt: &str) -> ApiResult<&str> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::InvalidPrompt("Prompt is required".to_string()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ApiError::InvalidPrompt(format!(
            "Prompt must be at most {} characters",
            MAX_PROMPT_CHARS
        )));
    }
    Ok(prompt)
}

fn primary_request(prompt: &str, params: &ImageParams) -> ImageGenerationRequest {
    ImageGenerationRequest {
        model: ImageModel::GptImage1,
        prompt: prompt.to_string(),
        size: params.size.as_str().to_string(),
        quality: params.quality.as_str().to_string(),
        output_format: Some(params.format.as_str().to_string()),
        background: Some(params.background.as_str().to_string()),
        output_compression: params.compression,
    }
}

/// dall-e-3 has its own size and quality vocabulary and a 4000 char prompt cap.
pub fn fallback_request(prompt: &str, params: &ImageParams) -> ImageGenerationRequest {
    let size = match params.size.as_str() {
        "1536x1024" => "1792x1024",
        "1024x1536" => "1024x1792",
        _ => "1024x1024",
    };
    let quality = match params.quality.as_str() {
        "high" => "hd",
        _ => "standard",
    };
    ImageGenerationRequest {
        model: ImageModel::DallE3,
        prompt: prompt.chars().take(MAX_PROMPT_CHARS).collect(),
        size: size.to_string(),
        quality: quality.to_string(),
        output_format: None,
        background: None,
        output_compression: None,
    }
}

async fn generate_with_fallback(
    state: &AppState,
    prompt: &str,
    params: &ImageParams,
) -> ApiResult<(ImageGenerationRequest, ImageOutput, bool)> {
    let primary = primary_request(prompt, params);
    match state.ai.generate_image(&primary).await {
        Ok(output) => Ok((primary, output, false)),
        Err(AiError::OrganizationNotVerified { model, message }) => {
            warn!("{} unavailable ({}), falling back to dall-e-3", model, message);
            let fallback = fallback_request(prompt, params);
            let output = state
                .ai
                .generate_image(&fallback)
                .await
                .map_err(|e| ApiError::GenerationFailed(e.to_string()))?;
            Ok((fallback, output, true))
        }
        Err(e) => Err(ApiError::GenerationFailed(e.to_string())),
    }
}

/// Copies the generated image into the images bucket and returns its public
/// URL. Inline base64 is decoded; hosted results are downloaded first.
async fn store_output(state: &AppState, user: &AuthUser, output: &ImageOutput, format: ImageFormat) -> ApiResult<String> {
    let bytes = match (&output.b64_json, &output.url) {
        (Some(encoded), _) => STANDARD
            .decode(encoded)
            .map_err(|e| ApiError::GenerationFailed(format!("invalid image data: {}", e)))?,
        (None, Some(url)) => state
            .ai
            .download_image(url)
            .await
            .map_err(|e| ApiError::GenerationFailed(format!("could not fetch generated image: {}", e)))?,
        (None, None) => return Err(ApiError::GenerationFailed("image response had no data".to_string())),
    };

    let path = format!("{}/{}.{}", user.id, Uuid::new_v4(), format.as_str());
    state
        .storage
        .upload(IMAGES_BUCKET, &path, bytes, format.content_type())
        .await?;
    Ok(state.storage.public_url(IMAGES_BUCKET, &path))
}

pub async fn generate(state: &AppState, user: &AuthUser, request: GenerateImageRequest) -> ApiResult<GenerateImageResponse> {
    let prompt = validate_prompt(&request.prompt)?.to_string();

    let profile = quota::ensure_profile(state.store.as_ref(), user).await?;
    quota::reserve(state.store.as_ref(), &profile, Feature::Images, Utc::now()).await?;

    let form_values = form_strings(&request.form_values);
    let category_id = request.category_id.filter(|c| !c.trim().is_empty());
    let params = image_optimizer::optimize(&ImageRequestContext {
        category_id: category_id.clone(),
        prompt: prompt.clone(),
        form_values: form_values.clone(),
        overrides: ImageOverrides {
            size: request.size,
            quality: request.quality,
            format: request.format,
            background: request.background,
            compression: request.compression,
        },
    });
    let enhanced = build_prompt(category_id.as_deref(), &prompt, &form_values);

    let (used, output, fallback_used) = generate_with_fallback(state, &enhanced, &params).await?;
    let format = if fallback_used { ImageFormat::Png } else { params.format };
    let image_url = store_output(state, user, &output, format).await?;

    let image = GeneratedImage {
        id: Uuid::new_v4(),
        user_id: user.id,
        prompt,
        enhanced_prompt: enhanced,
        category_id,
        image_url,
        model: used.model.as_str().to_string(),
        size: used.size,
        quality: used.quality,
        format: format.as_str().to_string(),
        background: if fallback_used {
            "auto".to_string()
        } else {
            params.background.as_str().to_string()
        },
        compression: if fallback_used { None } else { params.compression },
        created_at: Utc::now(),
    };
    let image = state.store.insert_image(&image).await?;
    quota::record_usage(state.store.as_ref(), user.id, Feature::Images).await;

    info!(
        "Generated image {} with {} (fallback: {})",
        image.id, image.model, fallback_used
    );
    Ok(GenerateImageResponse {
        image,
        fallback_used,
        revised_prompt: output.revised_prompt,
    })
}

pub async fn list_images(state: &AppState, user: &AuthUser) -> ApiResult<Vec<GeneratedImage>> {
    Ok(state.store.list_images(user.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_optimizer::{ImageBackground, ImageQuality, ImageSize};
    use crate::test_support::{test_state_with, StubAi, StubLeads};
    use serde_json::json;

    fn request(prompt: &str) -> GenerateImageRequest {
        GenerateImageRequest {
            prompt: prompt.to_string(),
            category_id: Some("logo-brand".to_string()),
            form_values: HashMap::from([
                ("brand_name".to_string(), json!("Kitsune Coffee")),
                ("colors".to_string(), json!(["orange", "black"])),
                ("optimize_for".to_string(), json!("quality")),
                ("notes".to_string(), json!("  ")),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn prompt_includes_prefix_and_sorted_details() {
        let values = form_strings(&request("x").form_values);
        let prompt = build_prompt(Some("logo-brand"), "  a fox  ", &values);
        assert_eq!(
            prompt,
            "Professional logo design, clean vector style, centered composition: a fox \
             Details: brand name: Kitsune Coffee; colors: orange, black."
        );
        assert_eq!(build_prompt(Some("unknown"), "a fox", &HashMap::new()), "a fox");
    }

    #[test]
    fn fallback_maps_size_and_quality() {
        let params = ImageParams {
            size: ImageSize::Landscape,
            quality: ImageQuality::High,
            format: ImageFormat::Png,
            background: ImageBackground::Transparent,
            compression: None,
        };
        let req = fallback_request("p", &params);
        assert_eq!(req.size, "1792x1024");
        assert_eq!(req.quality, "hd");

        let params = ImageParams {
            size: ImageSize::Portrait,
            quality: ImageQuality::Medium,
            ..params
        };
        let req = fallback_request("p", &params);
        assert_eq!(req.size, "1024x1792");
        assert_eq!(req.quality, "standard");
    }

    #[tokio::test]
    async fn rejects_bad_prompts() {
        let ctx = test_state_with(StubAi::failing(), StubLeads::default());
        let user = ctx.user();
        for prompt in ["   ".to_string(), "x".repeat(MAX_PROMPT_CHARS + 1)] {
            let err = generate(&ctx.state, &user, request(&prompt)).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_PROMPT");
            assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn inline_image_is_uploaded() {
        let ai = StubAi::failing().then_image(Ok(ImageOutput {
            b64_json: Some(STANDARD.encode(b"png-bytes")),
            ..Default::default()
        }));
        let ctx = test_state_with(ai, StubLeads::default());
        let user = ctx.user();

        let response = generate(&ctx.state, &user, request("a fox")).await.unwrap();
        assert!(!response.fallback_used);
        assert_eq!(response.image.model, "gpt-image-1");
        assert_eq!(response.image.background, "transparent");
        assert_eq!(response.image.format, "png");
        assert!(response.image.image_url.contains(IMAGES_BUCKET));
        assert_eq!(ctx.storage.object_count(IMAGES_BUCKET), 1);

        let listed = list_images(&ctx.state, &user).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn unverified_organization_falls_back_once() {
        let ai = StubAi::failing()
            .then_image(Err(AiError::OrganizationNotVerified {
                model: "gpt-image-1".to_string(),
                message: "Your organization must be verified".to_string(),
            }))
            .then_image(Ok(ImageOutput {
                url: Some("https://images.test/fox.png".to_string()),
                ..Default::default()
            }))
            .with_hosted_image("https://images.test/fox.png", b"dalle-bytes");
        let ctx = test_state_with(ai, StubLeads::default());
        let user = ctx.user();

        let response = generate(&ctx.state, &user, request("a fox")).await.unwrap();
        assert!(response.fallback_used);
        assert_eq!(response.image.model, "dall-e-3");
        assert_eq!(response.image.size, "1024x1024");
        assert_eq!(response.image.quality, "hd");
        assert!(response.image.image_url.starts_with(&format!("https://storage.test/public/{}/{}/", IMAGES_BUCKET, user.id)));
        assert!(response.image.image_url.ends_with(".png"));
        assert_eq!(ctx.storage.object_count(IMAGES_BUCKET), 1);

        let requests = ctx.ai.image_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].model, ImageModel::GptImage1);
        assert_eq!(requests[1].model, ImageModel::DallE3);
    }

    #[tokio::test]
    async fn expired_hosted_image_fails_without_a_row() {
        let ai = StubAi::failing().then_image(Ok(ImageOutput {
            url: Some("https://images.test/gone.png".to_string()),
            ..Default::default()
        }));
        let ctx = test_state_with(ai, StubLeads::default());
        let user = ctx.user();

        let err = generate(&ctx.state, &user, request("a fox")).await.unwrap_err();
        assert_eq!(err.code(), "GENERATION_FAILED");
        assert_eq!(ctx.storage.object_count(IMAGES_BUCKET), 0);
        assert!(list_images(&ctx.state, &user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_errors_do_not_fall_back() {
        let ai = StubAi::failing().then_image(Err(AiError::Api("rate limited".to_string())));
        let ctx = test_state_with(ai, StubLeads::default());
        let user = ctx.user();

        let err = generate(&ctx.state, &user, request("a fox")).await.unwrap_err();
        assert_eq!(err.code(), "GENERATION_FAILED");
        assert_eq!(ctx.ai.image_requests().len(), 1);
    }
}
