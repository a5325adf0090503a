//! Picks image generation parameters from the request context.
//!
//! Parameters are resolved by ordered passes; each later pass may override
//! what an earlier one chose:
//!
//! 1. defaults
//! 2. category rules
//! 3. platform rules (`platform` form value)
//! 4. rules detected from prompt content
//! 5. performance rules (`optimize_for` form value)
//! 6. explicit request overrides
//! 7. validation and coercion into the values the image model accepts

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_COMPRESSION: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1536x1024")]
    Landscape,
    #[serde(rename = "1024x1536")]
    Portrait,
    #[serde(rename = "auto")]
    Auto,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Landscape => "1536x1024",
            ImageSize::Portrait => "1024x1536",
            ImageSize::Auto => "auto",
        }
    }

    /// Exact match, otherwise the closest supported aspect ratio.
    fn coerce(value: &str) -> Self {
        match value {
            "1024x1024" => return ImageSize::Square,
            "1536x1024" => return ImageSize::Landscape,
            "1024x1536" => return ImageSize::Portrait,
            "auto" => return ImageSize::Auto,
            _ => {}
        }

        let dims = value
            .split_once('x')
            .and_then(|(w, h)| Some((w.trim().parse::<f64>().ok()?, h.trim().parse::<f64>().ok()?)));
        match dims {
            Some((w, h)) if w > 0.0 && h > 0.0 => {
                let ratio = w / h;
                if ratio > 1.2 {
                    ImageSize::Landscape
                } else if ratio < 0.83 {
                    ImageSize::Portrait
                } else {
                    ImageSize::Square
                }
            }
            _ => ImageSize::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Low,
    Medium,
    High,
    Auto,
}

impl ImageQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Low => "low",
            ImageQuality::Medium => "medium",
            ImageQuality::High => "high",
            ImageQuality::Auto => "auto",
        }
    }

    fn coerce(value: &str) -> Self {
        match value {
            "low" => ImageQuality::Low,
            "medium" | "standard" => ImageQuality::Medium,
            "high" | "hd" => ImageQuality::High,
            _ => ImageQuality::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    fn coerce(value: &str) -> Self {
        match value {
            "jpeg" | "jpg" => ImageFormat::Jpeg,
            "webp" => ImageFormat::Webp,
            _ => ImageFormat::Png,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackground {
    Transparent,
    Opaque,
    Auto,
}

impl ImageBackground {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageBackground::Transparent => "transparent",
            ImageBackground::Opaque => "opaque",
            ImageBackground::Auto => "auto",
        }
    }

    fn coerce(value: &str) -> Self {
        match value {
            "transparent" => ImageBackground::Transparent,
            "opaque" | "solid" | "white" => ImageBackground::Opaque,
            _ => ImageBackground::Auto,
        }
    }
}

/// Final parameters handed to the image model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageParams {
    pub size: ImageSize,
    pub quality: ImageQuality,
    pub format: ImageFormat,
    pub background: ImageBackground,
    pub compression: Option<u8>,
}

/// Values the caller set explicitly. They beat every rule.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageOverrides {
    pub size: Option<String>,
    pub quality: Option<String>,
    pub format: Option<String>,
    pub background: Option<String>,
    pub compression: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageRequestContext {
    pub category_id: Option<String>,
    pub prompt: String,
    pub form_values: HashMap<String, String>,
    pub overrides: ImageOverrides,
}

struct CategoryRule {
    id: &'static str,
    size: &'static str,
    quality: &'static str,
    format: &'static str,
    background: &'static str,
}

const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule { id: "logo-brand", size: "1024x1024", quality: "high", format: "png", background: "transparent" },
    CategoryRule { id: "social-media", size: "1024x1024", quality: "medium", format: "jpeg", background: "opaque" },
    CategoryRule { id: "marketing-material", size: "1536x1024", quality: "high", format: "jpeg", background: "opaque" },
    CategoryRule { id: "product-photo", size: "1024x1024", quality: "high", format: "jpeg", background: "opaque" },
    CategoryRule { id: "illustration-art", size: "1024x1536", quality: "high", format: "png", background: "auto" },
    CategoryRule { id: "ui-mockup", size: "1536x1024", quality: "high", format: "png", background: "opaque" },
    CategoryRule { id: "sticker-icon", size: "1024x1024", quality: "medium", format: "png", background: "transparent" },
    CategoryRule { id: "banner-header", size: "1536x1024", quality: "medium", format: "webp", background: "opaque" },
    CategoryRule { id: "print-poster", size: "1024x1536", quality: "high", format: "png", background: "opaque" },
];

const PLATFORM_SIZES: &[(&str, &str)] = &[
    ("instagram", "1024x1024"),
    ("instagram post", "1024x1024"),
    ("instagram story", "1024x1536"),
    ("instagram reel", "1024x1536"),
    ("facebook story", "1024x1536"),
    ("youtube shorts", "1024x1536"),
    ("story", "1024x1536"),
    ("tiktok", "1024x1536"),
    ("pinterest", "1024x1536"),
    ("youtube", "1536x1024"),
    ("twitter", "1536x1024"),
    ("linkedin", "1536x1024"),
    ("facebook", "1536x1024"),
];

const TRANSPARENCY_KEYWORDS: &[&str] = &[
    "transparent",
    "no background",
    "without background",
    "cutout",
    "cut-out",
    "sticker",
    "isolated",
];

const PHOTOGRAPHIC_KEYWORDS: &[&str] = &[
    "photo",
    "photos",
    "photograph",
    "photorealistic",
    "realistic",
    "dslr",
    "cinematic",
    "35mm",
    "bokeh",
];

const DETAIL_KEYWORDS: &[&str] = &[
    "detailed",
    "intricate",
    "complex",
    "ornate",
    "texture",
    "textured",
    "elaborate",
    "crowd",
    "crowded",
    "many",
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `phrase` occurs in `words` as whole consecutive words.
fn has_phrase(words: &[String], phrase: &str) -> bool {
    let phrase = self::words(phrase);
    !phrase.is_empty() && words.windows(phrase.len()).any(|w| w == phrase.as_slice())
}

/// Rough 0.0..=1.0 estimate of how much detail a prompt asks for.
pub fn content_complexity(prompt: &str) -> f32 {
    let words = words(prompt);
    let detail_hits = DETAIL_KEYWORDS.iter().filter(|k| has_phrase(&words, k)).count() as f32;

    ((words.len() as f32 / 80.0).min(0.6) + detail_hits * 0.15).min(1.0)
}

fn contains_any(words: &[String], keywords: &[&str]) -> bool {
    keywords.iter().any(|k| has_phrase(words, k))
}

/// Working values between passes, kept in request vocabulary until the
/// final pass validates them.
struct Draft {
    size: String,
    quality: String,
    format: String,
    background: String,
    compression: Option<i64>,
}

impl Draft {
    fn defaults() -> Self {
        Draft {
            size: "1024x1024".to_string(),
            quality: "auto".to_string(),
            format: "png".to_string(),
            background: "auto".to_string(),
            compression: None,
        }
    }

    fn set(field: &mut String, value: &str) {
        *field = value.to_string();
    }
}

fn apply_category(draft: &mut Draft, category_id: Option<&str>) {
    let Some(rule) = category_id.and_then(|id| CATEGORY_RULES.iter().find(|r| r.id == id)) else {
        return;
    };
    Draft::set(&mut draft.size, rule.size);
    Draft::set(&mut draft.quality, rule.quality);
    Draft::set(&mut draft.format, rule.format);
    Draft::set(&mut draft.background, rule.background);
}

/// An exact platform name wins; otherwise the longest table name found in
/// the value as whole words.
fn apply_platform(draft: &mut Draft, platform: Option<&str>) {
    let Some(platform) = platform.map(words).filter(|w| !w.is_empty()) else {
        return;
    };
    let exact = PLATFORM_SIZES.iter().find(|(name, _)| words(name) == platform);
    let matched = exact.or_else(|| {
        PLATFORM_SIZES
            .iter()
            .filter(|(name, _)| has_phrase(&platform, name))
            .max_by_key(|(name, _)| name.len())
    });
    if let Some((_, size)) = matched {
        Draft::set(&mut draft.size, size);
    }
}

fn apply_content(draft: &mut Draft, prompt: &str) {
    let words = words(prompt);

    if contains_any(&words, TRANSPARENCY_KEYWORDS) {
        Draft::set(&mut draft.background, "transparent");
        Draft::set(&mut draft.format, "png");
    } else if contains_any(&words, PHOTOGRAPHIC_KEYWORDS) && draft.background != "transparent" {
        Draft::set(&mut draft.format, "jpeg");
        Draft::set(&mut draft.quality, "high");
    }

    if draft.quality == "auto" {
        let complexity = content_complexity(prompt);
        if complexity >= 0.6 {
            Draft::set(&mut draft.quality, "high");
        } else if complexity >= 0.3 {
            Draft::set(&mut draft.quality, "medium");
        }
    }
}

fn apply_performance(draft: &mut Draft, optimize_for: Option<&str>) {
    match optimize_for.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("speed") => {
            Draft::set(&mut draft.quality, "low");
            draft.compression = Some(60);
        }
        Some("quality") => {
            Draft::set(&mut draft.quality, "high");
            draft.compression = Some(95);
        }
        Some("size") => {
            if draft.format == "png" && draft.background != "transparent" {
                Draft::set(&mut draft.format, "webp");
            }
            draft.compression = Some(70);
        }
        _ => {}
    }
}

fn apply_overrides(draft: &mut Draft, overrides: &ImageOverrides) {
    let pick = |value: &Option<String>| {
        value
            .as_deref()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
    };

    if let Some(size) = pick(&overrides.size) {
        draft.size = size;
    }
    if let Some(quality) = pick(&overrides.quality) {
        draft.quality = quality;
    }
    if let Some(format) = pick(&overrides.format) {
        draft.format = format;
    }
    if let Some(background) = pick(&overrides.background) {
        draft.background = background;
    }
    if overrides.compression.is_some() {
        draft.compression = overrides.compression;
    }
}

fn validate(draft: Draft) -> ImageParams {
    let background = ImageBackground::coerce(&draft.background);
    let mut format = ImageFormat::coerce(&draft.format);
    if background == ImageBackground::Transparent && format == ImageFormat::Jpeg {
        format = ImageFormat::Png;
    }

    let compression = match format {
        ImageFormat::Png => None,
        ImageFormat::Jpeg | ImageFormat::Webp => Some(
            draft
                .compression
                .map(|c| c.clamp(0, 100) as u8)
                .unwrap_or(DEFAULT_COMPRESSION),
        ),
    };

    ImageParams {
        size: ImageSize::coerce(&draft.size),
        quality: ImageQuality::coerce(&draft.quality),
        format,
        background,
        compression,
    }
}

pub fn optimize(ctx: &ImageRequestContext) -> ImageParams {
    let mut draft = Draft::defaults();

    apply_category(&mut draft, ctx.category_id.as_deref());
    apply_platform(&mut draft, ctx.form_values.get("platform").map(String::as_str));
    apply_content(&mut draft, &ctx.prompt);
    apply_performance(&mut draft, ctx.form_values.get("optimize_for").map(String::as_str));
    apply_overrides(&mut draft, &ctx.overrides);

    validate(draft)
}

pub fn known_categories() -> impl Iterator<Item = &'static str> {
    CATEGORY_RULES.iter().map(|r| r.id)
}
