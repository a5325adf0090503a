use std::env;
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    MissingEnvironmentVar(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEnvironmentVar(var) => {
                write!(f, "Missing environment variable: {}", var)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_RECORDINGS_BUCKET: &str = "audio-recordings";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub app_url: String,
    pub supabase_url: String,
    pub supabase_key: String,
    pub supabase_jwt_secret: String,
    pub openai_api_key: String,
    pub chat_model: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_pro_price_id: String,
    pub recordings_bucket: String,
    pub smart_executor_url: Option<String>,
}

fn required(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingEnvironmentVar(var.to_string()))
}

fn optional(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Reads configuration from the process environment. Call `dotenv()` first
    /// if values should come from a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            app_url: required("APP_URL")?.trim_end_matches('/').to_string(),
            supabase_url: required("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            supabase_key: required("SUPABASE_KEY")?,
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            chat_model: optional("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_pro_price_id: required("STRIPE_PRO_PRICE_ID")?,
            recordings_bucket: optional("RECORDINGS_BUCKET")
                .unwrap_or_else(|| DEFAULT_RECORDINGS_BUCKET.to_string()),
            smart_executor_url: optional("SMART_EXECUTOR_URL"),
        })
    }

    pub fn postgrest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.supabase_url)
    }
}
