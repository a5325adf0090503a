//! In-process doubles for the external services, shared by the unit tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::ai::{AiError, AiProvider, ChatMessage, ImageGenerationRequest, ImageOutput, TextStream};
use crate::analytics_service::AnalyticsEngine;
use crate::auth::{generate_token, AuthUser};
use crate::config::Config;
use crate::lead_service::{LeadPost, LeadSource, LeadSourceError};
use crate::payments::{CreatedPaymentLink, NewPaymentLink, PaymentGateway, StripeError};
use crate::state::AppState;
use crate::store::MemoryStore;
use crate::supabase::{ObjectStorage, StorageError};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scripted model. JSON, text and image answers are consumed in order; an
/// empty queue yields an error so callers exercise their fallback paths.
#[derive(Default)]
pub struct StubAi {
    json: Mutex<VecDeque<Value>>,
    text: Mutex<VecDeque<String>>,
    images: Mutex<VecDeque<Result<ImageOutput, AiError>>>,
    image_requests: Mutex<Vec<ImageGenerationRequest>>,
    hosted_images: HashMap<String, Vec<u8>>,
    transcript: Option<String>,
    chat_chunks: Vec<String>,
}

impl StubAi {
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_json(value: Value) -> Self {
        Self::default().then_json(value)
    }

    pub fn then_json(self, value: Value) -> Self {
        locked(&self.json).push_back(value);
        self
    }

    pub fn then_text(self, text: &str) -> Self {
        locked(&self.text).push_back(text.to_string());
        self
    }

    pub fn then_image(self, output: Result<ImageOutput, AiError>) -> Self {
        locked(&self.images).push_back(output);
        self
    }

    pub fn with_hosted_image(mut self, url: &str, bytes: &[u8]) -> Self {
        self.hosted_images.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn with_transcript(mut self, transcript: &str) -> Self {
        self.transcript = Some(transcript.to_string());
        self
    }

    pub fn with_chat_chunks(mut self, chunks: &[&str]) -> Self {
        self.chat_chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn image_requests(&self) -> Vec<ImageGenerationRequest> {
        locked(&self.image_requests).clone()
    }
}

#[async_trait]
impl AiProvider for StubAi {
    async fn complete_json(&self, _system: &str, _prompt: &str, _max_tokens: u32) -> Result<Value, AiError> {
        locked(&self.json)
            .pop_front()
            .ok_or_else(|| AiError::Api("no scripted JSON response".to_string()))
    }

    async fn complete_text(&self, _system: &str, _prompt: &str, _max_tokens: u32) -> Result<String, AiError> {
        locked(&self.text)
            .pop_front()
            .ok_or_else(|| AiError::Api("no scripted text response".to_string()))
    }

    async fn stream_chat(&self, _messages: Vec<ChatMessage>) -> Result<TextStream, AiError> {
        if self.chat_chunks.is_empty() {
            return Err(AiError::Api("no scripted chat".to_string()));
        }
        let chunks: Vec<Result<String, AiError>> = self.chat_chunks.iter().cloned().map(Ok).collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn generate_image(&self, request: &ImageGenerationRequest) -> Result<ImageOutput, AiError> {
        locked(&self.image_requests).push(request.clone());
        locked(&self.images)
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Api("no scripted image".to_string())))
    }

    async fn download_image(&self, url: &str) -> Result<Vec<u8>, AiError> {
        self.hosted_images
            .get(url)
            .cloned()
            .ok_or_else(|| AiError::Api(format!("image download returned 404 Not Found for {}", url)))
    }

    async fn transcribe(&self, _file_name: &str, _audio: Vec<u8>) -> Result<String, AiError> {
        self.transcript
            .clone()
            .ok_or_else(|| AiError::Api("no scripted transcript".to_string()))
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStorage {
    pub fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) {
        locked(&self.objects).insert((bucket.to_string(), path.to_string()), bytes);
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        locked(&self.objects).keys().filter(|(b, _)| b == bucket).count()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn signed_url(&self, bucket: &str, path: &str, expires_in_secs: u64) -> Result<String, StorageError> {
        Ok(format!("https://storage.test/sign/{}/{}?expires={}", bucket, path, expires_in_secs))
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        locked(&self.objects)
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::Status {
                status: 404,
                body: "Object not found".to_string(),
            })
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StorageError> {
        self.put(bucket, path, bytes);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://storage.test/public/{}/{}", bucket, path)
    }
}

/// Returns the same posts for every supported platform.
#[derive(Default)]
pub struct StubLeads {
    posts: Vec<LeadPost>,
}

impl StubLeads {
    pub fn new(posts: Vec<LeadPost>) -> Self {
        Self { posts }
    }
}

#[async_trait]
impl LeadSource for StubLeads {
    fn supports(&self, platform: &str) -> bool {
        platform == "reddit"
    }

    async fn search(&self, platform: &str, _keywords: &str, limit: usize) -> Result<Vec<LeadPost>, LeadSourceError> {
        if !self.supports(platform) {
            return Err(LeadSourceError::UnsupportedPlatform(platform.to_string()));
        }
        Ok(self.posts.iter().take(limit).cloned().collect())
    }
}

/// Counts calls per operation and hands back deterministic ids.
#[derive(Default)]
pub struct StubPayments {
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl StubPayments {
    fn record(&self, operation: &'static str) -> usize {
        let mut calls = locked(&self.calls);
        let count = calls.entry(operation).or_insert(0);
        *count += 1;
        *count
    }

    pub fn calls(&self, operation: &str) -> usize {
        locked(&self.calls).get(operation).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for StubPayments {
    async fn create_customer(&self, _user_id: Uuid, _email: Option<&str>) -> Result<String, StripeError> {
        self.record("create_customer");
        Ok("cus_test".to_string())
    }

    async fn create_checkout_session(
        &self,
        _user_id: Uuid,
        customer_id: &str,
        price_id: &str,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<String, StripeError> {
        let n = self.record("create_checkout_session");
        Ok(format!("https://checkout.stripe.test/{}/{}/{}", customer_id, price_id, n))
    }

    async fn create_connected_account(&self, _user_id: Uuid, _email: Option<&str>) -> Result<String, StripeError> {
        self.record("create_connected_account");
        Ok("acct_test".to_string())
    }

    async fn create_account_link(&self, account_id: &str, _refresh_url: &str, _return_url: &str) -> Result<String, StripeError> {
        self.record("create_account_link");
        Ok(format!("https://connect.stripe.test/setup/{}", account_id))
    }

    async fn create_payment_link(&self, _account_id: &str, link: &NewPaymentLink) -> Result<CreatedPaymentLink, StripeError> {
        let n = self.record("create_payment_link");
        Ok(CreatedPaymentLink {
            id: format!("plink_{}", n),
            url: format!("https://buy.stripe.test/{}", n),
            price_id: format!("price_{}_{}", link.currency, n),
        })
    }
}

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        app_url: "https://minato.test".to_string(),
        supabase_url: "https://project.supabase.test".to_string(),
        supabase_key: "service-role".to_string(),
        supabase_jwt_secret: TEST_JWT_SECRET.to_string(),
        openai_api_key: "sk-test".to_string(),
        chat_model: "gpt-4o-mini".to_string(),
        stripe_secret_key: "sk_test".to_string(),
        stripe_webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        stripe_pro_price_id: "price_pro".to_string(),
        recordings_bucket: "audio-recordings".to_string(),
        smart_executor_url: None,
    }
}

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub ai: Arc<StubAi>,
    pub payments: Arc<StubPayments>,
}

impl TestContext {
    /// A fresh user with no profile yet.
    pub fn user(&self) -> AuthUser {
        let id = Uuid::new_v4();
        AuthUser {
            id,
            email: Some(format!("{}@minato.test", id.simple())),
        }
    }

    pub fn token(&self, user: &AuthUser) -> String {
        generate_token(TEST_JWT_SECRET, user.id, user.email.as_deref(), 3600)
            .unwrap_or_else(|e| panic!("test token: {}", e))
    }

    pub fn app(&self) -> axum::Router {
        crate::handlers::router(self.state.clone())
    }
}

pub fn test_state() -> TestContext {
    test_state_with(StubAi::failing(), StubLeads::default())
}

pub fn test_state_with(ai: StubAi, leads: StubLeads) -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let storage = Arc::new(MemoryStorage::default());
    let ai = Arc::new(ai);
    let payments = Arc::new(StubPayments::default());

    let state = AppState {
        config: Arc::new(test_config()),
        store: store.clone(),
        storage: storage.clone(),
        ai: ai.clone(),
        leads: Arc::new(leads),
        payments: payments.clone(),
        analytics: AnalyticsEngine::local(),
    };

    TestContext {
        state,
        store,
        storage,
        ai,
        payments,
    }
}
