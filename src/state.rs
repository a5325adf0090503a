use axum::extract::FromRef;
use std::sync::Arc;

use crate::ai::AiProvider;
use crate::analytics_service::AnalyticsEngine;
use crate::config::Config;
use crate::lead_service::LeadSource;
use crate::payments::PaymentGateway;
use crate::store::Store;
use crate::supabase::ObjectStorage;

#[derive(FromRef, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn ObjectStorage>,
    pub ai: Arc<dyn AiProvider>,
    pub leads: Arc<dyn LeadSource>,
    pub payments: Arc<dyn PaymentGateway>,
    pub analytics: AnalyticsEngine,
}
