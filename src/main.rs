use anyhow::Context;
use dotenv::dotenv;
use env_logger::Env;
use std::sync::Arc;

use minato::ai::OpenAiProvider;
use minato::analytics_service::AnalyticsEngine;
use minato::config::Config;
use minato::handlers;
use minato::lead_service::WebLeadSource;
use minato::payments::StripeClient;
use minato::state::AppState;
use minato::store::SupabaseStore;
use minato::supabase::SupabaseStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env()?;

    let ai = OpenAiProvider::new(&config.openai_api_key, &config.chat_model)
        .context("failed to build OpenAI client")?;
    let leads = WebLeadSource::new().context("failed to build lead source client")?;
    let payments = StripeClient::new(&config.stripe_secret_key).context("failed to build Stripe client")?;

    match &config.smart_executor_url {
        Some(url) => log::info!("Analytics via smart executor at {}", url),
        None => log::info!("SMART_EXECUTOR_URL not set, analytics run locally"),
    }

    let app_state = AppState {
        store: Arc::new(SupabaseStore::new(&config)),
        storage: Arc::new(SupabaseStorage::new(&config)),
        ai: Arc::new(ai),
        leads: Arc::new(leads),
        payments: Arc::new(payments),
        analytics: AnalyticsEngine::new(config.smart_executor_url.clone()),
        config: Arc::new(config),
    };

    let addr = app_state.config.bind_addr.clone();
    let app = handlers::router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    log::info!("listening on http://{}", &addr);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
