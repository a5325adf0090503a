pub mod stripe;
pub mod webhook;

use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{PaymentLink, ProfileUpdate};
use crate::quota;
use crate::state::AppState;

pub use stripe::{CreatedPaymentLink, NewPaymentLink, PaymentGateway, StripeClient, StripeError};
pub use webhook::{handle_event, verify_signature, StripeEvent, WebhookOutcome};

pub const MIN_AMOUNT_CENTS: i64 = 50;
const DEFAULT_CURRENCY: &str = "usd";

#[derive(Debug, Serialize, PartialEq)]
pub struct RedirectUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentLinkRequest {
    pub product_name: String,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub description: Option<String>,
}

/// Creates the caller's Express account on first use and returns an
/// onboarding link for it.
pub async fn connect_onboard(state: &AppState, user: &AuthUser) -> ApiResult<RedirectUrl> {
    let profile = quota::ensure_profile(state.store.as_ref(), user).await?;

    let account_id = match profile.stripe_account_id {
        Some(id) => id,
        None => {
            let id = state
                .payments
                .create_connected_account(user.id, user.email.as_deref())
                .await?;
            state
                .store
                .update_profile(
                    user.id,
                    &ProfileUpdate {
                        stripe_account_id: Some(id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            info!("Created connected account {} for {}", id, user.id);
            id
        }
    };

    let base = &state.config.app_url;
    let url = state
        .payments
        .create_account_link(
            &account_id,
            &format!("{}/payments/onboarding?refresh=1", base),
            &format!("{}/payments/onboarding?complete=1", base),
        )
        .await?;
    Ok(RedirectUrl { url })
}

pub async fn create_payment_link(
    state: &AppState,
    user: &AuthUser,
    request: CreatePaymentLinkRequest,
) -> ApiResult<PaymentLink> {
    let product_name = request.product_name.trim();
    if product_name.is_empty() {
        return Err(ApiError::InvalidRequest("productName is required".to_string()));
    }
    if request.amount_cents < MIN_AMOUNT_CENTS {
        return Err(ApiError::InvalidRequest(format!(
            "amountCents must be at least {}",
            MIN_AMOUNT_CENTS
        )));
    }
    let currency = request
        .currency
        .map(|c| c.trim().to_lowercase())
        .filter(|c| c.len() == 3)
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let profile = quota::ensure_profile(state.store.as_ref(), user).await?;
    let account_id = profile
        .stripe_account_id
        .ok_or_else(|| ApiError::InvalidRequest("Connect a Stripe account first".to_string()))?;

    let new_link = NewPaymentLink {
        product_name: product_name.to_string(),
        description: request.description.filter(|d| !d.trim().is_empty()),
        amount_cents: request.amount_cents,
        currency,
    };
    let created = state.payments.create_payment_link(&account_id, &new_link).await?;

    let link = PaymentLink {
        id: Uuid::new_v4(),
        user_id: user.id,
        stripe_payment_link_id: created.id,
        stripe_price_id: created.price_id,
        url: created.url,
        product_name: new_link.product_name,
        description: new_link.description,
        amount_cents: new_link.amount_cents,
        currency: new_link.currency,
        active: true,
        created_at: Utc::now(),
    };
    Ok(state.store.insert_payment_link(&link).await?)
}

pub async fn list_payment_links(state: &AppState, user: &AuthUser) -> ApiResult<Vec<PaymentLink>> {
    Ok(state.store.list_payment_links(user.id).await?)
}

pub async fn subscription_checkout(state: &AppState, user: &AuthUser) -> ApiResult<RedirectUrl> {
    let profile = quota::ensure_profile(state.store.as_ref(), user).await?;

    let customer_id = match profile.stripe_customer_id {
        Some(id) => id,
        None => {
            let id = state.payments.create_customer(user.id, user.email.as_deref()).await?;
            state
                .store
                .update_profile(
                    user.id,
                    &ProfileUpdate {
                        stripe_customer_id: Some(id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            id
        }
    };

    let base = &state.config.app_url;
    let url = state
        .payments
        .create_checkout_session(
            user.id,
            &customer_id,
            &state.config.stripe_pro_price_id,
            &format!("{}/billing?success=1", base),
            &format!("{}/billing?canceled=1", base),
        )
        .await?;
    Ok(RedirectUrl { url })
}

/// Verifies and applies a webhook delivery.
pub async fn receive_webhook(state: &AppState, signature: Option<&str>, payload: &[u8]) -> ApiResult<WebhookOutcome> {
    let signature =
        signature.ok_or_else(|| ApiError::InvalidSignature("missing Stripe-Signature header".to_string()))?;
    verify_signature(payload, signature, &state.config.stripe_webhook_secret, Utc::now().timestamp())?;

    let event: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid event payload: {}", e)))?;
    handle_event(state.store.as_ref(), &event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::test_support::test_state;

    fn link_request(amount_cents: i64) -> CreatePaymentLinkRequest {
        CreatePaymentLinkRequest {
            product_name: "Coaching call".to_string(),
            amount_cents,
            currency: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn onboarding_creates_account_once() {
        let ctx = test_state();
        let user = ctx.user();

        let first = connect_onboard(&ctx.state, &user).await.unwrap();
        let second = connect_onboard(&ctx.state, &user).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(ctx.payments.calls("create_connected_account"), 1);

        let profile = ctx.store.get_profile(user.id).await.unwrap().unwrap();
        assert_eq!(profile.stripe_account_id.as_deref(), Some("acct_test"));
    }

    #[tokio::test]
    async fn payment_links_need_an_account_and_minimum_amount() {
        let ctx = test_state();
        let user = ctx.user();

        let err = create_payment_link(&ctx.state, &user, link_request(49)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        let err = create_payment_link(&ctx.state, &user, link_request(500)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        connect_onboard(&ctx.state, &user).await.unwrap();
        let link = create_payment_link(&ctx.state, &user, link_request(500)).await.unwrap();
        assert_eq!(link.currency, "usd");
        assert_eq!(link.amount_cents, 500);
        assert!(link.active);

        let links = list_payment_links(&ctx.state, &user).await.unwrap();
        assert_eq!(links, vec![link]);
    }

    #[tokio::test]
    async fn checkout_reuses_customer() {
        let ctx = test_state();
        let user = ctx.user();

        let redirect = subscription_checkout(&ctx.state, &user).await.unwrap();
        assert!(redirect.url.starts_with("https://checkout.stripe.test/"));
        subscription_checkout(&ctx.state, &user).await.unwrap();
        assert_eq!(ctx.payments.calls("create_customer"), 1);
        assert_eq!(ctx.payments.calls("create_checkout_session"), 2);
    }

    #[tokio::test]
    async fn webhook_without_signature_is_rejected() {
        let ctx = test_state();
        let err = receive_webhook(&ctx.state, None, b"{}").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE");
    }
}
