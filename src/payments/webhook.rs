//! Stripe webhook signature verification and event handling.

use hmac::{Hmac, Mac};
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{PlanType, ProfileUpdate, UserProfile};
use crate::store::Store;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Checks a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`) against the
/// raw request body.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> ApiResult<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| ApiError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(ApiError::InvalidSignature("missing v1 signature".to_string()));
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ApiError::InvalidSignature("timestamp outside tolerance".to_string()));
    }

    let matches = signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(ApiError::InvalidSignature("no matching signature".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, PartialEq)]
pub enum WebhookOutcome {
    ProfileUpdated(Uuid),
    /// Event recognised but no profile matched it.
    Unmatched,
    Ignored,
}

fn str_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn plan_for_subscription_status(status: &str) -> Option<PlanType> {
    match status {
        "active" | "trialing" => Some(PlanType::Pro),
        "canceled" | "unpaid" | "incomplete_expired" => Some(PlanType::Expired),
        _ => None,
    }
}

async fn profile_for_checkout(store: &dyn Store, session: &Value) -> ApiResult<Option<UserProfile>> {
    let user_id = str_field(session, "client_reference_id")
        .or_else(|| session.get("metadata").and_then(|m| str_field(m, "user_id")))
        .and_then(|id| Uuid::parse_str(id).ok());
    if let Some(user_id) = user_id {
        if let Some(profile) = store.get_profile(user_id).await? {
            return Ok(Some(profile));
        }
    }
    match str_field(session, "customer") {
        Some(customer) => Ok(store.find_profile_by_customer(customer).await?),
        None => Ok(None),
    }
}

async fn apply(store: &dyn Store, profile: Option<UserProfile>, update: ProfileUpdate) -> ApiResult<WebhookOutcome> {
    let Some(profile) = profile else {
        return Ok(WebhookOutcome::Unmatched);
    };
    if update.is_empty() {
        return Ok(WebhookOutcome::Ignored);
    }
    store.update_profile(profile.id, &update).await?;
    Ok(WebhookOutcome::ProfileUpdated(profile.id))
}

pub async fn handle_event(store: &dyn Store, event: &StripeEvent) -> ApiResult<WebhookOutcome> {
    let object = &event.data.object;
    let outcome = match event.event_type.as_str() {
        "checkout.session.completed" => {
            if str_field(object, "mode") != Some("subscription") {
                return Ok(WebhookOutcome::Ignored);
            }
            let profile = profile_for_checkout(store, object).await?;
            let update = ProfileUpdate {
                plan_type: Some(PlanType::Pro),
                stripe_customer_id: str_field(object, "customer").map(str::to_string),
                stripe_subscription_id: str_field(object, "subscription").map(str::to_string),
                ..Default::default()
            };
            apply(store, profile, update).await?
        }
        "customer.subscription.updated" | "customer.subscription.deleted" => {
            let plan = if event.event_type.ends_with("deleted") {
                Some(PlanType::Expired)
            } else {
                str_field(object, "status").and_then(plan_for_subscription_status)
            };
            let Some(plan) = plan else {
                return Ok(WebhookOutcome::Ignored);
            };
            let profile = match str_field(object, "customer") {
                Some(customer) => store.find_profile_by_customer(customer).await?,
                None => None,
            };
            let update = ProfileUpdate {
                plan_type: Some(plan),
                stripe_subscription_id: str_field(object, "id").map(str::to_string),
                ..Default::default()
            };
            apply(store, profile, update).await?
        }
        "account.updated" => {
            let profile = match str_field(object, "id") {
                Some(account) => store.find_profile_by_account(account).await?,
                None => None,
            };
            let update = ProfileUpdate {
                stripe_charges_enabled: Some(object.get("charges_enabled").and_then(Value::as_bool).unwrap_or(false)),
                ..Default::default()
            };
            apply(store, profile, update).await?
        }
        _ => WebhookOutcome::Ignored,
    };

    match &outcome {
        WebhookOutcome::ProfileUpdated(user_id) => {
            info!("Stripe event {} ({}) updated profile {}", event.id, event.event_type, user_id)
        }
        WebhookOutcome::Unmatched => {
            warn!("Stripe event {} ({}) matched no profile", event.id, event.event_type)
        }
        WebhookOutcome::Ignored => {}
    }
    Ok(outcome)
}
