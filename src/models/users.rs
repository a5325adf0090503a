use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_TRIAL_RECORDINGS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    FreeTrial,
    Free,
    Pro,
    Expired,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::FreeTrial => "FREE_TRIAL",
            PlanType::Free => "FREE",
            PlanType::Pro => "PRO",
            PlanType::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub plan_type: PlanType,
    #[serde(default)]
    pub trial_recordings_remaining: i32,
    #[serde(default)]
    pub monthly_usage: HashMap<String, i64>,
    pub usage_period: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_account_id: Option<String>,
    #[serde(default)]
    pub stripe_charges_enabled: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Profile created on first contact with the API.
    pub fn new_trial(id: Uuid, email: Option<String>) -> Self {
        Self {
            id,
            email,
            plan_type: PlanType::FreeTrial,
            trial_recordings_remaining: DEFAULT_TRIAL_RECORDINGS,
            monthly_usage: HashMap::new(),
            usage_period: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            stripe_account_id: None,
            stripe_charges_enabled: false,
            created_at: Some(Utc::now()),
        }
    }
}

/// Partial update of a profile; `None` fields are left untouched.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<PlanType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_charges_enabled: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.plan_type.is_none()
            && self.stripe_customer_id.is_none()
            && self.stripe_subscription_id.is_none()
            && self.stripe_account_id.is_none()
            && self.stripe_charges_enabled.is_none()
    }

    pub fn apply(&self, profile: &mut UserProfile) {
        if let Some(plan) = self.plan_type {
            profile.plan_type = plan;
        }
        if let Some(id) = &self.stripe_customer_id {
            profile.stripe_customer_id = Some(id.clone());
        }
        if let Some(id) = &self.stripe_subscription_id {
            profile.stripe_subscription_id = Some(id.clone());
        }
        if let Some(id) = &self.stripe_account_id {
            profile.stripe_account_id = Some(id.clone());
        }
        if let Some(enabled) = self.stripe_charges_enabled {
            profile.stripe_charges_enabled = enabled;
        }
    }
}
