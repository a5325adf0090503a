//! Monthly quota guard.
//!
//! Usage is measured by counting the rows a user created in the feature's
//! table since the first instant of the current UTC month. Counters kept on
//! the profile are only ever bumped through atomic database functions.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{PlanType, UserProfile};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Recordings,
    Images,
    LeadSearches,
    Games,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Recordings,
        Feature::Images,
        Feature::LeadSearches,
        Feature::Games,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Recordings => "recordings",
            Feature::Images => "images",
            Feature::LeadSearches => "lead_searches",
            Feature::Games => "games",
        }
    }

    /// Table whose rows count against this feature.
    pub fn table(&self) -> &'static str {
        match self {
            Feature::Recordings => "audio_recordings",
            Feature::Images => "generated_images",
            Feature::LeadSearches => "ai_lead_searches",
            Feature::Games => "game_rooms",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Feature::Recordings => "recording",
            Feature::Images => "image generation",
            Feature::LeadSearches => "lead search",
            Feature::Games => "game",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Limit {
    Monthly(i64),
    Unlimited,
    /// Gated by the profile's trial counter instead of a monthly count.
    Trial,
}

pub fn limit_for(plan: PlanType, feature: Feature) -> Limit {
    use Feature::*;
    use PlanType::*;

    match (plan, feature) {
        (Expired, _) => Limit::Monthly(0),
        (FreeTrial, Recordings) => Limit::Trial,
        (FreeTrial, Images) => Limit::Monthly(5),
        (FreeTrial, LeadSearches) => Limit::Monthly(2),
        (FreeTrial, Games) => Limit::Monthly(10),
        (Free, Recordings) => Limit::Monthly(5),
        (Free, Images) => Limit::Monthly(10),
        (Free, LeadSearches) => Limit::Monthly(5),
        (Free, Games) => Limit::Monthly(20),
        (Pro, Recordings) => Limit::Monthly(50),
        (Pro, Images) => Limit::Monthly(200),
        (Pro, LeadSearches) => Limit::Monthly(100),
        (Pro, Games) => Limit::Unlimited,
    }
}

pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Loads the caller's profile, creating a trial profile on first contact.
pub async fn ensure_profile(store: &dyn Store, user: &AuthUser) -> ApiResult<UserProfile> {
    if let Some(profile) = store.get_profile(user.id).await? {
        return Ok(profile);
    }
    log::info!("Creating trial profile for user {}", user.id);
    let profile = UserProfile::new_trial(user.id, user.email.clone());
    Ok(store.insert_profile(&profile).await?)
}

fn exceeded(profile: &UserProfile, feature: Feature, limit: Option<i64>, used: i64) -> ApiError {
    let message = match (profile.plan_type, limit) {
        (PlanType::Expired, _) => "Your plan has expired. Upgrade to continue.".to_string(),
        (PlanType::FreeTrial, None) => "Your free trial recordings are used up.".to_string(),
        (_, Some(limit)) => format!(
            "Monthly {} limit of {} reached for the {} plan.",
            feature.label(),
            limit,
            profile.plan_type
        ),
        (_, None) => format!("{} quota exceeded.", feature.label()),
    };

    ApiError::QuotaExceeded {
        message,
        details: json!({
            "feature": feature.as_str(),
            "plan": profile.plan_type,
            "limit": limit,
            "used": used,
        }),
    }
}

/// Admits one use of `feature` or rejects it with `QUOTA_EXCEEDED`.
///
/// Trial recordings are consumed here through the atomic trial counter, so a
/// request that loses a race for the last trial slot is rejected too.
pub async fn reserve(
    store: &dyn Store,
    profile: &UserProfile,
    feature: Feature,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    match limit_for(profile.plan_type, feature) {
        Limit::Unlimited => Ok(()),
        Limit::Trial => {
            if profile.trial_recordings_remaining <= 0 {
                return Err(exceeded(profile, feature, None, 0));
            }
            match store.consume_trial_recording(profile.id).await? {
                Some(remaining) => {
                    log::info!(
                        "User {} consumed a trial recording, {} remaining",
                        profile.id,
                        remaining
                    );
                    Ok(())
                }
                None => Err(exceeded(profile, feature, None, 0)),
            }
        }
        Limit::Monthly(limit) => {
            let used = if limit == 0 {
                0
            } else {
                store.count_since(feature, profile.id, month_start(now)).await?
            };
            if used >= limit {
                Err(exceeded(profile, feature, Some(limit), used))
            } else {
                Ok(())
            }
        }
    }
}

/// Records a completed use. Failures are logged, never surfaced: the work the
/// user paid quota for has already happened.
pub async fn record_usage(store: &dyn Store, user_id: uuid::Uuid, feature: Feature) {
    match store.increment_monthly_usage(user_id, feature).await {
        Ok(count) => log::debug!("{} usage for {} is now {}", feature.as_str(), user_id, count),
        Err(e) => log::error!("Failed to record {} usage for {}: {}", feature.as_str(), user_id, e),
    }
}

#[derive(Debug, Serialize)]
pub struct FeatureUsage {
    pub feature: Feature,
    pub used: i64,
    pub limit: Limit,
}

#[derive(Debug, Serialize)]
pub struct UsageSummary {
    pub plan: PlanType,
    pub trial_recordings_remaining: i32,
    pub period_start: DateTime<Utc>,
    pub features: Vec<FeatureUsage>,
}

pub async fn usage_summary(
    store: &dyn Store,
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> ApiResult<UsageSummary> {
    let since = month_start(now);
    let mut features = Vec::with_capacity(Feature::ALL.len());
    for feature in Feature::ALL {
        let used = store.count_since(feature, profile.id, since).await?;
        features.push(FeatureUsage {
            feature,
            used,
            limit: limit_for(profile.plan_type, feature),
        });
    }

    Ok(UsageSummary {
        plan: profile.plan_type,
        trial_recordings_remaining: profile.trial_recordings_remaining,
        period_start: since,
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioRecording;
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: Some("player@minato.test".to_string()),
        }
    }

    #[test]
    fn month_start_is_first_instant_utc() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 15, 42, 7).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn expired_plan_has_no_quota() {
        for feature in Feature::ALL {
            assert_eq!(limit_for(PlanType::Expired, feature), Limit::Monthly(0));
        }
        assert_eq!(limit_for(PlanType::FreeTrial, Feature::Recordings), Limit::Trial);
        assert_eq!(limit_for(PlanType::Pro, Feature::Games), Limit::Unlimited);
    }

    #[tokio::test]
    async fn ensure_profile_creates_trial_once() {
        let store = MemoryStore::new();
        let user = user();

        let first = ensure_profile(&store, &user).await.unwrap();
        assert_eq!(first.plan_type, PlanType::FreeTrial);

        let second = ensure_profile(&store, &user).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.trial_recordings_remaining, first.trial_recordings_remaining);
    }

    #[tokio::test]
    async fn trial_recordings_are_consumed_until_exhausted() {
        let store = MemoryStore::new();
        let mut profile = UserProfile::new_trial(Uuid::new_v4(), None);
        profile.trial_recordings_remaining = 1;
        store.insert_profile(&profile).await.unwrap();

        reserve(&store, &profile, Feature::Recordings, Utc::now()).await.unwrap();

        // stale profile still claims one left; the atomic counter refuses
        let err = reserve(&store, &profile, Feature::Recordings, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "QUOTA_EXCEEDED");

        profile.trial_recordings_remaining = 0;
        let err = reserve(&store, &profile, Feature::Recordings, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn monthly_limit_counts_only_current_month() {
        let store = MemoryStore::new();
        let mut profile = UserProfile::new_trial(Uuid::new_v4(), None);
        profile.plan_type = PlanType::Free;
        store.insert_profile(&profile).await.unwrap();

        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let last_month = Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).unwrap();

        for i in 0..5 {
            let mut recording = AudioRecording::new(
                profile.id,
                None,
                format!("r{}.webm", i),
                format!("{}/r{}.webm", profile.id, i),
                None,
            );
            recording.created_at = last_month;
            store.insert_recording(&recording).await.unwrap();
        }
        reserve(&store, &profile, Feature::Recordings, now).await.unwrap();

        for i in 0..5 {
            let mut recording = AudioRecording::new(profile.id, None, format!("n{}.webm", i), format!("n{}", i), None);
            recording.created_at = now;
            store.insert_recording(&recording).await.unwrap();
        }
        let err = reserve(&store, &profile, Feature::Recordings, now).await.unwrap_err();
        match err {
            ApiError::QuotaExceeded { details, .. } => {
                assert_eq!(details["limit"], 5);
                assert_eq!(details["used"], 5);
                assert_eq!(details["plan"], "FREE");
            }
            other => panic!("expected quota error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn record_usage_increments_counter() {
        let store = MemoryStore::new();
        let profile = UserProfile::new_trial(Uuid::new_v4(), None);
        store.insert_profile(&profile).await.unwrap();

        record_usage(&store, profile.id, Feature::Images).await;
        record_usage(&store, profile.id, Feature::Images).await;

        let stored = store.get_profile(profile.id).await.unwrap().unwrap();
        assert_eq!(stored.monthly_usage.get("images"), Some(&2));
    }
}
