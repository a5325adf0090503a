use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_payment_link_id: String,
    pub stripe_price_id: String,
    pub url: String,
    pub product_name: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
