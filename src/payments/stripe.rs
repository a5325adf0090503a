use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const STRIPE_API: &str = "https://api.stripe.com/v1";

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("Stripe request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Stripe returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Stripe response missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentLink {
    pub product_name: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPaymentLink {
    pub id: String,
    pub url: String,
    pub price_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(&self, user_id: Uuid, email: Option<&str>) -> Result<String, StripeError>;
    /// Subscription checkout for `price_id`; returns the hosted checkout URL.
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, StripeError>;
    async fn create_connected_account(&self, user_id: Uuid, email: Option<&str>) -> Result<String, StripeError>;
    /// Onboarding link for an Express account.
    async fn create_account_link(&self, account_id: &str, refresh_url: &str, return_url: &str) -> Result<String, StripeError>;
    /// Product, price and payment link, all created on the connected account.
    async fn create_payment_link(&self, account_id: &str, link: &NewPaymentLink) -> Result<CreatedPaymentLink, StripeError>;
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct WithUrl {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: &str) -> Result<Self, StripeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            secret_key: secret_key.to_string(),
            base_url: STRIPE_API.to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        account: Option<&str>,
        form: &[(&str, String)],
    ) -> Result<T, StripeError> {
        let mut request = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(form);
        if let Some(account) = account {
            request = request.header("Stripe-Account", account);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(body);
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        debug!("Stripe POST {} ok", path);
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_customer(&self, user_id: Uuid, email: Option<&str>) -> Result<String, StripeError> {
        let mut form = vec![("metadata[user_id]", user_id.to_string())];
        if let Some(email) = email {
            form.push(("email", email.to_string()));
        }
        let customer: IdOnly = self.post("customers", None, &form).await?;
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, StripeError> {
        let form = [
            ("mode", "subscription".to_string()),
            ("customer", customer_id.to_string()),
            ("line_items[0][price]", price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", success_url.to_string()),
            ("cancel_url", cancel_url.to_string()),
            ("client_reference_id", user_id.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];
        let session: WithUrl = self.post("checkout/sessions", None, &form).await?;
        session.url.ok_or(StripeError::MissingField("checkout session url"))
    }

    async fn create_connected_account(&self, user_id: Uuid, email: Option<&str>) -> Result<String, StripeError> {
        let mut form = vec![
            ("type", "express".to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("capabilities[card_payments][requested]", "true".to_string()),
            ("capabilities[transfers][requested]", "true".to_string()),
        ];
        if let Some(email) = email {
            form.push(("email", email.to_string()));
        }
        let account: IdOnly = self.post("accounts", None, &form).await?;
        Ok(account.id)
    }

    async fn create_account_link(&self, account_id: &str, refresh_url: &str, return_url: &str) -> Result<String, StripeError> {
        let form = [
            ("account", account_id.to_string()),
            ("refresh_url", refresh_url.to_string()),
            ("return_url", return_url.to_string()),
            ("type", "account_onboarding".to_string()),
        ];
        let link: WithUrl = self.post("account_links", None, &form).await?;
        link.url.ok_or(StripeError::MissingField("account link url"))
    }

    async fn create_payment_link(&self, account_id: &str, link: &NewPaymentLink) -> Result<CreatedPaymentLink, StripeError> {
        let mut product_form = vec![("name", link.product_name.clone())];
        if let Some(description) = &link.description {
            product_form.push(("description", description.clone()));
        }
        let product: IdOnly = self.post("products", Some(account_id), &product_form).await?;

        let price_form = [
            ("product", product.id),
            ("unit_amount", link.amount_cents.to_string()),
            ("currency", link.currency.clone()),
        ];
        let price: IdOnly = self.post("prices", Some(account_id), &price_form).await?;

        let link_form = [
            ("line_items[0][price]", price.id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
        ];
        let created: WithUrl = self.post("payment_links", Some(account_id), &link_form).await?;

        Ok(CreatedPaymentLink {
            id: created.id,
            url: created.url.ok_or(StripeError::MissingField("payment link url"))?,
            price_id: price.id,
        })
    }
}
