//! Stripe integration: hosted checkout, billing portal and webhook signatures

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::info;

use crate::config::AppConfig;

const STRIPE_API_URL: &str = "https://api.stripe.com/v1";

/// Maximum age of a signed webhook, in seconds
pub const WEBHOOK_TOLERANCE_SECONDS: i64 = 300;

/// Reasons a webhook is refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error("Malformed Stripe-Signature header")]
    MalformedSignature,

    #[error("Webhook timestamp outside the tolerance window")]
    Stale,

    #[error("Webhook signature mismatch")]
    SignatureMismatch,
}

/// Verify a `Stripe-Signature` header against the raw request body
///
/// The header carries `t=<unix time>` and one or more `v1=<hex hmac>`
/// entries; the HMAC-SHA256 is computed over `"{t}.{body}"`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::MalformedSignature)?,
                );
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature);
    }

    if (now - timestamp).abs() > WEBHOOK_TOLERANCE_SECONDS {
        return Err(WebhookError::Stale);
    }

    let matches = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
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
        Err(WebhookError::SignatureMismatch)
    }
}

/// Envelope of a webhook event
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    url: String,
}

/// Minimal Stripe REST client
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
    price_id: String,
    frontend_url: String,
    api_url: String,
}

impl StripeClient {
    /// Build a client when `STRIPE_SECRET_KEY` and `STRIPE_PRICE_ID` are configured
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let secret_key = config.stripe_secret_key.clone().filter(|k| !k.is_empty())?;
        let price_id = config.stripe_price_id.clone().filter(|p| !p.is_empty())?;

        Some(Self {
            client: reqwest::Client::new(),
            secret_key,
            price_id,
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            api_url: STRIPE_API_URL.to_string(),
        })
    }

    /// Create a subscription checkout session and return its URL
    ///
    /// The session is bound to `customer_id` when the user already has one,
    /// otherwise Stripe creates a customer for `email`.
    pub async fn create_checkout_session(
        &self,
        user_id: i64,
        email: &str,
        customer_id: Option<&str>,
    ) -> Result<String> {
        let success_url = format!("{}/dashboard?checkout=success", self.frontend_url);
        let cancel_url = format!("{}/dashboard?checkout=cancelled", self.frontend_url);
        let user_id = user_id.to_string();

        let mut form = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", self.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
            ("client_reference_id", user_id.as_str()),
        ];
        match customer_id {
            Some(customer) => form.push(("customer", customer)),
            None => form.push(("customer_email", email)),
        }

        let session = self.post_form("checkout/sessions", &form).await?;
        info!("Created checkout session for user {}", user_id);
        Ok(session.url)
    }

    /// Create a billing portal session for an existing customer
    pub async fn create_portal_session(&self, customer_id: &str) -> Result<String> {
        let return_url = format!("{}/dashboard", self.frontend_url);
        let form = [("customer", customer_id), ("return_url", return_url.as_str())];

        let session = self.post_form("billing_portal/sessions", &form).await?;
        Ok(session.url)
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<SessionResponse> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_url, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .with_context(|| format!("Stripe request to {} failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Stripe returned {} for {}: {}", status, path, body);
        }

        response
            .json::<SessionResponse>()
            .await
            .with_context(|| format!("Unexpected Stripe response for {}", path))
    }
}

#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
