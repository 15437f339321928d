use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::Sha256;
use tracing::error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Webhooks older than this are rejected as replays.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    pub portal_return_url: String,
}

/// Thin Stripe REST client on reqwest. Only the calls billing needs.
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub mode: Option<String>,
    pub subscription: Option<String>,
    pub customer: Option<String>,
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: Option<String>,
    pub subscription: Option<String>,
    pub customer: Option<String>,
    pub billing_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    pub customer: Option<String>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub billing_cycle_anchor: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub price: Option<StripePrice>,
}

#[derive(Debug, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

impl StripeSubscription {
    /// Newer API versions only report the period on the subscription item.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| {
                self.items
                    .data
                    .first()
                    .and_then(|item| item.current_period_start)
            })
            .or(self.billing_cycle_anchor)
    }

    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }

    pub fn price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            stripe_error_param = ?details.as_ref().and_then(|d| d.param.as_deref()),
            stripe_error_message = ?details.as_ref().and_then(|d| d.message.as_deref()),
            context = %context,
            "stripe: api request failed"
        );

        bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    async fn post_form(&self, path: &str, body: &[(String, String)], context: &str) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(format!("{}{}", STRIPE_API, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body)
            .send()
            .await
            .with_context(|| format!("failed to reach Stripe: {}", context))?;

        Self::ensure_success(resp, context).await
    }

    pub async fn create_customer(&self, email: &str, user_id: Uuid) -> Result<String> {
        // https://stripe.com/docs/api/customers/create
        let body = vec![
            ("email".to_string(), email.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        let resp = self.post_form("/customers", &body, "create customer").await?;

        #[derive(Deserialize)]
        struct CustomerResp {
            id: String,
        }

        let parsed: CustomerResp = resp.json().await?;
        Ok(parsed.id)
    }

    /// Subscription-mode Checkout Session. Returns the hosted page URL.
    pub async fn create_checkout_session(
        &self,
        price_id: &str,
        customer_id: &str,
        user_id: Uuid,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        // https://stripe.com/docs/api/checkout/sessions/create
        let mut body: Vec<(String, String)> = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("client_reference_id".to_string(), user_id.to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
        ];

        // Copied onto the subscription so later subscription events carry them too.
        for (key, value) in metadata {
            body.push((format!("metadata[{}]", key), value.clone()));
            body.push((format!("subscription_data[metadata][{}]", key), value));
        }

        let resp = self
            .post_form("/checkout/sessions", &body, "create checkout session")
            .await?;

        #[derive(Deserialize)]
        struct CheckoutResp {
            url: Option<String>,
        }

        let parsed: CheckoutResp = resp.json().await?;
        parsed
            .url
            .ok_or_else(|| anyhow!("Stripe Checkout session URL is missing"))
    }

    pub async fn create_portal_session(&self, customer_id: &str) -> Result<String> {
        // https://stripe.com/docs/api/customer_portal/sessions/create
        let body = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), self.config.portal_return_url.clone()),
        ];
        let resp = self
            .post_form("/billing_portal/sessions", &body, "create portal session")
            .await?;

        #[derive(Deserialize)]
        struct PortalResp {
            url: String,
        }

        let parsed: PortalResp = resp.json().await?;
        Ok(parsed.url)
    }

    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        // https://stripe.com/docs/api/subscriptions/update#update_subscription-cancel_at_period_end
        let body = vec![("cancel_at_period_end".to_string(), "true".to_string())];
        self.post_form(
            &format!("/subscriptions/{}", subscription_id),
            &body,
            "cancel subscription",
        )
        .await?;

        Ok(())
    }

    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        let resp = self
            .http
            .get(format!("{}/subscriptions/{}", STRIPE_API, subscription_id))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .send()
            .await
            .context("failed to reach Stripe: retrieve subscription")?;
        let resp = Self::ensure_success(resp, "retrieve subscription").await?;

        Ok(resp.json().await?)
    }

    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        now_unix: i64,
    ) -> Result<StripeEvent> {
        verify_signature(
            &self.config.webhook_secret,
            payload,
            signature_header,
            now_unix,
            WEBHOOK_TOLERANCE_SECS,
        )
    }

    pub fn extract_checkout_session(event: &StripeEvent) -> Option<StripeCheckoutSession> {
        serde_json::from_value(event.data.object.clone()).ok()
    }

    pub fn extract_subscription(event: &StripeEvent) -> Option<StripeSubscription> {
        serde_json::from_value(event.data.object.clone()).ok()
    }

    pub fn extract_invoice(event: &StripeEvent) -> Option<StripeInvoice> {
        serde_json::from_value(event.data.object.clone()).ok()
    }
}

/// Checks a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`) and parses the event.
///
/// https://stripe.com/docs/webhooks/signatures
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<StripeEvent> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("t=") {
            timestamp = rest.parse().ok();
        } else if let Some(rest) = part.strip_prefix("v1=") {
            signatures.push(rest);
        }
    }

    let timestamp = timestamp.ok_or_else(|| anyhow!("missing timestamp in stripe-signature"))?;
    if signatures.is_empty() {
        bail!("missing v1 in stripe-signature");
    }
    if (now_unix - timestamp).abs() > tolerance_secs {
        bail!("stripe-signature timestamp outside tolerance");
    }

    let matched = signatures.iter().any(|signature| {
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&provided).is_ok()
    });

    if !matched {
        bail!("invalid webhook signature");
    }

    serde_json::from_slice(payload).context("webhook payload is not a Stripe event")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const PAYLOAD: &[u8] =
        br#"{"id":"evt_1","type":"invoice.payment_failed","data":{"object":{"subscription":"sub_1"}}}"#;

    fn sign(timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_a_fresh_valid_signature() {
        let header = sign(1_700_000_000, PAYLOAD);

        let event = verify_signature(SECRET, PAYLOAD, &header, 1_700_000_060, 300).unwrap();

        assert_eq!(event.type_, "invoice.payment_failed");
        let invoice = StripeClient::extract_invoice(&event).unwrap();
        assert_eq!(invoice.subscription.as_deref(), Some("sub_1"));
    }

    #[test]
    fn accepts_when_any_v1_matches() {
        let valid = sign(1_700_000_000, PAYLOAD);
        let header = format!("{},v1=deadbeef", valid);
        let rotated = header.replacen("v1=", "v1=00ff,v1=", 1);

        assert!(verify_signature(SECRET, PAYLOAD, &rotated, 1_700_000_000, 300).is_ok());
    }

    #[test]
    fn rejects_stale_timestamps() {
        let header = sign(1_700_000_000, PAYLOAD);

        assert!(verify_signature(SECRET, PAYLOAD, &header, 1_700_000_301, 300).is_err());
    }

    #[test]
    fn rejects_modified_payloads_and_missing_parts() {
        let header = sign(1_700_000_000, PAYLOAD);
        let tampered = br#"{"id":"evt_2","type":"invoice.payment_failed","data":{"object":{}}}"#;

        assert!(verify_signature(SECRET, tampered, &header, 1_700_000_000, 300).is_err());
        assert!(verify_signature(SECRET, PAYLOAD, "t=1700000000", 1_700_000_000, 300).is_err());
        assert!(verify_signature(SECRET, PAYLOAD, "v1=abc", 1_700_000_000, 300).is_err());
    }

    #[test]
    fn subscription_period_falls_back_to_items() {
        let subscription: StripeSubscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "status": "active",
            "items": {"data": [{
                "current_period_start": 10,
                "current_period_end": 20,
                "price": {"id": "price_pro"}
            }]}
        }))
        .unwrap();

        assert_eq!(subscription.period_start(), Some(10));
        assert_eq!(subscription.period_end(), Some(20));
        assert_eq!(subscription.price_id(), Some("price_pro"));
        assert!(!subscription.cancel_at_period_end);
    }
}
