//! Subscriptions through Stripe Checkout and the Stripe customer portal.
//!
//! Checkout sessions carry the user id as `client_reference_id`; when the
//! browser returns, the session is fetched back from Stripe and the plan and
//! customer id are recorded on the user's profile.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::BillingConfig;

/// A Checkout session as read back from Stripe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    /// `complete`, `expired` or `open`.
    #[serde(default)]
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    #[serde(default)]
    pub payment_status: Option<String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.status.as_deref() == Some("complete")
            && matches!(
                self.payment_status.as_deref(),
                Some("paid") | Some("no_payment_required")
            )
    }
}

#[async_trait]
pub trait BillingPortal: Send + Sync {
    /// Plan name granted by a completed checkout.
    fn plan_name(&self) -> &str;

    /// Start a subscription checkout for `user_id`; returns the URL to redirect to.
    async fn create_checkout_session(
        &self,
        user_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> anyhow::Result<String>;

    async fn retrieve_checkout_session(&self, session_id: &str)
        -> anyhow::Result<CheckoutSession>;

    /// Open a portal session for `customer_id`; returns the URL to redirect to.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> anyhow::Result<String>;
}

pub struct StripeBillingPortal {
    client: Client,
    api_url: String,
    secret_key: String,
    price_id: String,
    plan_name: String,
}

#[derive(Debug, Deserialize)]
struct SessionUrl {
    url: String,
}

impl StripeBillingPortal {
    pub fn new(config: &BillingConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
            price_id: config.price_id.clone(),
            plan_name: config.plan_name.clone(),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
        what: &str,
    ) -> anyhow::Result<T> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            anyhow::bail!("Failed to {}: {} - {}", what, status, text);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl BillingPortal for StripeBillingPortal {
    fn plan_name(&self) -> &str {
        &self.plan_name
    }

    async fn create_checkout_session(
        &self,
        user_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(format!("{}/checkout/sessions", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("mode", "subscription"),
                ("line_items[0][price]", self.price_id.as_str()),
                ("line_items[0][quantity]", "1"),
                ("client_reference_id", user_id),
                ("success_url", success_url),
                ("cancel_url", cancel_url),
            ])
            .send()
            .await?;

        let session: SessionUrl = Self::read_json(resp, "create checkout session").await?;
        Ok(session.url)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> anyhow::Result<CheckoutSession> {
        // The id arrives on a browser redirect; keep it inside one segment.
        let mut url = url::Url::parse(&self.api_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Stripe API URL cannot take a path"))?
            .pop_if_empty()
            .extend(["checkout", "sessions", session_id]);
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::read_json(resp, "retrieve checkout session").await
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(format!("{}/billing_portal/sessions", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&[("customer", customer_id), ("return_url", return_url)])
            .send()
            .await?;

        let session: SessionUrl = Self::read_json(resp, "create billing portal session").await?;
        Ok(session.url)
    }
}
