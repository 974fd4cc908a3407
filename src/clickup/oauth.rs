//! ClickUp OAuth authorization-code flow.
//!
//! 1. The user is sent to [`OAuthClient::authorize_url`] with an opaque `state`
//! 2. ClickUp redirects back with `code` and the same `state`
//! 3. [`OAuthClient::exchange_code`] trades the code for an access token

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;

use crate::config::ClickUpConfig;

pub struct OAuthClient {
    client: Client,
    api_url: String,
    authorize_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl OAuthClient {
    pub fn new(config: &ClickUpConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Build the provider page the user must visit to grant access.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> anyhow::Result<String> {
        let mut url = url::Url::parse(&self.authorize_url)
            .with_context(|| format!("Invalid authorize URL {}", self.authorize_url))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(format!("{}/oauth/token", self.api_url))
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "code": code,
            }))
            .send()
            .await
            .context("Token exchange request failed")?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            anyhow::bail!("Token exchange failed: {} - {}", status, text);
        }

        let token: TokenResponse =
            serde_json::from_str(&text).context("Token exchange returned no access_token")?;
        if token.access_token.trim().is_empty() {
            anyhow::bail!("Token exchange returned an empty access_token");
        }
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config(api_url: &str) -> ClickUpConfig {
        ClickUpConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            api_url: api_url.to_string(),
            authorize_url: "https://app.clickup.com/api".to_string(),
        }
    }

    #[test]
    fn test_authorize_url() {
        let oauth = OAuthClient::new(&config("https://api.clickup.com/api/v2"));
        let url = oauth
            .authorize_url("https://archie.example/api/clickup/callback", "st&ate")
            .unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(parsed.host_str(), Some("app.clickup.com"));
        assert!(pairs.contains(&("client_id".to_string(), "client".to_string())));
        assert!(pairs.contains(&("state".to_string(), "st&ate".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "https://archie.example/api/clickup/callback".to_string()
        )));
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::Json(serde_json::json!({
                "client_id": "client",
                "client_secret": "secret",
                "code": "abc"
            })))
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let oauth = OAuthClient::new(&config(&server.url()));
        assert_eq!(oauth.exchange_code("abc").await.unwrap(), "tok-1");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/oauth/token")
            .with_status(400)
            .with_body(r#"{"err":"Code already used"}"#)
            .create_async()
            .await;

        let oauth = OAuthClient::new(&config(&server.url()));
        let err = oauth.exchange_code("abc").await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
