//! Supabase (PostgREST) profile storage.
//!
//! Expects a `profiles` table:
//!
//! ```sql
//! create table profiles (
//!     user_id text primary key,
//!     clickup_access_token text,
//!     subscription_plan text,
//!     stripe_customer_id text
//! );
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ProfileStore, UserProfile};

/// A row of the `profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileRow {
    user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clickup_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscription_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stripe_customer_id: Option<String>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            clickup_access_token: row.clickup_access_token,
            subscription_plan: row.subscription_plan,
            stripe_customer_id: row.stripe_customer_id,
        }
    }
}

pub struct SupabaseProfileStore {
    client: Client,
    url: String,
    service_role_key: String,
}

impl SupabaseProfileStore {
    pub fn new(url: &str, service_role_key: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        }
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    /// Insert or merge a partial row. Columns absent from `row` are left alone.
    async fn upsert(&self, row: &ProfileRow) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/profiles?on_conflict=user_id", self.rest_url()))
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            anyhow::bail!("Failed to upsert profile: {} - {}", status, text);
        }

        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn get(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        let resp = self
            .client
            .get(format!("{}/profiles", self.rest_url()))
            .query(&[("user_id", format!("eq.{}", user_id)), ("limit", "1".to_string())])
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            anyhow::bail!("Failed to fetch profile: {} - {}", status, text);
        }

        let rows: Vec<ProfileRow> = serde_json::from_str(&text)?;
        Ok(rows.into_iter().next().map(UserProfile::from))
    }

    async fn set_access_token(&self, user_id: &str, token: &str) -> anyhow::Result<()> {
        self.upsert(&ProfileRow {
            user_id: user_id.to_string(),
            clickup_access_token: Some(token.to_string()),
            subscription_plan: None,
            stripe_customer_id: None,
        })
        .await
    }

    async fn set_subscription(
        &self,
        user_id: &str,
        plan: &str,
        customer_id: Option<&str>,
    ) -> anyhow::Result<()> {
        self.upsert(&ProfileRow {
            user_id: user_id.to_string(),
            clickup_access_token: None,
            subscription_plan: Some(plan.to_string()),
            stripe_customer_id: customer_id.map(str::to_string),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use mockito::Server;

    #[tokio::test]
    async fn test_get_profile() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "eq.u1".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .match_header("apikey", "service")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"user_id":"u1","clickup_access_token":"tok","subscription_plan":"pro"}]"#)
            .create_async()
            .await;

        let store = SupabaseProfileStore::new(&server.url(), "service");
        let token = store.access_token("u1").await.unwrap().unwrap();
        assert_eq!(token.expose(), "tok");
    }

    #[tokio::test]
    async fn test_missing_profile() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let store = SupabaseProfileStore::new(&server.url(), "service");
        assert!(store.get("nobody").await.unwrap().is_none());
        assert!(store.access_token("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_access_token_upserts_partial_row() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/rest/v1/profiles")
            .match_query(Matcher::UrlEncoded("on_conflict".into(), "user_id".into()))
            .match_header("prefer", "resolution=merge-duplicates,return=minimal")
            .match_body(Matcher::Json(serde_json::json!({
                "user_id": "u1",
                "clickup_access_token": "tok"
            })))
            .with_status(201)
            .expect(1)
            .create_async()
            .await;

        let store = SupabaseProfileStore::new(&server.url(), "service");
        store.set_access_token("u1", "tok").await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;

        let store = SupabaseProfileStore::new(&server.url(), "wrong");
        let err = store.get("u1").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
