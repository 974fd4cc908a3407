//! User profiles: the ClickUp credential and subscription state per user.
//!
//! Two backends implement [`ProfileStore`]:
//! - [`FileProfileStore`] keeps profiles in `{working_dir}/.archie/profiles.json`
//! - [`SupabaseProfileStore`] keeps them in a PostgREST `profiles` table

mod file;
mod supabase;

pub use file::FileProfileStore;
pub use supabase::SupabaseProfileStore;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque access token for the workspace API.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Stored state for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clickup_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
}

impl UserProfile {
    pub fn credential(&self) -> Option<Credential> {
        self.clickup_access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(Credential::new)
    }

    /// Plan name shown to the user; users without a plan are on `free`.
    pub fn plan(&self) -> &str {
        self.subscription_plan.as_deref().unwrap_or("free")
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>>;

    async fn set_access_token(&self, user_id: &str, token: &str) -> anyhow::Result<()>;

    async fn set_subscription(
        &self,
        user_id: &str,
        plan: &str,
        customer_id: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Resolve the workspace credential for a user.
    ///
    /// `Ok(None)` means the user has not connected ClickUp.
    async fn access_token(&self, user_id: &str) -> anyhow::Result<Option<Credential>> {
        Ok(self.get(user_id).await?.and_then(|p| p.credential()))
    }
}

pub type SharedProfileStore = Arc<dyn ProfileStore>;
