//! Profile storage on local disk.
//!
//! Persists profiles to `{working_dir}/.archie/profiles.json`, keyed by user id.
//! The whole map is cached in memory and written through on every change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ProfileStore, UserProfile};

#[derive(Debug)]
pub struct FileProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
    storage_path: PathBuf,
}

impl FileProfileStore {
    /// Create a store, loading existing profiles from disk if present.
    ///
    /// An unreadable or corrupt file is an error, not an empty store.
    pub async fn new(working_dir: &Path) -> anyhow::Result<Self> {
        let storage_path = working_dir.join(".archie").join("profiles.json");

        let profiles = if storage_path.exists() {
            let contents = tokio::fs::read_to_string(&storage_path)
                .await
                .with_context(|| format!("Failed to read {}", storage_path.display()))?;
            let profiles: HashMap<String, UserProfile> = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", storage_path.display()))?;
            tracing::info!(
                "Loaded {} profiles from {}",
                profiles.len(),
                storage_path.display()
            );
            profiles
        } else {
            tracing::info!(
                "No profile file at {}, starting empty",
                storage_path.display()
            );
            HashMap::new()
        };

        Ok(Self {
            profiles: RwLock::new(profiles),
            storage_path,
        })
    }

    async fn save_to_disk(&self, profiles: &HashMap<String, UserProfile>) -> anyhow::Result<()> {
        if let Some(parent) = self.storage_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(profiles)?;
        // Atomic replace via sibling file.
        let tmp = self.storage_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.storage_path).await?;
        tracing::debug!("Saved profiles to {}", self.storage_path.display());
        Ok(())
    }

    async fn update<F>(&self, user_id: &str, apply: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut UserProfile) + Send,
    {
        let mut profiles = self.profiles.write().await;
        apply(profiles.entry(user_id.to_string()).or_default());
        self.save_to_disk(&profiles).await
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn get(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn set_access_token(&self, user_id: &str, token: &str) -> anyhow::Result<()> {
        let token = token.to_string();
        self.update(user_id, move |p| p.clickup_access_token = Some(token))
            .await
    }

    async fn set_subscription(
        &self,
        user_id: &str,
        plan: &str,
        customer_id: Option<&str>,
    ) -> anyhow::Result<()> {
        let plan = plan.to_string();
        let customer_id = customer_id.map(str::to_string);
        self.update(user_id, move |p| {
            p.subscription_plan = Some(plan);
            if customer_id.is_some() {
                p.stripe_customer_id = customer_id;
            }
        })
        .await
    }
}
