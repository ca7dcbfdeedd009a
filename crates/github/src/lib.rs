pub mod events;
pub mod host;
pub mod models;
pub mod webhook;

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use anyhow::{Context, Result};
pub use host::{GitHubHost, HostApi};
use octocrab::{Octocrab, models::InstallationId};
use recipe_bot_core::{config::GitHubConfig, models::PrInfo};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    pub installations: Option<Arc<Mutex<Installations>>>,
}

pub struct Installations {
    pub app_client: Octocrab,
    pub clients: HashMap<InstallationId, Octocrab>,
}

impl Installations {
    pub fn client_for_installation(&mut self, installation_id: InstallationId) -> Result<Octocrab> {
        match self.clients.entry(installation_id) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                // Create a new client for the installation
                let client = self.app_client.installation(installation_id)?;
                entry.insert(client.clone());
                Ok(client)
            }
        }
    }
}

impl GitHub {
    pub async fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let client = Octocrab::builder()
            .personal_token(config.token.clone())
            .build()
            .context("Failed to create GitHub client")?;
        let profile = client.current().user().await.context("Failed to fetch current user")?;
        tracing::info!("Logged in as {}", profile.login);
        if profile.login != config.bot.login {
            tracing::warn!(
                "Token belongs to {}, but the bot is configured as {}",
                profile.login,
                config.bot.login
            );
        }

        let installations = if let Some(app_config) = &config.app {
            let app_client = Octocrab::builder()
                .app(
                    app_config.id.into(),
                    jsonwebtoken::EncodingKey::from_rsa_pem(app_config.private_key.as_bytes())?,
                )
                .build()
                .context("Failed to create GitHub app client")?;
            tracing::info!("Using GitHub app {}", app_config.id);
            Some(Arc::new(Mutex::new(Installations { app_client, clients: HashMap::new() })))
        } else {
            None
        };
        Ok(Arc::new(Self { client, installations }))
    }

    /// Client acting as the given installation, or the token client without one.
    pub async fn client_for(&self, installation: Option<u64>) -> Result<Octocrab> {
        if let (Some(installation_id), Some(installations)) = (installation, &self.installations) {
            let mut installations = installations.lock().await;
            return installations
                .client_for_installation(InstallationId(installation_id))
                .with_context(|| format!("Failed to get client for installation {installation_id}"));
        }
        Ok(self.client.clone())
    }

    pub async fn host_for(&self, pr: &PrInfo) -> Result<GitHubHost> {
        let client = self.client_for(pr.installation).await?;
        Ok(GitHubHost::new(client, &pr.user, &pr.repo))
    }
}
