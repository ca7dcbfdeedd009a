//! Helpers over octocrab's webhook events.

use octocrab::models::webhook_events::{EventInstallation, WebhookEvent};
use recipe_bot_core::models::PrInfo;
use serde::Deserialize;

/// Repository and installation an event was delivered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub owner: String,
    pub repo: String,
    pub installation: Option<u64>,
}

impl EventSource {
    /// `None` for events not tied to a repository, such as `ping` from an app hook.
    pub fn from_event(event: &WebhookEvent) -> Option<Self> {
        let repository = event.repository.as_ref()?;
        let owner = repository.owner.as_ref()?.login.clone();
        let installation = match &event.installation {
            Some(EventInstallation::Full(installation)) => Some(installation.id.into_inner()),
            Some(EventInstallation::Minimal(installation)) => Some(installation.id.into_inner()),
            None => None,
        };
        Some(Self { owner, repo: repository.name.clone(), installation })
    }

    pub fn full_name(&self) -> String { format!("{}/{}", self.owner, self.repo) }

    pub fn pr_info(&self, number: u64, git_ref: Option<String>) -> PrInfo {
        PrInfo {
            installation: self.installation,
            user: self.owner.clone(),
            repo: self.repo.clone(),
            git_ref,
            issue_number: number,
        }
    }
}

/// The fields of a `check_run` payload the bot reads. octocrab leaves the
/// run itself as raw JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunPayload {
    pub id: u64,
    pub name: String,
    pub head_sha: String,
    pub app: Option<CheckRunApp>,
    #[serde(default)]
    pub pull_requests: Vec<CheckRunPullRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunApp {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunPullRequest {
    pub number: u64,
}
