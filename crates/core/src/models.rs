use serde::{Deserialize, Serialize};

/// Identifies the pull request a task operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrInfo {
    /// GitHub App installation that received the event, if any.
    pub installation: Option<u64>,
    /// Owner of the home repository.
    pub user: String,
    /// Name of the home repository.
    pub repo: String,
    /// Head ref or SHA, when the triggering event carried one.
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub issue_number: u64,
}

impl PrInfo {
    pub fn full_name(&self) -> String { format!("{}/{}", self.user, self.repo) }
}

/// Result of a task that ends in a user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub message: String,
}

impl TaskOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Path under which the CI provider files builds of a pull request.
///
/// Branches pushed to the home repository build under their own name, fork
/// branches build under `pull/<number>`.
pub fn ci_path(head_owner: &str, head_ref: &str, home_user: &str, number: u64) -> String {
    if head_owner == home_user { head_ref.to_string() } else { format!("pull/{number}") }
}

/// Shortens full commit SHAs for display.
pub fn short_ref(git_ref: &str) -> &str {
    if git_ref.len() >= 40 { git_ref.get(..8).unwrap_or(git_ref) } else { git_ref }
}
