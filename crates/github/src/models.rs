//! Subset of the GitHub REST payloads the bot reads and writes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Login {
    pub login: String,
}

impl From<&str> for Login {
    fn from(value: &str) -> Self { Self { login: value.to_string() } }
}

impl From<String> for Login {
    fn from(login: String) -> Self { Self { login } }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullRequest {
    pub number: u64,
    pub user: Login,
    pub head: PullHead,
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub mergeable_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullHead {
    #[serde(rename = "ref")]
    pub ref_field: String,
    pub sha: String,
    pub user: Option<Login>,
    /// Missing when the fork was deleted.
    pub repo: Option<HeadRepo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeadRepo {
    pub name: String,
    pub owner: Login,
}

impl PullRequest {
    /// Owner of the repository the head branch lives in.
    pub fn head_owner(&self) -> Option<&str> {
        self.head.repo.as_ref().map(|r| r.owner.login.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullCommit {
    pub sha: String,
    /// GitHub account of the author, absent for unlinked emails.
    pub author: Option<Login>,
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommitDetail {
    /// Git author of the commit, absent when GitHub could not parse it.
    pub author: Option<GitAuthor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitAuthor {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
    Queued,
    InProgress,
    Completed,
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunConclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub status: CheckRunStatus,
    pub conclusion: Option<CheckRunConclusion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationLevel {
    Notice,
    Warning,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub path: String,
    pub start_line: u64,
    pub end_line: u64,
    pub annotation_level: AnnotationLevel,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckRunOutput {
    pub title: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub annotations: Vec<Annotation>,
}

/// A change to an existing check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunUpdate {
    pub status: CheckRunStatus,
    pub conclusion: Option<CheckRunConclusion>,
    pub output: Option<CheckRunOutput>,
}

impl CheckRunUpdate {
    pub fn in_progress() -> Self {
        Self { status: CheckRunStatus::InProgress, conclusion: None, output: None }
    }

    pub fn completed(conclusion: CheckRunConclusion, output: CheckRunOutput) -> Self {
        Self { status: CheckRunStatus::Completed, conclusion: Some(conclusion), output: Some(output) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

/// Outcome of a merge request against the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub merged: bool,
    pub message: String,
}

/// Whether branch protections allow merging. `state` is `None` while GitHub
/// is still computing mergeability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protection {
    pub state: Option<bool>,
    pub message: String,
}

impl Protection {
    pub fn pending(message: impl Into<String>) -> Self {
        Self { state: None, message: message.into() }
    }

    pub fn allowed(message: impl Into<String>) -> Self {
        Self { state: Some(true), message: message.into() }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self { state: Some(false), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_owner() {
        let mut pr = PullRequest {
            number: 42,
            user: "alice".into(),
            head: PullHead {
                ref_field: "patch-1".to_string(),
                sha: "abc123".to_string(),
                user: Some("alice".into()),
                repo: Some(HeadRepo {
                    name: "bioconda-recipes".to_string(),
                    owner: String::from("alice").into(),
                }),
            },
            mergeable: None,
            mergeable_state: None,
        };
        assert_eq!(pr.head_owner(), Some("alice"));
        // Deleted fork
        pr.head.repo = None;
        assert_eq!(pr.head_owner(), None);
    }

    #[test]
    fn test_check_run_status() {
        let run: CheckRun = serde_json::from_str(
            r#"{"id": 1, "name": "Linting Recipe(s)", "status": "waiting", "conclusion": null}"#,
        )
        .unwrap();
        assert_eq!(run.status, CheckRunStatus::Pending);
        assert_eq!(serde_json::to_string(&CheckRunStatus::InProgress).unwrap(), "\"in_progress\"");
    }
}
