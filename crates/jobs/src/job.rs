use std::time::Duration;

use recipe_bot_core::models::{PrInfo, TaskOutcome};
use serde::{Deserialize, Serialize};

/// A unit of work for the bot worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// Find the latest commit of a pull request and create its lint check run.
    CheckPullRequest { pr: PrInfo, recreate: bool },
    /// Lint the recipes changed at `head_sha`, reporting to the check run.
    Lint { pr: PrInfo, check_run_id: u64, head_sha: String },
    /// Increment the build number of every changed recipe.
    Bump { pr: PrInfo },
    /// Post (or refresh) the comment listing CI build artifacts.
    CollectArtifacts { pr: PrInfo },
    TriggerRebuild { pr: PrInfo },
    /// Upload the pull request's artifacts and merge it. `attempt` starts at 1
    /// and grows each time the merge is deferred.
    Merge { pr: PrInfo, comment_id: u64, user: String, attempt: u32 },
    /// Tell `user` how their request ended.
    PostResult { pr: PrInfo, comment_id: u64, prefix: String, user: String, outcome: TaskOutcome },
}

impl Job {
    pub fn pr(&self) -> &PrInfo {
        match self {
            Self::CheckPullRequest { pr, .. }
            | Self::Lint { pr, .. }
            | Self::Bump { pr }
            | Self::CollectArtifacts { pr }
            | Self::TriggerRebuild { pr }
            | Self::Merge { pr, .. }
            | Self::PostResult { pr, .. } => pr,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckPullRequest { .. } => "check-pull-request",
            Self::Lint { .. } => "lint",
            Self::Bump { .. } => "bump",
            Self::CollectArtifacts { .. } => "collect-artifacts",
            Self::TriggerRebuild { .. } => "trigger-rebuild",
            Self::Merge { .. } => "merge",
            Self::PostResult { .. } => "post-result",
        }
    }
}

/// A job to enqueue once the current one finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub job: Job,
    /// Wait this long before enqueueing.
    pub delay: Option<Duration>,
}

impl FollowUp {
    pub fn now(job: Job) -> Self { Self { job, delay: None } }

    pub fn after(job: Job, delay: Duration) -> Self { Self { job, delay: Some(delay) } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_encoding() {
        let pr = PrInfo {
            installation: None,
            user: "bioconda".to_string(),
            repo: "bioconda-recipes".to_string(),
            git_ref: None,
            issue_number: 5,
        };
        let job = Job::Merge { pr, comment_id: 9, user: "alice".to_string(), attempt: 1 };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "merge");
        assert_eq!(value["pr"]["issue_number"], 5);
        let decoded: Job = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.name(), "merge");
        assert_eq!(decoded.pr().issue_number, 5);
    }
}
