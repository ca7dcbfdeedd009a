use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::StatusCode;
use octocrab::{
    GitHubError, Octocrab,
    models::{CommentId, pulls::ReviewState, repos::RepoCommit},
    params::pulls::MergeMethod,
};
use serde::{Deserialize, Serialize};

use crate::models::{
    Annotation, CheckRun, CheckRunConclusion, CheckRunStatus, CheckRunUpdate, Comment,
    CommitDetail, GitAuthor, HeadRepo, Login, MergeResult, Protection, PullCommit, PullHead,
    PullRequest,
};

/// GitHub accepts at most this many annotations per check run request.
const MAX_ANNOTATIONS: usize = 50;

const PER_PAGE: u8 = 100;

/// Operations the bot performs against the repository host.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Owner of the home repository.
    fn owner(&self) -> &str;

    /// Name of the home repository.
    fn repo(&self) -> &str;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    /// Commits of a pull request, oldest first.
    async fn pull_request_commits(&self, number: u64) -> Result<Vec<PullCommit>>;

    async fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>>;

    async fn create_check_run(&self, name: &str, sha: &str) -> Result<u64>;

    async fn update_check_run(&self, id: u64, update: CheckRunUpdate) -> Result<()>;

    async fn comments(&self, number: u64) -> Result<Vec<Comment>>;

    async fn create_comment(&self, number: u64, body: &str) -> Result<u64>;

    async fn update_comment(&self, id: u64, body: &str) -> Result<()>;

    async fn merge_pull_request(
        &self,
        number: u64,
        sha: &str,
        message: Option<&str>,
    ) -> Result<MergeResult>;

    async fn check_protections(&self, number: u64, sha: &str) -> Result<Protection>;
}

/// [`HostApi`] backed by the GitHub REST API.
#[derive(Clone)]
pub struct GitHubHost {
    client: Octocrab,
    owner: String,
    repo: String,
}

#[derive(Serialize)]
struct PageParams {
    per_page: u8,
    page: u32,
}

#[derive(Deserialize)]
struct CheckRunList {
    total_count: usize,
    check_runs: Vec<CheckRun>,
}

#[derive(Serialize)]
struct CheckRunPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<CheckRunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conclusion: Option<CheckRunConclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<OutputPatch<'a>>,
}

#[derive(Serialize)]
struct OutputPatch<'a> {
    title: &'a str,
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    annotations: &'a [Annotation],
}

fn pull_request(pull: octocrab::models::pulls::PullRequest) -> PullRequest {
    let head = *pull.head;
    PullRequest {
        number: pull.number,
        user: Login::from(pull.user.map(|u| u.login).unwrap_or_default()),
        head: PullHead {
            ref_field: head.ref_field,
            sha: head.sha,
            user: head.user.map(|u| Login::from(u.login)),
            repo: head
                .repo
                .and_then(|r| Some(HeadRepo { name: r.name, owner: Login::from(r.owner?.login) })),
        },
        mergeable: pull.mergeable,
        // Kept as the wire string so unknown states pass through
        mergeable_state: pull.mergeable_state.and_then(|state| match serde_json::to_value(state) {
            Ok(serde_json::Value::String(state)) => Some(state),
            _ => None,
        }),
    }
}

fn pull_commit(commit: RepoCommit) -> PullCommit {
    PullCommit {
        sha: commit.sha,
        author: commit.author.map(|a| Login::from(a.login)),
        commit: CommitDetail {
            author: commit
                .commit
                .author
                .map(|a| GitAuthor { name: a.name, email: a.email }),
        },
    }
}

/// Why reviews block a merge, if they do. Only the latest review of each
/// reviewer counts, and plain comments never replace an earlier verdict.
fn review_verdict(reviews: impl IntoIterator<Item = (String, ReviewState)>) -> Option<&'static str> {
    let mut latest = HashMap::new();
    for (login, state) in reviews {
        if matches!(state, ReviewState::Commented | ReviewState::Pending) {
            continue;
        }
        latest.insert(login, state);
    }
    if latest.values().any(|s| matches!(s, ReviewState::ChangesRequested)) {
        return Some("Changes have been requested by a reviewer");
    }
    if !latest.values().any(|s| matches!(s, ReviewState::Approved)) {
        return Some("PR has not been approved");
    }
    None
}

impl GitHubHost {
    pub fn new(client: Octocrab, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self { client, owner: owner.into(), repo: repo.into() }
    }

    fn route(&self, path: &str) -> String { format!("/repos/{}/{}/{}", self.owner, self.repo, path) }

    async fn reviews_ok(&self, number: u64) -> Result<Option<&'static str>> {
        let page = self
            .client
            .pulls(&self.owner, &self.repo)
            .list_reviews(number)
            .per_page(PER_PAGE)
            .send()
            .await
            .with_context(|| format!("Failed to fetch reviews of #{number}"))?;
        let reviews = self.client.all_pages(page).await.context("Failed to fetch reviews")?;
        Ok(review_verdict(reviews.into_iter().filter_map(|r| Some((r.user?.login, r.state?)))))
    }
}

#[async_trait]
impl HostApi for GitHubHost {
    fn owner(&self) -> &str { &self.owner }

    fn repo(&self) -> &str { &self.repo }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let pull = self
            .client
            .pulls(&self.owner, &self.repo)
            .get(number)
            .await
            .with_context(|| format!("Failed to fetch pull request #{number}"))?;
        Ok(pull_request(pull))
    }

    async fn pull_request_commits(&self, number: u64) -> Result<Vec<PullCommit>> {
        let page = self
            .client
            .pulls(&self.owner, &self.repo)
            .pr_commits(number)
            .per_page(PER_PAGE)
            .send()
            .await
            .with_context(|| format!("Failed to fetch commits of #{number}"))?;
        let commits = self.client.all_pages(page).await.context("Failed to fetch commits")?;
        Ok(commits.into_iter().map(pull_commit).collect())
    }

    /// Listed through the raw route: octocrab's check run model has no `status`.
    async fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        let route = self.route(&format!("commits/{sha}/check-runs"));
        let mut runs = Vec::new();
        for page in 1u32.. {
            let list: CheckRunList = self
                .client
                .get(&route, Some(&PageParams { per_page: PER_PAGE, page }))
                .await
                .with_context(|| format!("Failed to fetch check runs for {sha} page {page}"))?;
            let done = list.check_runs.is_empty();
            runs.extend(list.check_runs);
            if done || runs.len() >= list.total_count {
                break;
            }
        }
        Ok(runs)
    }

    async fn create_check_run(&self, name: &str, sha: &str) -> Result<u64> {
        let run = self
            .client
            .checks(&self.owner, &self.repo)
            .create_check_run(name, sha)
            .status(octocrab::params::checks::CheckRunStatus::Queued)
            .send()
            .await
            .with_context(|| format!("Failed to create check run for {sha}"))?;
        Ok(run.id.into_inner())
    }

    /// Raw route, so annotations can go out in batches.
    async fn update_check_run(&self, id: u64, update: CheckRunUpdate) -> Result<()> {
        let route = self.route(&format!("check-runs/{id}"));
        let output = update.output.as_ref();
        let mut chunks = output.map(|o| o.annotations.chunks(MAX_ANNOTATIONS)).into_iter().flatten();
        let first = chunks.next().unwrap_or(&[]);
        let patch = CheckRunPatch {
            status: Some(update.status),
            conclusion: update.conclusion,
            output: output.map(|o| OutputPatch {
                title: &o.title,
                summary: &o.summary,
                text: o.text.as_deref(),
                annotations: first,
            }),
        };
        let _: serde_json::Value = self
            .client
            .patch(&route, Some(&patch))
            .await
            .with_context(|| format!("Failed to update check run {id}"))?;
        // Remaining annotations are appended in further requests
        if let Some(output) = output {
            for chunk in chunks {
                let patch = CheckRunPatch {
                    status: None,
                    conclusion: None,
                    output: Some(OutputPatch {
                        title: &output.title,
                        summary: &output.summary,
                        text: None,
                        annotations: chunk,
                    }),
                };
                let _: serde_json::Value = self
                    .client
                    .patch(&route, Some(&patch))
                    .await
                    .with_context(|| format!("Failed to add annotations to check run {id}"))?;
            }
        }
        Ok(())
    }

    async fn comments(&self, number: u64) -> Result<Vec<Comment>> {
        let page = self
            .client
            .issues(&self.owner, &self.repo)
            .list_comments(number)
            .per_page(PER_PAGE)
            .send()
            .await
            .with_context(|| format!("Failed to fetch comments of #{number}"))?;
        let comments = self.client.all_pages(page).await.context("Failed to fetch comments")?;
        Ok(comments.into_iter().map(|c| Comment { id: c.id.into_inner(), body: c.body }).collect())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<u64> {
        let comment = self
            .client
            .issues(&self.owner, &self.repo)
            .create_comment(number, body)
            .await
            .with_context(|| format!("Failed to comment on #{number}"))?;
        Ok(comment.id.into_inner())
    }

    async fn update_comment(&self, id: u64, body: &str) -> Result<()> {
        self.client
            .issues(&self.owner, &self.repo)
            .update_comment(CommentId(id), body)
            .await
            .with_context(|| format!("Failed to update comment {id}"))?;
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        number: u64,
        sha: &str,
        message: Option<&str>,
    ) -> Result<MergeResult> {
        let pulls = self.client.pulls(&self.owner, &self.repo);
        let mut merge = pulls.merge(number).method(MergeMethod::Squash).sha(sha);
        if let Some(message) = message {
            merge = merge.message(message);
        }
        match merge.send().await {
            Ok(merge) => {
                Ok(MergeResult { merged: merge.merged, message: merge.message.unwrap_or_default() })
            }
            // 405 (not mergeable) and 409 (head moved) carry a readable reason
            Err(octocrab::Error::GitHub { source, .. })
                if matches!(
                    source.status_code,
                    StatusCode::METHOD_NOT_ALLOWED | StatusCode::CONFLICT
                ) =>
            {
                let GitHubError { message, .. } = *source;
                Ok(MergeResult { merged: false, message })
            }
            Err(e) => Err(e).with_context(|| format!("Failed to merge #{number}")),
        }
    }

    async fn check_protections(&self, number: u64, sha: &str) -> Result<Protection> {
        let pr = self.get_pull_request(number).await?;
        if pr.head.sha != sha {
            return Ok(Protection::denied("PR head changed, please retry"));
        }
        match (pr.mergeable, pr.mergeable_state.as_deref()) {
            (None, _) | (_, Some("unknown")) => {
                return Ok(Protection::pending("Mergeability is still being computed"));
            }
            (Some(false), _) | (_, Some("dirty")) => {
                return Ok(Protection::denied("PR has merge conflicts"));
            }
            _ => {}
        }
        if let Some(reason) = self.reviews_ok(number).await? {
            return Ok(Protection::denied(reason));
        }
        let runs = self.check_runs(sha).await?;
        if runs.iter().any(|r| r.status != CheckRunStatus::Completed) {
            return Ok(Protection::denied("Some checks are still running"));
        }
        let failed = runs
            .iter()
            .filter(|r| {
                !matches!(
                    r.conclusion,
                    Some(
                        CheckRunConclusion::Success
                            | CheckRunConclusion::Neutral
                            | CheckRunConclusion::Skipped
                    )
                )
            })
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>();
        if !failed.is_empty() {
            return Ok(Protection::denied(format!("Checks failed: {}", failed.join(", "))));
        }
        Ok(Protection::allowed("All checks passed"))
    }
}
