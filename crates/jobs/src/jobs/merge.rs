//! Upload & Merge.
//!
//! Uploads every package and image a pull request built on CI, then squash
//! merges it. Progress is reported by rewriting the comment that queued the
//! request.

use std::{collections::BTreeMap, time::Duration};

use anyhow::{Context, Result};
use recipe_bot_ci::Download;
use recipe_bot_core::{artifacts::ArtifactSet, models::TaskOutcome, util::join_normalized};
use recipe_bot_github::models::PullCommit;
use recipe_bot_upload::{upload_image_with_retry, upload_package_with_retry};

use crate::{jobs::artifacts::CiTarget, progress::Progress, services::Services};

/// Protection checks before giving up on a pull request that is still being
/// evaluated by GitHub.
pub const MAX_MERGE_ATTEMPTS: u32 = 15;
/// Wait between protection checks.
pub const MERGE_RETRY_DELAY: Duration = Duration::from_secs(20);

const STARTED: &str = "Upload & Merge started. Reload page to view progress.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStep {
    /// Protections are not settled yet; run again after [`MERGE_RETRY_DELAY`].
    Deferred,
    Done(TaskOutcome),
}

/// Co-authors credited in the merge commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoAuthors {
    /// `Co-authored-by:` trailers.
    pub trailers: Vec<String>,
    /// `@login`, or the display name for authors without an account.
    pub handles: Vec<String>,
}

/// Collect everyone other than `pr_author` who authored one of `commits`.
/// Authors are deduplicated by login, or by name when they have none.
pub fn co_authors(pr_author: &str, commits: &[PullCommit]) -> CoAuthors {
    let mut seen = BTreeMap::new();
    for commit in commits {
        let login = commit.author.as_ref().map(|a| a.login.as_str());
        if login == Some(pr_author) {
            continue;
        }
        let Some(author) = &commit.commit.author else {
            continue;
        };
        let handle = match login {
            Some(login) => format!("@{login}"),
            None => author.name.clone(),
        };
        seen.entry(handle)
            .or_insert_with(|| format!("Co-authored-by: {} <{}>", author.name, author.email));
    }
    let trailers = seen.values().cloned().collect();
    CoAuthors { trailers, handles: seen.into_keys().collect() }
}

/// Squash commit message listing what was uploaded.
pub fn merge_message(uploaded: &[String], co_authors: &CoAuthors) -> String {
    let mut lines = vec![String::new(), "Package uploads complete: [ci skip]".to_string()];
    lines.extend(uploaded.iter().map(|item| format!(" - {item}")));
    lines.push(String::new());
    lines.extend(co_authors.trailers.iter().cloned());
    lines.join("\n")
}

/// Upload a pull request's build artifacts and merge it. `attempt` counts
/// protection checks so far, starting at 1.
pub async fn merge(
    services: &Services<'_>,
    number: u64,
    comment_id: u64,
    attempt: u32,
) -> Result<MergeStep> {
    let host = services.host;
    let (target, pr) = CiTarget::resolve(host, number).await?;
    let protection = host
        .check_protections(number, &pr.head.sha)
        .await
        .context("Failed to check merge protections")?;
    match protection.state {
        None if attempt >= MAX_MERGE_ATTEMPTS => {
            tracing::warn!("#{} still not mergeable after {} attempts", number, attempt);
            return Ok(MergeStep::Done(TaskOutcome::failed(
                "PR cannot be merged at this time. Please try again later",
            )));
        }
        None => {
            tracing::info!("Protections of #{} not settled (attempt {}), deferring", number, attempt);
            return Ok(MergeStep::Deferred);
        }
        Some(false) => return Ok(MergeStep::Done(TaskOutcome::failed(protection.message))),
        Some(true) => {}
    }

    let mut progress = Progress::new(comment_id, STARTED);
    progress.check("Checks OK");
    progress.publish(host).await?;

    let artifacts = services
        .ci
        .artifacts(&target.path, &target.sha)
        .await
        .with_context(|| format!("Failed to fetch artifacts for {}", target.path))?;
    let set = ArtifactSet::from_urls(artifacts.iter().map(|a| a.url.as_str()));
    if set.is_empty() {
        return Ok(MergeStep::Done(TaskOutcome::failed("PR did not build any packages.")));
    }
    progress.check(format!(
        "Fetching {} packages and {} images",
        set.packages.len(),
        set.images.len()
    ));
    progress.publish(host).await?;

    let uploaded = match upload_artifacts(services, &set, &mut progress).await? {
        Ok(uploaded) => uploaded,
        Err(outcome) => return Ok(MergeStep::Done(outcome)),
    };

    let commits = host
        .pull_request_commits(number)
        .await
        .with_context(|| format!("Failed to list commits of #{number}"))?;
    let last_sha = commits.last().map_or(pr.head.sha.as_str(), |c| c.sha.as_str());
    let authors = co_authors(&pr.user.login, &commits);
    if authors.handles.is_empty() {
        progress.note("Creating squash merge");
    } else {
        progress.note(format!(
            "Creating squash merge (with co-authors {})",
            authors.handles.join(", ")
        ));
    }
    progress.publish(host).await?;

    let message = merge_message(&uploaded, &authors);
    let result = host
        .merge_pull_request(number, last_sha, Some(&message))
        .await
        .with_context(|| format!("Failed to merge #{number}"))?;
    tracing::info!("Merge of #{} returned {}: {}", number, result.merged, result.message);
    Ok(MergeStep::Done(TaskOutcome { success: result.merged, message: result.message }))
}

/// Download everything into a scratch directory and upload images, then
/// packages. The inner error is the outcome to report.
async fn upload_artifacts(
    services: &Services<'_>,
    set: &ArtifactSet,
    progress: &mut Progress,
) -> Result<Result<Vec<String>, TaskOutcome>> {
    let scratch = tempfile::Builder::new()
        .prefix("recipe-bot-merge-")
        .tempdir()
        .context("Failed to create scratch directory")?;
    let root = scratch.path();
    let downloads = set
        .packages
        .iter()
        .map(|p| (&p.url, p.local_path()))
        .chain(set.images.iter().map(|i| (&i.url, i.local_path())))
        .map(|(url, path)| Download { url: url.clone(), dest: join_normalized(root, path) })
        .collect::<Vec<_>>();
    tracing::info!(
        "Downloading {}",
        downloads.iter().map(|d| d.url.as_str()).collect::<Vec<_>>().join(", ")
    );
    if let Err(e) = services.ci.download(&downloads).await {
        tracing::error!("Failed to download archives: {}", e);
        return Ok(Err(TaskOutcome::failed("Failed to download archives. Please try again later")));
    }

    let host = services.host;
    let policy = services.upload_policy;
    let mut uploaded = Vec::new();
    for image in &set.images {
        let destination = format!("{}/{}", services.image_namespace, image.reference());
        let file = join_normalized(root, image.local_path());
        if let Err(e) =
            upload_image_with_retry(services.uploader, policy, &file, &destination).await
        {
            return Ok(Err(TaskOutcome::failed(e.to_string())));
        }
        progress.check(format!("Uploaded image {destination}"));
        progress.publish(host).await?;
        uploaded.push(destination);
    }
    for package in &set.packages {
        let path = package.local_path();
        let file = join_normalized(root, &path);
        if let Err(e) = upload_package_with_retry(services.uploader, policy, &file).await {
            return Ok(Err(TaskOutcome::failed(e.to_string())));
        }
        progress.check(format!("Uploaded package {path}"));
        progress.publish(host).await?;
        uploaded.push(path);
    }
    if let Err(e) = scratch.close() {
        tracing::warn!("Failed to remove scratch directory: {}", e);
    }
    Ok(Ok(uploaded))
}
