use anyhow::{Context, Result};
use recipe_bot_core::{artifacts::ArtifactSet, models::ci_path};
use recipe_bot_github::{HostApi, models::PullRequest};

use crate::{services::Services, templates::render_artifacts};

/// Where the CI provider builds a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiTarget {
    pub path: String,
    pub sha: String,
}

impl CiTarget {
    pub fn for_pull_request(pr: &PullRequest, home_owner: &str) -> Self {
        let head_owner = pr.head_owner().unwrap_or_default();
        Self {
            path: ci_path(head_owner, &pr.head.ref_field, home_owner, pr.number),
            sha: pr.head.sha.clone(),
        }
    }

    pub async fn resolve(host: &dyn HostApi, number: u64) -> Result<(Self, PullRequest)> {
        let pr = host
            .get_pull_request(number)
            .await
            .with_context(|| format!("Failed to fetch pull request #{number}"))?;
        Ok((Self::for_pull_request(&pr, host.owner()), pr))
    }
}

/// Post the list of CI build artifacts, refreshing an earlier listing in place.
pub async fn collect_artifacts(services: &Services<'_>, number: u64) -> Result<()> {
    let host = services.host;
    tracing::info!("Starting check for artifacts on #{}", number);
    let (target, _) = CiTarget::resolve(host, number).await?;
    let artifacts = services
        .ci
        .artifacts(&target.path, &target.sha)
        .await
        .with_context(|| format!("Failed to fetch artifacts for {}", target.path))?;
    let set = ArtifactSet::from_urls(artifacts.iter().map(|a| a.url.as_str()));
    let body = render_artifacts(&set)?;

    let head = body.split('\n').next().unwrap_or_default();
    let comments = host.comments(number).await.context("Failed to list comments")?;
    let existing = comments
        .iter()
        .find(|c| c.body.as_deref().is_some_and(|b| b.starts_with(head)));
    match existing {
        Some(comment) => {
            host.update_comment(comment.id, &body).await.context("Failed to update comment")?;
            tracing::info!("Updated artifact comment {} on #{}", comment.id, number);
        }
        None => {
            let id = host.create_comment(number, &body).await.context("Failed to create comment")?;
            tracing::info!("Created artifact comment {} on #{}", id, number);
        }
    }
    Ok(())
}

/// Ask the CI provider to build a pull request again.
pub async fn trigger_rebuild(services: &Services<'_>, number: u64) -> Result<()> {
    tracing::info!("Triggering rebuild of #{}", number);
    let (target, _) = CiTarget::resolve(services.host, number).await?;
    let response = services
        .ci
        .trigger_rebuild(&target.path, &target.sha)
        .await
        .with_context(|| format!("Failed to trigger rebuild of {}", target.path))?;
    tracing::warn!("Trigger rebuild call returned with {}", response);
    Ok(())
}
