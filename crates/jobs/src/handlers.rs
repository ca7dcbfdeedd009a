use anyhow::{Context, Result};
use apalis::prelude::*;
use recipe_bot_ci::CircleCi;
use recipe_bot_upload::RetryPolicy;

use crate::{
    JobContext,
    job::{FollowUp, Job},
    jobs::{self, MERGE_RETRY_DELAY, MergeStep},
    services::Services,
};

/// Prefix used when reporting the outcome of a merge request.
pub const MERGE_PREFIX: &str = "merge";

/// Run one job against `services`. Returns the job to enqueue next, if any.
pub async fn run_job(job: Job, services: &Services<'_>) -> Result<Option<FollowUp>> {
    match job {
        Job::CheckPullRequest { pr, recreate } => {
            let sha = jobs::fetch_latest_commit(services.host, pr.issue_number).await?;
            jobs::create_check_run(services.host, sha.as_deref(), recreate).await?;
            Ok(None)
        }
        Job::Lint { check_run_id, head_sha, .. } => {
            jobs::lint(services, check_run_id, &head_sha).await?;
            Ok(None)
        }
        Job::Bump { pr } => {
            jobs::bump(services, pr.issue_number).await?;
            Ok(None)
        }
        Job::CollectArtifacts { pr } => {
            jobs::collect_artifacts(services, pr.issue_number).await?;
            Ok(None)
        }
        Job::TriggerRebuild { pr } => {
            jobs::trigger_rebuild(services, pr.issue_number).await?;
            Ok(None)
        }
        Job::Merge { pr, comment_id, user, attempt } => {
            match jobs::merge(services, pr.issue_number, comment_id, attempt).await? {
                MergeStep::Deferred => {
                    let job = Job::Merge { pr, comment_id, user, attempt: attempt + 1 };
                    Ok(Some(FollowUp::after(job, MERGE_RETRY_DELAY)))
                }
                MergeStep::Done(outcome) => Ok(Some(FollowUp::now(Job::PostResult {
                    pr,
                    comment_id,
                    prefix: MERGE_PREFIX.to_string(),
                    user,
                    outcome,
                }))),
            }
        }
        Job::PostResult { pr, user, prefix, outcome, .. } => {
            jobs::post_result(services.host, pr.issue_number, &user, &prefix, &outcome).await?;
            Ok(None)
        }
    }
}

/// Worker entry point: bind collaborators to the job's repository, run it
/// and enqueue whatever follows.
pub async fn process_job(job: Job, ctx: Data<JobContext>) -> Result<()> {
    let pr = job.pr().clone();
    tracing::info!("Processing {} job for {}#{}", job.name(), pr.full_name(), pr.issue_number);

    let host = ctx.github.host_for(&pr).await.context("Failed to get GitHub client")?;
    let ci = CircleCi::new(ctx.http.clone(), &ctx.config.ci, &pr.user, &pr.repo)?;
    let services = Services {
        host: &host,
        ci: &ci,
        git: ctx.git.clone(),
        uploader: ctx.uploader.as_ref(),
        linter: ctx.linter.as_ref(),
        token: &ctx.config.github.token,
        identity: &ctx.config.github.bot,
        upload_policy: RetryPolicy::from(&ctx.config.uploads),
        image_namespace: &ctx.config.uploads.image_namespace,
    };
    let name = job.name();
    let next = run_job(job, &services)
        .await
        .with_context(|| format!("{} job for {}#{} failed", name, pr.full_name(), pr.issue_number))?;
    if let Some(next) = next {
        ctx.enqueue(next).await?;
    }
    Ok(())
}
