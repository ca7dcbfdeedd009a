use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use octocrab::models::webhook_events::{
    WebhookEventPayload,
    payload::{
        CheckRunWebhookEventAction, IssueCommentWebhookEventAction, PullRequestWebhookEventAction,
    },
};
use recipe_bot_core::{AppError, config::Config};
use recipe_bot_github::{
    HostApi,
    events::{CheckRunPayload, EventSource},
    webhook::GitHubEvent,
};
use recipe_bot_jobs::{Job, jobs::LINT_CHECK_NAME};

use crate::{
    AppState,
    commands::{Command, help_message, parse_commands},
};

/// Webhook handler that enqueues jobs for processing instead of handling synchronously.
pub async fn webhook(
    State(state): State<AppState>,
    GitHubEvent { event }: GitHubEvent,
) -> Result<Response, AppError> {
    let Some(source) = EventSource::from_event(&event) else {
        if matches!(event.specific, WebhookEventPayload::Ping(_)) {
            return Ok((StatusCode::OK, "pong").into_response());
        }
        tracing::info!("Ignoring webhook event {:?} without a repository", event.kind);
        return Ok((StatusCode::OK, "Event ignored").into_response());
    };
    tracing::info!("Received webhook event {:?} from repository {}", event.kind, source.full_name());

    let message = match &event.specific {
        WebhookEventPayload::PullRequest(inner) => {
            let head_sha = &inner.pull_request.head.sha;
            push(&state, pull_request_job(&source, &inner.action, inner.number, head_sha)).await?
        }
        WebhookEventPayload::CheckRun(inner) => {
            let run: CheckRunPayload = serde_json::from_value(inner.check_run.clone())
                .context("Received check_run event with invalid check_run")?;
            push(&state, check_run_job(&state.config, &source, &inner.action, run)).await?
        }
        WebhookEventPayload::IssueComment(inner) => {
            if !matches!(inner.action, IssueCommentWebhookEventAction::Created)
                || inner.issue.pull_request.is_none()
            {
                "Event ignored"
            } else {
                let body = inner.comment.body.as_deref().unwrap_or_default();
                issue_comment(&state, &source, inner.issue.number, &inner.comment.user.login, body)
                    .await?
            }
        }
        WebhookEventPayload::Ping(_) => "pong",
        _ => {
            tracing::debug!("Ignoring webhook event {:?}", event.kind);
            "Event ignored"
        }
    };
    Ok((StatusCode::OK, message).into_response())
}

fn pull_request_job(
    source: &EventSource,
    action: &PullRequestWebhookEventAction,
    number: u64,
    head_sha: &str,
) -> Option<Job> {
    let recreate = match action {
        PullRequestWebhookEventAction::Opened | PullRequestWebhookEventAction::Reopened => false,
        PullRequestWebhookEventAction::Synchronize => true,
        _ => return None,
    };
    tracing::info!("Pull request {}#{} {:?}", source.full_name(), number, action);
    let pr = source.pr_info(number, Some(head_sha.to_string()));
    Some(Job::CheckPullRequest { pr, recreate })
}

fn check_run_job(
    config: &Config,
    source: &EventSource,
    action: &CheckRunWebhookEventAction,
    run: CheckRunPayload,
) -> Option<Job> {
    if !matches!(
        action,
        CheckRunWebhookEventAction::Created | CheckRunWebhookEventAction::Rerequested
    ) || run.name != LINT_CHECK_NAME
    {
        return None;
    }
    if let (Some(app), Some(run_app)) = (&config.github.app, &run.app) {
        if app.id != run_app.id {
            return None;
        }
    }
    let Some(number) = run.pull_requests.first().map(|p| p.number) else {
        tracing::warn!("Check run {} is not attached to a pull request", run.id);
        return None;
    };
    let pr = source.pr_info(number, Some(run.head_sha.clone()));
    tracing::info!("Linting {}#{} at {}", pr.full_name(), number, run.head_sha);
    Some(Job::Lint { pr, check_run_id: run.id, head_sha: run.head_sha })
}

async fn push(state: &AppState, job: Option<Job>) -> Result<&'static str, AppError> {
    let Some(job) = job else {
        return Ok("Event ignored");
    };
    state.jobs.push(job).await?;
    Ok("Event processed")
}

async fn issue_comment(
    state: &AppState,
    source: &EventSource,
    number: u64,
    user: &str,
    body: &str,
) -> Result<&'static str, AppError> {
    let bot = &state.config.github.bot.login;
    if user.eq_ignore_ascii_case(bot) {
        return Ok("Event ignored");
    }
    let commands = parse_commands(body, bot);
    if commands.is_empty() {
        return Ok("Event ignored");
    }
    let pr = source.pr_info(number, None);
    for command in commands {
        tracing::info!("@{} requested {:?} on {}#{}", user, command, pr.full_name(), number);
        let job = match command {
            Command::Lint => Job::CheckPullRequest { pr: pr.clone(), recreate: true },
            Command::Bump => Job::Bump { pr: pr.clone() },
            Command::FetchArtifacts => Job::CollectArtifacts { pr: pr.clone() },
            Command::Rebuild => Job::TriggerRebuild { pr: pr.clone() },
            Command::Merge => {
                let host = state.github.host_for(&pr).await?;
                let body = format!("Upload & Merge requested by @{user}. Queued.");
                let comment_id = host
                    .create_comment(number, &body)
                    .await
                    .context("Failed to create merge status comment")?;
                Job::Merge { pr: pr.clone(), comment_id, user: user.to_string(), attempt: 1 }
            }
            Command::Unknown(words) => {
                let host = state.github.host_for(&pr).await?;
                host.create_comment(number, &help_message(bot, &words))
                    .await
                    .context("Failed to post help")?;
                continue;
            }
        };
        state.jobs.push(job).await?;
    }
    Ok("Event processed")
}
