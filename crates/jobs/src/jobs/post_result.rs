use anyhow::{Context, Result};
use recipe_bot_core::models::TaskOutcome;
use recipe_bot_github::HostApi;

/// "@user, your request to <prefix> succeeded: <message>"
pub fn result_message(user: &str, prefix: &str, outcome: &TaskOutcome) -> String {
    let status = if outcome.success { "succeeded" } else { "failed" };
    format!("@{user}, your request to {prefix} {status}: {}", outcome.message)
}

/// Reply to the user who requested a task with its outcome.
pub async fn post_result(
    host: &dyn HostApi,
    number: u64,
    user: &str,
    prefix: &str,
    outcome: &TaskOutcome,
) -> Result<()> {
    tracing::info!("Posting result to #{}: {:?}", number, outcome);
    let message = result_message(user, prefix, outcome);
    host.create_comment(number, &message).await.context("Failed to post result")?;
    Ok(())
}
