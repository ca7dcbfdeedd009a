use anyhow::{Context, Result};
use recipe_bot_github::HostApi;

/// Name of the check run holding lint results.
pub const LINT_CHECK_NAME: &str = "Linting Recipe(s)";

/// SHA of the newest commit of a pull request.
pub async fn fetch_latest_commit(host: &dyn HostApi, number: u64) -> Result<Option<String>> {
    let commits = host
        .pull_request_commits(number)
        .await
        .with_context(|| format!("Failed to list commits of #{number}"))?;
    let sha = commits.into_iter().last().map(|c| c.sha);
    tracing::info!("Latest SHA on #{} is {}", number, sha.as_deref().unwrap_or("[none]"));
    Ok(sha)
}

/// Create the lint check run for `head_sha`. Unless `recreate` is set, an
/// existing run is left alone. Returns the id of the created run.
pub async fn create_check_run(
    host: &dyn HostApi,
    head_sha: Option<&str>,
    recreate: bool,
) -> Result<Option<u64>> {
    let Some(head_sha) = head_sha else {
        tracing::info!("Not creating check run, SHA is None");
        return Ok(None);
    };
    if !recreate {
        let runs = host.check_runs(head_sha).await.context("Failed to list check runs")?;
        if runs.iter().any(|run| run.name == LINT_CHECK_NAME) {
            tracing::warn!("Check run for {} exists - not recreating", head_sha);
            return Ok(None);
        }
    }
    let id = host
        .create_check_run(LINT_CHECK_NAME, head_sha)
        .await
        .context("Failed to create check run")?;
    tracing::info!("Created check run {} for {}", id, head_sha);
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use recipe_bot_github::models::{CheckRun, CheckRunStatus};

    use super::*;
    use crate::testing::{FakeHost, commit};

    #[tokio::test]
    async fn test_latest_commit() {
        let host = FakeHost::default();
        assert_eq!(fetch_latest_commit(&host, 1).await.unwrap(), None);
        host.state().commits = vec![commit("a", Some("alice"), "Alice"), commit("b", None, "Bob")];
        assert_eq!(fetch_latest_commit(&host, 1).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_create_check_run() {
        let host = FakeHost::default();
        assert_eq!(create_check_run(&host, None, true).await.unwrap(), None);
        assert!(host.state().created_check_runs.is_empty());

        let id = create_check_run(&host, Some("abc"), false).await.unwrap();
        assert!(id.is_some());

        host.state().check_runs = vec![CheckRun {
            id: 1,
            name: LINT_CHECK_NAME.to_string(),
            status: CheckRunStatus::Completed,
            conclusion: None,
        }];
        assert_eq!(create_check_run(&host, Some("abc"), false).await.unwrap(), None);
        assert!(create_check_run(&host, Some("abc"), true).await.unwrap().is_some());
        let created = host.state().created_check_runs.clone();
        assert_eq!(created, vec![
            (LINT_CHECK_NAME.to_string(), "abc".to_string()),
            (LINT_CHECK_NAME.to_string(), "abc".to_string()),
        ]);
    }
}
