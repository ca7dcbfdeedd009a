use std::fmt::Write;

use anyhow::{Context, Result};
use recipe_bot_core::models::short_ref;
use recipe_bot_github::models::{
    Annotation, AnnotationLevel, CheckRunConclusion, CheckRunOutput, CheckRunUpdate,
};
use recipe_bot_repo::{
    Checkout, CheckoutTarget, LintReport, acquire, checkout::RECIPE_FILE, lint::markdown_report,
};

use crate::services::Services;

/// Lint the recipes changed at `git_ref` and report through check run `check_run_id`.
pub async fn lint(services: &Services<'_>, check_run_id: u64, git_ref: &str) -> Result<()> {
    let host = services.host;
    let label = short_ref(git_ref);
    tracing::info!("Starting lint check for {}", label);
    host.update_check_run(check_run_id, CheckRunUpdate::in_progress())
        .await
        .context("Failed to mark check run in progress")?;

    let target = CheckoutTarget::Ref(git_ref.to_string());
    let workspace = match acquire(&services.checkout_context(), &target).await {
        Checkout::Ready(workspace) => workspace,
        Checkout::Unavailable(_) => {
            let output = CheckRunOutput {
                title: format!("Failed to check out {}/{}:{}", host.owner(), host.repo(), label),
                ..Default::default()
            };
            return complete(services, check_run_id, CheckRunConclusion::Cancelled, output).await;
        }
    };

    let recipes = workspace.recipes_to_build().await.context("Failed to list changed recipes")?;
    if recipes.is_empty() {
        let output = CheckRunOutput {
            title: "No recipes modified".to_string(),
            summary: "This branch does not modify any recipes! Please make sure this is what you \
                      intend. Upon merge, no packages would be built."
                .to_string(),
            ..Default::default()
        };
        return complete(services, check_run_id, CheckRunConclusion::Neutral, output).await;
    }

    let report = services
        .linter
        .lint(workspace.root(), &recipes)
        .await
        .with_context(|| format!("Failed to lint {}", recipes.join(", ")))?;
    workspace.close();

    let (conclusion, output) = lint_output(&recipes, report.as_ref());
    complete(services, check_run_id, conclusion, output).await
}

async fn complete(
    services: &Services<'_>,
    check_run_id: u64,
    conclusion: CheckRunConclusion,
    output: CheckRunOutput,
) -> Result<()> {
    tracing::info!("Completing check run {} as {:?}: {}", check_run_id, conclusion, output.title);
    services
        .host
        .update_check_run(check_run_id, CheckRunUpdate::completed(conclusion, output))
        .await
        .context("Failed to complete check run")
}

fn lint_output(recipes: &[String], report: Option<&LintReport>) -> (CheckRunConclusion, CheckRunOutput) {
    let mut summary = String::from("Linted recipes:\n");
    for recipe in recipes {
        let _ = writeln!(summary, " - `{recipe}`");
    }
    summary.push('\n');
    let text = Some(markdown_report(report));
    let Some(report) = report else {
        summary.push_str("No problems found.");
        let output = CheckRunOutput {
            title: "All recipes in good condition".to_string(),
            summary,
            text,
            annotations: vec![],
        };
        return (CheckRunConclusion::Success, output);
    };
    summary.push_str("Please fix the issues listed below.");
    let annotations = report
        .messages
        .iter()
        .map(|message| Annotation {
            path: format!("{}/{}", message.recipe, RECIPE_FILE),
            start_line: message.start_line(),
            end_line: message.end_line(),
            annotation_level: AnnotationLevel::Failure,
            title: message.check.clone(),
            message: message.fix_message(),
        })
        .collect();
    let output =
        CheckRunOutput { title: "Some recipes had problems".to_string(), summary, text, annotations };
    (CheckRunConclusion::Failure, output)
}

#[cfg(test)]
mod tests {
    use recipe_bot_github::models::CheckRunStatus;
    use recipe_bot_repo::lint::LintMessage;
    use serde_json::json;

    use super::*;
    use crate::testing::{FakeGit, FakeLinter, HEAD_SHA, Harness};

    fn updates(harness: &Harness) -> Vec<CheckRunUpdate> {
        harness.host.state().check_run_updates.iter().map(|(_, u)| u.clone()).collect()
    }

    fn final_output(harness: &Harness) -> (Option<CheckRunConclusion>, CheckRunOutput) {
        let updates = updates(harness);
        let last = updates.last().unwrap();
        assert_eq!(last.status, CheckRunStatus::Completed);
        (last.conclusion, last.output.clone().unwrap())
    }

    #[tokio::test]
    async fn test_no_recipes_is_neutral() {
        let harness = Harness {
            git: FakeGit { changed: vec!["README.md", ".circleci/config.yml"], ..Default::default() }
                .into(),
            ..Default::default()
        };
        lint(&harness.services(), 7, HEAD_SHA).await.unwrap();
        let updates = updates(&harness);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], CheckRunUpdate::in_progress());
        let (conclusion, output) = final_output(&harness);
        assert_eq!(conclusion, Some(CheckRunConclusion::Neutral));
        assert_eq!(output.title, "No recipes modified");
        assert!(harness.linter.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_failure_cancels() {
        let harness = Harness {
            git: FakeGit { missing_branch: true, ..Default::default() }.into(),
            ..Default::default()
        };
        lint(&harness.services(), 7, HEAD_SHA).await.unwrap();
        let (conclusion, output) = final_output(&harness);
        assert_eq!(conclusion, Some(CheckRunConclusion::Cancelled));
        assert_eq!(output.title, "Failed to check out bioconda/bioconda-recipes:01234567");
        assert!(!harness.git.roots.lock().unwrap()[0].exists());
    }

    fn recipe_tree() -> FakeGit {
        FakeGit {
            files: vec![("recipes/samtools/meta.yaml", "build:\n  number: 0\n")],
            changed: vec!["recipes/samtools/meta.yaml"],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clean_lint_succeeds() {
        let harness = Harness { git: recipe_tree().into(), ..Default::default() };
        lint(&harness.services(), 7, "master").await.unwrap();
        let (conclusion, output) = final_output(&harness);
        assert_eq!(conclusion, Some(CheckRunConclusion::Success));
        assert_eq!(output.title, "All recipes in good condition");
        assert_eq!(output.summary, "Linted recipes:\n - `recipes/samtools`\n\nNo problems found.");
        assert!(output.annotations.is_empty());
        let calls = harness.linter.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![vec!["recipes/samtools".to_string()]]);
    }

    #[tokio::test]
    async fn test_problems_are_annotated() {
        let report = LintReport {
            messages: vec![
                LintMessage {
                    recipe: "recipes/samtools".to_string(),
                    check: "missing_hash".to_string(),
                    severity: Some("error".to_string()),
                    info: json!({"start_line": 3, "end_line": 4, "fix": "add a sha256 checksum"}),
                },
                LintMessage {
                    recipe: "recipes/samtools".to_string(),
                    check: "should_use_compilers".to_string(),
                    severity: None,
                    info: json!({"package": "gcc"}),
                },
            ],
        };
        let harness = Harness {
            git: recipe_tree().into(),
            linter: FakeLinter { report: Some(report), ..Default::default() },
            ..Default::default()
        };
        lint(&harness.services(), 7, "master").await.unwrap();
        let (conclusion, output) = final_output(&harness);
        assert_eq!(conclusion, Some(CheckRunConclusion::Failure));
        assert_eq!(output.title, "Some recipes had problems");
        assert_eq!(output.annotations.len(), 2);
        let first = &output.annotations[0];
        assert_eq!(first.path, "recipes/samtools/meta.yaml");
        assert_eq!((first.start_line, first.end_line), (3, 4));
        assert_eq!(first.annotation_level, AnnotationLevel::Failure);
        assert_eq!(first.title, "missing_hash");
        assert_eq!(first.message, "add a sha256 checksum");
        let second = &output.annotations[1];
        assert_eq!((second.start_line, second.end_line), (1, 1));
        assert_eq!(second.message, r#"{"package":"gcc"}"#);
        assert!(output.text.unwrap().contains("missing_hash"));
    }

    #[tokio::test]
    async fn test_linter_error_propagates() {
        let harness = Harness {
            git: recipe_tree().into(),
            linter: FakeLinter { fail: true, ..Default::default() },
            ..Default::default()
        };
        assert!(lint(&harness.services(), 7, "master").await.is_err());
        // The clone is gone even though the task failed
        assert!(!harness.git.roots.lock().unwrap()[0].exists());
    }
}
