use std::{collections::BTreeMap, fmt::Write, path::Path, process::Stdio};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use recipe_bot_core::config::LintConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

/// One problem reported by the linter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LintMessage {
    /// Recipe directory, relative to the repository root.
    pub recipe: String,
    /// Name of the check that failed.
    pub check: String,
    #[serde(default)]
    pub severity: Option<String>,
    /// Check specific details; may carry `start_line`, `end_line` and `fix`.
    #[serde(default)]
    pub info: Value,
}

impl LintMessage {
    fn line(&self, key: &str) -> u64 { self.info.get(key).and_then(Value::as_u64).unwrap_or(1) }

    pub fn start_line(&self) -> u64 { self.line("start_line") }

    pub fn end_line(&self) -> u64 { self.line("end_line") }

    /// Suggested fix, or the raw details when the check offers none.
    pub fn fix_message(&self) -> String {
        match self.info.get("fix").and_then(Value::as_str) {
            Some(fix) if !fix.is_empty() => fix.to_string(),
            _ => self.info.to_string(),
        }
    }
}

/// Problems found in one lint run. Never empty.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LintReport {
    pub messages: Vec<LintMessage>,
}

#[async_trait]
pub trait Linter: Send + Sync {
    /// Lint `recipes` in the checkout at `root`. `None` means no problems.
    async fn lint(&self, root: &Path, recipes: &[String]) -> Result<Option<LintReport>>;
}

/// [`Linter`] running an external command that prints a JSON array of
/// [`LintMessage`]s.
#[derive(Debug, Clone)]
pub struct CommandLinter {
    command: String,
    args: Vec<String>,
}

impl CommandLinter {
    pub fn new(config: &LintConfig) -> Self {
        Self { command: config.command.clone(), args: config.args.clone() }
    }
}

#[async_trait]
impl Linter for CommandLinter {
    async fn lint(&self, root: &Path, recipes: &[String]) -> Result<Option<LintReport>> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .args(recipes)
            .current_dir(root)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.command))?;
        // The linter exits non-zero when it finds problems, so only the output matters
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            if output.status.success() {
                return Ok(None);
            }
            bail!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let messages: Vec<LintMessage> =
            serde_json::from_str(&stdout).context("Failed to parse linter output")?;
        Ok(parse_messages(messages))
    }
}

fn parse_messages(messages: Vec<LintMessage>) -> Option<LintReport> {
    (!messages.is_empty()).then_some(LintReport { messages })
}

fn escape_cell(text: &str) -> String { text.replace('|', "\\|").replace('\n', " ") }

/// Render a report as markdown, grouped by recipe.
pub fn markdown_report(report: Option<&LintReport>) -> String {
    let Some(report) = report else {
        return "All checks passed.\n".to_string();
    };
    let mut by_recipe = BTreeMap::<&str, Vec<&LintMessage>>::new();
    for message in &report.messages {
        by_recipe.entry(&message.recipe).or_default().push(message);
    }
    let mut out = String::new();
    for (recipe, messages) in by_recipe {
        let _ = writeln!(out, "### `{recipe}`\n");
        out.push_str("| Check | Severity | Details |\n|---|---|---|\n");
        for message in messages {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                escape_cell(&message.check),
                message.severity.as_deref().unwrap_or("error"),
                escape_cell(&message.fix_message())
            );
        }
        out.push('\n');
    }
    out
}
