use std::fmt::Display;

use anyhow::{Context, Result};
use recipe_bot_github::HostApi;

/// Checklist rendered into a single status comment. Lines are only ever
/// appended; every [`publish`](Self::publish) replaces the comment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    comment_id: u64,
    body: String,
}

impl Progress {
    pub fn new(comment_id: u64, header: &str) -> Self {
        Self { comment_id, body: format!("{header}\n") }
    }

    /// Append a completed step.
    pub fn check(&mut self, line: impl Display) -> &mut Self {
        self.body.push_str(&format!("- [x] {line}\n"));
        self
    }

    /// Append a plain line.
    pub fn note(&mut self, line: impl Display) -> &mut Self {
        self.body.push_str(&format!("- {line}\n"));
        self
    }

    pub fn body(&self) -> &str { &self.body }

    pub async fn publish(&self, host: &dyn HostApi) -> Result<()> {
        host.update_comment(self.comment_id, &self.body)
            .await
            .with_context(|| format!("Failed to update progress comment {}", self.comment_id))
    }
}
