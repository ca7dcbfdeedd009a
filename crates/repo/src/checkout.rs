//! Temporary clones scoped to a single task.
//!
//! A [`Workspace`] owns its clone on disk. Dropping it removes the clone, on
//! every exit path of the task holding it. The process working directory is
//! never changed: every repository operation receives the clone's root.

use std::{
    collections::BTreeSet,
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use recipe_bot_core::config::BotIdentity;
use recipe_bot_github::HostApi;
use tempfile::TempDir;
use thiserror::Error;

use crate::git::{CloneSpec, FORK_REMOTE, GitBackend, HOME_REMOTE, Remote};

/// Directory holding one subdirectory per recipe.
pub const RECIPES_DIR: &str = "recipes";
/// Recipe definition file name.
pub const RECIPE_FILE: &str = "meta.yaml";

/// What to check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
    /// A commit or branch of the home repository.
    Ref(String),
    /// The head branch of a pull request, possibly on a fork.
    PullRequest(u64),
}

impl fmt::Display for CheckoutTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref(git_ref) => write!(f, "{git_ref}"),
            Self::PullRequest(number) => write!(f, "#{number}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Failed to find {branch}:{git_ref} in {owner}/{repo}")]
    BranchNotFound { branch: String, git_ref: String, owner: String, repo: String },
    #[error("Pull request #{0} has no head repository")]
    MissingHeadRepo(u64),
}

/// Result of acquiring a checkout.
pub enum Checkout {
    Ready(Workspace),
    /// The clone could not be prepared. Holds a description of the failure.
    Unavailable(String),
}

/// A prepared clone with the target branch checked out.
pub struct Workspace {
    dir: TempDir,
    git: Arc<dyn GitBackend>,
    branch: String,
    remote: &'static str,
}

/// Everything needed to create clones for one repository.
#[derive(Clone)]
pub struct CheckoutContext<'a> {
    pub host: &'a dyn HostApi,
    pub git: Arc<dyn GitBackend>,
    pub token: &'a str,
    pub identity: &'a BotIdentity,
}

pub async fn acquire(ctx: &CheckoutContext<'_>, target: &CheckoutTarget) -> Checkout {
    match prepare(ctx, target).await {
        Ok(workspace) => Checkout::Ready(workspace),
        Err(e) => {
            tracing::error!(
                "Error while checking out {} from {}/{}: {:?}",
                target,
                ctx.host.owner(),
                ctx.host.repo(),
                e
            );
            Checkout::Unavailable(format!("{e:#}"))
        }
    }
}

async fn prepare(ctx: &CheckoutContext<'_>, target: &CheckoutTarget) -> Result<Workspace> {
    let (fork, branch, git_ref) = match target {
        CheckoutTarget::PullRequest(number) => {
            let pr = ctx.host.get_pull_request(*number).await?;
            let head_repo = pr.head.repo.ok_or(CheckoutError::MissingHeadRepo(*number))?;
            (Some(Remote::new(head_repo.owner.login, head_repo.name)), pr.head.ref_field, None)
        }
        CheckoutTarget::Ref(git_ref) => (None, "unknown".to_string(), Some(git_ref.as_str())),
    };
    // Owned before any git work so the clone is removed on every failure below
    let dir = tempfile::Builder::new()
        .prefix("recipe-bot-")
        .tempdir()
        .context("Failed to create temporary directory")?;
    let root = dir.path();
    let spec = CloneSpec {
        token: ctx.token.to_string(),
        home: Remote::new(ctx.host.owner(), ctx.host.repo()),
        fork,
    };
    let remote = if spec.fork.is_some() { FORK_REMOTE } else { HOME_REMOTE };
    GitBackend::clone_into(&*ctx.git, root, &spec).await.context("Failed to clone repository")?;
    ctx.git.set_identity(root, &ctx.identity.name, &ctx.identity.email).await?;
    if !ctx.git.create_local_branch(root, &branch, git_ref).await? {
        return Err(CheckoutError::BranchNotFound {
            branch,
            git_ref: git_ref.unwrap_or("").to_string(),
            owner: ctx.host.owner().to_string(),
            repo: ctx.host.repo().to_string(),
        }
        .into());
    }
    ctx.git.checkout(root, &branch).await?;
    tracing::info!("Checked out {} into {}", target, root.display());
    Ok(Workspace { dir, git: ctx.git.clone(), branch, remote })
}

impl Workspace {
    pub fn root(&self) -> &Path { self.dir.path() }

    pub fn branch(&self) -> &str { &self.branch }

    /// Recipe files modified on this branch, relative to the root.
    pub async fn changed_recipes(&self) -> Result<Vec<PathBuf>> {
        let files = self.git.changed_files(self.root()).await?;
        Ok(files
            .into_iter()
            .filter(|f| f.starts_with(RECIPES_DIR) && f.file_name() == Some(OsStr::new(RECIPE_FILE)))
            .filter(|f| self.root().join(f).is_file())
            .collect())
    }

    /// Recipe directories touched by this branch that still exist.
    pub async fn recipes_to_build(&self) -> Result<Vec<String>> {
        let files = self.git.changed_files(self.root()).await?;
        let mut recipes = BTreeSet::new();
        for file in files.iter().filter(|f| f.starts_with(RECIPES_DIR)) {
            let recipe = file
                .ancestors()
                .skip(1)
                .take_while(|dir| *dir != Path::new(RECIPES_DIR))
                .find(|dir| self.root().join(dir).join(RECIPE_FILE).is_file());
            if let Some(recipe) = recipe {
                recipes.insert(recipe.to_string_lossy().into_owned());
            }
        }
        Ok(recipes.into_iter().collect())
    }

    /// Commit `files` and push to the branch the checkout came from.
    pub async fn commit_and_push(&self, files: &[PathBuf], message: &str, sign: bool) -> Result<bool> {
        self.git.commit_and_push(self.root(), files, message, self.remote, &self.branch, sign).await
    }

    /// Remove the clone, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!("Failed to remove checkout {}: {}", path.display(), e);
        }
    }
}
