//! In-memory collaborators for task tests.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use recipe_bot_ci::{CiApi, CiArtifact, Download, DownloadError};
use recipe_bot_core::{config::BotIdentity, models::PrInfo};
use recipe_bot_github::{
    HostApi,
    models::{
        CheckRun, CheckRunUpdate, Comment, CommitDetail, GitAuthor, HeadRepo, MergeResult,
        Protection, PullCommit, PullHead, PullRequest,
    },
};
use recipe_bot_repo::{GitBackend, LintReport, Linter, git::CloneSpec};
use recipe_bot_upload::{RetryPolicy, Uploader};

use crate::services::Services;

pub const HOME_OWNER: &str = "bioconda";
pub const HOME_REPO: &str = "bioconda-recipes";
pub const HEAD_SHA: &str = "0123456789abcdef0123456789abcdef01234567";

pub fn pr_info(number: u64) -> PrInfo {
    PrInfo {
        installation: None,
        user: HOME_OWNER.to_string(),
        repo: HOME_REPO.to_string(),
        git_ref: None,
        issue_number: number,
    }
}

pub fn commit(sha: &str, login: Option<&str>, name: &str) -> PullCommit {
    PullCommit {
        sha: sha.to_string(),
        author: login.map(Into::into),
        commit: CommitDetail {
            author: Some(GitAuthor {
                name: name.to_string(),
                email: format!("{}@example.org", name.to_lowercase()),
            }),
        },
    }
}

/// Pull request opened by `alice` from her fork.
pub fn pull_request(number: u64) -> PullRequest {
    PullRequest {
        number,
        user: "alice".into(),
        head: PullHead {
            ref_field: "patch-1".to_string(),
            sha: HEAD_SHA.to_string(),
            user: Some("alice".into()),
            repo: Some(HeadRepo { name: HOME_REPO.to_string(), owner: "alice".into() }),
        },
        mergeable: Some(true),
        mergeable_state: Some("clean".to_string()),
    }
}

#[derive(Default)]
pub struct HostState {
    /// Returned by `get_pull_request`; defaults to [`pull_request`].
    pub pull: Option<PullRequest>,
    pub commits: Vec<PullCommit>,
    pub check_runs: Vec<CheckRun>,
    pub created_check_runs: Vec<(String, String)>,
    pub check_run_updates: Vec<(u64, CheckRunUpdate)>,
    pub comments: Vec<Comment>,
    pub created_comments: Vec<(u64, String)>,
    pub updated_comments: Vec<(u64, String)>,
    /// Answers to `check_protections`, in order. Allowed once exhausted.
    pub protections: VecDeque<Protection>,
    pub protection_checks: u32,
    pub merges: Vec<(u64, String, Option<String>)>,
}

#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn state(&self) -> MutexGuard<'_, HostState> { self.state.lock().unwrap() }
}

#[async_trait]
impl HostApi for FakeHost {
    fn owner(&self) -> &str { HOME_OWNER }

    fn repo(&self) -> &str { HOME_REPO }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        Ok(self.state().pull.clone().unwrap_or_else(|| pull_request(number)))
    }

    async fn pull_request_commits(&self, _number: u64) -> Result<Vec<PullCommit>> {
        Ok(self.state().commits.clone())
    }

    async fn check_runs(&self, _sha: &str) -> Result<Vec<CheckRun>> {
        Ok(self.state().check_runs.clone())
    }

    async fn create_check_run(&self, name: &str, sha: &str) -> Result<u64> {
        let mut state = self.state();
        state.created_check_runs.push((name.to_string(), sha.to_string()));
        Ok(100 + state.created_check_runs.len() as u64)
    }

    async fn update_check_run(&self, id: u64, update: CheckRunUpdate) -> Result<()> {
        self.state().check_run_updates.push((id, update));
        Ok(())
    }

    async fn comments(&self, _number: u64) -> Result<Vec<Comment>> {
        Ok(self.state().comments.clone())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<u64> {
        let mut state = self.state();
        state.created_comments.push((number, body.to_string()));
        Ok(500 + state.created_comments.len() as u64)
    }

    async fn update_comment(&self, id: u64, body: &str) -> Result<()> {
        self.state().updated_comments.push((id, body.to_string()));
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        number: u64,
        sha: &str,
        message: Option<&str>,
    ) -> Result<MergeResult> {
        self.state().merges.push((number, sha.to_string(), message.map(str::to_string)));
        Ok(MergeResult { merged: true, message: "Pull Request successfully merged".to_string() })
    }

    async fn check_protections(&self, _number: u64, _sha: &str) -> Result<Protection> {
        let mut state = self.state();
        state.protection_checks += 1;
        Ok(state.protections.pop_front().unwrap_or_else(|| Protection::allowed("")))
    }
}

#[derive(Default)]
pub struct FakeCi {
    pub artifacts: Vec<CiArtifact>,
    pub fail_download: bool,
    pub artifact_requests: Mutex<Vec<(String, String)>>,
    pub downloads: Mutex<Vec<Download>>,
    pub rebuilds: Mutex<Vec<(String, String)>>,
}

impl FakeCi {
    pub fn with_urls(urls: &[&str]) -> Self {
        let artifacts = urls
            .iter()
            .map(|url| CiArtifact {
                path: url.rsplit('/').next().unwrap_or_default().to_string(),
                url: url.to_string(),
                build_number: 1,
            })
            .collect();
        Self { artifacts, ..Default::default() }
    }
}

#[async_trait]
impl CiApi for FakeCi {
    async fn artifacts(&self, path: &str, sha: &str) -> Result<Vec<CiArtifact>> {
        self.artifact_requests.lock().unwrap().push((path.to_string(), sha.to_string()));
        Ok(self.artifacts.clone())
    }

    async fn trigger_rebuild(&self, path: &str, sha: &str) -> Result<String> {
        self.rebuilds.lock().unwrap().push((path.to_string(), sha.to_string()));
        Ok("build 2 queued".to_string())
    }

    async fn download(&self, files: &[Download]) -> Result<(), DownloadError> {
        self.downloads.lock().unwrap().extend(files.iter().cloned());
        for file in files {
            let io = |source| DownloadError::Io { path: file.dest.clone(), source };
            std::fs::create_dir_all(file.dest.parent().unwrap_or(Path::new("."))).map_err(io)?;
            if self.fail_download {
                return Err(io(std::io::Error::other("connection reset")));
            }
            std::fs::write(&file.dest, b"archive").map_err(io)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeUploader {
    pub fail_packages: bool,
    /// `(kind, target)` per attempt.
    pub calls: Mutex<Vec<(&'static str, String)>>,
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload_package(&self, file: &Path) -> bool {
        self.calls.lock().unwrap().push(("package", file.display().to_string()));
        file.is_file() && !self.fail_packages
    }

    async fn upload_image(&self, file: &Path, destination: &str) -> bool {
        self.calls.lock().unwrap().push(("image", destination.to_string()));
        file.is_file()
    }
}

/// Git backend writing a fixed tree instead of cloning.
#[derive(Default)]
pub struct FakeGit {
    pub files: Vec<(&'static str, &'static str)>,
    pub changed: Vec<&'static str>,
    pub missing_branch: bool,
    pub roots: Mutex<Vec<PathBuf>>,
    /// `(message, remote, branch, files)` per push.
    pub pushes: Mutex<Vec<(String, String, String, Vec<PathBuf>)>>,
}

#[async_trait]
impl GitBackend for FakeGit {
    async fn clone_into(&self, root: &Path, _spec: &CloneSpec) -> Result<()> {
        self.roots.lock().unwrap().push(root.to_path_buf());
        for (path, contents) in &self.files {
            let path = root.join(path);
            std::fs::create_dir_all(path.parent().unwrap_or(root))?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    async fn set_identity(&self, _root: &Path, _name: &str, _email: &str) -> Result<()> { Ok(()) }

    async fn create_local_branch(
        &self,
        _root: &Path,
        _name: &str,
        _git_ref: Option<&str>,
    ) -> Result<bool> {
        Ok(!self.missing_branch)
    }

    async fn checkout(&self, _root: &Path, _name: &str) -> Result<()> { Ok(()) }

    async fn changed_files(&self, _root: &Path) -> Result<Vec<PathBuf>> {
        Ok(self.changed.iter().map(PathBuf::from).collect())
    }

    async fn commit_and_push(
        &self,
        _root: &Path,
        files: &[PathBuf],
        message: &str,
        remote: &str,
        branch: &str,
        _sign: bool,
    ) -> Result<bool> {
        self.pushes.lock().unwrap().push((
            message.to_string(),
            remote.to_string(),
            branch.to_string(),
            files.to_vec(),
        ));
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeLinter {
    pub report: Option<LintReport>,
    pub fail: bool,
    pub calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl Linter for FakeLinter {
    async fn lint(&self, _root: &Path, recipes: &[String]) -> Result<Option<LintReport>> {
        self.calls.lock().unwrap().push(recipes.to_vec());
        if self.fail {
            bail!("linter crashed");
        }
        Ok(self.report.clone())
    }
}

/// Owns one of every fake and lends them out as [`Services`].
#[derive(Default)]
pub struct Harness {
    pub host: FakeHost,
    pub ci: FakeCi,
    pub git: Arc<FakeGit>,
    pub uploader: FakeUploader,
    pub linter: FakeLinter,
}

pub fn identity() -> &'static BotIdentity {
    static IDENTITY: std::sync::OnceLock<BotIdentity> = std::sync::OnceLock::new();
    IDENTITY.get_or_init(|| BotIdentity {
        login: "recipe-bot".to_string(),
        name: "Recipe Bot".to_string(),
        email: "bot@example.org".to_string(),
    })
}

impl Harness {
    pub fn services(&self) -> Services<'_> {
        Services {
            host: &self.host,
            ci: &self.ci,
            git: self.git.clone(),
            uploader: &self.uploader,
            linter: &self.linter,
            token: "secret",
            identity: identity(),
            upload_policy: RetryPolicy::default(),
            image_namespace: "biocontainers",
        }
    }
}
