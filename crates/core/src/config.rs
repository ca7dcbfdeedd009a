use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub ci: CiConfig,
    pub uploads: UploadConfig,
    #[serde(default)]
    pub lint: LintConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DbConfig {
    pub jobs_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// Token used for API calls without an installation, and for git pushes.
    pub token: String,
    pub app: Option<GitHubAppConfig>,
    pub bot: BotIdentity,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubAppConfig {
    pub id: u64,
    pub webhook_secret: String,
    pub private_key: String,
}

/// Who the bot is on GitHub and in commits it authors.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BotIdentity {
    pub login: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CiConfig {
    #[serde(default = "default_ci_base_url")]
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for CiConfig {
    fn default() -> Self { Self { base_url: default_ci_base_url(), token: None } }
}

fn default_ci_base_url() -> String { "https://circleci.com/api/v1.1".to_string() }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    pub anaconda_token: String,
    /// `user:password` passed to skopeo as destination credentials.
    pub quay_login: String,
    #[serde(default = "default_image_namespace")]
    pub image_namespace: String,
    #[serde(default = "default_upload_attempts")]
    pub attempts: u32,
    #[serde(default = "default_upload_delay_secs")]
    pub delay_secs: u64,
}

impl UploadConfig {
    pub fn delay(&self) -> Duration { Duration::from_secs(self.delay_secs) }
}

fn default_image_namespace() -> String { "biocontainers".to_string() }

fn default_upload_attempts() -> u32 { 5 }

fn default_upload_delay_secs() -> u64 { 5 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LintConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            command: "bioconda-utils".to_string(),
            args: vec!["lint".to_string(), "--format".to_string(), "json".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub retry_attempts: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self { Self { concurrency: 4, retry_attempts: 3 } }
}
