pub mod download;

use std::collections::BTreeSet;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
pub use download::{Download, DownloadError, download_all};
use recipe_bot_core::config::CiConfig;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// A file published by a CI build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiArtifact {
    pub path: String,
    pub url: String,
    pub build_number: u64,
}

/// Operations against the CI provider building the home repository.
#[async_trait]
pub trait CiApi: Send + Sync {
    /// Artifacts of every build of `path` (branch name or `pull/<n>`) at `sha`.
    async fn artifacts(&self, path: &str, sha: &str) -> Result<Vec<CiArtifact>>;

    /// Start a new build of `path` at `sha`. Returns a short status text.
    async fn trigger_rebuild(&self, path: &str, sha: &str) -> Result<String>;

    /// Fetch all files into their destinations. Fails if any file fails.
    async fn download(&self, files: &[Download]) -> Result<(), DownloadError>;
}

/// [`CiApi`] implementation for the CircleCI v1.1 API.
#[derive(Clone)]
pub struct CircleCi {
    client: Client,
    base_url: Url,
    token: Option<String>,
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
struct Build {
    build_num: u64,
    vcs_revision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BuildArtifact {
    path: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TriggeredBuild {
    build_num: Option<u64>,
    status: Option<String>,
}

/// Concurrent downloads per batch.
const DOWNLOAD_CONCURRENCY: usize = 4;

impl CircleCi {
    pub fn new(client: Client, config: &CiConfig, owner: &str, repo: &str) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid CI base URL {}", config.base_url))?;
        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    fn project_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("CI base URL cannot be a base"))?
            .pop_if_empty()
            .extend(["project", "github", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url).header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.header("Circle-Token", token),
            None => builder,
        }
    }

    async fn builds_for(&self, path: &str, sha: &str) -> Result<Vec<u64>> {
        let mut url = self.project_url(["tree", path])?;
        url.query_pairs_mut().append_pair("limit", "100");
        let builds: Vec<Build> = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to list CI builds for {path}"))?
            .json()
            .await
            .context("Failed to parse CI build list")?;
        Ok(builds
            .into_iter()
            .filter(|b| b.vcs_revision.as_deref() == Some(sha))
            .map(|b| b.build_num)
            .collect())
    }
}

#[async_trait]
impl CiApi for CircleCi {
    async fn artifacts(&self, path: &str, sha: &str) -> Result<Vec<CiArtifact>> {
        let builds = self.builds_for(path, sha).await?;
        tracing::debug!("Found {} CI builds for {} at {}", builds.len(), path, sha);
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for build_number in builds {
            let build = build_number.to_string();
            let url = self.project_url([build.as_str(), "artifacts"])?;
            let artifacts: Vec<BuildArtifact> = self
                .request(reqwest::Method::GET, url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .with_context(|| format!("Failed to list artifacts of build {build_number}"))?
                .json()
                .await
                .context("Failed to parse CI artifact list")?;
            for artifact in artifacts {
                // Reruns of the same commit publish the same paths
                if seen.insert(artifact.path.clone()) {
                    result.push(CiArtifact { path: artifact.path, url: artifact.url, build_number });
                }
            }
        }
        Ok(result)
    }

    async fn trigger_rebuild(&self, path: &str, sha: &str) -> Result<String> {
        let url = match self.builds_for(path, sha).await?.into_iter().max() {
            Some(build_number) => self.project_url([build_number.to_string().as_str(), "retry"])?,
            None => self.project_url(["tree", path])?,
        };
        let triggered: TriggeredBuild = self
            .request(reqwest::Method::POST, url)
            .json(&serde_json::json!({ "revision": sha }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to trigger CI build for {path}"))?
            .json()
            .await
            .context("Failed to parse CI trigger response")?;
        Ok(format!(
            "build {} {}",
            triggered.build_num.map(|n| n.to_string()).unwrap_or_else(|| "[unknown]".to_string()),
            triggered.status.as_deref().unwrap_or("[unknown]")
        ))
    }

    async fn download(&self, files: &[Download]) -> Result<(), DownloadError> {
        download_all(&self.client, files, DOWNLOAD_CONCURRENCY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle() -> CircleCi {
        let config = CiConfig { base_url: "https://circleci.com/api/v1.1".to_string(), token: None };
        CircleCi::new(Client::new(), &config, "bioconda", "bioconda-recipes").unwrap()
    }

    #[test]
    fn test_project_url() {
        let ci = circle();
        assert_eq!(
            ci.project_url(["tree", "pull/12"]).unwrap().as_str(),
            "https://circleci.com/api/v1.1/project/github/bioconda/bioconda-recipes/tree/pull%2F12"
        );
        assert_eq!(
            ci.project_url(["42", "artifacts"]).unwrap().as_str(),
            "https://circleci.com/api/v1.1/project/github/bioconda/bioconda-recipes/42/artifacts"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = CiConfig { base_url: "not a url".to_string(), token: None };
        assert!(CircleCi::new(Client::new(), &config, "a", "b").is_err());
    }
}
