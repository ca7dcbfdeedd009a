pub mod retry;

use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use recipe_bot_core::config::UploadConfig;
pub use retry::{
    RetryPolicy, UploadError, UploadKind, retry_upload, upload_image_with_retry,
    upload_package_with_retry,
};
use tokio::process::Command;

/// Registry for container images.
pub const IMAGE_REGISTRY: &str = "quay.io";

/// Single-shot upload primitives. Failures are reported, not raised, so the
/// caller can decide whether to retry.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_package(&self, file: &Path) -> bool;

    /// Push an image archive to `destination` (`<namespace>/<name>:<tag>`).
    async fn upload_image(&self, file: &Path, destination: &str) -> bool;
}

/// [`Uploader`] shelling out to the `anaconda` and `skopeo` clients.
#[derive(Clone)]
pub struct CliUploader {
    anaconda_token: String,
    quay_login: String,
}

impl CliUploader {
    pub fn new(config: &UploadConfig) -> Self {
        Self { anaconda_token: config.anaconda_token.clone(), quay_login: config.quay_login.clone() }
    }
}

async fn run(program: &str, command: &mut Command) -> bool {
    match command.stdin(Stdio::null()).output().await {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            tracing::warn!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            tracing::error!("Failed to run {}: {}", program, e);
            false
        }
    }
}

#[async_trait]
impl Uploader for CliUploader {
    async fn upload_package(&self, file: &Path) -> bool {
        let mut command = Command::new("anaconda");
        command.arg("-t").arg(&self.anaconda_token).arg("upload").arg(file);
        run("anaconda", &mut command).await
    }

    async fn upload_image(&self, file: &Path, destination: &str) -> bool {
        let mut command = Command::new("skopeo");
        command
            .arg("--insecure-policy")
            .arg("copy")
            .arg("--dest-creds")
            .arg(&self.quay_login)
            .arg(format!("docker-archive:{}", file.display()))
            .arg(format!("docker://{IMAGE_REGISTRY}/{destination}"));
        run("skopeo", &mut command).await
    }
}
