use std::{fmt, future::Future, path::Path, time::Duration};

use recipe_bot_core::config::UploadConfig;
use thiserror::Error;
use tokio::time::sleep;

use crate::Uploader;

/// Fixed-delay retry budget for a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { attempts: 5, delay: Duration::from_secs(5) } }
}

impl From<&UploadConfig> for RetryPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self { attempts: config.attempts.max(1), delay: config.delay() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Package,
    Image,
}

impl UploadKind {
    fn failure_message(&self) -> &'static str {
        match self {
            Self::Package => "Failed to upload package to Anaconda",
            Self::Image => "Failed to upload image to Quay.io",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Package => "package",
            Self::Image => "image",
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("{}", kind.failure_message())]
    Exhausted { kind: UploadKind, target: String, attempts: u32 },
}

/// Run `upload` until it reports success, sleeping `policy.delay` between
/// attempts. Returns the number of attempts used.
pub async fn retry_upload<F, Fut>(
    policy: RetryPolicy,
    kind: UploadKind,
    target: &str,
    mut upload: F,
) -> Result<u32, UploadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=policy.attempts {
        tracing::info!("Uploading {} {} (attempt {}/{})", kind, target, attempt, policy.attempts);
        if upload().await {
            return Ok(attempt);
        }
        if attempt < policy.attempts {
            tracing::warn!(
                "Upload of {} {} failed, retrying in {}s...",
                kind,
                target,
                policy.delay.as_secs()
            );
            sleep(policy.delay).await;
        }
    }
    tracing::error!("Upload of {} {} failed, giving up", kind, target);
    Err(UploadError::Exhausted { kind, target: target.to_string(), attempts: policy.attempts })
}

pub async fn upload_package_with_retry(
    uploader: &dyn Uploader,
    policy: RetryPolicy,
    file: &Path,
) -> Result<u32, UploadError> {
    let target = file.display().to_string();
    retry_upload(policy, UploadKind::Package, &target, || uploader.upload_package(file)).await
}

pub async fn upload_image_with_retry(
    uploader: &dyn Uploader,
    policy: RetryPolicy,
    file: &Path,
    destination: &str,
) -> Result<u32, UploadError> {
    retry_upload(policy, UploadKind::Image, destination, || uploader.upload_image(file, destination))
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    async fn run(failures: u32) -> (Result<u32, UploadError>, u32, Duration) {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result = retry_upload(RetryPolicy::default(), UploadKind::Package, "a.tar.bz2", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { n >= failures }
        })
        .await;
        (result, calls.load(Ordering::SeqCst), start.elapsed())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_succeeds() {
        let (result, calls, elapsed) = run(0).await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls, 1);
        assert_eq!(elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        for failures in 1..5 {
            let (result, calls, elapsed) = run(failures).await;
            assert_eq!(result, Ok(failures + 1));
            assert_eq!(calls, failures + 1);
            assert_eq!(elapsed, Duration::from_secs(5 * failures as u64));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_five() {
        let (result, calls, elapsed) = run(u32::MAX).await;
        let err = result.unwrap_err();
        assert_eq!(err, UploadError::Exhausted {
            kind: UploadKind::Package,
            target: "a.tar.bz2".to_string(),
            attempts: 5,
        });
        assert_eq!(err.to_string(), "Failed to upload package to Anaconda");
        assert_eq!(calls, 5);
        // No sleep after the last attempt
        assert_eq!(elapsed, Duration::from_secs(20));
    }

    #[test]
    fn test_image_message() {
        let err = UploadError::Exhausted {
            kind: UploadKind::Image,
            target: "biocontainers/a:1".to_string(),
            attempts: 5,
        };
        assert_eq!(err.to_string(), "Failed to upload image to Quay.io");
    }
}
