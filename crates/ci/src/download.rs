use std::{path::PathBuf, sync::Arc, time::Instant};

use futures_util::StreamExt;
use recipe_bot_core::util::size;
use reqwest::Client;
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt, sync::Semaphore, task::JoinSet};

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub url: String,
    pub dest: PathBuf,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to fetch {url}: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("download task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Fetch every file with at most `concurrency` requests in flight. The first
/// failure aborts the remaining downloads.
pub async fn download_all(
    client: &Client,
    files: &[Download],
    concurrency: usize,
) -> Result<(), DownloadError> {
    let start = Instant::now();
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();
    for file in files.iter().cloned() {
        let sem = sem.clone();
        let client = client.clone();
        set.spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            download_one(&client, file).await
        });
    }
    let mut total = 0;
    while let Some(result) = set.join_next().await {
        // Dropping the set on error aborts the outstanding tasks
        total += result??;
    }
    tracing::info!(
        "Downloaded {} files ({}) in {}ms",
        files.len(),
        size(total),
        start.elapsed().as_millis()
    );
    Ok(())
}

async fn download_one(client: &Client, file: Download) -> Result<u64, DownloadError> {
    let request_err = |source| DownloadError::Request { url: file.url.clone(), source };
    let io_err = |source| DownloadError::Io { path: file.dest.clone(), source };
    if let Some(parent) = file.dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let response = client
        .get(&file.url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(request_err)?;
    let mut out = File::create(&file.dest).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    let mut written = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(request_err)?;
        out.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    out.flush().await.map_err(io_err)?;
    tracing::debug!("Downloaded {} ({})", file.url, size(written));
    Ok(written)
}
