mod handlers;
pub mod job;
pub mod jobs;
pub mod progress;
mod services;
pub mod templates;
#[cfg(test)]
mod testing;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use apalis::{
    layers::retry::{
        HasherRng, RetryPolicy,
        backoff::{ExponentialBackoffMaker, MakeBackoff},
    },
    prelude::*,
};
use apalis_codec::json::JsonCodec;
use apalis_sqlite::{CompactType, SqliteStorage, fetcher::SqliteFetcher};
pub use handlers::{MERGE_PREFIX, process_job, run_job};
pub use job::{FollowUp, Job};
use recipe_bot_core::config::{Config, DbConfig, WorkerConfig};
use recipe_bot_github::GitHub;
use recipe_bot_repo::{GitBackend, Linter};
use recipe_bot_upload::Uploader;
pub use services::Services;
use sqlx::{Sqlite, migrate::MigrateDatabase, sqlite::SqlitePool};

/// Shared context available to all job handlers.
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<Config>,
    pub github: Arc<GitHub>,
    pub http: reqwest::Client,
    pub git: Arc<dyn GitBackend>,
    pub uploader: Arc<dyn Uploader>,
    pub linter: Arc<dyn Linter>,
    pub storage: Arc<JobStorage>,
}

impl JobContext {
    pub async fn enqueue(&self, follow_up: FollowUp) -> Result<()> {
        self.storage.schedule(follow_up).await
    }
}

/// Type alias for the default codec used by SqliteStorage.
type DefaultCodec = JsonCodec<CompactType>;

/// Type alias for the bot task storage.
pub type TaskStorage = SqliteStorage<Job, DefaultCodec, SqliteFetcher>;

/// Storage handle for pushing jobs from request handlers.
#[derive(Clone)]
pub struct JobStorage {
    tasks: TaskStorage,
}

impl JobStorage {
    /// Set up job storage tables and create the storage instance.
    pub async fn setup(db: &DbConfig) -> Result<Arc<Self>> {
        if !Sqlite::database_exists(&db.jobs_url).await.unwrap_or(false) {
            tracing::info!(url = %db.jobs_url, "Creating database");
            Sqlite::create_database(&db.jobs_url).await.context("Failed to create database")?;
            tracing::info!("Database created");
        }
        let pool =
            SqlitePool::connect(&db.jobs_url).await.context("Failed to connect to database")?;
        SqliteStorage::setup(&pool).await?;
        Ok(Arc::new(Self { tasks: create_storage(&pool) }))
    }

    /// Get a clone of the task storage for pushing jobs.
    pub fn tasks(&self) -> TaskStorage { self.tasks.clone() }

    pub async fn push(&self, job: Job) -> Result<()> {
        let name = job.name();
        self.tasks().push(job).await.with_context(|| format!("Failed to enqueue {name} job"))?;
        Ok(())
    }

    /// Push a follow-up job. Delayed jobs are stored with a run-at time, so
    /// they survive a restart and no worker slot waits on the delay.
    pub async fn schedule(&self, follow_up: FollowUp) -> Result<()> {
        let FollowUp { job, delay } = follow_up;
        let Some(delay) = delay else {
            return self.push(job).await;
        };
        let name = job.name();
        tracing::info!("Scheduling {} job in {}s", name, delay.as_secs());
        let task = TaskBuilder::new(job).run_after(delay).build();
        self.tasks()
            .push_task(task)
            .await
            .with_context(|| format!("Failed to schedule {name} job"))?;
        Ok(())
    }
}

fn create_storage<T>(pool: &SqlitePool) -> SqliteStorage<T, DefaultCodec, SqliteFetcher> {
    let config = apalis_sqlite::Config::new(std::any::type_name::<T>()).with_poll_interval(
        StrategyBuilder::new()
            .apply(
                IntervalStrategy::new(Duration::from_millis(100))
                    .with_backoff(BackoffConfig::new(Duration::from_secs(1))),
            )
            .build(),
    );
    SqliteStorage::new_with_config(pool, &config)
}

/// Create the job monitor running the bot worker.
pub fn create_monitor(context: JobContext, config: &WorkerConfig) -> Result<Monitor> {
    let &WorkerConfig { concurrency, retry_attempts } = config;

    let backoff = ExponentialBackoffMaker::new(
        Duration::from_secs(1),
        Duration::from_secs(120),
        1.25,
        HasherRng::default(),
    )
    .context("Invalid retry backoff")?
    .make_backoff();
    let retry_policy = RetryPolicy::retries(retry_attempts)
        .with_backoff(backoff)
        .retry_if(|e: &BoxDynError| e.downcast_ref::<AbortError>().is_none());

    Ok(Monitor::new()
        .register(move |_| {
            WorkerBuilder::new("bot-task-worker")
                .backend(context.storage.tasks())
                .retry(retry_policy.clone())
                .enable_tracing()
                .catch_panic()
                .concurrency(concurrency)
                .data(context.clone())
                .build(process_job)
        })
        .shutdown_timeout(Duration::from_secs(30)))
}
