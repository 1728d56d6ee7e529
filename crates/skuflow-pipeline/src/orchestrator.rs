//! Sequential fetch → transform → load orchestration, with an optional
//! cron scheduler.

use std::future::Future;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{DbConfig, PipelineConfig};
use crate::error::Result;
use crate::{fetch, load, transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Transform,
    Load,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Transform => "transform",
            Step::Load => "load",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched_records: usize,
    pub cleaned_records: usize,
    pub attempted_rows: usize,
    pub inserted_rows: u64,
}

/// Runs the three stages strictly in order, aborting the remainder on the
/// first failure. Each step gets one retry after a fixed delay, and only
/// when the failure is worth retrying.
pub struct Orchestrator {
    config: PipelineConfig,
    db: DbConfig,
    retries: usize,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, db: DbConfig) -> Self {
        Self {
            config,
            db,
            retries: 1,
        }
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "pipeline run started");

        let fetched = self
            .with_retry(Step::Fetch, || fetch::run(&self.config))
            .await?;
        let transformed = self
            .with_retry(Step::Transform, || transform::run(&self.config))
            .await?;
        let loaded = self
            .with_retry(Step::Load, || load::run(&self.config, &self.db))
            .await?;

        let finished_at = Utc::now();
        let summary = RunSummary {
            run_id,
            started_at,
            finished_at,
            fetched_records: fetched.records,
            cleaned_records: transformed.records,
            attempted_rows: loaded.attempted,
            inserted_rows: loaded.inserted,
        };
        info!(
            %run_id,
            fetched = summary.fetched_records,
            cleaned = summary.cleaned_records,
            inserted = summary.inserted_rows,
            "pipeline run finished"
        );
        Ok(summary)
    }

    async fn with_retry<T, F, Fut>(&self, step: Step, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    warn!(
                        step = step.name(),
                        error = %err,
                        delay_secs = self.config.retry_delay.as_secs(),
                        "step failed; retrying after fixed delay"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(step = step.name(), error = %err, "step failed; aborting run");
                    return Err(err);
                }
            }
        }
    }

    /// Build a scheduler that runs the full sequence on the configured cron.
    /// Returns `None` when scheduling is disabled.
    pub async fn build_scheduler(&self) -> anyhow::Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let config = self.config.clone();
        let db = self.db.clone();
        let job = Job::new_async(self.config.cron.as_str(), move |_uuid, _lock| {
            let config = config.clone();
            let db = db.clone();
            Box::pin(async move {
                let orchestrator = Orchestrator::new(config, db);
                match orchestrator.run_once().await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        inserted = summary.inserted_rows,
                        "scheduled pipeline run completed"
                    ),
                    Err(err) => error!(error = %err, "scheduled pipeline run failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {}", self.config.cron))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}
