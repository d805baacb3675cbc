mod classifier;
mod config;
mod encoding;
mod engine;
mod evaluator;
mod executor;
mod runner;

#[cfg(test)]
mod fakes;

use arbiter_common::config::Config;
use arbiter_common::redis;
use arbiter_common::types::{JudgeRecord, Submission};
use async_trait::async_trait;
use chrono::Utc;
use config::LanguageConfigManager;
use engine::HttpExecutionService;
use evaluator::SubmissionResult;
use executor::{Pipeline, ProgressSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Arbiter worker booting...");

    let config = Config::from_env();

    let languages = LanguageConfigManager::load(&config.languages_path).map_err(|e| {
        error!("Failed to load language configurations: {}", e);
        error!("Make sure {} exists", config.languages_path.display());
        e
    })?;
    info!("Loaded language configurations for: {:?}", languages.list_languages());

    let service = HttpExecutionService::new(
        &config.execution_service_url,
        config.execution_auth_token.clone(),
        config.execution_timeout,
    )?;
    info!(
        url = %config.execution_service_url,
        timeout_secs = config.execution_timeout.as_secs(),
        "Execution service configured"
    );

    let pipeline = Arc::new(Pipeline::new(service, languages, config.execution_timeout));

    let client = ::redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = ::redis::aio::ConnectionManager::new(client).await?;
    info!("Connected to Redis: {}", config.redis_url);

    let shutdown = CancellationToken::new();
    let jobs = TaskTracker::new();
    let intake = tokio::spawn(worker_loop(
        redis_conn,
        pipeline,
        config.worker_concurrency,
        shutdown.clone(),
        jobs.clone(),
    ));

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    warn!("Received shutdown signal, stopping intake...");
    shutdown.cancel();

    if let Err(e) = intake.await {
        error!(error = %e, "Intake loop panicked");
    }
    jobs.close();
    info!(in_flight = jobs.len(), "Waiting for in-flight jobs to record their results");
    jobs.wait().await;

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip(redis_conn, pipeline, shutdown, jobs))]
async fn worker_loop(
    mut redis_conn: ::redis::aio::ConnectionManager,
    pipeline: Arc<Pipeline<HttpExecutionService>>,
    concurrency: usize,
    shutdown: CancellationToken,
    jobs: TaskTracker,
) {
    let permits = Arc::new(Semaphore::new(concurrency));

    while !shutdown.is_cancelled() {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => return,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        // BLPOP with 5 second timeout so shutdown is noticed. The pop itself is
        // never abandoned mid-flight, or a job could leave the queue unseen.
        match redis::pop_submission(&mut redis_conn, 5.0).await {
            Ok(Some(submission)) => {
                info!(
                    job_id = %submission.id,
                    language = %submission.language,
                    test_cases = submission.test_cases.len(),
                    source_size = submission.source_code.len(),
                    deadline = ?submission.deadline,
                    "Received submission"
                );
                let conn = redis_conn.clone();
                let pipeline = pipeline.clone();
                let cancel = shutdown.child_token();
                jobs.spawn(async move {
                    judge_submission(conn, &pipeline, submission, cancel).await;
                    drop(permit);
                });
            }
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Publishes every partial snapshot so callers can watch cases complete
struct RedisProgress {
    conn: ::redis::aio::ConnectionManager,
    job_id: Uuid,
}

#[async_trait]
impl ProgressSink for RedisProgress {
    async fn publish(&mut self, snapshot: &SubmissionResult) {
        let record = JudgeRecord::Judged(snapshot.report(self.job_id));
        if let Err(e) = redis::store_record(&mut self.conn, &record).await {
            // Non-fatal - the final record is written again at the end
            warn!(job_id = %self.job_id, error = %e, "Failed to publish progress");
        }
    }
}

/// Judge one submission. `cancel` fires on worker shutdown; the caller's own
/// cancel flag is watched here and trips the same token.
async fn judge_submission(
    mut conn: ::redis::aio::ConnectionManager,
    pipeline: &Pipeline<HttpExecutionService>,
    submission: Submission,
    cancel: CancellationToken,
) {
    let job_id = submission.id;
    let watcher = tokio::spawn(watch_cancellation(conn.clone(), job_id, cancel.clone()));

    let mut progress = RedisProgress {
        conn: conn.clone(),
        job_id,
    };
    let start = std::time::Instant::now();
    let record = pipeline
        .judge(&submission, Utc::now(), cancel, &mut progress)
        .await;
    watcher.abort();

    if let JudgeRecord::Judged(report) = &record {
        info!(
            job_id = %job_id,
            phase = ?report.phase,
            score = report.score,
            execution_ms = start.elapsed().as_millis() as u64,
            "Execution completed"
        );
    }

    match redis::store_record(&mut conn, &record).await {
        Ok(_) => info!(job_id = %job_id, "Result persisted to Redis"),
        Err(e) => error!(job_id = %job_id, error = %e, "Failed to persist result"),
    }
}

/// Poll the cancel flag the API sets and trip the token when it appears
async fn watch_cancellation(
    mut conn: ::redis::aio::ConnectionManager,
    job_id: Uuid,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(CANCEL_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        match redis::is_job_cancelled(&mut conn, &job_id).await {
            Ok(true) => {
                info!(job_id = %job_id, "Cancellation requested by caller");
                cancel.cancel();
                return;
            }
            Ok(false) => {}
            Err(e) => {
                // Keep running on lookup errors to avoid false cancellations
                debug!(job_id = %job_id, error = %e, "Failed to check cancellation status");
            }
        }
    }
}
