/// Submission Executor - admission, test-case walk and aggregation
///
/// **Responsibility:**
/// Glue the pipeline together for one submission:
/// 1. Admission: language must be configured, session clock must not be expired
/// 2. Drive the `CaseRunner` stream in ordinal order
/// 3. Feed each result to the `Aggregator` and publish a snapshot
/// 4. Return the terminal `SubmissionResult`
///
/// A rejection is the only way to come out of here without a result, and it
/// always happens before the first request is sent.
use crate::classifier::Classifier;
use crate::config::LanguageConfigManager;
use crate::engine::ExecutionService;
use crate::evaluator::{Aggregator, SubmissionResult};
use crate::runner::CaseRunner;
use arbiter_common::clock::SessionClock;
use arbiter_common::types::{JudgeRecord, RunPhase, Submission, SubmissionRejected};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::pin::pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Receives the accumulated result after every test case
#[async_trait]
pub trait ProgressSink: Send {
    async fn publish(&mut self, snapshot: &SubmissionResult);
}

pub struct Pipeline<S> {
    service: S,
    classifier: Classifier,
    languages: LanguageConfigManager,
    request_timeout: Duration,
}

impl<S: ExecutionService> Pipeline<S> {
    pub fn new(service: S, languages: LanguageConfigManager, request_timeout: Duration) -> Self {
        Self {
            service,
            classifier: Classifier::default(),
            languages,
            request_timeout,
        }
    }

    /// Decide whether a submission may run at all. Returns the language id to use.
    pub fn admit(
        &self,
        submission: &Submission,
        clock: Option<&SessionClock>,
    ) -> Result<u32, SubmissionRejected> {
        let language_id = self.languages.language_id(&submission.language)?;
        if clock.is_some_and(|c| c.is_expired()) {
            return Err(SubmissionRejected::SessionExpired);
        }
        Ok(language_id)
    }

    #[instrument(
        skip_all,
        fields(
            job_id = %submission.id,
            language = %submission.language,
            test_cases = submission.test_cases.len()
        )
    )]
    pub async fn evaluate(
        &self,
        submission: &Submission,
        clock: Option<&SessionClock>,
        cancel: CancellationToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<SubmissionResult, SubmissionRejected> {
        let language_id = match self.admit(submission, clock) {
            Ok(id) => id,
            Err(reason) => {
                warn!(job_id = %submission.id, reason = %reason, "Submission rejected");
                return Err(reason);
            }
        };

        let mut aggregator = Aggregator::new(submission.test_cases.len());
        let runner = CaseRunner::new(
            submission,
            language_id,
            &self.service,
            &self.classifier,
            self.request_timeout,
        )
        .with_clock(clock)
        .with_cancellation(cancel.clone());

        let mut results = pin!(runner.into_stream());
        while let Some(result) = results.next().await {
            aggregator.push(result);
            sink.publish(&aggregator.snapshot()).await;
        }

        let phase = if aggregator.is_complete() {
            RunPhase::Completed
        } else if cancel.is_cancelled() {
            RunPhase::Cancelled
        } else {
            RunPhase::Expired
        };
        let result = aggregator.finish(phase);

        info!(
            job_id = %submission.id,
            phase = ?result.phase,
            overall = ?result.overall_status(),
            passed = result.passed,
            total = result.total,
            "Submission evaluated"
        );
        Ok(result)
    }

    /// Evaluate a queued submission and produce the record to store for it.
    ///
    /// The session clock is rebuilt from the submission's deadline as seen at `now`,
    /// so time spent waiting in the queue is already gone from the budget.
    pub async fn judge(
        &self,
        submission: &Submission,
        now: DateTime<Utc>,
        cancel: CancellationToken,
        sink: &mut dyn ProgressSink,
    ) -> JudgeRecord {
        let clock = submission.remaining_budget(now).map(SessionClock::start);
        match self.evaluate(submission, clock.as_deref(), cancel, sink).await {
            Ok(result) => JudgeRecord::Judged(result.report(submission.id)),
            Err(reason) => JudgeRecord::Rejected {
                job_id: submission.id,
                reason,
            },
        }
    }
}
