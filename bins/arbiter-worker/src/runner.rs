/// Test Case Runner - ordered, one-shot walk over a submission's test cases
///
/// For each case, in ordinal order: encode stdin, dispatch to the execution
/// service, classify the response and judge the output. Exactly one result is
/// yielded per case before the next case is dispatched.
///
/// **Failure handling:**
/// - Transport failures and request timeouts become an Internal Error for that
///   case only; later cases still run
/// - Cancellation or an expired session clock ends the sequence early
/// - Nothing is retried
use crate::classifier::{Classifier, ExecutionOutcome};
use crate::encoding::encode;
use crate::engine::{ExecutionRequest, ExecutionService, TransportError};
use crate::evaluator::TestCaseResult;
use arbiter_common::clock::SessionClock;
use arbiter_common::types::{Submission, TestCase};
use futures_util::stream::{self, Stream};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct CaseRunner<'a> {
    job_id: Uuid,
    service: &'a dyn ExecutionService,
    classifier: &'a Classifier,
    language_id: u32,
    encoded_source: String,
    cases: std::slice::Iter<'a, TestCase>,
    request_timeout: Duration,
    clock: Option<&'a SessionClock>,
    cancel: CancellationToken,
    halted: bool,
}

impl<'a> CaseRunner<'a> {
    pub fn new(
        submission: &'a Submission,
        language_id: u32,
        service: &'a dyn ExecutionService,
        classifier: &'a Classifier,
        request_timeout: Duration,
    ) -> Self {
        Self {
            job_id: submission.id,
            service,
            classifier,
            language_id,
            encoded_source: encode(&submission.source_code),
            cases: submission.test_cases.iter(),
            request_timeout,
            clock: None,
            cancel: CancellationToken::new(),
            halted: false,
        }
    }

    pub fn with_clock(mut self, clock: Option<&'a SessionClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn halt(&mut self, reason: &str) -> Option<TestCaseResult> {
        info!(
            job_id = %self.job_id,
            remaining = self.cases.len(),
            reason,
            "Stopping before remaining test cases"
        );
        self.halted = true;
        None
    }

    /// Run the next test case. `None` once every case has reported or the run
    /// was halted; a halted runner never resumes.
    pub async fn next_result(&mut self) -> Option<TestCaseResult> {
        if self.halted {
            return None;
        }
        if self.cases.as_slice().is_empty() {
            return None;
        }
        if self.cancel.is_cancelled() {
            return self.halt("cancelled");
        }
        if self.clock.is_some_and(|clock| clock.is_expired()) {
            return self.halt("session clock expired");
        }

        let test_case = self.cases.next()?;
        let request = ExecutionRequest {
            source_code: self.encoded_source.clone(),
            language_id: self.language_id,
            stdin: encode(&test_case.input),
        };

        debug!(job_id = %self.job_id, ordinal = test_case.ordinal, "Dispatching test case");
        let cancel = self.cancel.clone();
        let dispatch = tokio::time::timeout(self.request_timeout, self.service.execute(&request));
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            response = dispatch => Some(response),
        };
        // An abandoned run discards whatever the in-flight request produced
        let Some(response) = response else {
            return self.halt("cancelled during dispatch");
        };

        let outcome = match response {
            Ok(Ok(raw)) => self.classifier.classify(&raw),
            Ok(Err(e)) => {
                warn!(
                    job_id = %self.job_id,
                    ordinal = test_case.ordinal,
                    error = %e,
                    "Execution request failed"
                );
                ExecutionOutcome::internal_error(e.to_string())
            }
            Err(_) => {
                let e = TransportError::Timeout(self.request_timeout);
                warn!(
                    job_id = %self.job_id,
                    ordinal = test_case.ordinal,
                    error = %e,
                    "Execution request timed out"
                );
                ExecutionOutcome::internal_error(e.to_string())
            }
        };

        let result = TestCaseResult::judge(test_case, outcome);
        info!(
            job_id = %self.job_id,
            ordinal = result.ordinal,
            hidden = result.hidden,
            passed = result.passed,
            verdict = ?result.verdict(),
            "Test case judged"
        );
        Some(result)
    }

    /// The runner as a lazy, finite stream of results in ordinal order.
    pub fn into_stream(self) -> impl Stream<Item = TestCaseResult> + 'a {
        stream::unfold(self, |mut runner| async move {
            runner.next_result().await.map(|result| (result, runner))
        })
    }
}
