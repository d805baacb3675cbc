/// Test Evaluator - output comparison and result aggregation
///
/// **Core Responsibility:**
/// Decide whether a clean run produced the right answer, and fold per-case
/// results into a submission-level verdict.
///
/// **Critical Properties:**
/// - Knows nothing about HTTP or the execution service
/// - Knows nothing about Redis
/// - The aggregator is a plain owned value: snapshots never block and reflect
///   exactly the results pushed so far
///
/// **Normalization Rules:**
/// - Trailing whitespace on each line: ignored (covers \r\n vs \n)
/// - Trailing blank lines: ignored
/// - Leading whitespace and internal spacing: significant
/// - Case: significant
/// - Floating-point tolerance: none
///
/// **Overall Status:**
/// Accepted iff every case passed. Otherwise the first failing case decides,
/// except that a compile error, runtime error or timeout anywhere is reported
/// ahead of plain wrong answers.
use crate::classifier::ExecutionOutcome;
use arbiter_common::types::{
    CaseReport, FailureDetail, RunPhase, SubmissionReport, TestCase, VerdictKind,
};
use uuid::Uuid;

pub fn normalize_output(output: &str) -> String {
    let mut lines: Vec<&str> = output.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

/// Result of one test case as seen inside the pipeline.
///
/// Carries the full outcome and expected output; `report` strips what a
/// hidden case must not reveal.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseResult {
    pub ordinal: u32,
    pub hidden: bool,
    pub passed: bool,
    pub expected_output: String,
    pub outcome: ExecutionOutcome,
}

impl TestCaseResult {
    /// Judge a classified outcome against its test case.
    pub fn judge(test_case: &TestCase, mut outcome: ExecutionOutcome) -> Self {
        let matches = outputs_match(&outcome.stdout, &test_case.expected_output);
        let passed = match outcome.verdict {
            VerdictKind::Accepted if matches => true,
            VerdictKind::Accepted => {
                outcome.verdict = VerdictKind::WrongAnswer;
                false
            }
            _ => false,
        };

        Self {
            ordinal: test_case.ordinal,
            hidden: test_case.hidden,
            passed,
            expected_output: test_case.expected_output.clone(),
            outcome,
        }
    }

    pub fn verdict(&self) -> VerdictKind {
        self.outcome.verdict
    }

    pub fn report(&self) -> CaseReport {
        if self.hidden {
            return CaseReport {
                ordinal: self.ordinal,
                hidden: true,
                passed: self.passed,
                verdict: None,
                time_secs: None,
                memory_kb: None,
            };
        }
        CaseReport {
            ordinal: self.ordinal,
            hidden: false,
            passed: self.passed,
            verdict: Some(self.outcome.verdict),
            time_secs: self.outcome.time_secs,
            memory_kb: self.outcome.memory_kb,
        }
    }
}

/// Submission-level view over the results received so far
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub results: Vec<TestCaseResult>,
    pub passed: usize,
    pub total: usize,
    pub phase: RunPhase,
}

impl SubmissionResult {
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.total
    }

    pub fn score(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }

    /// `None` while every received case passed but some are still outstanding.
    pub fn overall_status(&self) -> Option<VerdictKind> {
        let mut failures = self.results.iter().filter(|r| !r.passed);
        let Some(first) = failures.next() else {
            return self.is_complete().then_some(VerdictKind::Accepted);
        };
        if first.verdict().takes_precedence() {
            return Some(first.verdict());
        }
        let severe = failures.find(|r| r.verdict().takes_precedence());
        Some(severe.unwrap_or(first).verdict())
    }

    pub fn report(&self, job_id: Uuid) -> SubmissionReport {
        let first_failure = self
            .results
            .iter()
            .find(|r| !r.passed && !r.hidden)
            .map(|r| FailureDetail {
                ordinal: r.ordinal,
                verdict: r.verdict(),
                detail: r.outcome.detail.clone(),
                expected_output: r.expected_output.clone(),
                actual_output: r.outcome.stdout.clone(),
            });

        SubmissionReport {
            job_id,
            phase: self.phase,
            overall: self.overall_status(),
            passed: self.passed,
            total: self.total,
            score: self.score(),
            results: self.results.iter().map(TestCaseResult::report).collect(),
            first_failure,
        }
    }
}

/// Streaming accumulator for one submission's results
#[derive(Debug, Clone)]
pub struct Aggregator {
    total: usize,
    results: Vec<TestCaseResult>,
    passed: usize,
}

impl Aggregator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            results: Vec::with_capacity(total),
            passed: 0,
        }
    }

    pub fn push(&mut self, result: TestCaseResult) {
        debug_assert!(self.results.len() < self.total, "more results than test cases");
        if result.passed {
            self.passed += 1;
        }
        self.results.push(result);
    }

    pub fn passed_count(&self) -> usize {
        self.passed
    }

    pub fn completed(&self) -> usize {
        self.results.len()
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() == self.total
    }

    pub fn snapshot(&self) -> SubmissionResult {
        SubmissionResult {
            results: self.results.clone(),
            passed: self.passed,
            total: self.total,
            phase: RunPhase::Running,
        }
    }

    pub fn finish(self, phase: RunPhase) -> SubmissionResult {
        SubmissionResult {
            results: self.results,
            passed: self.passed,
            total: self.total,
            phase,
        }
    }
}

/// One-shot reduction over a finished sequence of results
pub fn fold<I>(total: usize, results: I) -> SubmissionResult
where
    I: IntoIterator<Item = TestCaseResult>,
{
    let mut aggregator = Aggregator::new(total);
    for result in results {
        aggregator.push(result);
    }
    let phase = if aggregator.is_complete() {
        RunPhase::Completed
    } else {
        RunPhase::Running
    };
    aggregator.finish(phase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_case(ordinal: u32, expected_output: &str, hidden: bool) -> TestCase {
        TestCase {
            ordinal,
            input: "input".to_string(),
            expected_output: expected_output.to_string(),
            hidden,
        }
    }

    fn make_outcome(verdict: VerdictKind, stdout: &str, detail: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            verdict,
            stdout: stdout.to_string(),
            stderr: String::new(),
            compile_output: String::new(),
            detail: detail.to_string(),
            status_description: None,
            time_secs: Some(0.01),
            memory_kb: Some(2048),
        }
    }

    fn passing(ordinal: u32) -> TestCaseResult {
        TestCaseResult::judge(
            &make_test_case(ordinal, "ok", false),
            make_outcome(VerdictKind::Accepted, "ok\n", "ok\n"),
        )
    }

    fn failing(ordinal: u32, verdict: VerdictKind, hidden: bool) -> TestCaseResult {
        TestCaseResult::judge(
            &make_test_case(ordinal, "ok", hidden),
            make_outcome(verdict, "nope", "why"),
        )
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("hello"), "hello");
        assert_eq!(normalize_output("hello  \n"), "hello");
        assert_eq!(normalize_output("a \r\nb\t\r\n\n\n"), "a\nb");
        assert_eq!(normalize_output("  indented"), "  indented");
        assert_eq!(normalize_output(""), "");
        assert_eq!(normalize_output("\n\n"), "");
    }

    #[test]
    fn test_outputs_match_rules() {
        assert!(outputs_match("abc\n", "abc"));
        assert!(!outputs_match("abc\ndef", "abc\n def"));
        assert!(!outputs_match("Hello", "hello"));
        assert!(!outputs_match("1.0", "1.00"));
        assert!(outputs_match("1 2 3   \n4\n\n", "1 2 3\n4"));
        assert!(!outputs_match("a\n\nb", "a\nb"));
    }

    #[test]
    fn test_judge_accepted_and_matching() {
        let result = passing(1);
        assert!(result.passed);
        assert_eq!(result.verdict(), VerdictKind::Accepted);
    }

    #[test]
    fn test_judge_mismatch_becomes_wrong_answer() {
        let result = TestCaseResult::judge(
            &make_test_case(2, "120", false),
            make_outcome(VerdictKind::Accepted, "121\n", "121\n"),
        );
        assert!(!result.passed);
        assert_eq!(result.verdict(), VerdictKind::WrongAnswer);
    }

    #[test]
    fn test_judge_non_accepted_never_passes() {
        // Right output but the run itself errored
        let result = TestCaseResult::judge(
            &make_test_case(1, "ok", false),
            make_outcome(VerdictKind::RuntimeError, "ok", "segfault"),
        );
        assert!(!result.passed);
        assert_eq!(result.verdict(), VerdictKind::RuntimeError);
    }

    #[test]
    fn test_all_pass() {
        let result = fold(3, vec![passing(1), passing(2), passing(3)]);

        assert_eq!(result.overall_status(), Some(VerdictKind::Accepted));
        assert_eq!(result.passed, 3);
        assert_eq!(result.total, 3);
        assert_eq!(result.score(), 1.0);
        assert_eq!(result.phase, RunPhase::Completed);
    }

    #[test]
    fn test_compile_error_decides_overall() {
        let result = fold(
            3,
            vec![passing(1), failing(2, VerdictKind::CompileError, false), passing(3)],
        );

        assert_eq!(result.overall_status(), Some(VerdictKind::CompileError));
        assert_eq!(result.passed, 2);
        assert!((result.score() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_severe_failure_outranks_earlier_wrong_answer() {
        let result = fold(
            3,
            vec![
                failing(1, VerdictKind::WrongAnswer, false),
                failing(2, VerdictKind::TimeLimitExceeded, false),
                failing(3, VerdictKind::RuntimeError, false),
            ],
        );
        assert_eq!(result.overall_status(), Some(VerdictKind::TimeLimitExceeded));
    }

    #[test]
    fn test_first_failure_wins_without_severe_kinds() {
        let result = fold(
            2,
            vec![
                failing(1, VerdictKind::InternalError, false),
                failing(2, VerdictKind::WrongAnswer, false),
            ],
        );
        assert_eq!(result.overall_status(), Some(VerdictKind::InternalError));
    }

    #[test]
    fn test_partial_snapshot_has_no_overall_until_failure() {
        let mut aggregator = Aggregator::new(3);
        assert_eq!(aggregator.snapshot().overall_status(), None);

        aggregator.push(passing(1));
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.overall_status(), None);
        assert_eq!(snapshot.phase, RunPhase::Running);
        assert_eq!(aggregator.completed(), 1);

        aggregator.push(failing(2, VerdictKind::WrongAnswer, false));
        assert_eq!(aggregator.snapshot().overall_status(), Some(VerdictKind::WrongAnswer));
    }

    #[test]
    fn test_passed_count_is_monotonic() {
        let sequence = vec![
            passing(1),
            failing(2, VerdictKind::WrongAnswer, false),
            passing(3),
            failing(4, VerdictKind::RuntimeError, true),
            passing(5),
        ];
        let full = fold(5, sequence.clone()).passed;

        let mut aggregator = Aggregator::new(5);
        let mut previous = 0;
        for result in sequence {
            aggregator.push(result);
            let now = aggregator.passed_count();
            assert!(now >= previous);
            assert!(now <= full);
            previous = now;
        }
        assert_eq!(previous, full);
        assert!(aggregator.is_complete());
    }

    #[test]
    fn test_zero_cases_is_vacuously_accepted() {
        let result = fold(0, Vec::new());
        assert_eq!(result.overall_status(), Some(VerdictKind::Accepted));
        assert_eq!(result.score(), 1.0);
    }

    #[test]
    fn test_hidden_failure_reveals_only_pass_fail() {
        let result = fold(
            2,
            vec![passing(1), failing(2, VerdictKind::WrongAnswer, true)],
        );
        let report = result.report(Uuid::new_v4());

        let hidden = &report.results[1];
        assert_eq!(
            *hidden,
            CaseReport {
                ordinal: 2,
                hidden: true,
                passed: false,
                verdict: None,
                time_secs: None,
                memory_kb: None,
            }
        );
        // No visible failure, so nothing about the hidden one leaks
        assert!(report.first_failure.is_none());
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("nope"));
    }

    #[test]
    fn test_first_failure_detail_for_visible_case() {
        let result = fold(
            3,
            vec![
                failing(1, VerdictKind::WrongAnswer, true),
                failing(2, VerdictKind::WrongAnswer, false),
                passing(3),
            ],
        );
        let report = result.report(Uuid::new_v4());
        let failure = report.first_failure.unwrap();
        assert_eq!(failure.ordinal, 2);
        assert_eq!(failure.verdict, VerdictKind::WrongAnswer);
        assert_eq!(failure.expected_output, "ok");
        assert_eq!(failure.actual_output, "nope");
        assert_eq!(report.results[1].verdict, Some(VerdictKind::WrongAnswer));
        assert_eq!(report.results[1].memory_kb, Some(2048));
    }
}
