use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Source languages the platform knows about.
///
/// Knowing a language is not the same as supporting it: only languages listed in
/// `config/languages.json` with an execution-service id may be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
    Rust,
    JavaScript,
    Go,
}

impl Language {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "c" => Some(Language::C),
            "cpp" | "c++" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "python" => Some(Language::Python),
            "rust" => Some(Language::Rust),
            "javascript" | "js" => Some(Language::JavaScript),
            "go" => Some(Language::Go),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::JavaScript => "javascript",
            Language::Go => "go",
        };
        f.write_str(name)
    }
}

/// One entry of `config/languages.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub name: String,
    pub display_name: String,
    /// Identifier the execution service uses for this compiler/runtime.
    pub language_id: u32,
    pub file_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesFile {
    pub languages: Vec<LanguageEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// 1-based position within the problem.
    pub ordinal: u32,
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub hidden: bool,
}

/// A learner's submission as it travels through the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    #[serde(default)]
    pub attempt_id: Option<Uuid>,
    pub language: Language,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
    /// Wall-clock instant the attempt's budget runs out.
    /// `None` for untimed practice submissions.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl Submission {
    /// Budget left at `now`; zero once the deadline has passed.
    pub fn remaining_budget(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.deadline
            .map(|deadline| (deadline - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// The instant `remaining` from `now`, saturating at the latest representable time.
pub fn deadline_after(now: DateTime<Utc>, remaining: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(remaining)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Closed set of verdicts a single test-case execution can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Accepted,
    WrongAnswer,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    InternalError,
    Unknown,
}

impl VerdictKind {
    /// Failures that are reported ahead of a plain wrong answer.
    pub fn takes_precedence(&self) -> bool {
        matches!(
            self,
            VerdictKind::CompileError | VerdictKind::RuntimeError | VerdictKind::TimeLimitExceeded
        )
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VerdictKind::Accepted => "Accepted",
            VerdictKind::WrongAnswer => "Wrong Answer",
            VerdictKind::CompileError => "Compile Error",
            VerdictKind::RuntimeError => "Runtime Error",
            VerdictKind::TimeLimitExceeded => "Time Limit Exceeded",
            VerdictKind::InternalError => "Internal Error",
            VerdictKind::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Why a submission was refused before any test case ran.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionRejected {
    #[error("time budget for this attempt has expired")]
    SessionExpired,

    #[error("language '{language}' is not supported")]
    UnsupportedLanguage { language: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Running,
    Completed,
    Expired,
    Cancelled,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunPhase::Running)
    }
}

/// Per-case entry visible to the submitter.
///
/// Hidden cases serialize to `{ordinal, hidden, passed}` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub ordinal: u32,
    pub hidden: bool,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub ordinal: u32,
    pub verdict: VerdictKind,
    pub detail: String,
    pub expected_output: String,
    pub actual_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub job_id: Uuid,
    pub phase: RunPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<VerdictKind>,
    pub passed: usize,
    pub total: usize,
    pub score: f64,
    pub results: Vec<CaseReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<FailureDetail>,
}

/// What gets stored for a job: either a (possibly partial) report or the rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JudgeRecord {
    Judged(SubmissionReport),
    Rejected {
        job_id: Uuid,
        reason: SubmissionRejected,
    },
}

impl JudgeRecord {
    pub fn job_id(&self) -> Uuid {
        match self {
            JudgeRecord::Judged(report) => report.job_id,
            JudgeRecord::Rejected { job_id, .. } => *job_id,
        }
    }

    /// Short status string kept alongside the full record for cheap lookups.
    pub fn status_label(&self) -> String {
        match self {
            JudgeRecord::Judged(report) => match (report.phase, report.overall) {
                (RunPhase::Running, _) => "running".to_string(),
                (_, Some(verdict)) => verdict.to_string(),
                (phase, None) => format!("{:?}", phase).to_lowercase(),
            },
            JudgeRecord::Rejected { .. } => "rejected".to_string(),
        }
    }
}
