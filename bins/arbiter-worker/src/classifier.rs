/// Outcome Classifier - raw service response -> verdict
///
/// **Core Responsibility:**
/// Map the service's status id onto our closed set of verdict kinds and pick
/// the payload field that explains it.
///
/// **Critical Properties:**
/// - Never fails: missing fields degrade to `NO_DETAIL`
/// - Pure: the same response always classifies the same way
/// - Status ids live in a versioned table; ids not in it become `Unknown`
///
/// `Accepted` here only means the program ran cleanly. Whether the output is
/// right is decided later by the runner.
use crate::encoding::{self, DecodeError};
use crate::engine::RawResponse;
use arbiter_common::types::VerdictKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Shown when the field a verdict would normally explain itself with is absent
pub const NO_DETAIL: &str = "<no details provided>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailSource {
    Stdout,
    Stderr,
    CompileOutput,
    Message,
    Nothing,
    /// stderr, else stdout, else compile output, else message
    FirstAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRule {
    pub verdict: VerdictKind,
    pub detail: DetailSource,
}

/// Status id -> verdict lookup for one version of the service's status enumeration
#[derive(Debug, Clone)]
pub struct StatusTable {
    version: &'static str,
    rules: HashMap<u32, StatusRule>,
}

fn rule(verdict: VerdictKind, detail: DetailSource) -> StatusRule {
    StatusRule { verdict, detail }
}

impl StatusTable {
    pub fn v1() -> Self {
        let rules = HashMap::from([
            (3, rule(VerdictKind::Accepted, DetailSource::Stdout)),
            (5, rule(VerdictKind::TimeLimitExceeded, DetailSource::Nothing)),
            (6, rule(VerdictKind::CompileError, DetailSource::CompileOutput)),
            (11, rule(VerdictKind::RuntimeError, DetailSource::Stderr)),
            (13, rule(VerdictKind::InternalError, DetailSource::Message)),
        ]);
        Self { version: "v1", rules }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn lookup(&self, status_id: u32) -> Option<StatusRule> {
        self.rules.get(&status_id).copied()
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::v1()
    }
}

/// Classified result of running one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub verdict: VerdictKind,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    /// Human-readable explanation chosen by the status rule
    pub detail: String,
    pub status_description: Option<String>,
    pub time_secs: Option<f64>,
    pub memory_kb: Option<u64>,
}

impl ExecutionOutcome {
    /// Outcome for a case whose execution never produced a usable response
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self {
            verdict: VerdictKind::InternalError,
            stdout: String::new(),
            stderr: String::new(),
            compile_output: String::new(),
            detail: detail.into(),
            status_description: None,
            time_secs: None,
            memory_kb: None,
        }
    }
}

struct DecodedStreams {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
}

fn decode_field(
    name: &str,
    value: Option<&str>,
) -> Result<Option<String>, (String, DecodeError)> {
    value
        .map(encoding::decode)
        .transpose()
        .map_err(|e| (name.to_string(), e))
}

fn decode_streams(raw: &RawResponse) -> Result<DecodedStreams, (String, DecodeError)> {
    Ok(DecodedStreams {
        stdout: decode_field("stdout", raw.stdout.as_deref())?,
        stderr: decode_field("stderr", raw.stderr.as_deref())?,
        compile_output: decode_field("compile_output", raw.compile_output.as_deref())?,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    table: StatusTable,
}

impl Classifier {
    pub fn new(table: StatusTable) -> Self {
        Self { table }
    }

    pub fn classify(&self, raw: &RawResponse) -> ExecutionOutcome {
        // Service-side faults carry no usable status
        if let Some(error) = &raw.error {
            return ExecutionOutcome::internal_error(error.clone());
        }
        let Some(status) = &raw.status else {
            let detail = raw.message.clone().unwrap_or_else(|| NO_DETAIL.to_string());
            return ExecutionOutcome::internal_error(detail);
        };

        let streams = match decode_streams(raw) {
            Ok(streams) => streams,
            Err((field, e)) => {
                return ExecutionOutcome::internal_error(format!(
                    "malformed {} payload: {}",
                    field, e
                ));
            }
        };

        let rule = match status.id.and_then(|id| self.table.lookup(id)) {
            Some(rule) => rule,
            None => {
                warn!(
                    status_id = status.id,
                    description = status.description.as_deref().unwrap_or(""),
                    table = self.table.version(),
                    "Unrecognized execution status, classifying as Unknown"
                );
                StatusRule {
                    verdict: VerdictKind::Unknown,
                    detail: DetailSource::FirstAvailable,
                }
            }
        };

        let detail = match rule.detail {
            DetailSource::Stdout => non_empty(&streams.stdout),
            DetailSource::Stderr => non_empty(&streams.stderr),
            DetailSource::CompileOutput => non_empty(&streams.compile_output),
            DetailSource::Message => non_empty(&raw.message),
            DetailSource::Nothing => None,
            DetailSource::FirstAvailable => non_empty(&streams.stderr)
                .or_else(|| non_empty(&streams.stdout))
                .or_else(|| non_empty(&streams.compile_output))
                .or_else(|| non_empty(&raw.message)),
        }
        .unwrap_or(NO_DETAIL)
        .to_string();

        ExecutionOutcome {
            verdict: rule.verdict,
            detail,
            stdout: streams.stdout.unwrap_or_default(),
            stderr: streams.stderr.unwrap_or_default(),
            compile_output: streams.compile_output.unwrap_or_default(),
            status_description: status.description.clone(),
            time_secs: raw.time,
            memory_kb: raw.memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::encode;
    use crate::engine::RawStatus;

    fn response(id: u32) -> RawResponse {
        RawResponse {
            status: Some(RawStatus {
                id: Some(id),
                description: Some(format!("status {}", id)),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_accepted_uses_stdout() {
        let mut raw = response(3);
        raw.stdout = Some(encode("42\n"));
        raw.time = Some(0.01);
        raw.memory = Some(1024);

        let outcome = Classifier::default().classify(&raw);

        assert_eq!(outcome.verdict, VerdictKind::Accepted);
        assert_eq!(outcome.stdout, "42\n");
        assert_eq!(outcome.detail, "42\n");
        assert_eq!(outcome.time_secs, Some(0.01));
        assert_eq!(outcome.memory_kb, Some(1024));
    }

    #[test]
    fn test_table_mapping() {
        let classifier = Classifier::default();
        let cases = [
            (5, VerdictKind::TimeLimitExceeded),
            (6, VerdictKind::CompileError),
            (11, VerdictKind::RuntimeError),
            (13, VerdictKind::InternalError),
            (4, VerdictKind::Unknown),
            (14, VerdictKind::Unknown),
        ];
        for (id, expected) in cases {
            assert_eq!(classifier.classify(&response(id)).verdict, expected, "status {}", id);
        }
    }

    #[test]
    fn test_compile_error_detail() {
        let mut raw = response(6);
        raw.compile_output = Some(encode("error: expected ';'"));

        let outcome = Classifier::default().classify(&raw);

        assert_eq!(outcome.verdict, VerdictKind::CompileError);
        assert_eq!(outcome.detail, "error: expected ';'");
    }

    #[test]
    fn test_runtime_error_without_stderr_gets_placeholder() {
        let outcome = Classifier::default().classify(&response(11));
        assert_eq!(outcome.verdict, VerdictKind::RuntimeError);
        assert_eq!(outcome.detail, NO_DETAIL);
        assert_eq!(outcome.stderr, "");
    }

    #[test]
    fn test_internal_error_uses_message() {
        let mut raw = response(13);
        raw.message = Some("sandbox crashed".to_string());
        let outcome = Classifier::default().classify(&raw);
        assert_eq!(outcome.verdict, VerdictKind::InternalError);
        assert_eq!(outcome.detail, "sandbox crashed");
    }

    #[test]
    fn test_unknown_status_best_effort_detail() {
        let mut raw = response(99);
        raw.stdout = Some(encode("partial"));
        raw.compile_output = Some(encode("warning"));
        let outcome = Classifier::default().classify(&raw);
        assert_eq!(outcome.verdict, VerdictKind::Unknown);
        assert_eq!(outcome.detail, "partial");

        raw.stderr = Some(encode("boom"));
        assert_eq!(Classifier::default().classify(&raw).detail, "boom");

        let mut only_message = response(99);
        only_message.message = Some("odd".to_string());
        assert_eq!(Classifier::default().classify(&only_message).detail, "odd");
    }

    #[test]
    fn test_missing_status_id_is_unknown() {
        let raw = RawResponse {
            status: Some(RawStatus {
                id: None,
                description: Some("???".to_string()),
            }),
            ..Default::default()
        };
        let outcome = Classifier::default().classify(&raw);
        assert_eq!(outcome.verdict, VerdictKind::Unknown);
        assert_eq!(outcome.detail, NO_DETAIL);
    }

    #[test]
    fn test_missing_status_or_error_field_is_internal_error() {
        let no_status = RawResponse {
            message: Some("queue is full".to_string()),
            ..Default::default()
        };
        let outcome = Classifier::default().classify(&no_status);
        assert_eq!(outcome.verdict, VerdictKind::InternalError);
        assert_eq!(outcome.detail, "queue is full");

        let empty = Classifier::default().classify(&RawResponse::default());
        assert_eq!(empty.verdict, VerdictKind::InternalError);
        assert_eq!(empty.detail, NO_DETAIL);

        let mut errored = response(3);
        errored.error = Some("language with id 999 doesn't exist".to_string());
        let outcome = Classifier::default().classify(&errored);
        assert_eq!(outcome.verdict, VerdictKind::InternalError);
        assert_eq!(outcome.detail, "language with id 999 doesn't exist");
    }

    #[test]
    fn test_malformed_payload_is_internal_error() {
        let mut raw = response(3);
        raw.stdout = Some("%%% not base64 %%%".to_string());
        let outcome = Classifier::default().classify(&raw);
        assert_eq!(outcome.verdict, VerdictKind::InternalError);
        assert!(outcome.detail.starts_with("malformed stdout payload"));
        assert_eq!(outcome.stdout, "");
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = Classifier::default();
        for id in [3, 5, 6, 11, 13, 42] {
            let mut raw = response(id);
            raw.stderr = Some(encode("trace"));
            assert_eq!(classifier.classify(&raw), classifier.classify(&raw));
        }
    }

    #[test]
    fn test_table_version() {
        let table = StatusTable::v1();
        assert_eq!(table.version(), "v1");
        assert_eq!(table.lookup(4), None);
        assert_eq!(table.lookup(3).map(|r| r.verdict), Some(VerdictKind::Accepted));
    }
}
