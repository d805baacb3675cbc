// HTTP route handlers for the Arbiter API

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use arbiter_common::clock::SessionClock;
use arbiter_common::redis;
use arbiter_common::storage::{ObjectStore, StorageError, DEFAULT_PRESIGN_TTL};
use arbiter_common::types::{
    deadline_after, Language, Submission, SubmissionRejected, TestCase,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::language_config::LanguageRegistry;
use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub language: Language,
    pub source_code: String,
    pub test_cases: Vec<TestCaseInput>,
}

#[derive(Debug, Deserialize)]
pub struct TestCaseInput {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub budget_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub attempt_id: Uuid,
    #[serde(flatten)]
    pub clock: arbiter_common::clock::ClockState,
}

/// Admission gate: language must be enabled and the attempt clock still running.
/// Produces the queued form of the submission with ordinals assigned in order.
pub fn admit(
    languages: &LanguageRegistry,
    clock: Option<&SessionClock>,
    attempt_id: Option<Uuid>,
    payload: SubmitRequest,
    now: DateTime<Utc>,
) -> Result<Submission, SubmissionRejected> {
    languages.check(payload.language)?;
    if clock.is_some_and(|c| c.is_expired()) {
        return Err(SubmissionRejected::SessionExpired);
    }

    let test_cases = payload
        .test_cases
        .into_iter()
        .enumerate()
        .map(|(idx, tc)| TestCase {
            ordinal: (idx + 1) as u32,
            input: tc.input,
            expected_output: tc.expected_output,
            hidden: tc.hidden,
        })
        .collect();

    Ok(Submission {
        id: Uuid::new_v4(),
        attempt_id,
        language: payload.language,
        source_code: payload.source_code,
        test_cases,
        deadline: clock.map(|c| deadline_after(now, c.remaining())),
    })
}

fn rejection_response(reason: SubmissionRejected) -> Response {
    let status = match reason {
        SubmissionRejected::SessionExpired => StatusCode::FORBIDDEN,
        SubmissionRejected::UnsupportedLanguage { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    let label = match reason {
        SubmissionRejected::SessionExpired => "session_expired",
        SubmissionRejected::UnsupportedLanguage { .. } => "unsupported_language",
    };
    metrics::SUBMISSIONS_REJECTED.with_label_values(&[label]).inc();

    (
        status,
        Json(serde_json::json!({
            "error": reason.to_string(),
            "reason": reason,
        })),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

async fn queue_submission(state: &AppState, submission: Submission) -> Response {
    let job_id = submission.id;
    let mut conn = state.redis.clone();
    match redis::push_submission(&mut conn, &submission).await {
        Ok(_) => {
            metrics::SUBMISSIONS_QUEUED.inc();
            info!(
                job_id = %job_id,
                language = %submission.language,
                test_cases = submission.test_cases.len(),
                deadline = ?submission.deadline,
                "Submission queued"
            );
            (
                StatusCode::CREATED,
                Json(SubmitResponse {
                    job_id: job_id.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to queue submission");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to queue submission: {}", e),
            )
        }
    }
}

/// One week
pub const MAX_ATTEMPT_BUDGET_SECS: u64 = 7 * 24 * 60 * 60;

/// POST /attempts - Start a timed contest attempt
pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartAttemptRequest>,
) -> Response {
    if payload.budget_secs > MAX_ATTEMPT_BUDGET_SECS {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("budget_secs may not exceed {}", MAX_ATTEMPT_BUDGET_SECS),
        );
    }

    let (attempt_id, clock) = state
        .attempts
        .start(Duration::from_secs(payload.budget_secs))
        .await;
    let clock_state = clock.state();
    metrics::ATTEMPTS_STARTED.inc();

    info!(attempt_id = %attempt_id, budget_secs = payload.budget_secs, "Attempt started");
    (
        StatusCode::CREATED,
        Json(AttemptResponse {
            attempt_id,
            clock: clock_state,
        }),
    )
        .into_response()
}

/// GET /attempts/:attempt_id - Remaining budget for an attempt
pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Response {
    match state.attempts.get(&attempt_id).await {
        Some(clock) => Json(AttemptResponse {
            attempt_id,
            clock: clock.state(),
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Unknown attempt"),
    }
}

/// POST /attempts/:attempt_id/submissions - Submit within a timed attempt
pub async fn submit_for_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    let Some(clock) = state.attempts.get(&attempt_id).await else {
        return error_response(StatusCode::NOT_FOUND, "Unknown attempt");
    };

    let now = Utc::now();
    match admit(&state.languages, Some(clock.as_ref()), Some(attempt_id), payload, now) {
        Ok(submission) => queue_submission(&state, submission).await,
        Err(reason) => {
            warn!(attempt_id = %attempt_id, reason = %reason, "Submission rejected");
            rejection_response(reason)
        }
    }
}

/// POST /submissions - Untimed practice submission
pub async fn submit_practice(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    match admit(&state.languages, None, None, payload, Utc::now()) {
        Ok(submission) => queue_submission(&state, submission).await,
        Err(reason) => {
            warn!(reason = %reason, "Submission rejected");
            rejection_response(reason)
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// GET /job/:job_id - Latest (partial or final) result
pub async fn get_job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let Ok(job_uuid) = Uuid::parse_str(&job_id) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid job ID format");
    };

    let mut conn = state.redis.clone();
    match redis::get_record(&mut conn, &job_uuid).await {
        Ok(Some(record)) => {
            info!(job_id = %job_id, status = %record.status_label(), "Job result retrieved");
            (StatusCode::OK, Json(record)).into_response()
        }
        Ok(None) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "job_id": job_id,
                "status": "pending",
                "message": "Submission is queued and no test case has reported yet"
            })),
        )
            .into_response(),
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to fetch job result");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to query job status: {}", e),
            )
        }
    }
}

/// DELETE /job/:job_id - Caller abandons an evaluation
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Response {
    let mut conn = state.redis.clone();
    match redis::request_cancel(&mut conn, &job_id).await {
        Ok(()) => {
            info!(job_id = %job_id, "Cancellation requested");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "job_id": job_id, "status": "cancelling" })),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to request cancellation");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub folder: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct PresignQuery {
    pub key: String,
    #[serde(default = "default_presign_ttl")]
    pub ttl_secs: u64,
}

fn default_presign_ttl() -> u64 {
    DEFAULT_PRESIGN_TTL.as_secs()
}

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

fn storage_error_response(e: StorageError) -> Response {
    let status = match e {
        StorageError::InvalidKey(_) | StorageError::InvalidTtl(_) => StatusCode::BAD_REQUEST,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidSignature | StorageError::Expired => StatusCode::FORBIDDEN,
        StorageError::Io(_) | StorageError::SigningKey(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, "Object storage failure");
    }
    error_response(status, e.to_string())
}

/// POST /assets?folder= - Store an uploaded asset
pub async fn upload_asset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    match state.store.put(&query.folder, &body, content_type).await {
        Ok(object) => {
            metrics::ASSETS_STORED.inc();
            info!(key = %object.key, size = body.len(), "Asset stored");
            (StatusCode::CREATED, Json(object)).into_response()
        }
        Err(e) => storage_error_response(e),
    }
}

/// DELETE /assets?key= - Remove an asset
pub async fn delete_asset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeyQuery>,
) -> Response {
    match state.store.delete(&query.key).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => storage_error_response(e),
    }
}

/// GET /assets/presign?key=&ttl_secs= - Time-limited read url
pub async fn presign_asset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PresignQuery>,
) -> Response {
    match state.store.presign(&query.key, Duration::from_secs(query.ttl_secs)) {
        Ok(url) => Json(serde_json::json!({ "url": url })).into_response(),
        Err(e) => storage_error_response(e),
    }
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// GET /files/*key?expires=&signature= - Serve an asset through a presigned url
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Response {
    match state
        .store
        .read_signed(&key, query.expires, &query.signature, Utc::now())
        .await
    {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_for(&key))],
            bytes,
        )
            .into_response(),
        Err(e) => storage_error_response(e),
    }
}
