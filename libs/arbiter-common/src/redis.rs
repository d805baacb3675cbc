use crate::types::{JudgeRecord, Submission};
use redis::{AsyncCommands, RedisResult};

/// Redis queue semantics shared by API and worker.
/// Keys are deterministic so either side can find a job's state from its id.

pub const QUEUE_NAME: &str = "arbiter:queue:submissions";
pub const RESULT_PREFIX: &str = "arbiter:result";
pub const STATUS_PREFIX: &str = "arbiter:status";
pub const CANCEL_PREFIX: &str = "arbiter:cancel";

/// Results and flags expire after 24 hours
pub const RECORD_TTL_SECS: u64 = 86400;

pub fn result_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

pub fn status_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, job_id)
}

pub fn cancel_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", CANCEL_PREFIX, job_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Push a submission onto the queue (RPUSH, FIFO with BLPOP)
pub async fn push_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload = serde_json::to_string(submission).map_err(serialization_error)?;
    conn.rpush(QUEUE_NAME, payload).await
}

/// Pop the next submission, waiting at most `timeout_seconds`
pub async fn pop_submission(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<Submission>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_NAME, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let submission: Submission = serde_json::from_str(&payload).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(submission))
        }
        None => Ok(None),
    }
}

/// Store a partial or final record. Overwrites whatever was stored before,
/// so readers always see the latest snapshot.
pub async fn store_record(
    conn: &mut redis::aio::ConnectionManager,
    record: &JudgeRecord,
) -> RedisResult<()> {
    let job_id = record.job_id();
    let payload = serde_json::to_string(record).map_err(serialization_error)?;
    let _: () = conn.set_ex(result_key(&job_id), payload, RECORD_TTL_SECS).await?;

    let _: () = conn
        .set_ex(status_key(&job_id), record.status_label(), RECORD_TTL_SECS)
        .await?;

    Ok(())
}

pub async fn get_record(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<Option<JudgeRecord>> {
    let payload: Option<String> = conn.get(result_key(job_id)).await?;

    match payload {
        Some(data) => {
            let record: JudgeRecord = serde_json::from_str(&data).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Flag a job as abandoned by its caller
pub async fn request_cancel(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<()> {
    conn.set_ex(cancel_key(job_id), "1", RECORD_TTL_SECS).await
}

pub async fn is_job_cancelled(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<bool> {
    conn.exists(cancel_key(job_id)).await
}
