/// Execution Engine - client side of the external execution service
///
/// **Core Responsibility:**
/// Ship base64 source + stdin to the service and hand back its raw response.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to talk to the service (HTTP, headers, wait mode)
/// - Engine does NOT interpret status codes (classifier's job)
/// - Engine does NOT compare outputs (runner's job)
///
/// Anything that prevents a well-formed response from arriving is a
/// `TransportError`; the runner turns that into an Internal Error for the case.
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// One execution request, already in wire encoding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language_id: u32,
    pub stdin: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawStatus {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Response body exactly as the service returns it. Every field is optional;
/// the classifier decides what missing fields mean.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub status: Option<RawStatus>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub time: Option<f64>,
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The service reports `time` as a string ("0.012"); accept plain numbers too.
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Number(n)) => Some(n),
        Some(Loose::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("execution service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("execution service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("execution service unreachable: {0}")]
    Network(String),

    #[error("execution service response could not be parsed: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<RawResponse, TransportError>;
}

/// HTTP client for a Judge0-compatible service, using synchronous
/// (`wait=true`) submissions.
pub struct HttpExecutionService {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpExecutionService {
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            timeout,
        })
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionService {
    #[instrument(skip(self, request), fields(language_id = request.language_id))]
    async fn execute(&self, request: &ExecutionRequest) -> Result<RawResponse, TransportError> {
        let url = format!("{}/submissions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .query(&[("base64_encoded", "true"), ("wait", "true")])
            .json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.header("X-Auth-Token", token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                e.into()
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw: RawResponse = response.json().await?;
        debug!(
            status_id = raw.status.as_ref().and_then(|s| s.id),
            time = raw.time,
            memory = raw.memory,
            "Execution service responded"
        );
        Ok(raw)
    }
}
