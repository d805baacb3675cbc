// In-process execution service for runner and pipeline tests.
// By default it behaves like an echo program: stdout == stdin, status 3.

use crate::encoding::{decode, encode};
use crate::engine::{ExecutionRequest, ExecutionService, RawResponse, RawStatus, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum Behavior {
    Respond(RawResponse),
    HttpStatus(u16),
    Unreachable,
    /// Never answers
    Hang,
}

#[derive(Clone, Default)]
pub struct FakeService {
    by_stdin: HashMap<String, Behavior>,
    calls: Arc<Mutex<Vec<String>>>,
}

pub fn status(id: u32) -> RawResponse {
    RawResponse {
        status: Some(RawStatus {
            id: Some(id),
            description: Some(format!("status {}", id)),
        }),
        time: Some(0.004),
        memory: Some(3200),
        ..Default::default()
    }
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, stdin: &str, behavior: Behavior) -> Self {
        self.by_stdin.insert(stdin.to_string(), behavior);
        self
    }

    /// Decoded stdin of every request received, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionService for FakeService {
    async fn execute(&self, request: &ExecutionRequest) -> Result<RawResponse, TransportError> {
        let stdin = decode(&request.stdin).expect("runner must send base64 stdin");
        self.calls.lock().unwrap().push(stdin.clone());

        match self.by_stdin.get(&stdin).cloned() {
            Some(Behavior::Respond(raw)) => Ok(raw),
            Some(Behavior::HttpStatus(code)) => Err(TransportError::Status {
                status: code,
                body: "{\"error\":\"unavailable\"}".to_string(),
            }),
            Some(Behavior::Unreachable) => {
                Err(TransportError::Network("connection refused".to_string()))
            }
            Some(Behavior::Hang) => std::future::pending().await,
            None => {
                let mut raw = status(3);
                raw.stdout = Some(encode(&stdin));
                Ok(raw)
            }
        }
    }
}
