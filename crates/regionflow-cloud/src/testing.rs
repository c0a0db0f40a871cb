//! Test doubles for the transport boundary

use crate::error::TransportError;
use crate::transport::{Transport, TransportRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&TransportRequest) -> Result<Value, TransportError> + Send + Sync>;

/// Transport that replays queued envelopes and records every request
///
/// Queued responses are consumed first; once the queue is empty the optional
/// handler answers. With neither, the call fails with `ScriptExhausted`.
#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Result<Value, TransportError>>>,
    handler: Option<Handler>,
    sent: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `handler`
    pub fn with_handler<H>(handler: H) -> Self
    where
        H: Fn(&TransportRequest) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, envelope: Value) {
        self.queue.lock().unwrap().push_back(Ok(envelope));
    }

    pub fn push_err(&self, error: TransportError) {
        self.queue.lock().unwrap().push_back(Err(error));
    }

    /// Every request sent so far, in order
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Action names sent so far, in order
    pub fn actions(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.action.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &TransportRequest) -> Result<Value, TransportError> {
        self.sent.lock().unwrap().push(request.clone());

        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            return next;
        }

        match &self.handler {
            Some(handler) => handler(request),
            None => Err(TransportError::new(
                "ScriptExhausted",
                format!("no scripted response for {}", request.action),
            )),
        }
    }
}
