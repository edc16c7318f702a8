//! Generative model port
//!
//! The generative matcher and the labor linkage pass reach the model only
//! through [`GenerativeModelPort`]. Adapters own transport concerns; callers
//! own the timeout and the fail-safe fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_kernel::{DomainPort, HealthCheckable, PortError};

/// What a request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPurpose {
    ItemClassification,
    LaborLinkage,
}

/// A single completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerativeRequest {
    pub purpose: RequestPurpose,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Port to a text-completion model
#[async_trait]
pub trait GenerativeModelPort: DomainPort + HealthCheckable {
    /// Sends `request` and returns the raw completion text
    async fn complete(&self, request: &GenerativeRequest) -> Result<String, PortError>;

    /// Model identifier recorded in traces
    fn model_name(&self) -> &str;
}

/// Scripted in-memory model for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use core_kernel::{AdapterHealth, HealthCheckResult};
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone)]
    enum Reply {
        Text(String),
        Failure(String),
    }

    /// Replays queued responses in order, then falls back to a default
    #[derive(Debug, Default)]
    pub struct MockGenerativeModel {
        replies: Mutex<VecDeque<Reply>>,
        default_reply: Option<String>,
        delay: Option<Duration>,
        calls: Mutex<Vec<GenerativeRequest>>,
    }

    impl MockGenerativeModel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answers every unscripted call with `text`
        pub fn with_default(mut self, text: impl Into<String>) -> Self {
            self.default_reply = Some(text.into());
            self
        }

        /// Sleeps before answering, for timeout tests
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn with_responses<I, S>(self, responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let replies = responses.into_iter().map(|r| Reply::Text(r.into())).collect();
            Self {
                replies: Mutex::new(replies),
                ..self
            }
        }

        pub async fn push_response(&self, text: impl Into<String>) {
            self.replies.lock().await.push_back(Reply::Text(text.into()));
        }

        pub async fn push_failure(&self, message: impl Into<String>) {
            self.replies.lock().await.push_back(Reply::Failure(message.into()));
        }

        pub async fn calls(&self) -> Vec<GenerativeRequest> {
            self.calls.lock().await.clone()
        }

        pub async fn call_count(&self) -> usize {
            self.calls.lock().await.len()
        }
    }

    impl DomainPort for MockGenerativeModel {}

    #[async_trait]
    impl HealthCheckable for MockGenerativeModel {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "mock-generative-model".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("Mock adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl GenerativeModelPort for MockGenerativeModel {
        async fn complete(&self, request: &GenerativeRequest) -> Result<String, PortError> {
            self.calls.lock().await.push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let scripted = self.replies.lock().await.pop_front();
            match scripted {
                Some(Reply::Text(text)) => Ok(text),
                Some(Reply::Failure(message)) => Err(PortError::ServiceUnavailable { service: message }),
                None => self
                    .default_reply
                    .clone()
                    .ok_or_else(|| PortError::internal("mock model has no scripted response")),
            }
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockGenerativeModel;
    use super::*;

    fn request() -> GenerativeRequest {
        GenerativeRequest {
            purpose: RequestPurpose::ItemClassification,
            system: "system".to_string(),
            prompt: "prompt".to_string(),
            temperature: 0.0,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let model = MockGenerativeModel::new()
            .with_responses(["first", "second"])
            .with_default("fallback");

        assert_eq!(model.complete(&request()).await.unwrap(), "first");
        assert_eq!(model.complete(&request()).await.unwrap(), "second");
        assert_eq!(model.complete(&request()).await.unwrap(), "fallback");
        assert_eq!(model.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let model = MockGenerativeModel::new();
        model.push_failure("model offline").await;

        let err = model.complete(&request()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(model.complete(&request()).await.is_err());
    }
}
