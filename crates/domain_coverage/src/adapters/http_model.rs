//! HTTP Generative Model Adapter
//!
//! Talks to any OpenAI-compatible `chat/completions` endpoint. HTTP failures
//! are mapped to `PortError` variants:
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - other 4xx -> `PortError::Validation`
//! - client timeouts -> `PortError::Timeout`
//! - connect failures -> `PortError::Connection`
//!
//! A circuit breaker stops calling an endpoint that keeps failing; while it
//! is open every call fails fast with `ServiceUnavailable`, which the
//! generative matcher turns into a REVIEW_NEEDED item.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use core_kernel::{
    AdapterHealth, CircuitBreakerConfig, DomainPort, HealthCheckResult, HealthCheckable, PortError,
};

use crate::model_port::{GenerativeModelPort, GenerativeRequest};

const ADAPTER_ID: &str = "http-generative-model";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpModelConfig {
    /// Base URL up to and excluding `/chat/completions`
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for HttpModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

#[derive(Debug)]
struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    is_open: AtomicBool,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            is_open: AtomicBool::new(false),
            opened_at: RwLock::new(None),
        }
    }

    async fn is_available(&self) -> bool {
        if !self.is_open.load(Ordering::Relaxed) {
            return true;
        }

        // Half-open once the reset timeout has elapsed
        match *self.opened_at.read().await {
            Some(time) => time.elapsed() > Duration::from_secs(self.config.reset_timeout_secs),
            None => false,
        }
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        if !self.is_open.load(Ordering::Relaxed) {
            return;
        }
        let success = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
        if success >= self.config.success_threshold as u64 {
            self.is_open.store(false, Ordering::Relaxed);
            self.success_count.store(0, Ordering::Relaxed);
        }
    }

    async fn record_failure(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.failure_threshold as u64 {
            if !self.is_open.swap(true, Ordering::Relaxed) {
                tracing::warn!(adapter = ADAPTER_ID, failures, "Circuit breaker opened");
            }
            *self.opened_at.write().await = Some(Instant::now());
        }
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generative model reached over HTTP
#[derive(Debug)]
pub struct HttpModelAdapter {
    config: HttpModelConfig,
    client: reqwest::Client,
    circuit_breaker: Option<CircuitBreaker>,
}

impl HttpModelAdapter {
    pub fn new(config: HttpModelConfig) -> Result<Self, PortError> {
        if config.base_url.trim().is_empty() {
            return Err(PortError::validation("generative model base_url is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PortError::Internal {
                message: "failed to build HTTP client".to_string(),
                source: Some(Box::new(e)),
            })?;
        let circuit_breaker = config.circuit_breaker.clone().map(CircuitBreaker::new);

        Ok(Self {
            config,
            client,
            circuit_breaker,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub async fn is_circuit_open(&self) -> bool {
        match &self.circuit_breaker {
            Some(cb) => !cb.is_available().await,
            None => false,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }

    async fn send_chat(&self, request: &GenerativeRequest) -> Result<String, PortError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .authorized(self.client.post(self.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, retry_after, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PortError::transformation(format!("invalid completion payload: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PortError::transformation("completion contained no content"))
    }
}

fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> PortError {
    if err.is_timeout() {
        PortError::timeout("chat completion", Duration::from_secs(timeout_secs))
    } else {
        PortError::Connection {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

fn map_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> PortError {
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        PortError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(60),
        }
    } else if status.is_server_error() {
        PortError::ServiceUnavailable {
            service: format!("generative model ({}): {}", status, snippet),
        }
    } else if status == StatusCode::NOT_FOUND {
        PortError::not_found("model endpoint", status)
    } else {
        PortError::validation(format!("model rejected request ({}): {}", status, snippet))
    }
}

impl DomainPort for HttpModelAdapter {}

#[async_trait]
impl HealthCheckable for HttpModelAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();

        if self.is_circuit_open().await {
            return HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Degraded,
                latency_ms: 0,
                message: Some("Circuit breaker is open".to_string()),
                checked_at: Utc::now(),
            };
        }

        let result = self
            .authorized(self.client.get(self.endpoint("models")))
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(r) if r.status().is_success() => (AdapterHealth::Healthy, None),
            Ok(r) => (AdapterHealth::Degraded, Some(format!("model endpoint returned {}", r.status()))),
            Err(e) => (AdapterHealth::Unhealthy, Some(e.to_string())),
        };

        HealthCheckResult {
            adapter_id: ADAPTER_ID.to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl GenerativeModelPort for HttpModelAdapter {
    async fn complete(&self, request: &GenerativeRequest) -> Result<String, PortError> {
        if let Some(cb) = &self.circuit_breaker {
            if !cb.is_available().await {
                return Err(PortError::ServiceUnavailable {
                    service: format!("{} (circuit open)", ADAPTER_ID),
                });
            }
        }

        let result = self.send_chat(request).await;

        if let Some(cb) = &self.circuit_breaker {
            match &result {
                Ok(_) => cb.record_success(),
                Err(e) if e.is_transient() => cb.record_failure().await,
                Err(_) => {}
            }
        }

        result
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_circuit_opens_after_threshold() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout_secs: 60,
            success_threshold: 1,
        });
        assert!(cb.is_available().await);

        cb.record_failure().await;
        assert!(cb.is_available().await);
        cb.record_failure().await;
        assert!(cb.is_open());
        assert!(!cb.is_available().await);
    }

    #[tokio::test]
    async fn test_circuit_half_opens_after_reset() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout_secs: 0,
            success_threshold: 1,
        });
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cb.is_available().await);

        cb.record_success();
        assert!(!cb.is_open());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, Some(12), ""),
            PortError::RateLimited { retry_after_secs: 12 }
        ));
        assert!(map_status(StatusCode::BAD_GATEWAY, None, "upstream").is_transient());
        assert!(map_status(StatusCode::NOT_FOUND, None, "").is_not_found());
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, None, "max_tokens too large"),
            PortError::Validation { .. }
        ));
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        let adapter = HttpModelAdapter::new(HttpModelConfig {
            base_url: "https://models.internal/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(adapter.endpoint("chat/completions"), "https://models.internal/v1/chat/completions");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let config = HttpModelConfig {
            base_url: " ".to_string(),
            ..Default::default()
        };
        assert!(HttpModelAdapter::new(config).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let adapter = HttpModelAdapter::new(HttpModelConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            circuit_breaker: None,
            ..Default::default()
        })
        .unwrap();
        let request = GenerativeRequest {
            purpose: crate::model_port::RequestPurpose::ItemClassification,
            system: String::new(),
            prompt: "Turbolader".to_string(),
            temperature: 0.0,
            max_tokens: 16,
        };
        let err = adapter.complete(&request).await.unwrap_err();
        assert!(err.is_transient());
    }
}
