//! Model service interface and the retrying request executor.
//!
//! Backends implement [`ModelService`] and report transport failures as
//! [`ServiceFailure`]. The [`RequestExecutor`] classifies those failures,
//! retries the transient ones with exponential backoff, and turns
//! unstructured text into JSON through the repairer.
pub mod command;
pub mod executor;
pub mod http;

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use command::CommandModelService;
pub use executor::{classify_failure, is_gateway_text, RequestExecutor, RetryPolicy};
pub use http::HttpModelService;

/// One prompt sent to the model service.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    /// JSON-schema-like shape; when present the service returns JSON.
    pub schema: Option<Value>,
    /// Label identifying the call in logs.
    pub context_label: String,
}

/// Raw answer from the model service.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Structured(Value),
    Text(String),
}

/// Transport-level failure reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceFailure {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("tls failure: {0}")]
    Tls(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("{0}")]
    Other(String),
}

/// Retry classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Gateway,
    Timeout,
    Ssl,
    RateLimit,
    Generic,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Gateway => "gateway",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Ssl => "ssl",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::Generic => "generic",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call retry bookkeeping; lives for one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// 1-based retry number (the first re-attempt is 1).
    pub attempt: u32,
    pub class: ErrorClass,
    pub delay: Duration,
}

/// Failure surfaced to callers of the executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Transient failures persisted past the retry budget.
    #[error("{context}: {class} failure persisted after {attempts} attempts: {message}")]
    Exhausted {
        context: String,
        class: ErrorClass,
        attempts: u32,
        message: String,
    },
    #[error("{context}: rate limited by model service: {message}")]
    RateLimited { context: String, message: String },
    #[error("{context}: model service error: {message}")]
    Upstream { context: String, message: String },
    #[error("configuration error: {0}")]
    Config(String),
}

impl ExecutorError {
    /// Class of the failure, for logging and summaries.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            ExecutorError::Exhausted { class, .. } => Some(*class),
            ExecutorError::RateLimited { .. } => Some(ErrorClass::RateLimit),
            ExecutorError::Upstream { .. } => Some(ErrorClass::Generic),
            ExecutorError::Config(_) => None,
        }
    }
}

/// A language model reachable over some transport.
pub trait ModelService {
    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ServiceFailure>;
}

impl<T: ModelService + ?Sized> ModelService for Box<T> {
    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ServiceFailure> {
        (**self).generate(request)
    }
}
