//! Retrying executor for model service calls.
//!
//! | class     | retries | first delay | growth |
//! |-----------|---------|-------------|--------|
//! | gateway   | 3       | 5s          | x2     |
//! | timeout   | 3       | 10s         | x2     |
//! | ssl       | 3       | 5s          | x2     |
//! | rate limit| 0       |             |        |
//! | generic   | 0       |             |        |
//!
//! Each class keeps its own retry count within one `execute` call, so a
//! gateway error after two timeouts still starts at 5s with three retries.
//! Unclassified failures are checked against the gateway patterns before
//! giving up, so a CDN error page wrapped in a generic error still retries.
//! Backoff blocks the calling thread; there is no jitter and no cancellation.
use super::{
    ErrorClass, ExecutorError, ModelRequest, ModelResponse, ModelService, RetryState,
    ServiceFailure,
};
use crate::repair::JsonRepairer;
use crate::report::Reporter;
use crate::util::Sleeper;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Retry budget for one error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn for_class(class: ErrorClass) -> RetryPolicy {
        match class {
            ErrorClass::Gateway | ErrorClass::Ssl => RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_secs(5),
            },
            ErrorClass::Timeout => RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_secs(10),
            },
            ErrorClass::RateLimit | ErrorClass::Generic => RetryPolicy {
                max_retries: 0,
                base_delay: Duration::ZERO,
            },
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay * (1u32 << exponent)
    }
}

/// True when text looks like a CDN or proxy error page for 502/503/504.
pub fn is_gateway_text(text: &str) -> bool {
    let gateway = Regex::new(
        r"(?is)(502\s+bad\s+gateway|503\s+service\s+(temporarily\s+)?unavailable|504\s+gateway\s+time-?out|<title>[^<]*\b50[234]\b[^<]*</title>|cf-ray|cloudflare|error\s+code:?\s+52[0-9]|upstream\s+(connect\s+error|request\s+timeout)|the\s+server\s+encountered\s+a\s+temporary\s+error)",
    )
    .expect("regex for gateway error pages");
    gateway.is_match(text)
}

fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start();
    head.starts_with('<') || head.to_ascii_lowercase().contains("<html")
}

/// Map a backend failure to its retry class; `None` means configuration.
pub fn classify_failure(failure: &ServiceFailure) -> Option<ErrorClass> {
    match failure {
        ServiceFailure::Timeout(_) => Some(ErrorClass::Timeout),
        ServiceFailure::Tls(_) => Some(ErrorClass::Ssl),
        ServiceFailure::RateLimited(_) => Some(ErrorClass::RateLimit),
        ServiceFailure::MissingCredentials(_) => None,
        ServiceFailure::Other(text) if is_gateway_text(text) => Some(ErrorClass::Gateway),
        ServiceFailure::Other(_) => Some(ErrorClass::Generic),
    }
}

/// Sends prompts to a model service with classified retries.
pub struct RequestExecutor<M> {
    service: M,
    repairer: JsonRepairer,
    sleeper: Box<dyn Sleeper>,
    reporter: Arc<dyn Reporter>,
}

impl<M: ModelService> RequestExecutor<M> {
    pub fn new(service: M, sleeper: Box<dyn Sleeper>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            service,
            repairer: JsonRepairer::new(reporter.clone()),
            sleeper,
            reporter,
        }
    }

    /// Send `prompt` and return the response as JSON.
    ///
    /// With a `schema`, the service is asked for structured output; without
    /// one, free text is passed through the JSON repairer, so malformed
    /// output yields an empty object rather than an error.
    pub fn execute(
        &self,
        prompt: &str,
        schema: Option<&Value>,
        context_label: &str,
    ) -> Result<Value, ExecutorError> {
        let request = ModelRequest {
            prompt: prompt.to_string(),
            schema: schema.cloned(),
            context_label: context_label.to_string(),
        };
        let start = Instant::now();
        let mut retries: HashMap<ErrorClass, u32> = HashMap::new();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let failure = match self.service.generate(&request) {
                Ok(response) => match self.interpret(response) {
                    Ok(value) => {
                        tracing::info!(
                            context = context_label,
                            retries = attempts - 1,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "model request complete"
                        );
                        return Ok(value);
                    }
                    Err(failure) => failure,
                },
                Err(failure) => failure,
            };

            let Some(class) = classify_failure(&failure) else {
                return Err(ExecutorError::Config(failure.to_string()));
            };
            let policy = RetryPolicy::for_class(class);
            let class_retries = retries.entry(class).or_insert(0);
            if *class_retries >= policy.max_retries {
                return Err(give_up(context_label, class, attempts, &failure));
            }

            *class_retries += 1;
            let state = RetryState {
                attempt: *class_retries,
                class,
                delay: policy.delay_for(*class_retries),
            };
            self.reporter
                .retry_scheduled(context_label, &state, &failure.to_string());
            self.sleeper.sleep(state.delay);
        }
    }

    fn interpret(&self, response: ModelResponse) -> Result<Value, ServiceFailure> {
        match response {
            ModelResponse::Structured(value) => Ok(value),
            ModelResponse::Text(text) => {
                if looks_like_html(&text) && is_gateway_text(&text) {
                    return Err(ServiceFailure::Other(text));
                }
                Ok(self.repairer.repair(&text))
            }
        }
    }
}

fn give_up(
    context_label: &str,
    class: ErrorClass,
    attempts: u32,
    failure: &ServiceFailure,
) -> ExecutorError {
    let context = context_label.to_string();
    let message = crate::util::truncate_string(&failure.to_string(), 500);
    match class {
        ErrorClass::RateLimit => ExecutorError::RateLimited { context, message },
        ErrorClass::Generic => ExecutorError::Upstream { context, message },
        _ => ExecutorError::Exhausted {
            context,
            class,
            attempts,
            message,
        },
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
