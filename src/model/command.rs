//! Model service backed by a local command.
//!
//! The command line is split with shell quoting rules, the prompt is written
//! to stdin, and stdout is returned as text. A schema, when given, is
//! appended to the prompt since a plain command has no structured mode.
use super::{ModelRequest, ModelResponse, ModelService, ServiceFailure};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CommandModelService {
    command: String,
}

impl CommandModelService {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl ModelService for CommandModelService {
    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ServiceFailure> {
        let prompt = match &request.schema {
            Some(schema) => format!(
                "{}\n\nRespond with JSON only, matching this schema:\n{}\n",
                request.prompt, schema
            ),
            None => request.prompt.clone(),
        };
        invoke_model_command(&self.command, &prompt).map(ModelResponse::Text)
    }
}

fn invoke_model_command(command: &str, prompt: &str) -> Result<String, ServiceFailure> {
    let args = shell_words::split(command)
        .map_err(|err| ServiceFailure::Other(format!("parse model command {command:?}: {err}")))?;
    if args.is_empty() {
        return Err(ServiceFailure::MissingCredentials(
            "model command is empty".to_string(),
        ));
    }

    let start = Instant::now();
    let mut child = Command::new(&args[0])
        .args(&args[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| ServiceFailure::Other(format!("spawn model command {}: {err}", args[0])))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(prompt.as_bytes())
            .map_err(|err| ServiceFailure::Other(format!("write prompt to model stdin: {err}")))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|err| ServiceFailure::Other(format!("wait for model command: {err}")))?;

    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        prompt_bytes = prompt.len(),
        response_bytes = output.stdout.len(),
        "model command complete"
    );

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(classify_stderr(&format!(
            "model command failed with status {}: {stderr}",
            output.status
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|err| ServiceFailure::Other(format!("decode model stdout as UTF-8: {err}")))
}

/// Commands usually wrap an HTTP client; map its error text onto failures.
fn classify_stderr(message: &str) -> ServiceFailure {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        ServiceFailure::Timeout(message.to_string())
    } else if lower.contains("429") || lower.contains("rate limit") || lower.contains("quota") {
        ServiceFailure::RateLimited(message.to_string())
    } else if lower.contains("ssl") || lower.contains("tls") || lower.contains("unexpected eof")
    {
        ServiceFailure::Tls(message.to_string())
    } else {
        ServiceFailure::Other(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> ModelRequest {
        ModelRequest {
            prompt: prompt.to_string(),
            schema: None,
            context_label: "test".to_string(),
        }
    }

    #[test]
    fn empty_command_is_a_configuration_failure() {
        let service = CommandModelService::new("   ");
        let err = service.generate(&request("hi")).expect_err("empty");
        assert!(matches!(err, ServiceFailure::MissingCredentials(_)));
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let service = CommandModelService::new("model --flag \"unterminated");
        let err = service.generate(&request("hi")).expect_err("bad quoting");
        assert!(matches!(err, ServiceFailure::Other(_)));
    }

    #[cfg(unix)]
    #[test]
    fn prompt_is_piped_through_stdin() {
        let service = CommandModelService::new("cat");
        let response = service.generate(&request("{\"places\": []}")).expect("cat");
        assert_eq!(response, ModelResponse::Text("{\"places\": []}".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_stderr() {
        let service = CommandModelService::new("sh -c 'echo \"read timed out\" >&2; exit 3'");
        let err = service.generate(&request("hi")).expect_err("fails");
        assert!(matches!(err, ServiceFailure::Timeout(_)));
    }

    #[test]
    fn stderr_classification() {
        assert!(matches!(
            classify_stderr("HTTP 429 Too Many Requests"),
            ServiceFailure::RateLimited(_)
        ));
        assert!(matches!(
            classify_stderr("SSL: unexpected EOF while reading"),
            ServiceFailure::Tls(_)
        ));
        assert!(matches!(
            classify_stderr("502 Bad Gateway"),
            ServiceFailure::Other(_)
        ));
    }
}
