//! Generative model over HTTP (`generateContent`-style API).
use super::{ModelRequest, ModelResponse, ModelService, ServiceFailure};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub const DEFAULT_MODEL_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpModelService {
    agent: ureq::Agent,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpModelService {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout.unwrap_or(DEFAULT_TIMEOUT)))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl ModelService for HttpModelService {
    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ServiceFailure> {
        if self.api_key.trim().is_empty() {
            return Err(ServiceFailure::MissingCredentials(
                "model API key is not configured".to_string(),
            ));
        }

        let start = Instant::now();
        let body = request_body(request);
        let mut response = self
            .agent
            .post(&self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .send_json(&body)
            .map_err(transport_failure)?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(transport_failure)?;

        tracing::debug!(
            context = %request.context_label,
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = text.len(),
            "model http response"
        );

        if status == 429 {
            return Err(ServiceFailure::RateLimited(crate::util::truncate_string(
                &text, 500,
            )));
        }
        if !(200..300).contains(&status) {
            return Err(ServiceFailure::Other(format!(
                "HTTP {status}: {}",
                crate::util::truncate_string(&text, 2000)
            )));
        }

        interpret_body(&text, request.schema.is_some())
    }
}

fn request_body(request: &ModelRequest) -> Value {
    let mut body = json!({
        "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
    });
    if let Some(schema) = &request.schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    body
}

/// Pull the candidate text out of a successful response body.
///
/// A body that is not JSON (a proxy error page served with 200) comes back
/// as text so the executor can classify it.
fn interpret_body(body: &str, structured: bool) -> Result<ModelResponse, ServiceFailure> {
    let Ok(envelope) = serde_json::from_str::<Value>(body) else {
        return Ok(ModelResponse::Text(body.to_string()));
    };
    let text = envelope
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .ok_or_else(|| {
            let reason = envelope
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            ServiceFailure::Other(format!("model returned no content: {reason}"))
        })?;

    if structured {
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            return Ok(ModelResponse::Structured(value));
        }
    }
    Ok(ModelResponse::Text(text))
}

fn transport_failure(err: ureq::Error) -> ServiceFailure {
    if let ureq::Error::Timeout(_) = err {
        return ServiceFailure::Timeout(err.to_string());
    }
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("timed out") {
        ServiceFailure::Timeout(message)
    } else if ["tls", "ssl", "certificate", "unexpected eof", "connection reset"]
        .iter()
        .any(|marker| lower.contains(marker))
    {
        ServiceFailure::Tls(message)
    } else {
        ServiceFailure::Other(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_switches_on_json_mode() {
        let request = ModelRequest {
            prompt: "list places".to_string(),
            schema: Some(json!({"type": "object"})),
            context_label: "t".to_string(),
        };
        let body = request_body(&request);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "list places");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );

        let plain = ModelRequest {
            schema: None,
            ..request
        };
        assert!(request_body(&plain).get("generationConfig").is_none());
    }

    #[test]
    fn candidate_text_is_extracted() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"places\":"}, {"text": " []}"}]}}]
        })
        .to_string();
        assert_eq!(
            interpret_body(&body, true).expect("structured"),
            ModelResponse::Structured(json!({"places": []}))
        );
        assert_eq!(
            interpret_body(&body, false).expect("text"),
            ModelResponse::Text("{\"places\": []}".to_string())
        );
    }

    #[test]
    fn invalid_structured_text_falls_back_to_text() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "{'places': [],}"}]}}]
        })
        .to_string();
        assert!(matches!(
            interpret_body(&body, true),
            Ok(ModelResponse::Text(_))
        ));
    }

    #[test]
    fn html_bodies_pass_through_as_text() {
        let page = "<html><title>502 Bad Gateway</title></html>";
        assert_eq!(
            interpret_body(page, true).expect("text"),
            ModelResponse::Text(page.to_string())
        );
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        let err = interpret_body(&body, false).expect_err("blocked");
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let service = HttpModelService::new(DEFAULT_MODEL_URL, DEFAULT_MODEL, "", None);
        let request = ModelRequest {
            prompt: "p".to_string(),
            schema: None,
            context_label: "t".to_string(),
        };
        assert!(matches!(
            service.generate(&request),
            Err(ServiceFailure::MissingCredentials(_))
        ));
    }
}
