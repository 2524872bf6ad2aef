//! Prompt and response schema for place suggestions.
use serde_json::{json, Value};

const SUGGEST_PLACES: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/suggest_places.md"
));

/// Most known names listed in a prompt; keeps prompts bounded.
const MAX_KNOWN_NAMES: usize = 50;

/// What a batch should ask the model for.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub region: String,
    pub count: usize,
    pub focus: Option<String>,
}

impl BatchRequest {
    pub fn new(region: impl Into<String>, count: usize) -> Self {
        Self {
            region: region.into(),
            count,
            focus: None,
        }
    }

    /// Label used for logs and retry reports.
    pub fn context_label(&self) -> String {
        format!("suggest_places:{}", self.region)
    }
}

pub fn build_prompt(request: &BatchRequest, known_names: &[String]) -> String {
    let focus = request
        .focus
        .as_deref()
        .map(|focus| format!(" Focus on {focus}."))
        .unwrap_or_default();
    let known = if known_names.is_empty() {
        "(none)".to_string()
    } else {
        known_names
            .iter()
            .take(MAX_KNOWN_NAMES)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    SUGGEST_PLACES
        .replace("{count}", &request.count.to_string())
        .replace("{region}", &request.region)
        .replace("{focus}", &focus)
        .replace("{known}", &known)
}

/// Response shape requested from services with a structured output mode.
pub fn suggestion_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "places": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "lat": {"type": "number"},
                        "lng": {"type": "number"},
                        "city": {"type": "string"},
                        "category": {"type": "string"},
                        "content_type": {"type": "string"},
                        "experience_types": {"type": "array", "items": {"type": "string"}},
                        "description": {"type": "string"}
                    },
                    "required": ["name", "lat", "lng"]
                }
            }
        },
        "required": ["places"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_filled() {
        let mut request = BatchRequest::new("Mostar", 5);
        request.focus = Some("Ottoman architecture".to_string());
        let prompt = build_prompt(&request, &["Stari Most".to_string()]);
        assert!(prompt.contains("Suggest up to 5"));
        assert!(prompt.contains("near\nMostar. Focus on Ottoman architecture."));
        assert!(prompt.contains("Skip places already listed here: Stari Most"));
        assert!(!prompt.contains("{region}"));
        assert!(!prompt.contains("{known}"));
    }

    #[test]
    fn schema_requires_coordinates() {
        let schema = suggestion_schema();
        let required = &schema["properties"]["places"]["items"]["required"];
        assert_eq!(required, &json!(["name", "lat", "lng"]));
    }
}
