//! Place suggestions parsed from model output.
//!
//! Model output is loosely typed, so parsing is lenient: numbers may arrive
//! as strings, fields go by several names, and unknown categories map to
//! `Other`. Entries that are not objects are skipped.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What kind of content a suggestion describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Place,
    Restaurant,
    Artisan,
    Guide,
    Business,
    Accommodation,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Place => "place",
            ContentType::Restaurant => "restaurant",
            ContentType::Artisan => "artisan",
            ContentType::Guide => "guide",
            ContentType::Business => "business",
            ContentType::Accommodation => "accommodation",
        }
    }

    pub fn parse_loose(value: &str) -> ContentType {
        match value.trim().to_lowercase().as_str() {
            "restaurant" | "cafe" | "café" | "bar" | "food" => ContentType::Restaurant,
            "artisan" | "craft" | "crafts" | "workshop" => ContentType::Artisan,
            "guide" | "tour_guide" | "tour guide" => ContentType::Guide,
            "business" | "shop" | "agency" => ContentType::Business,
            "accommodation" | "hotel" | "hostel" | "guesthouse" | "lodging" => {
                ContentType::Accommodation
            }
            _ => ContentType::Place,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thematic category of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Historical,
    Cultural,
    Religious,
    Natural,
    Adventure,
    Culinary,
    Accommodation,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Historical => "historical",
            Category::Cultural => "cultural",
            Category::Religious => "religious",
            Category::Natural => "natural",
            Category::Adventure => "adventure",
            Category::Culinary => "culinary",
            Category::Accommodation => "accommodation",
            Category::Other => "other",
        }
    }

    pub fn parse_loose(value: &str) -> Category {
        match value.trim().to_lowercase().as_str() {
            "historical" | "history" | "heritage" | "monument" => Category::Historical,
            "cultural" | "culture" | "museum" | "art" => Category::Cultural,
            "religious" | "religion" | "mosque" | "church" | "monastery" => Category::Religious,
            "natural" | "nature" | "park" | "waterfall" | "lake" => Category::Natural,
            "adventure" | "sport" | "outdoor" | "hiking" => Category::Adventure,
            "culinary" | "food" | "gastronomy" | "restaurant" => Category::Culinary,
            "accommodation" | "hotel" | "lodging" => Category::Accommodation,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unvalidated candidate point of interest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_city: Option<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Suggestion {
    /// Build a suggestion from one loosely-typed JSON object.
    pub fn from_value(value: &Value) -> Option<Suggestion> {
        let object = value.as_object()?;
        let text = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|key| object.get(*key))
                .find_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let number = |keys: &[&str]| -> Option<f64> {
            keys.iter()
                .filter_map(|key| object.get(*key))
                .find_map(as_f64_loose)
        };

        let experience_types = ["experience_types", "experience_type", "tags"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(|v| match v {
                Value::Array(items) => Some(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>(),
                ),
                Value::String(s) => Some(
                    s.split(',')
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        Some(Suggestion {
            name: text(&["name", "title"]).unwrap_or_default(),
            lat: number(&["lat", "latitude"]),
            lng: number(&["lng", "lon", "long", "longitude"]),
            claimed_city: text(&["city", "claimed_city", "town"]),
            category: text(&["category"])
                .map(|c| Category::parse_loose(&c))
                .unwrap_or_default(),
            content_type: text(&["content_type", "type", "kind"])
                .map(|c| ContentType::parse_loose(&c))
                .unwrap_or_default(),
            experience_types,
            description: text(&["description", "summary"]),
        })
    }

    /// Extract every suggestion from a repaired model response.
    ///
    /// Accepts `{"places": [...]}`, `{"suggestions": [...]}`, a bare array,
    /// or a single place object.
    pub fn list_from_value(value: &Value) -> Vec<Suggestion> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(object) => {
                match ["places", "suggestions", "items", "results"]
                    .iter()
                    .find_map(|key| object.get(*key).and_then(Value::as_array))
                {
                    Some(items) => items.iter().collect(),
                    None if object.contains_key("name") => vec![value],
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        };
        items.into_iter().filter_map(Suggestion::from_value).collect()
    }
}

fn as_f64_loose(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_loose_fields() {
        let value = json!({
            "title": " Stari Most ",
            "latitude": "43.3373",
            "lon": 17.8150,
            "city": "Mostar",
            "category": "Heritage",
            "type": "place",
            "tags": "bridge, diving",
            "description": "Ottoman bridge."
        });
        let suggestion = Suggestion::from_value(&value).expect("object");
        assert_eq!(suggestion.name, "Stari Most");
        assert_eq!(suggestion.lat, Some(43.3373));
        assert_eq!(suggestion.lng, Some(17.815));
        assert_eq!(suggestion.claimed_city.as_deref(), Some("Mostar"));
        assert_eq!(suggestion.category, Category::Historical);
        assert_eq!(suggestion.content_type, ContentType::Place);
        assert_eq!(suggestion.experience_types, vec!["bridge", "diving"]);
    }

    #[test]
    fn missing_fields_stay_empty() {
        let suggestion = Suggestion::from_value(&json!({"lat": "north"})).expect("object");
        assert_eq!(suggestion.name, "");
        assert_eq!(suggestion.lat, None);
        assert_eq!(suggestion.category, Category::Other);
        assert!(Suggestion::from_value(&json!("Stari Most")).is_none());
    }

    #[test]
    fn list_shapes() {
        let place = json!({"name": "Kravica"});
        assert_eq!(
            Suggestion::list_from_value(&json!({"places": [place.clone(), 3]})).len(),
            1
        );
        assert_eq!(
            Suggestion::list_from_value(&json!({"suggestions": [place.clone()]})).len(),
            1
        );
        assert_eq!(Suggestion::list_from_value(&json!([place.clone(), place.clone()])).len(), 2);
        assert_eq!(Suggestion::list_from_value(&place).len(), 1);
        assert!(Suggestion::list_from_value(&json!({})).is_empty());
    }

    #[test]
    fn loose_enum_parsing() {
        assert_eq!(ContentType::parse_loose("Hotel"), ContentType::Accommodation);
        assert_eq!(ContentType::parse_loose("anything"), ContentType::Place);
        assert_eq!(Category::parse_loose(" Nature "), Category::Natural);
        assert_eq!(Category::parse_loose("gastronomy"), Category::Culinary);
    }
}
