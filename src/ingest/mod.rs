//! Ingestion pipeline: model suggestions in, verified places out.
//!
//! Each suggestion ends in exactly one terminal outcome:
//!
//! - `Promoted`: validated (or matched to an existing place) and stored.
//! - `Queued`: failed validation; one review entry is written.
//! - `Dropped`: structurally unusable (no name or no coordinates).
//!
//! In strict mode a place is only created with a geocoded city. Coordinates
//! outside the country are never promoted, whatever the mode.
pub mod priority;
pub mod prompt;

use crate::geo::{GeoValidator, ReasonCode, ValidationResult};
use crate::model::{ModelService, RequestExecutor};
use crate::report::Reporter;
use crate::review::{NewReviewEntry, ReviewEntry, ReviewStore};
use crate::store::{self, NewPlace, Place, PlaceStore, DEFAULT_DEDUP_TOLERANCE};
use crate::suggestion::Suggestion;
use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

pub use priority::{priority_score, sort_by_priority};
pub use prompt::{build_prompt, suggestion_schema, BatchRequest};

/// Why a suggestion was discarded without review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingName,
    MissingCoordinates,
}

impl DropReason {
    /// The drop reason for a structural validation failure.
    pub fn from_reason(reason: ReasonCode) -> Option<DropReason> {
        if !reason.is_structural() {
            return None;
        }
        Some(match reason {
            ReasonCode::MissingName => DropReason::MissingName,
            _ => DropReason::MissingCoordinates,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MissingName => "missing_name",
            DropReason::MissingCoordinates => "missing_coordinates",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Promotion {
    pub place: Place,
    /// False when the suggestion resolved to a place that already existed.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Promoted(Promotion),
    Queued(ReviewEntry),
    Dropped { reason: DropReason },
}

/// Per-item record in a batch summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Set when the item could not be processed (store I/O).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub suggested: usize,
    pub promoted: usize,
    pub resolved_existing: usize,
    pub queued: usize,
    pub dropped: usize,
    pub failed: usize,
    /// Set when the model request itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub items: Vec<BatchItem>,
}

impl BatchSummary {
    fn record(&mut self, name: String, result: Result<Outcome>) {
        let item = match result {
            Ok(outcome) => {
                match &outcome {
                    Outcome::Promoted(Promotion { created: true, .. }) => self.promoted += 1,
                    Outcome::Promoted(Promotion { created: false, .. }) => {
                        self.resolved_existing += 1
                    }
                    Outcome::Queued(_) => self.queued += 1,
                    Outcome::Dropped { .. } => self.dropped += 1,
                }
                BatchItem {
                    name,
                    outcome: Some(outcome),
                    error: None,
                }
            }
            Err(err) => {
                self.failed += 1;
                BatchItem {
                    name,
                    outcome: None,
                    error: Some(format!("{err:#}")),
                }
            }
        };
        self.items.push(item);
    }
}

/// In-memory view of known places, loaded from the store on first use.
#[derive(Debug, Clone, Default)]
pub struct PlaceIndex {
    places: Vec<Place>,
}

impl PlaceIndex {
    pub fn new(places: Vec<Place>) -> Self {
        Self { places }
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Existing place near the coordinates, or with the same name.
    pub fn find_duplicate(&self, name: &str, lat: f64, lng: f64, tolerance: f64) -> Option<&Place> {
        store::nearest(&self.places, lat, lng, tolerance)
            .or_else(|| self.places.iter().find(|p| store::same_name(&p.name, name)))
    }

    pub fn names(&self) -> Vec<String> {
        self.places.iter().map(|place| place.name.clone()).collect()
    }

    fn insert(&mut self, place: Place) {
        if !self.places.iter().any(|known| known.id == place.id) {
            self.places.push(place);
        }
    }
}

pub struct Orchestrator<M> {
    executor: RequestExecutor<M>,
    validator: GeoValidator,
    places: Box<dyn PlaceStore>,
    reviews: Box<dyn ReviewStore>,
    reporter: Arc<dyn Reporter>,
    dedup_tolerance: f64,
    index: Option<PlaceIndex>,
}

impl<M: ModelService> Orchestrator<M> {
    pub fn new(
        executor: RequestExecutor<M>,
        validator: GeoValidator,
        places: Box<dyn PlaceStore>,
        reviews: Box<dyn ReviewStore>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            executor,
            validator,
            places,
            reviews,
            reporter,
            dedup_tolerance: DEFAULT_DEDUP_TOLERANCE,
            index: None,
        }
    }

    pub fn with_dedup_tolerance(mut self, tolerance: f64) -> Self {
        self.dedup_tolerance = tolerance;
        self
    }

    pub fn places(&self) -> &dyn PlaceStore {
        self.places.as_ref()
    }

    pub fn reviews(&self) -> &dyn ReviewStore {
        self.reviews.as_ref()
    }

    pub fn validator(&self) -> &GeoValidator {
        &self.validator
    }

    /// Drop the cached place index; the next lookup reloads from the store.
    pub fn invalidate_cache(&mut self) {
        self.index = None;
    }

    fn index(&mut self) -> Result<&mut PlaceIndex> {
        if self.index.is_none() {
            let places = self.places.all()?;
            tracing::debug!(count = places.len(), "loaded place index");
            self.index = Some(PlaceIndex::new(places));
        }
        Ok(self.index.get_or_insert_with(PlaceIndex::default))
    }

    /// Ask the model for suggestions and process every one of them.
    ///
    /// A failed model request is reported in the summary; per-item store
    /// failures are counted and the batch continues.
    pub fn run_batch(&mut self, request: &BatchRequest) -> BatchSummary {
        let known = match self.index() {
            Ok(index) => index.names(),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "place index unavailable");
                Vec::new()
            }
        };
        let prompt = build_prompt(request, &known);
        let schema = suggestion_schema();
        let label = request.context_label();

        let response = match self.executor.execute(&prompt, Some(&schema), &label) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(context = %label, error = %err, "suggestion batch failed");
                return BatchSummary {
                    error: Some(err.to_string()),
                    ..Default::default()
                };
            }
        };

        let summary = self.process_all(Suggestion::list_from_value(&response));
        tracing::info!(
            context = %label,
            suggested = summary.suggested,
            promoted = summary.promoted,
            resolved_existing = summary.resolved_existing,
            queued = summary.queued,
            dropped = summary.dropped,
            failed = summary.failed,
            "suggestion batch complete"
        );
        summary
    }

    /// Process suggestions in priority order; no item halts the batch.
    pub fn process_all(&mut self, mut suggestions: Vec<Suggestion>) -> BatchSummary {
        sort_by_priority(&mut suggestions);
        let mut summary = BatchSummary {
            suggested: suggestions.len(),
            items: Vec::with_capacity(suggestions.len()),
            ..Default::default()
        };
        for suggestion in &suggestions {
            let result = self.process(suggestion);
            summary.record(suggestion.name.clone(), result);
        }
        summary
    }

    /// Drive one suggestion to its terminal outcome.
    pub fn process(&mut self, suggestion: &Suggestion) -> Result<Outcome> {
        let name = suggestion.name.trim();
        if name.is_empty() {
            return Ok(self.drop_item(suggestion, DropReason::MissingName));
        }
        let (Some(lat), Some(lng)) = (suggestion.lat, suggestion.lng) else {
            return Ok(self.drop_item(suggestion, DropReason::MissingCoordinates));
        };

        let tolerance = self.dedup_tolerance;
        if let Some(existing) = self.index()?.find_duplicate(name, lat, lng, tolerance) {
            tracing::debug!(name, existing_id = existing.id, "suggestion matches existing place");
            return Ok(Outcome::Promoted(Promotion {
                place: existing.clone(),
                created: false,
            }));
        }

        let validation = self.validator.validate_suggestion(suggestion);
        if let Some(reason) = validation.reason.and_then(DropReason::from_reason) {
            return Ok(self.drop_item(suggestion, reason));
        }
        if self.should_promote(&validation) {
            self.promote(suggestion, lat, lng, &validation)
        } else {
            self.queue(suggestion, &validation)
        }
    }

    fn should_promote(&self, validation: &ValidationResult) -> bool {
        validation.valid && (!self.validator.is_strict() || validation.verified_city.is_some())
    }

    fn promote(
        &mut self,
        suggestion: &Suggestion,
        lat: f64,
        lng: f64,
        validation: &ValidationResult,
    ) -> Result<Outcome> {
        let city_verified = validation.verified_city.is_some();
        let city = if self.validator.is_strict() {
            validation.verified_city.clone()
        } else {
            validation
                .verified_city
                .clone()
                .or_else(|| suggestion.claimed_city.clone())
        };
        let new_place = NewPlace {
            name: suggestion.name.trim().to_string(),
            lat,
            lng,
            city,
            city_verified,
            category: suggestion.category,
            content_type: suggestion.content_type,
            tags: suggestion.experience_types.clone(),
            description: suggestion.description.clone(),
        };

        let (place, created) =
            store::find_or_create(self.places.as_mut(), new_place, self.dedup_tolerance)?;
        self.index()?.insert(place.clone());
        tracing::info!(
            id = place.id,
            name = %place.name,
            city = place.city.as_deref().unwrap_or(""),
            created,
            "suggestion promoted"
        );
        Ok(Outcome::Promoted(Promotion { place, created }))
    }

    fn queue(&mut self, suggestion: &Suggestion, validation: &ValidationResult) -> Result<Outcome> {
        let reason = validation.reason.unwrap_or(ReasonCode::GeocodingFailed);
        let entry = self.reviews.append(NewReviewEntry {
            name: suggestion.name.trim().to_string(),
            lat: suggestion.lat,
            lng: suggestion.lng,
            claimed_city: suggestion.claimed_city.clone(),
            failure_reason: reason,
            detail: json!({
                "suggestion": suggestion,
                "validation": validation,
                "strict": self.validator.is_strict(),
            }),
        })?;
        self.reporter.item_queued(&entry);
        Ok(Outcome::Queued(entry))
    }

    fn drop_item(&self, suggestion: &Suggestion, reason: DropReason) -> Outcome {
        self.reporter.item_dropped(&suggestion.name, reason.as_str());
        Outcome::Dropped { reason }
    }
}
