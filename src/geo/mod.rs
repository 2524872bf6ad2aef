//! Geographic validation of suggested places.
//!
//! A suggestion's coordinates must fall inside the country border, and its
//! city is resolved independently of what the model claimed:
//!
//! 1. manual coordinate-range overrides,
//! 2. the primary geocoder,
//! 3. the rate-limited fallback geocoder.
//!
//! The first non-empty answer wins. A geocoded city that disagrees with the
//! claim is not a failure; it replaces the claim and `city_match` is false.
pub mod boundary;
pub mod city;
pub mod google;
pub mod nominatim;
pub mod provider;

use crate::suggestion::Suggestion;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use boundary::{Containment, CountryBoundary};
pub use city::{cities_match, normalize_city, CityOverride};
pub use provider::{Geocoder, PlaceHit, RateLimited, ReverseGeocode, SearchBias};

/// Why a suggestion failed (or was only partly) validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    MissingCoordinates,
    MissingName,
    CoordinatesOutsideCountry,
    GeocodingFailed,
    NoVerifiedCityInStrictMode,
}

impl ReasonCode {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::MissingCoordinates => "missing_coordinates",
            ReasonCode::MissingName => "missing_name",
            ReasonCode::CoordinatesOutsideCountry => "coordinates_outside_country",
            ReasonCode::GeocodingFailed => "geocoding_failed",
            ReasonCode::NoVerifiedCityInStrictMode => "no_verified_city_in_strict_mode",
        }
    }

    /// Structural problems are dropped rather than queued for review.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ReasonCode::MissingCoordinates | ReasonCode::MissingName
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReasonCode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "missing_coordinates" => Ok(ReasonCode::MissingCoordinates),
            "missing_name" => Ok(ReasonCode::MissingName),
            "coordinates_outside_country" => Ok(ReasonCode::CoordinatesOutsideCountry),
            "geocoding_failed" => Ok(ReasonCode::GeocodingFailed),
            "no_verified_city_in_strict_mode" => Ok(ReasonCode::NoVerifiedCityInStrictMode),
            other => Err(format!("unknown reason code {other:?}")),
        }
    }
}

/// Outcome of validating one coordinate/city claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    pub city_match: bool,
    /// Where the verified city came from (`override`, provider name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_source: Option<String>,
}

impl ValidationResult {
    fn invalid(reason: ReasonCode) -> Self {
        Self {
            valid: false,
            verified_city: None,
            reason: Some(reason),
            city_match: false,
            city_source: None,
        }
    }
}

/// City resolved through the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum CityResolution {
    Resolved { city: String, source: String },
    /// At least one provider returned an address but no usable locality.
    NoLocality,
    /// Every provider failed or had nothing for the point.
    Failed,
}

pub struct GeoValidator {
    boundary: CountryBoundary,
    overrides: Vec<CityOverride>,
    primary: Option<Box<dyn Geocoder>>,
    fallback: Option<Box<dyn Geocoder>>,
    strict: bool,
}

impl GeoValidator {
    pub fn new(
        primary: Option<Box<dyn Geocoder>>,
        fallback: Option<Box<dyn Geocoder>>,
        strict: bool,
    ) -> Self {
        Self {
            boundary: CountryBoundary::default(),
            overrides: city::default_overrides(),
            primary,
            fallback,
            strict,
        }
    }

    /// Replace the manual override table.
    pub fn with_overrides(mut self, overrides: Vec<CityOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_boundary(mut self, boundary: CountryBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn boundary(&self) -> &CountryBoundary {
        &self.boundary
    }

    /// Validate a suggestion, including its name.
    pub fn validate_suggestion(&self, suggestion: &Suggestion) -> ValidationResult {
        if suggestion.name.trim().is_empty() {
            return ValidationResult::invalid(ReasonCode::MissingName);
        }
        self.validate(
            suggestion.lat,
            suggestion.lng,
            suggestion.claimed_city.as_deref(),
        )
    }

    /// Check the boundary, then resolve and reconcile the city.
    pub fn validate(
        &self,
        lat: Option<f64>,
        lng: Option<f64>,
        claimed_city: Option<&str>,
    ) -> ValidationResult {
        let (Some(lat), Some(lng)) = (lat, lng) else {
            return ValidationResult::invalid(ReasonCode::MissingCoordinates);
        };

        let containment = self.boundary.classify(lat, lng);
        if !containment.is_inside() {
            tracing::debug!(lat, lng, ?containment, "coordinates outside country");
            return ValidationResult::invalid(ReasonCode::CoordinatesOutsideCountry);
        }

        match self.resolve_city(lat, lng) {
            CityResolution::Resolved { city, source } => {
                let city_match = claimed_city.is_some_and(|claimed| cities_match(claimed, &city));
                if !city_match {
                    tracing::info!(
                        claimed = claimed_city.unwrap_or(""),
                        verified = %city,
                        source = %source,
                        "geocoded city replaces claim"
                    );
                }
                ValidationResult {
                    valid: true,
                    verified_city: Some(city),
                    reason: None,
                    city_match,
                    city_source: Some(source),
                }
            }
            unresolved => {
                let reason = match unresolved {
                    CityResolution::NoLocality if self.strict => {
                        ReasonCode::NoVerifiedCityInStrictMode
                    }
                    _ => ReasonCode::GeocodingFailed,
                };
                ValidationResult {
                    valid: !self.strict,
                    verified_city: None,
                    reason: Some(reason),
                    city_match: false,
                    city_source: None,
                }
            }
        }
    }

    /// Run the override → primary → fallback chain.
    pub fn resolve_city(&self, lat: f64, lng: f64) -> CityResolution {
        if let Some(hit) = city::find_override(&self.overrides, lat, lng) {
            return CityResolution::Resolved {
                city: hit.city.clone(),
                source: "override".to_string(),
            };
        }

        let mut answered = false;
        for geocoder in [&self.primary, &self.fallback].into_iter().flatten() {
            match geocoder.reverse_geocode(lat, lng) {
                Ok(Some(geocode)) => {
                    if let Some(city) = geocode.best_city() {
                        return CityResolution::Resolved {
                            city,
                            source: geocoder.name().to_string(),
                        };
                    }
                    answered = true;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        provider = geocoder.name(),
                        lat,
                        lng,
                        error = %err,
                        "reverse geocode failed"
                    );
                }
            }
        }

        if answered {
            CityResolution::NoLocality
        } else {
            CityResolution::Failed
        }
    }

    /// Forward search, primary first; the first provider with hits wins.
    pub fn search(&self, query: &str, bias: Option<SearchBias>) -> anyhow::Result<Vec<PlaceHit>> {
        let mut last_error = None;
        for geocoder in [&self.primary, &self.fallback].into_iter().flatten() {
            match geocoder.text_search(query, bias) {
                Ok(hits) if !hits.is_empty() => return Ok(hits),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(provider = geocoder.name(), error = %err, "text search failed");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
#[path = "geo_tests.rs"]
mod tests;
