use super::*;
use anyhow::anyhow;
use std::cell::Cell;
use std::rc::Rc;

/// Scripted geocoder that counts its calls.
struct FakeGeocoder {
    name: &'static str,
    answer: Result<Option<ReverseGeocode>, String>,
    calls: Rc<Cell<usize>>,
}

impl FakeGeocoder {
    fn boxed(
        name: &'static str,
        answer: Result<Option<ReverseGeocode>, String>,
    ) -> (Box<dyn Geocoder>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let geocoder = FakeGeocoder {
            name,
            answer,
            calls: calls.clone(),
        };
        (Box::new(geocoder), calls)
    }
}

impl Geocoder for FakeGeocoder {
    fn name(&self) -> &str {
        self.name
    }

    fn reverse_geocode(&self, _lat: f64, _lng: f64) -> anyhow::Result<Option<ReverseGeocode>> {
        self.calls.set(self.calls.get() + 1);
        self.answer.clone().map_err(|e| anyhow!(e))
    }

    fn text_search(&self, query: &str, _bias: Option<SearchBias>) -> anyhow::Result<Vec<PlaceHit>> {
        self.calls.set(self.calls.get() + 1);
        Ok(vec![PlaceHit {
            name: format!("{query} ({})", self.name),
            lat: 43.0,
            lng: 18.0,
            address: String::new(),
        }])
    }
}

fn city(name: &str) -> Result<Option<ReverseGeocode>, String> {
    Ok(Some(ReverseGeocode {
        city: Some(name.to_string()),
        ..Default::default()
    }))
}

#[test]
fn outside_box_never_calls_a_geocoder() {
    let (primary, primary_calls) = FakeGeocoder::boxed("primary", city("Beograd"));
    let (fallback, fallback_calls) = FakeGeocoder::boxed("fallback", city("Beograd"));
    let validator = GeoValidator::new(Some(primary), Some(fallback), true);

    for (lat, lng) in [(44.82, 20.45), (48.2, 16.37), (42.0, 18.0), (45.4, 17.0)] {
        let result = validator.validate(Some(lat), Some(lng), Some("Belgrade"));
        assert!(!result.valid);
        assert_eq!(result.reason, Some(ReasonCode::CoordinatesOutsideCountry));
    }
    assert_eq!(primary_calls.get(), 0);
    assert_eq!(fallback_calls.get(), 0);
}

#[test]
fn inside_box_outside_border_is_rejected() {
    let (primary, calls) = FakeGeocoder::boxed("primary", city("Split"));
    let validator = GeoValidator::new(Some(primary), None, true);
    let result = validator.validate(Some(43.5081), Some(16.4402), Some("Split"));
    assert_eq!(result.reason, Some(ReasonCode::CoordinatesOutsideCountry));
    assert_eq!(calls.get(), 0);
}

#[test]
fn sarajevo_validates_with_matching_city() {
    let (primary, _) = FakeGeocoder::boxed("primary", city("Sarajevo"));
    let validator = GeoValidator::new(Some(primary), None, true);
    let result = validator.validate(Some(43.8563), Some(18.4131), Some("City of Sarajevo"));
    assert!(result.valid);
    assert_eq!(result.verified_city.as_deref(), Some("Sarajevo"));
    assert!(result.city_match);
    assert_eq!(result.reason, None);
    assert_eq!(result.city_source.as_deref(), Some("primary"));
}

#[test]
fn geocoded_city_wins_over_claim() {
    let (primary, _) = FakeGeocoder::boxed("primary", city("Ilidža"));
    let validator = GeoValidator::new(Some(primary), None, true);
    let result = validator.validate(Some(43.83), Some(18.31), Some("Sarajevo"));
    assert!(result.valid);
    assert_eq!(result.verified_city.as_deref(), Some("Ilidža"));
    assert!(!result.city_match);
}

#[test]
fn override_range_skips_providers() {
    let (primary, primary_calls) = FakeGeocoder::boxed("primary", city("Stari Grad"));
    let (fallback, fallback_calls) = FakeGeocoder::boxed("fallback", city("Stari Grad"));
    let validator = GeoValidator::new(Some(primary), Some(fallback), true);

    let result = validator.validate(Some(43.8597), Some(18.4313), Some("Sarajevo"));
    assert_eq!(result.verified_city.as_deref(), Some("Sarajevo"));
    assert_eq!(result.city_source.as_deref(), Some("override"));
    assert!(result.city_match);
    assert_eq!(primary_calls.get(), 0);
    assert_eq!(fallback_calls.get(), 0);
}

#[test]
fn custom_override_table_replaces_defaults() {
    let validator = GeoValidator::new(None, None, true).with_overrides(vec![CityOverride {
        city: "Jajce".to_string(),
        min_lat: 44.33,
        max_lat: 44.35,
        min_lng: 17.26,
        max_lng: 17.28,
    }]);
    let result = validator.validate(Some(44.341), Some(17.270), None);
    assert_eq!(result.verified_city.as_deref(), Some("Jajce"));
    assert!(!result.city_match);

    let old_town = validator.validate(Some(43.8597), Some(18.4313), Some("Sarajevo"));
    assert_eq!(old_town.reason, Some(ReasonCode::GeocodingFailed));
}

#[test]
fn fallback_used_when_primary_errors() {
    let (primary, primary_calls) = FakeGeocoder::boxed("primary", Err("timeout".to_string()));
    let (fallback, fallback_calls) = FakeGeocoder::boxed(
        "fallback",
        Ok(Some(ReverseGeocode {
            village: Some("Blagaj".to_string()),
            municipality: Some("Mostar".to_string()),
            ..Default::default()
        })),
    );
    let validator = GeoValidator::new(Some(primary), Some(fallback), true);
    let result = validator.validate(Some(43.2566), Some(17.8866), Some("Blagaj"));
    assert_eq!(result.verified_city.as_deref(), Some("Blagaj"));
    assert_eq!(result.city_source.as_deref(), Some("fallback"));
    assert_eq!(primary_calls.get(), 1);
    assert_eq!(fallback_calls.get(), 1);
}

#[test]
fn all_providers_failing_is_geocoding_failed() {
    let (primary, _) = FakeGeocoder::boxed("primary", Err("boom".to_string()));
    let (fallback, _) = FakeGeocoder::boxed("fallback", Ok(None));
    let validator = GeoValidator::new(Some(primary), Some(fallback), true);
    let result = validator.validate(Some(44.5384), Some(18.6671), Some("Tuzla"));
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::GeocodingFailed));
    assert_eq!(result.verified_city, None);
}

#[test]
fn address_without_locality_in_strict_mode() {
    let (primary, _) = FakeGeocoder::boxed(
        "primary",
        Ok(Some(ReverseGeocode {
            formatted: Some("Bosnia and Herzegovina".to_string()),
            ..Default::default()
        })),
    );
    let validator = GeoValidator::new(Some(primary), None, true);
    let result = validator.validate(Some(44.5384), Some(18.6671), Some("Tuzla"));
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::NoVerifiedCityInStrictMode));
}

#[test]
fn non_strict_mode_accepts_unverified_city() {
    let (primary, _) = FakeGeocoder::boxed("primary", Ok(None));
    let validator = GeoValidator::new(Some(primary), None, false);
    let result = validator.validate(Some(44.5384), Some(18.6671), Some("Tuzla"));
    assert!(result.valid);
    assert_eq!(result.verified_city, None);
    assert_eq!(result.reason, Some(ReasonCode::GeocodingFailed));
}

#[test]
fn non_strict_mode_still_enforces_the_boundary() {
    let validator = GeoValidator::new(None, None, false);
    let result = validator.validate(Some(44.82), Some(20.45), Some("Belgrade"));
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::CoordinatesOutsideCountry));
}

#[test]
fn missing_coordinates_and_name() {
    let validator = GeoValidator::new(None, None, true);
    assert_eq!(
        validator.validate(None, Some(18.0), None).reason,
        Some(ReasonCode::MissingCoordinates)
    );

    let suggestion = Suggestion {
        name: "  ".to_string(),
        lat: Some(43.8563),
        lng: Some(18.4131),
        ..Default::default()
    };
    assert_eq!(
        validator.validate_suggestion(&suggestion).reason,
        Some(ReasonCode::MissingName)
    );
}

#[test]
fn search_falls_through_to_fallback_on_error() {
    let (primary, _) = FakeGeocoder::boxed("primary", Ok(None));
    let validator = GeoValidator::new(Some(primary), None, true);
    let hits = validator.search("Kravica", None).expect("hits");
    assert_eq!(hits[0].name, "Kravica (primary)");
}

#[test]
fn reason_codes_round_trip_through_strings() {
    for reason in [
        ReasonCode::MissingCoordinates,
        ReasonCode::MissingName,
        ReasonCode::CoordinatesOutsideCountry,
        ReasonCode::GeocodingFailed,
        ReasonCode::NoVerifiedCityInStrictMode,
    ] {
        assert_eq!(reason.as_str().parse::<ReasonCode>(), Ok(reason));
    }
    assert!("nope".parse::<ReasonCode>().is_err());
}
