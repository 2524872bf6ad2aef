//! Geocoding provider interface and shared plumbing.
use crate::util::Sleeper;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::time::{Duration, Instant};

use super::city::city_from_formatted_address;

/// Minimum spacing between requests to the fallback provider.
pub const FALLBACK_MIN_INTERVAL: Duration = Duration::from_millis(1100);

/// Address fields returned by a reverse geocode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReverseGeocode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub town: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub village: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbourhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

impl ReverseGeocode {
    /// Most specific locality field, ignoring administrative regions.
    pub fn locality(&self) -> Option<&str> {
        [
            &self.city,
            &self.town,
            &self.village,
            &self.suburb,
            &self.neighbourhood,
        ]
        .into_iter()
        .find_map(|field| non_empty(field.as_deref()))
    }

    /// Locality, then administrative region, then the parsed address.
    pub fn best_city(&self) -> Option<String> {
        if let Some(locality) = self.locality() {
            return Some(locality.to_string());
        }
        if let Some(region) = non_empty(self.municipality.as_deref())
            .or_else(|| non_empty(self.county.as_deref()))
        {
            return Some(region.to_string());
        }
        self.formatted
            .as_deref()
            .and_then(city_from_formatted_address)
    }

    pub fn is_empty(&self) -> bool {
        *self == ReverseGeocode::default()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// One hit from a text search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceHit {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: String,
}

/// Optional location bias for text search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBias {
    pub lat: f64,
    pub lng: f64,
    pub radius_m: Option<u32>,
}

/// A reverse/forward geocoding service.
///
/// `reverse_geocode` returns `Ok(None)` when the provider answered but has
/// no address for the point; transport and API failures are errors.
pub trait Geocoder {
    fn name(&self) -> &str;

    fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseGeocode>>;

    fn text_search(&self, query: &str, bias: Option<SearchBias>) -> Result<Vec<PlaceHit>>;
}

impl<T: Geocoder + ?Sized> Geocoder for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseGeocode>> {
        (**self).reverse_geocode(lat, lng)
    }

    fn text_search(&self, query: &str, bias: Option<SearchBias>) -> Result<Vec<PlaceHit>> {
        (**self).text_search(query, bias)
    }
}

/// Enforces a minimum spacing between calls by sleeping before each one.
///
/// The limit belongs to the external service, so a single pipeline only
/// needs to remember its own last request.
pub struct RateLimited<G, S> {
    inner: G,
    sleeper: S,
    min_interval: Duration,
    last_request: Cell<Option<Instant>>,
}

impl<G: Geocoder, S: Sleeper> RateLimited<G, S> {
    pub fn new(inner: G, sleeper: S, min_interval: Duration) -> Self {
        Self {
            inner,
            sleeper,
            min_interval,
            last_request: Cell::new(None),
        }
    }

    fn wait_turn(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(
                    provider = self.inner.name(),
                    sleep_ms = wait.as_millis() as u64,
                    "rate limiting geocoder request"
                );
                self.sleeper.sleep(wait);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }
}

impl<G: Geocoder, S: Sleeper> Geocoder for RateLimited<G, S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseGeocode>> {
        self.wait_turn();
        self.inner.reverse_geocode(lat, lng)
    }

    fn text_search(&self, query: &str, bias: Option<SearchBias>) -> Result<Vec<PlaceHit>> {
        self.wait_turn();
        self.inner.text_search(query, bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::RecordingSleeper;

    struct Fixed;

    impl Geocoder for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn reverse_geocode(&self, _lat: f64, _lng: f64) -> Result<Option<ReverseGeocode>> {
            Ok(None)
        }

        fn text_search(&self, _query: &str, _bias: Option<SearchBias>) -> Result<Vec<PlaceHit>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn locality_fields_win_over_regions() {
        let geocode = ReverseGeocode {
            village: Some("Blagaj".to_string()),
            municipality: Some("Mostar".to_string()),
            county: Some("Herzegovina-Neretva".to_string()),
            ..Default::default()
        };
        assert_eq!(geocode.best_city().as_deref(), Some("Blagaj"));
    }

    #[test]
    fn region_then_formatted_address_fallback() {
        let region = ReverseGeocode {
            suburb: Some("  ".to_string()),
            county: Some("Una-Sana".to_string()),
            ..Default::default()
        };
        assert_eq!(region.best_city().as_deref(), Some("Una-Sana"));

        let formatted = ReverseGeocode {
            formatted: Some("Kulina bana 5, 77000 Bihać, Bosnia and Herzegovina".to_string()),
            ..Default::default()
        };
        assert_eq!(formatted.best_city().as_deref(), Some("Bihać"));
        assert_eq!(ReverseGeocode::default().best_city(), None);
    }

    #[test]
    fn rate_limiter_sleeps_between_back_to_back_calls() {
        let sleeper = RecordingSleeper::new();
        let limited = RateLimited::new(Fixed, sleeper.clone(), FALLBACK_MIN_INTERVAL);

        limited.reverse_geocode(43.0, 18.0).expect("first call");
        assert!(sleeper.delays().is_empty());

        limited.text_search("Kravice", None).expect("second call");
        let delays = sleeper.delays();
        assert_eq!(delays.len(), 1);
        assert!(delays[0] > Duration::from_millis(1000));
        assert!(delays[0] <= FALLBACK_MIN_INTERVAL);
    }
}
