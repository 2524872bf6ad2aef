//! Google Geocoding and Places text search (primary provider).
use super::provider::{Geocoder, PlaceHit, ReverseGeocode, SearchBias};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::Duration;

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const TEXT_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct GoogleGeocoder {
    agent: ureq::Agent,
    api_key: String,
    language: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>, language: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            api_key: api_key.into(),
            language: language.into(),
        }
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<GoogleResponse> {
        let mut request = self.agent.get(url);
        for (key, value) in query {
            request = request.query(*key, value);
        }
        let mut response = request
            .query("key", &self.api_key)
            .call()
            .with_context(|| format!("request {url}"))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .context("read google response body")?;
        if !(200..300).contains(&status) {
            return Err(anyhow!("google returned HTTP {status}"));
        }
        serde_json::from_str(&body).context("parse google response JSON")
    }
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl GoogleResponse {
    /// `Ok(false)` for an empty result set, an error for API-level failures.
    fn check(&self) -> Result<bool> {
        match self.status.as_str() {
            "OK" => Ok(true),
            "ZERO_RESULTS" => Ok(false),
            other => Err(anyhow!(
                "google status {other}: {}",
                self.error_message.as_deref().unwrap_or("no message")
            )),
        }
    }
}

fn reverse_from_response(response: &GoogleResponse) -> Result<Option<ReverseGeocode>> {
    if !response.check()? {
        return Ok(None);
    }
    let Some(first) = response.results.first() else {
        return Ok(None);
    };

    let mut geocode = ReverseGeocode {
        formatted: first.formatted_address.clone(),
        ..Default::default()
    };
    for component in &first.address_components {
        let has = |kind: &str| component.types.iter().any(|t| t == kind);
        let slot = if has("locality") {
            &mut geocode.city
        } else if has("postal_town") {
            &mut geocode.town
        } else if has("sublocality") || has("sublocality_level_1") {
            &mut geocode.suburb
        } else if has("neighborhood") {
            &mut geocode.neighbourhood
        } else if has("administrative_area_level_3") || has("administrative_area_level_2") {
            &mut geocode.municipality
        } else if has("administrative_area_level_1") {
            &mut geocode.county
        } else {
            continue;
        };
        if slot.is_none() {
            *slot = Some(component.long_name.clone());
        }
    }
    Ok(Some(geocode))
}

fn hits_from_response(response: &GoogleResponse) -> Result<Vec<PlaceHit>> {
    if !response.check()? {
        return Ok(Vec::new());
    }
    Ok(response
        .results
        .iter()
        .filter_map(|result| {
            let location = &result.geometry.as_ref()?.location;
            Some(PlaceHit {
                name: result.name.clone().unwrap_or_default(),
                lat: location.lat,
                lng: location.lng,
                address: result.formatted_address.clone().unwrap_or_default(),
            })
        })
        .collect())
}

impl Geocoder for GoogleGeocoder {
    fn name(&self) -> &str {
        "google"
    }

    fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseGeocode>> {
        let response = self.get_json(
            GEOCODE_URL,
            &[
                ("latlng", format!("{lat},{lng}")),
                ("language", self.language.clone()),
            ],
        )?;
        reverse_from_response(&response)
    }

    fn text_search(&self, query: &str, bias: Option<SearchBias>) -> Result<Vec<PlaceHit>> {
        let mut params = vec![
            ("query", query.to_string()),
            ("language", self.language.clone()),
        ];
        if let Some(bias) = bias {
            params.push(("location", format!("{},{}", bias.lat, bias.lng)));
            params.push(("radius", bias.radius_m.unwrap_or(50_000).to_string()));
        }
        let response = self.get_json(TEXT_SEARCH_URL, &params)?;
        hits_from_response(&response)
    }
}
