//! OpenStreetMap Nominatim client (fallback provider).
//!
//! Nominatim's usage policy allows one request per second and requires an
//! identifying User-Agent; wrap this client in
//! [`RateLimited`](super::provider::RateLimited) before use.
use super::provider::{Geocoder, PlaceHit, ReverseGeocode, SearchBias};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct NominatimGeocoder {
    agent: ureq::Agent,
    base_url: String,
    user_agent: String,
    language: String,
}

impl NominatimGeocoder {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            language: language.into(),
        }
    }

    fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self
            .agent
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .header("Accept-Language", &self.language);
        for (key, value) in query {
            request = request.query(*key, value);
        }
        let mut response = request
            .call()
            .with_context(|| format!("request {url}"))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .context("read nominatim response body")?;
        if !(200..300).contains(&status) {
            return Err(anyhow!("nominatim returned HTTP {status}"));
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<ReverseGeocode>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    name: Option<String>,
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

fn parse_reverse(body: &str) -> Result<Option<ReverseGeocode>> {
    let response: ReverseResponse =
        serde_json::from_str(body).context("parse nominatim reverse JSON")?;
    if response.error.is_some() {
        return Ok(None);
    }
    let mut geocode = response.address.unwrap_or_default();
    if geocode.formatted.is_none() {
        geocode.formatted = response.display_name;
    }
    if geocode.is_empty() {
        return Ok(None);
    }
    Ok(Some(geocode))
}

fn parse_search(body: &str) -> Result<Vec<PlaceHit>> {
    let results: Vec<SearchResult> =
        serde_json::from_str(body).context("parse nominatim search JSON")?;
    Ok(results
        .into_iter()
        .filter_map(|result| {
            let lat = result.lat.parse().ok()?;
            let lng = result.lon.parse().ok()?;
            let address = result.display_name.unwrap_or_default();
            let name = result
                .name
                .filter(|n| !n.is_empty())
                .or_else(|| address.split(',').next().map(|s| s.trim().to_string()))
                .unwrap_or_default();
            Some(PlaceHit {
                name,
                lat,
                lng,
                address,
            })
        })
        .collect())
}

impl Geocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        "nominatim"
    }

    fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseGeocode>> {
        let body = self.get_text(
            "reverse",
            &[
                ("format", "jsonv2".to_string()),
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", "14".to_string()),
            ],
        )?;
        parse_reverse(&body)
    }

    fn text_search(&self, query: &str, bias: Option<SearchBias>) -> Result<Vec<PlaceHit>> {
        let mut params = vec![
            ("q", query.to_string()),
            ("format", "jsonv2".to_string()),
            ("limit", "5".to_string()),
        ];
        if let Some(bias) = bias {
            // Nominatim has no radius; approximate it with a viewbox.
            let degrees = f64::from(bias.radius_m.unwrap_or(50_000)) / 111_000.0;
            params.push((
                "viewbox",
                format!(
                    "{},{},{},{}",
                    bias.lng - degrees,
                    bias.lat + degrees,
                    bias.lng + degrees,
                    bias.lat - degrees
                ),
            ));
        }
        let body = self.get_text("search", &params)?;
        parse_search(&body)
    }
}
