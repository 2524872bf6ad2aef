//! Persistence collaborator for promoted places.
//!
//! The content platform owns the real data model; this crate only needs to
//! find existing places and create new ones. A JSONL file and an in-memory
//! store are provided for the CLI and tests.
use crate::suggestion::{Category, ContentType};
use crate::util::now_epoch_ms;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Coordinate tolerance, in degrees, for treating two places as the same.
pub const DEFAULT_DEDUP_TOLERANCE: f64 = 0.0005;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: u64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// True when `city` came from geocoding rather than the model.
    #[serde(default)]
    pub city_verified: bool,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPlace {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub city: Option<String>,
    pub city_verified: bool,
    pub category: Category,
    pub content_type: ContentType,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

impl NewPlace {
    fn into_place(self, id: u64) -> Place {
        Place {
            id,
            name: self.name,
            lat: self.lat,
            lng: self.lng,
            city: self.city,
            city_verified: self.city_verified,
            category: self.category,
            content_type: self.content_type,
            tags: self.tags,
            description: self.description,
            created_at: now_epoch_ms(),
        }
    }
}

pub trait PlaceStore {
    /// Closest place whose coordinates are within `tolerance` degrees.
    fn find_near(&self, lat: f64, lng: f64, tolerance: f64) -> Result<Option<Place>>;

    /// Place with the same name, compared case-insensitively.
    fn find_by_name(&self, name: &str) -> Result<Option<Place>>;

    fn create(&mut self, place: NewPlace) -> Result<Place>;

    fn all(&self) -> Result<Vec<Place>>;
}

impl<T: PlaceStore + ?Sized> PlaceStore for Box<T> {
    fn find_near(&self, lat: f64, lng: f64, tolerance: f64) -> Result<Option<Place>> {
        (**self).find_near(lat, lng, tolerance)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Place>> {
        (**self).find_by_name(name)
    }

    fn create(&mut self, place: NewPlace) -> Result<Place> {
        (**self).create(place)
    }

    fn all(&self) -> Result<Vec<Place>> {
        (**self).all()
    }
}

/// Look up by coordinates, then by exact name, and create only on a miss.
///
/// Returns the place and whether it was created.
pub fn find_or_create(
    store: &mut dyn PlaceStore,
    place: NewPlace,
    tolerance: f64,
) -> Result<(Place, bool)> {
    if let Some(existing) = store.find_near(place.lat, place.lng, tolerance)? {
        return Ok((existing, false));
    }
    if let Some(existing) = store.find_by_name(&place.name)? {
        return Ok((existing, false));
    }
    Ok((store.create(place)?, true))
}

pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

pub(crate) fn nearest<'a>(
    places: impl IntoIterator<Item = &'a Place>,
    lat: f64,
    lng: f64,
    tolerance: f64,
) -> Option<&'a Place> {
    places
        .into_iter()
        .filter(|place| (place.lat - lat).abs() <= tolerance && (place.lng - lng).abs() <= tolerance)
        .min_by(|a, b| {
            let da = (a.lat - lat).powi(2) + (a.lng - lng).powi(2);
            let db = (b.lat - lat).powi(2) + (b.lng - lng).powi(2);
            da.total_cmp(&db)
        })
}

fn next_id(places: &[Place]) -> u64 {
    places.iter().map(|place| place.id).max().unwrap_or(0) + 1
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPlaceStore {
    places: Vec<Place>,
}

impl MemoryPlaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_places(places: Vec<Place>) -> Self {
        Self { places }
    }
}

impl PlaceStore for MemoryPlaceStore {
    fn find_near(&self, lat: f64, lng: f64, tolerance: f64) -> Result<Option<Place>> {
        Ok(nearest(&self.places, lat, lng, tolerance).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Place>> {
        Ok(self
            .places
            .iter()
            .find(|place| same_name(&place.name, name))
            .cloned())
    }

    fn create(&mut self, place: NewPlace) -> Result<Place> {
        let place = place.into_place(next_id(&self.places));
        self.places.push(place.clone());
        Ok(place)
    }

    fn all(&self) -> Result<Vec<Place>> {
        Ok(self.places.clone())
    }
}

/// Places stored one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlPlaceStore {
    path: PathBuf,
}

impl JsonlPlaceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Place>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("open place store: {}", self.path.display()))?;
        let mut places = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("read line {} of place store", line_num + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Place>(&line) {
                Ok(place) => places.push(place),
                Err(err) => tracing::warn!(
                    path = %self.path.display(),
                    line = line_num + 1,
                    error = %err,
                    "skip corrupt place line"
                ),
            }
        }
        Ok(places)
    }
}

impl PlaceStore for JsonlPlaceStore {
    fn find_near(&self, lat: f64, lng: f64, tolerance: f64) -> Result<Option<Place>> {
        let places = self.load()?;
        Ok(nearest(&places, lat, lng, tolerance).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Place>> {
        Ok(self
            .load()?
            .into_iter()
            .find(|place| same_name(&place.name, name)))
    }

    fn create(&mut self, place: NewPlace) -> Result<Place> {
        let place = place.into_place(next_id(&self.load()?));
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("create place store directory")?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open place store for append: {}", self.path.display()))?;
        let line = serde_json::to_string(&place).context("serialize place")?;
        writeln!(file, "{}", line).context("write place")?;
        Ok(place)
    }

    fn all(&self) -> Result<Vec<Place>> {
        self.load()
    }
}
