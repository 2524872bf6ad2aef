//! Review queue for suggestions that could not be verified.
//!
//! # Log Format
//!
//! The JSONL queue is append-only. Each suggestion adds one `queued` event
//! and each resolution adds one `resolved` event; the current state is the
//! fold of both:
//!
//! ```jsonl
//! {"event":"queued","id":1,"name":"Kravica","lat":43.15,"lng":17.6,"failure_reason":"geocoding_failed",...}
//! {"event":"resolved","id":1,"resolved_at":1707900060000}
//! ```
use crate::geo::ReasonCode;
use crate::util::now_epoch_ms;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Resolved,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ReviewStatus::Pending),
            "resolved" => Ok(ReviewStatus::Resolved),
            other => Err(format!("unknown review status {other:?}")),
        }
    }
}

/// A quarantined suggestion awaiting a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_city: Option<String>,
    pub failure_reason: ReasonCode,
    /// Full suggestion and validation result, for the reviewer.
    #[serde(default)]
    pub detail: Value,
    /// Unix timestamp in milliseconds.
    pub queued_at: u64,
    #[serde(default)]
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
}

/// Entry fields supplied by the caller; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReviewEntry {
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub claimed_city: Option<String>,
    pub failure_reason: ReasonCode,
    pub detail: Value,
}

impl NewReviewEntry {
    fn into_entry(self, id: u64) -> ReviewEntry {
        ReviewEntry {
            id,
            name: self.name,
            lat: self.lat,
            lng: self.lng,
            claimed_city: self.claimed_city,
            failure_reason: self.failure_reason,
            detail: self.detail,
            queued_at: now_epoch_ms(),
            status: ReviewStatus::Pending,
            resolved_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    pub reason: Option<ReasonCode>,
    pub status: Option<ReviewStatus>,
}

impl ReviewFilter {
    pub fn pending() -> Self {
        Self {
            reason: None,
            status: Some(ReviewStatus::Pending),
        }
    }

    pub fn matches(&self, entry: &ReviewEntry) -> bool {
        self.reason.is_none_or(|reason| entry.failure_reason == reason)
            && self.status.is_none_or(|status| entry.status == status)
    }
}

/// Durable quarantine store.
pub trait ReviewStore {
    fn append(&mut self, entry: NewReviewEntry) -> Result<ReviewEntry>;

    /// Entries matching `filter`, in queue order.
    fn list(&self, filter: &ReviewFilter) -> Result<Vec<ReviewEntry>>;

    /// Mark an entry resolved. Resolving twice returns the entry unchanged.
    fn mark_resolved(&mut self, id: u64) -> Result<ReviewEntry>;
}

impl<T: ReviewStore + ?Sized> ReviewStore for Box<T> {
    fn append(&mut self, entry: NewReviewEntry) -> Result<ReviewEntry> {
        (**self).append(entry)
    }

    fn list(&self, filter: &ReviewFilter) -> Result<Vec<ReviewEntry>> {
        (**self).list(filter)
    }

    fn mark_resolved(&mut self, id: u64) -> Result<ReviewEntry> {
        (**self).mark_resolved(id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum QueueEvent {
    Queued(ReviewEntry),
    Resolved { id: u64, resolved_at: u64 },
}

/// Review queue persisted as an append-only JSONL event log.
#[derive(Debug, Clone)]
pub struct JsonlReviewQueue {
    path: PathBuf,
}

impl JsonlReviewQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_event(&self, event: &QueueEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("create review queue directory")?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open review queue for append: {}", self.path.display()))?;
        let line = serde_json::to_string(event).context("serialize review event")?;
        writeln!(file, "{}", line).context("write review event")?;
        Ok(())
    }

    /// Fold the event log into entries, skipping corrupt lines.
    fn load(&self) -> Result<Vec<ReviewEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("open review queue: {}", self.path.display()))?;

        let mut entries: Vec<ReviewEntry> = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line =
                line.with_context(|| format!("read line {} of review queue", line_num + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<QueueEvent>(&line) {
                Ok(QueueEvent::Queued(entry)) => entries.push(entry),
                Ok(QueueEvent::Resolved { id, resolved_at }) => {
                    match entries.iter_mut().find(|entry| entry.id == id) {
                        Some(entry) => {
                            entry.status = ReviewStatus::Resolved;
                            entry.resolved_at = Some(resolved_at);
                        }
                        None => tracing::warn!(
                            line = line_num + 1,
                            id,
                            "resolution for unknown review entry"
                        ),
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_num + 1,
                        error = %err,
                        "skip corrupt review queue line"
                    );
                }
            }
        }
        Ok(entries)
    }
}

impl ReviewStore for JsonlReviewQueue {
    fn append(&mut self, entry: NewReviewEntry) -> Result<ReviewEntry> {
        let entry = entry.into_entry(next_id(&self.load()?));
        self.append_event(&QueueEvent::Queued(entry.clone()))?;
        Ok(entry)
    }

    fn list(&self, filter: &ReviewFilter) -> Result<Vec<ReviewEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect())
    }

    fn mark_resolved(&mut self, id: u64) -> Result<ReviewEntry> {
        let mut entry = self
            .load()?
            .into_iter()
            .find(|entry| entry.id == id)
            .ok_or_else(|| anyhow!("no review entry with id {id}"))?;
        if entry.status == ReviewStatus::Resolved {
            return Ok(entry);
        }
        let resolved_at = now_epoch_ms();
        self.append_event(&QueueEvent::Resolved { id, resolved_at })?;
        entry.status = ReviewStatus::Resolved;
        entry.resolved_at = Some(resolved_at);
        Ok(entry)
    }
}

/// In-memory review queue for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryReviewQueue {
    entries: Vec<ReviewEntry>,
}

impl MemoryReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStore for MemoryReviewQueue {
    fn append(&mut self, entry: NewReviewEntry) -> Result<ReviewEntry> {
        let entry = entry.into_entry(next_id(&self.entries));
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn list(&self, filter: &ReviewFilter) -> Result<Vec<ReviewEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }

    fn mark_resolved(&mut self, id: u64) -> Result<ReviewEntry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| anyhow!("no review entry with id {id}"))?;
        if entry.status == ReviewStatus::Pending {
            entry.status = ReviewStatus::Resolved;
            entry.resolved_at = Some(now_epoch_ms());
        }
        Ok(entry.clone())
    }
}

fn next_id(entries: &[ReviewEntry]) -> u64 {
    entries.iter().map(|entry| entry.id).max().unwrap_or(0) + 1
}
