//! Ingestion of LM-generated points of interest.
//!
//! Model output is untrusted: it may be malformed JSON, place coordinates
//! outside the country, or claim the wrong city. The pipeline repairs what
//! it can, verifies every location against the country border and a
//! geocoder, and quarantines anything it cannot verify instead of storing it.
pub mod config;
pub mod geo;
pub mod ingest;
pub mod model;
pub mod repair;
pub mod report;
pub mod review;
pub mod store;
pub mod suggestion;
pub mod util;

pub use geo::{GeoValidator, ReasonCode, ValidationResult};
pub use ingest::{BatchRequest, BatchSummary, Orchestrator, Outcome};
pub use model::{ExecutorError, RequestExecutor};
pub use repair::JsonRepairer;
pub use review::{JsonlReviewQueue, ReviewEntry, ReviewStore};
