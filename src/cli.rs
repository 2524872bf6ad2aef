//! CLI argument parsing.
//!
//! The CLI only wires collaborators together; validation policy lives in the
//! library so the same pipeline can run inside other jobs.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "poi-ingest",
    version,
    about = "Validated ingestion of LM-generated points of interest",
    after_help = "Examples:\n  poi-ingest generate --region Mostar --count 5\n  poi-ingest ingest --region Sarajevo --count 10\n  poi-ingest ingest --from suggestions.json --lenient\n  poi-ingest validate --lat 43.8563 --lng 18.4131 --city Sarajevo\n  poi-ingest repair response.txt\n  poi-ingest queue list --status pending",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: <data dir>/poi-ingest/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Model API key (overrides POI_INGEST_MODEL_API_KEY and the config)
    #[arg(long, global = true, value_name = "KEY")]
    pub model_api_key: Option<String>,

    /// Google API key (overrides POI_INGEST_GOOGLE_API_KEY and the config)
    #[arg(long, global = true, value_name = "KEY")]
    pub google_api_key: Option<String>,

    /// Local model command; prompt on stdin, response on stdout
    #[arg(long, global = true, value_name = "CMD")]
    pub model_command: Option<String>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask the model for suggestions and print them without validating
    Generate(GenerateArgs),
    /// Run suggestions through validation, promotion and the review queue
    Ingest(IngestArgs),
    /// Check one coordinate pair and city claim
    Validate(ValidateArgs),
    /// Repair malformed JSON from a file or stdin
    Repair(RepairArgs),
    /// Forward search through the geocoders
    Search(SearchArgs),
    /// Inspect and resolve quarantined suggestions
    #[command(subcommand)]
    Queue(QueueCommand),
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Region to ask about (city, canton or area)
    #[arg(long, default_value = "Bosnia and Herzegovina")]
    pub region: String,

    /// Number of suggestions to ask for
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Optional theme, e.g. "waterfalls" or "Ottoman architecture"
    #[arg(long)]
    pub focus: Option<String>,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Read suggestions from a file instead of asking the model
    #[arg(long, value_name = "PATH")]
    pub from: Option<PathBuf>,

    /// Promote places without a verified city (boundary still enforced)
    #[arg(long)]
    pub lenient: bool,

    /// Validate without writing places or review entries
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lng: f64,

    /// City the suggestion claims
    #[arg(long)]
    pub city: Option<String>,

    /// Accept coordinates without a verified city
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Args, Debug)]
pub struct RepairArgs {
    /// Input file; stdin when omitted
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    pub query: String,

    /// Bias results toward this point, as LAT,LNG
    #[arg(long, value_name = "LAT,LNG", allow_hyphen_values = true)]
    pub near: Option<String>,

    /// Bias radius in meters
    #[arg(long)]
    pub radius: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// List review entries
    List(QueueListArgs),
    /// Mark a review entry resolved
    Resolve(QueueResolveArgs),
}

#[derive(Args, Debug)]
pub struct QueueListArgs {
    /// Only entries with this failure reason (e.g. geocoding_failed)
    #[arg(long)]
    pub reason: Option<String>,

    /// Only entries with this status (pending or resolved)
    #[arg(long)]
    pub status: Option<String>,

    /// Emit JSON instead of one line per entry
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct QueueResolveArgs {
    pub id: u64,
}
