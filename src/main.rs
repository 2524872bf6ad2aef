use anyhow::{anyhow, Context, Result};
use clap::Parser;
use poi_ingest::config::{self, Config, ConfigError, ModelBackend};
use poi_ingest::geo::google::GoogleGeocoder;
use poi_ingest::geo::nominatim::NominatimGeocoder;
use poi_ingest::geo::provider::FALLBACK_MIN_INTERVAL;
use poi_ingest::geo::{GeoValidator, Geocoder, RateLimited, SearchBias};
use poi_ingest::ingest::{build_prompt, sort_by_priority, suggestion_schema, BatchRequest};
use poi_ingest::model::{CommandModelService, HttpModelService, ModelService, RequestExecutor};
use poi_ingest::report::{Reporter, TracingReporter};
use poi_ingest::review::{JsonlReviewQueue, MemoryReviewQueue, ReviewFilter, ReviewStore};
use poi_ingest::store::{JsonlPlaceStore, MemoryPlaceStore, PlaceStore};
use poi_ingest::suggestion::Suggestion;
use poi_ingest::util::ThreadSleeper;
use poi_ingest::{JsonRepairer, Orchestrator};
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

mod cli;
use cli::{
    BatchArgs, Command, GenerateArgs, GlobalArgs, IngestArgs, QueueCommand, QueueListArgs,
    QueueResolveArgs, RepairArgs, RootArgs, SearchArgs, ValidateArgs,
};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.global.verbose);

    match args.command {
        Command::Generate(cmd) => cmd_generate(&args.global, cmd),
        Command::Ingest(cmd) => cmd_ingest(&args.global, cmd),
        Command::Validate(cmd) => cmd_validate(&args.global, cmd),
        Command::Repair(cmd) => cmd_repair(cmd),
        Command::Search(cmd) => cmd_search(&args.global, cmd),
        Command::Queue(QueueCommand::List(cmd)) => cmd_queue_list(&args.global, cmd),
        Command::Queue(QueueCommand::Resolve(cmd)) => cmd_queue_resolve(&args.global, cmd),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(global: &GlobalArgs) -> Result<Config> {
    let path = match &global.config {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("config file {} does not exist", path.display()));
            }
            path.clone()
        }
        None => config::default_config_path()?,
    };
    let config = config::load_or_default(&path)?;
    config::validate_config(&config).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

fn model_service(global: &GlobalArgs, config: &Config) -> Result<Box<dyn ModelService>> {
    let command = config::model_command(config, global.model_command.as_deref());
    let use_command = global.model_command.is_some() || config.model.backend == ModelBackend::Command;
    if use_command {
        let command = command.ok_or(ConfigError::MissingModelCommand)?;
        tracing::debug!(command = %command, "using model command");
        return Ok(Box::new(CommandModelService::new(command)));
    }

    let api_key = config::model_api_key(config, global.model_api_key.as_deref()).unwrap_or_default();
    Ok(Box::new(HttpModelService::new(
        config.model.base_url.clone(),
        config.model.model.clone(),
        api_key,
        Some(Duration::from_secs(config.model.timeout_secs)),
    )))
}

fn geo_validator(global: &GlobalArgs, config: &Config, strict: bool) -> GeoValidator {
    let geocoding = &config.geocoding;
    let primary: Option<Box<dyn Geocoder>> =
        match config::google_api_key(config, global.google_api_key.as_deref()) {
            Some(key) => Some(
                Box::new(GoogleGeocoder::new(key, geocoding.language.clone())) as Box<dyn Geocoder>
            ),
            None => {
                tracing::warn!("no Google API key configured; using fallback geocoder only");
                None
            }
        };
    let fallback: Option<Box<dyn Geocoder>> = geocoding.fallback_enabled.then(|| {
        let nominatim = NominatimGeocoder::new(
            geocoding.nominatim_url.clone(),
            geocoding.user_agent.clone(),
            geocoding.language.clone(),
        );
        Box::new(RateLimited::new(nominatim, ThreadSleeper, FALLBACK_MIN_INTERVAL))
            as Box<dyn Geocoder>
    });
    GeoValidator::new(primary, fallback, strict).with_overrides(config::effective_overrides(config))
}

fn executor(
    global: &GlobalArgs,
    config: &Config,
    reporter: Arc<dyn Reporter>,
) -> Result<RequestExecutor<Box<dyn ModelService>>> {
    Ok(RequestExecutor::new(
        model_service(global, config)?,
        Box::new(ThreadSleeper),
        reporter,
    ))
}

fn batch_request(args: &BatchArgs) -> BatchRequest {
    BatchRequest {
        region: args.region.clone(),
        count: args.count,
        focus: args.focus.clone(),
    }
}

fn cmd_generate(global: &GlobalArgs, args: GenerateArgs) -> Result<()> {
    let config = load_config(global)?;
    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter);
    let executor = executor(global, &config, reporter)?;
    let request = batch_request(&args.batch);

    let known = JsonlPlaceStore::new(&config.storage.places_path)
        .all()?
        .into_iter()
        .map(|place| place.name)
        .collect::<Vec<_>>();
    let prompt = build_prompt(&request, &known);
    let response = executor.execute(&prompt, Some(&suggestion_schema()), &request.context_label())?;

    let mut suggestions = Suggestion::list_from_value(&response);
    sort_by_priority(&mut suggestions);
    print_json(&suggestions)
}

fn cmd_ingest(global: &GlobalArgs, args: IngestArgs) -> Result<()> {
    let config = load_config(global)?;
    let strict = config.strict && !args.lenient;
    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter);

    let places_store = JsonlPlaceStore::new(&config.storage.places_path);
    let (places, reviews): (Box<dyn PlaceStore>, Box<dyn ReviewStore>) = if args.dry_run {
        (
            Box::new(MemoryPlaceStore::with_places(places_store.all()?)),
            Box::new(MemoryReviewQueue::new()),
        )
    } else {
        (
            Box::new(places_store),
            Box::new(JsonlReviewQueue::new(&config.storage.review_queue_path)),
        )
    };

    let mut orchestrator = Orchestrator::new(
        executor(global, &config, reporter.clone())?,
        geo_validator(global, &config, strict),
        places,
        reviews,
        reporter.clone(),
    )
    .with_dedup_tolerance(config.dedup_tolerance);

    let summary = match &args.from {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read suggestions {}", path.display()))?;
            let value = JsonRepairer::new(reporter).repair(&text);
            orchestrator.process_all(Suggestion::list_from_value(&value))
        }
        None => orchestrator.run_batch(&batch_request(&args.batch)),
    };

    print_json(&summary)?;
    match &summary.error {
        Some(error) => Err(anyhow!("batch failed: {error}")),
        None => Ok(()),
    }
}

fn cmd_validate(global: &GlobalArgs, args: ValidateArgs) -> Result<()> {
    let config = load_config(global)?;
    let strict = config.strict && !args.lenient;
    let validator = geo_validator(global, &config, strict);
    let result = validator.validate(Some(args.lat), Some(args.lng), args.city.as_deref());
    print_json(&result)
}

fn cmd_repair(args: RepairArgs) -> Result<()> {
    let text = match &args.input {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("read stdin")?;
            buffer
        }
    };
    let value = JsonRepairer::new(Arc::new(TracingReporter)).repair(&text);
    print_json(&value)
}

fn cmd_search(global: &GlobalArgs, args: SearchArgs) -> Result<()> {
    let config = load_config(global)?;
    let bias = match &args.near {
        Some(near) => Some(parse_bias(near, args.radius)?),
        None => None,
    };
    let validator = geo_validator(global, &config, config.strict);
    let hits = validator.search(&args.query, bias)?;
    print_json(&hits)
}

fn parse_bias(near: &str, radius_m: Option<u32>) -> Result<SearchBias> {
    let (lat, lng) = near
        .split_once(',')
        .ok_or_else(|| anyhow!("--near must be LAT,LNG (got {near:?})"))?;
    let lat: f64 = lat.trim().parse().with_context(|| format!("parse latitude {lat:?}"))?;
    let lng: f64 = lng.trim().parse().with_context(|| format!("parse longitude {lng:?}"))?;
    Ok(SearchBias { lat, lng, radius_m })
}

fn review_queue(global: &GlobalArgs) -> Result<JsonlReviewQueue> {
    let config = load_config(global)?;
    Ok(JsonlReviewQueue::new(config.storage.review_queue_path))
}

fn cmd_queue_list(global: &GlobalArgs, args: QueueListArgs) -> Result<()> {
    let queue = review_queue(global)?;
    let filter = ReviewFilter {
        reason: args
            .reason
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|err: String| anyhow!(err))?,
        status: args
            .status
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|err: String| anyhow!(err))?,
    };
    let entries = queue.list(&filter)?;
    if args.json {
        return print_json(&entries);
    }
    for entry in &entries {
        let coordinates = match (entry.lat, entry.lng) {
            (Some(lat), Some(lng)) => format!("{lat:.5},{lng:.5}"),
            _ => "-".to_string(),
        };
        println!(
            "{:>5}  {:<8}  {:<32}  {:<20}  {}",
            entry.id,
            entry.status.as_str(),
            entry.failure_reason.as_str(),
            coordinates,
            entry.name
        );
    }
    if entries.is_empty() {
        eprintln!("no review entries in {}", queue.path().display());
    }
    Ok(())
}

fn cmd_queue_resolve(global: &GlobalArgs, args: QueueResolveArgs) -> Result<()> {
    let mut queue = review_queue(global)?;
    let entry = queue.mark_resolved(args.id)?;
    tracing::info!(id = entry.id, name = %entry.name, "review entry resolved");
    print_json(&entry)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
