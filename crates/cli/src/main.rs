//! Parking pricing replay tool.
//!
//! Replays a historical occupancy CSV through the pricing models and writes
//! the joined price table plus a summary report.
//!
//! ```bash
//! parking-pricer dataset.csv --config pricing.toml --output pricing_results.csv
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parking_core::{
    AnomalyRecord, Config, ModelKind, PriceEvent, ReplayOrdering, Result as PricingResult,
};
use parking_engine::{
    CollectingSink, CsvExporter, FanoutSink, JsonLinesSink, PriceReport, PricingEngine,
    ResultsSink, SqliteSink,
};
use parking_ingestion::{ColumnMapping, CsvSource, RecordNormalizer};
use tracing::{info, warn};

/// Replay parking occupancy data through the pricing models
#[derive(Parser, Debug)]
#[clap(name = "parking-pricer")]
#[clap(about = "Replay parking occupancy observations through dynamic pricing models")]
struct Args {
    /// Occupancy CSV to replay
    #[clap(value_name = "INPUT")]
    input: PathBuf,

    /// TOML configuration file
    #[clap(long, short, value_name = "FILE", env = "PARKING_PRICER_CONFIG")]
    config: Option<PathBuf>,

    /// TOML table of input column aliases
    #[clap(long, value_name = "FILE")]
    columns: Option<PathBuf>,

    /// Models to run (comma separated: baseline, demand, competitive)
    #[clap(long, value_delimiter = ',')]
    models: Option<Vec<ModelKind>>,

    /// Process observations in file order instead of sorting by timestamp
    #[clap(long)]
    arrival_order: bool,

    /// Stop after this many observations
    #[clap(long, value_name = "N")]
    limit: Option<usize>,

    /// Joined price table (CSV)
    #[clap(long, short, value_name = "FILE", default_value = "pricing_results.csv")]
    output: PathBuf,

    /// Stream every event and anomaly as JSON lines
    #[clap(long, value_name = "FILE")]
    jsonl: Option<PathBuf>,

    /// Persist events and anomalies to a SQLite database
    #[clap(long, value_name = "FILE")]
    sqlite: Option<PathBuf>,

    /// Print the report as JSON instead of a table
    #[clap(long)]
    json: bool,
}

/// Keeps every event for the report while forwarding to file sinks.
struct ReportSink {
    collected: CollectingSink,
    outputs: FanoutSink,
}

impl ResultsSink for ReportSink {
    fn write_events(&mut self, events: &[PriceEvent]) -> PricingResult<()> {
        self.collected.write_events(events)?;
        self.outputs.write_events(events)
    }

    fn write_anomaly(&mut self, record: &AnomalyRecord) -> PricingResult<()> {
        self.collected.write_anomaly(record)?;
        self.outputs.write_anomaly(record)
    }

    fn flush(&mut self) -> PricingResult<()> {
        self.outputs.flush()
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(models) = &args.models {
        config.engine.active_models = models.clone();
    }
    if args.arrival_order {
        config.engine.ordering = ReplayOrdering::Arrival;
    }
    if args.limit.is_some() {
        config.engine.max_observations = args.limit;
    }
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parking=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut engine = PricingEngine::new(config).context("invalid pricing configuration")?;

    let mut outputs = FanoutSink::new();
    if let Some(path) = &args.jsonl {
        let sink = JsonLinesSink::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        outputs.push(Box::new(sink));
    }
    if let Some(path) = &args.sqlite {
        let sink =
            SqliteSink::open(path).with_context(|| format!("opening {}", path.display()))?;
        outputs.push(Box::new(sink));
    }
    let mut sink = ReportSink {
        collected: CollectingSink::new(),
        outputs,
    };

    let mapping = match &args.columns {
        Some(path) => ColumnMapping::from_toml_file(path)
            .with_context(|| format!("loading column mapping {}", path.display()))?,
        None => ColumnMapping::default(),
    };
    let source = CsvSource::with_normalizer(&args.input, RecordNormalizer::new(mapping));
    let summary = engine
        .run(&source, &mut sink)
        .with_context(|| format!("replaying {}", args.input.display()))?;

    CsvExporter::new(engine.models())
        .write_file(&args.output, &sink.collected.joined())
        .with_context(|| format!("writing {}", args.output.display()))?;

    let report = PriceReport::from_events(sink.collected.events(), &engine.config().stabilizer);
    if report.bound_violations() > 0 {
        warn!(count = report.bound_violations(), "prices outside configured bounds");
    }

    if args.json {
        let out = serde_json::json!({ "summary": summary, "report": report });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", summary);
        println!("{}", report);
    }

    info!(output = %args.output.display(), "done");
    Ok(())
}
