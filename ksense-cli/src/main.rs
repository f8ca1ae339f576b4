//! KSense CLI: percentile, score, and replay commands.
//!
//! Commands:
//! - `percentiles`: estimate percentiles from a histogram snapshot (JSON)
//! - `score`: Mahalanobis distance of one query against a reference CSV
//! - `replay`: stream a CSV of observations through the monitor, writing one
//!   report row per tick

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ksense_core::{estimate_percentiles, mahalanobis, KsenseConfig, PickMode};
use ksense_runner::{report_header, CsvSink, Monitor, SeriesRecorder};

#[derive(Parser)]
#[command(
    name = "ksense",
    about = "KSense CLI: histogram percentiles and Mahalanobis anomaly scores"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate percentiles from a histogram snapshot.
    Percentiles {
        /// JSON file: {"key": count, ...} or [[key, count], ...].
        #[arg(long)]
        histogram: PathBuf,

        /// Ratio in (0, 1]; repeat for several. Overrides the config.
        #[arg(short = 'p', long = "percentile")]
        percentiles: Vec<f64>,

        /// Sub-bucket bits. Overrides the config.
        #[arg(long)]
        subbits: Option<u32>,

        /// lower, mid, or upper. Overrides the config.
        #[arg(long)]
        mode: Option<PickMode>,
    },
    /// Score one feature vector against a reference set.
    Score {
        /// CSV file with one feature vector per row.
        #[arg(long)]
        reference: PathBuf,

        /// Comma-separated feature vector, e.g. 1.0,2.5,-0.3.
        #[arg(long, allow_hyphen_values = true)]
        query: String,

        /// The reference CSV starts with a header row.
        #[arg(long, default_value_t = false)]
        header: bool,
    },
    /// Replay observations (value,f1,...,fd per row) through the monitor.
    Replay {
        /// Input CSV.
        #[arg(long)]
        input: PathBuf,

        /// Output CSV for per-tick reports (appended; header written once).
        #[arg(long)]
        out: PathBuf,

        /// Also save the distance/energy/direction series to this CSV.
        #[arg(long)]
        series: Option<PathBuf>,

        /// The input CSV starts with a header row.
        #[arg(long, default_value_t = false)]
        header: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Percentiles {
            histogram,
            percentiles,
            subbits,
            mode,
        } => run_percentiles(&config, &histogram, percentiles, subbits, mode),
        Commands::Score {
            reference,
            query,
            header,
        } => run_score(&config, &reference, &query, header),
        Commands::Replay {
            input,
            out,
            series,
            header,
        } => run_replay(config, &input, &out, series.as_deref(), header),
    }
}

fn load_config(path: Option<&Path>) -> Result<KsenseConfig> {
    match path {
        Some(p) => KsenseConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(KsenseConfig::default()),
    }
}

fn run_percentiles(
    config: &KsenseConfig,
    path: &Path,
    percentiles: Vec<f64>,
    subbits: Option<u32>,
    mode: Option<PickMode>,
) -> Result<()> {
    let mut hc = config.histogram.clone();
    if !percentiles.is_empty() {
        hc.percentiles = percentiles;
    }
    if let Some(s) = subbits {
        hc.subbits = s;
    }
    if let Some(m) = mode {
        hc.mode = m;
    }
    let overridden = KsenseConfig {
        histogram: hc,
        ..config.clone()
    };
    overridden.validate()?;
    let hc = &overridden.histogram;

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let histogram = parse_histogram(&text)
        .with_context(|| format!("failed to parse histogram {}", path.display()))?;

    let estimates = estimate_percentiles(histogram, &hc.percentiles, hc.subbits, hc.mode);
    println!("{}", serde_json::to_string_pretty(&estimates)?);
    Ok(())
}

/// Accepts a JSON object keyed by histogram key or a list of `[key, count]`.
fn parse_histogram(text: &str) -> Result<BTreeMap<u64, u64>> {
    if let Ok(map) = serde_json::from_str::<BTreeMap<u64, u64>>(text) {
        return Ok(map);
    }
    let pairs: Vec<(u64, u64)> = serde_json::from_str(text)
        .context("expected {\"key\": count, ...} or [[key, count], ...]")?;
    let mut map = BTreeMap::new();
    for (key, count) in pairs {
        *map.entry(key).or_insert(0u64) += count;
    }
    Ok(map)
}

fn parse_row<'a, I>(fields: I, line: usize) -> Result<Vec<f64>>
where
    I: IntoIterator<Item = &'a str>,
{
    fields
        .into_iter()
        .enumerate()
        .map(|(col, f)| {
            f.trim()
                .parse::<f64>()
                .with_context(|| format!("line {line}, column {}: not a number: '{f}'", col + 1))
        })
        .collect()
}

fn read_rows(path: &Path, header: bool) -> Result<Vec<Vec<f64>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(header)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        let line = i + 1 + usize::from(header);
        rows.push(parse_row(record.iter(), line)?);
    }
    Ok(rows)
}

fn run_score(config: &KsenseConfig, reference: &Path, query: &str, header: bool) -> Result<()> {
    let rows = read_rows(reference, header)?;
    let x = parse_row(query.split(','), 1).context("invalid --query")?;

    match mahalanobis::try_score(&x, &rows, &config.mahalanobis) {
        Ok(d) => println!("{d:.6}"),
        Err(cause) => {
            info!(%cause, "score undefined");
            println!("undefined");
        }
    }
    Ok(())
}

fn run_replay(
    config: KsenseConfig,
    input: &Path,
    out: &Path,
    series: Option<&Path>,
    header: bool,
) -> Result<()> {
    let rows = read_rows(input, header)?;
    if rows.is_empty() {
        bail!("{} has no observations", input.display());
    }

    let report_cols = report_header(&config.histogram.percentiles);
    let sink = CsvSink::open(out, &report_cols)
        .with_context(|| format!("failed to open output {}", out.display()))?;
    let mut monitor = Monitor::new(config).with_sink(sink);
    if series.is_some() {
        monitor = monitor.with_renderer(Box::new(SeriesRecorder::new()));
    }

    let mut defined = 0usize;
    let mut last = None;
    for (i, row) in rows.into_iter().enumerate() {
        let Some((&value, features)) = row.split_first() else {
            continue;
        };
        if !value.is_finite() || value < 0.0 {
            bail!("row {}: value must be a finite non-negative number, got {value}", i + 1);
        }
        let report = monitor
            .observe(i as f64, value.round() as u64, features.to_vec())
            .with_context(|| format!("row {}", i + 1))?;
        if report.distance.is_some() {
            defined += 1;
        }
        last = Some(report);
    }

    if let Some(path) = series {
        monitor
            .save_plot(path)
            .with_context(|| format!("failed to save series {}", path.display()))?;
    }

    info!(
        ticks = monitor.ticks(),
        defined,
        out = %out.display(),
        "replay complete"
    );
    if let Some(report) = last {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
