use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use flate2::write::GzEncoder;
use flate2::Compression;

use eeek_rs::constants::{Index, KalmanModel, RecordingFlag};
use eeek_rs::export::{self, Unpacker};
use eeek_rs::fit_plot;
use eeek_rs::{FilterConfig, PointCollection, PointOutcome, ProcessNoise};

#[derive(Parser, Debug)]
#[command(name = "eeek")]
#[command(about = "Per-pixel Kalman filtering of satellite time series", long_about = None)]
struct Args {
    /// Point collection (.json or .json.gz)
    #[arg(long)]
    input: PathBuf,

    /// JSON filter configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Results file: .csv or .json, optionally followed by .gz
    #[arg(long, default_value = "kalman_results.csv")]
    output: PathBuf,

    /// Harmonic model
    #[arg(long, value_enum)]
    model: Option<KalmanModel>,

    /// Spectral index to filter
    #[arg(long, value_enum, conflicts_with = "band_name")]
    band: Option<Index>,

    /// Band by raw name, for collections with custom bands
    #[arg(long)]
    band_name: Option<String>,

    /// Process noise, shared by every coefficient
    #[arg(long)]
    q: Option<f64>,

    /// Measurement noise
    #[arg(long)]
    r: Option<f64>,

    /// Initial covariance scale (P0 = p0 * I)
    #[arg(long)]
    p0: Option<f64>,

    /// Measurements at or below this value are masked
    #[arg(long, allow_hyphen_values = true)]
    mask_value: Option<f64>,

    /// Column groups to write, comma separated (default: all)
    #[arg(long, value_enum, value_delimiter = ',')]
    record: Vec<RecordingFlag>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Also write per-point fit plot data into this directory
    #[arg(long)]
    plot_dir: Option<PathBuf>,
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn build_config(args: &Args) -> Result<FilterConfig> {
    let mut config = match &args.config {
        Some(path) => FilterConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FilterConfig::default(),
    };

    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(band) = args.band {
        config.band = Some(band.band_name().to_string());
    }
    if let Some(name) = &args.band_name {
        config.band = Some(name.clone());
    }
    if let Some(q) = args.q {
        config.q = ProcessNoise::Scalar(q);
    }
    if let Some(r) = args.r {
        config.r = r;
    }
    if let Some(p0) = args.p0 {
        config.p0 = p0;
    }
    if let Some(mask_value) = args.mask_value {
        config.mask_value = mask_value;
    }
    if !args.record.is_empty() {
        config.recording = args.record.clone();
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }

    config.validate()?;
    Ok(config)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct OutputTarget {
    format: OutputFormat,
    gzip: bool,
}

fn output_target(path: &Path) -> Result<OutputTarget> {
    let gzip = path.extension().map(|e| e == "gz").unwrap_or(false);
    let inner = if gzip { path.file_stem().map(Path::new) } else { Some(path) };
    let format = match inner.and_then(|p| p.extension()).and_then(|e| e.to_str()) {
        Some("csv") => OutputFormat::Csv,
        Some("json") => OutputFormat::Json,
        _ => bail!(
            "Output must end in .csv, .json, .csv.gz or .json.gz: {}",
            path.display()
        ),
    };
    Ok(OutputTarget { format, gzip })
}

/// Returns the number of CSV rows, or the number of points for JSON.
fn write_results<W: Write>(
    writer: &mut W,
    format: OutputFormat,
    unpacker: &Unpacker,
    outcomes: &[PointOutcome],
) -> Result<usize> {
    match format {
        OutputFormat::Csv => Ok(export::write_csv(writer, unpacker, outcomes)?),
        OutputFormat::Json => {
            export::write_json(writer, outcomes)?;
            Ok(outcomes.len())
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let target = output_target(&args.output)?;
    let config = build_config(&args)?;

    println!("[{}] eeek starting", ts_now());
    println!("  Input: {}", args.input.display());
    println!("  Model: {:?} ({} coefficients)", config.model, config.model.num_params());
    println!(
        "  Band: {}",
        config.band.as_deref().unwrap_or("(first band)")
    );
    println!("  Noise: q={:?} r={} p0={}", config.q, config.r, config.p0);

    let collection = PointCollection::load(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    println!("[{}] Loaded {} points", ts_now(), collection.len());

    let unpacker = config.unpacker()?;
    let filter = config.filter()?;
    let seed = config.seed();

    let outcomes = collection.run_parallel(&filter, &seed, config.threads)?;
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    println!(
        "[{}] Filtered {} points ({} failed)",
        ts_now(),
        outcomes.len(),
        failed
    );
    for outcome in outcomes.iter().filter(|o| o.result.is_err()) {
        if let Err(e) = &outcome.result {
            eprintln!("[FAILED] point {}: {}", outcome.point, e);
        }
    }

    let mut file = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create {}", args.output.display()))?,
    );
    let written = if target.gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        let written = write_results(&mut encoder, target.format, &unpacker, &outcomes)?;
        encoder.finish()?.flush()?;
        written
    } else {
        let written = write_results(&mut file, target.format, &unpacker, &outcomes)?;
        file.flush()?;
        written
    };
    let unit = match target.format {
        OutputFormat::Csv => "rows",
        OutputFormat::Json => "points",
    };
    println!(
        "[{}] Wrote {} {} to {}",
        ts_now(),
        written,
        unit,
        args.output.display()
    );

    if let Some(dir) = &args.plot_dir {
        let series = fit_plot::build_series(&outcomes, None, config.mask_value)?;
        let written = fit_plot::write_all(dir, &series)?;
        println!("[{}] Wrote {} plot files to {}", ts_now(), written, dir.display());
    }

    Ok(())
}
