use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use flate2::read::GzDecoder;

use eeek_rs::constants::MASK_VALUE;
use eeek_rs::export;
use eeek_rs::fit_plot::{self, FitPlotSeries};
use eeek_rs::PointOutcome;

#[derive(Parser, Debug)]
#[command(about = "Write estimate-vs-observed plot data from a results JSON", long_about = None)]
struct Args {
    /// Results written by `eeek --output <file>.json` or `<file>.json.gz`
    #[arg(long)]
    results: PathBuf,

    /// Results of a baseline run to overlay
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Output directory for graph_group_<point>.csv files
    #[arg(long, default_value = "fit_plots")]
    output_dir: PathBuf,

    /// Measurements at or below this value are not plotted
    #[arg(long, default_value_t = MASK_VALUE, allow_hyphen_values = true)]
    mask_value: f64,
}

fn load_results(path: &Path) -> anyhow::Result<Vec<PointOutcome>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(export::read_json(GzDecoder::new(file))?)
    } else {
        Ok(export::read_json(file)?)
    }
}

fn rmse_pairs(pairs: &[(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return f64::INFINITY;
    }
    let sum_sq: f64 = pairs.iter().map(|(a, b)| (a - b).powi(2)).sum();
    (sum_sq / pairs.len() as f64).sqrt()
}

/// Estimate against the observations it was fitted to.
fn fit_rmse(series: &FitPlotSeries) -> f64 {
    let pairs: Vec<(f64, f64)> = series
        .samples
        .iter()
        .filter_map(|s| s.observed.map(|z| (s.estimate, z)))
        .collect();
    rmse_pairs(&pairs)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let outcomes = load_results(&args.results)?;
    let baseline = match &args.baseline {
        Some(path) => Some(load_results(path)?),
        None => None,
    };

    let series = fit_plot::build_series(&outcomes, baseline.as_deref(), args.mask_value)?;
    for s in &series {
        println!(
            "[POINT {}] steps={} observed={} rmse={:.4}",
            s.point,
            s.samples.len(),
            s.observed_count(),
            fit_rmse(s)
        );
    }

    let written = fit_plot::write_all(&args.output_dir, &series)?;
    println!("Wrote {} plot files to {}", written, args.output_dir.display());
    Ok(())
}
