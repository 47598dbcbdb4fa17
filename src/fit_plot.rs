//! Data behind the "estimate vs observed" plots: per point, the filtered and
//! predicted estimates over time, the observations that were actually used,
//! and optionally the estimate of a baseline run for comparison.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::collection::PointOutcome;
use crate::constants::{
    Kalman, DATE_LABEL, ESTIMATE_LABEL, ESTIMATE_PREDICTED_LABEL, TIMESTAMP_LABEL,
};
use crate::dates;
use crate::error::IoError;
use crate::export::write_csv_line;
use crate::types::StepResult;

const BASELINE_LABEL: &str = "estimate_original";

#[derive(Clone, Debug, PartialEq)]
pub struct FitSample {
    pub date: String,
    pub timestamp: i64,
    pub estimate: f64,
    pub estimate_predicted: f64,
    /// Baseline run's estimate at the same timestamp
    pub baseline: Option<f64>,
    /// Measurement, when it counts as an observation
    pub observed: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FitPlotSeries {
    pub point: u64,
    pub title: String,
    pub samples: Vec<FitSample>,
}

/// Zero and masked measurements are not plotted as observations.
fn is_observed(z: f64, mask_value: f64) -> bool {
    z.is_finite() && z != 0.0 && z > mask_value
}

impl FitPlotSeries {
    pub fn from_results(point: u64, results: &[StepResult], mask_value: f64) -> Result<Self, IoError> {
        let samples = results
            .iter()
            .map(|r| {
                Ok(FitSample {
                    date: dates::format_date(r.timestamp)?,
                    timestamp: r.timestamp,
                    estimate: r.estimate,
                    estimate_predicted: r.estimate_predicted,
                    baseline: None,
                    observed: is_observed(r.z, mask_value).then_some(r.z),
                })
            })
            .collect::<Result<Vec<_>, IoError>>()?;

        Ok(FitPlotSeries {
            point,
            title: format!("Kalman Estimate - Point {}", point),
            samples,
        })
    }

    /// Attach a baseline run's estimates, matched by timestamp.
    pub fn with_baseline(mut self, baseline: &[StepResult]) -> Self {
        let by_time: HashMap<i64, f64> = baseline
            .iter()
            .map(|r| (r.timestamp, r.estimate))
            .collect();
        for sample in &mut self.samples {
            sample.baseline = by_time.get(&sample.timestamp).copied();
        }
        self
    }

    pub fn has_baseline(&self) -> bool {
        self.samples.iter().any(|s| s.baseline.is_some())
    }

    pub fn observed_count(&self) -> usize {
        self.samples.iter().filter(|s| s.observed.is_some()).count()
    }

    pub fn file_name(&self) -> String {
        format!("graph_group_{}.csv", self.point)
    }

    /// `# title` line, header, then one row per step. Empty cells mark a
    /// missing observation or baseline.
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> Result<(), IoError> {
        writeln!(writer, "# {}", self.title)?;

        let mut header = vec![
            DATE_LABEL.to_string(),
            TIMESTAMP_LABEL.to_string(),
            ESTIMATE_LABEL.to_string(),
            ESTIMATE_PREDICTED_LABEL.to_string(),
        ];
        let baseline = self.has_baseline();
        if baseline {
            header.push(BASELINE_LABEL.to_string());
        }
        header.push(Kalman::Z.as_str().to_string());
        write_csv_line(writer, &header)?;

        for s in &self.samples {
            let mut row = vec![
                s.date.clone(),
                s.timestamp.to_string(),
                s.estimate.to_string(),
                s.estimate_predicted.to_string(),
            ];
            if baseline {
                row.push(s.baseline.map(|v| v.to_string()).unwrap_or_default());
            }
            row.push(s.observed.map(|v| v.to_string()).unwrap_or_default());
            write_csv_line(writer, &row)?;
        }
        Ok(())
    }
}

/// One series per successful point. `baseline` outcomes are matched by
/// point id.
pub fn build_series(
    outcomes: &[PointOutcome],
    baseline: Option<&[PointOutcome]>,
    mask_value: f64,
) -> Result<Vec<FitPlotSeries>, IoError> {
    let baseline: HashMap<u64, &[StepResult]> = baseline
        .unwrap_or_default()
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|r| (o.point, r.as_slice())))
        .collect();

    outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|r| (o.point, r)))
        .map(|(point, results)| {
            let series = FitPlotSeries::from_results(point, results, mask_value)?;
            Ok(match baseline.get(&point) {
                Some(base) => series.with_baseline(base),
                None => series,
            })
        })
        .collect()
}

/// Write every series to `dir/graph_group_<point>.csv`.
pub fn write_all(dir: &Path, series: &[FitPlotSeries]) -> Result<usize, IoError> {
    fs::create_dir_all(dir)?;
    for s in series {
        let mut writer = BufWriter::new(File::create(dir.join(s.file_name()))?);
        s.write_csv(&mut writer)?;
        writer.flush()?;
    }
    info!("[FIT PLOT] wrote {} series to {}", series.len(), dir.display());
    Ok(series.len())
}
