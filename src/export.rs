//! Flattening filter results into tables (CSV) and JSON documents.

use std::io::{BufReader, Read, Write};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::collection::PointOutcome;
use crate::constants::{
    Harmonic, Kalman, RecordingFlag, AMPLITUDE_LABEL, COV_PREFIX, DATE_LABEL, ESTIMATE_LABEL,
    ESTIMATE_PREDICTED_LABEL, FRACTION_OF_YEAR_LABEL, POINT_INDEX_LABEL, PROVENANCE_LABEL,
    SENSOR_LABEL, TIMESTAMP_LABEL,
};
use crate::dates;
use crate::error::IoError;
use crate::types::{AuxOutput, StepResult};

/// Names the state entries when results are unpacked into columns, and
/// selects which column groups are written.
#[derive(Clone, Debug, PartialEq)]
pub struct Unpacker {
    state_labels: Vec<String>,
    recording: Vec<RecordingFlag>,
}

impl Unpacker {
    /// Unpacker recording every column group.
    pub fn new(state_labels: Vec<String>) -> Self {
        Unpacker {
            state_labels,
            recording: RecordingFlag::ALL.to_vec(),
        }
    }

    /// `X0, X1, ...` for models without named coefficients.
    pub fn generic(num_params: usize) -> Self {
        Unpacker::new(
            (0..num_params)
                .map(|i| format!("{}{}", Kalman::X, i))
                .collect(),
        )
    }

    pub fn with_recording(mut self, flags: &[RecordingFlag]) -> Self {
        self.recording = flags.to_vec();
        self
    }

    fn records(&self, flag: RecordingFlag) -> bool {
        self.recording.contains(&flag)
    }

    fn position(&self, tag: Harmonic) -> Option<usize> {
        self.state_labels.iter().position(|l| l == tag.tag())
    }

    fn amplitude_terms(&self) -> Option<(usize, usize)> {
        if !self.records(RecordingFlag::Amplitude) {
            return None;
        }
        Some((self.position(Harmonic::Cos)?, self.position(Harmonic::Sin)?))
    }

    pub fn header(&self, aux_labels: &[String]) -> Vec<String> {
        let mut columns: Vec<String> = [POINT_INDEX_LABEL, DATE_LABEL, PROVENANCE_LABEL, SENSOR_LABEL]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let scalars = [
            (RecordingFlag::Measurement, Kalman::Z.as_str()),
            (RecordingFlag::Estimate, ESTIMATE_LABEL),
            (RecordingFlag::EstimatePredicted, ESTIMATE_PREDICTED_LABEL),
            (RecordingFlag::Timestamp, TIMESTAMP_LABEL),
            (RecordingFlag::FractionOfYear, FRACTION_OF_YEAR_LABEL),
        ];
        for (flag, label) in scalars {
            if self.records(flag) {
                columns.push(label.to_string());
            }
        }

        if self.records(RecordingFlag::State) {
            columns.extend(self.state_labels.iter().cloned());
        }
        if self.amplitude_terms().is_some() {
            columns.push(AMPLITUDE_LABEL.to_string());
        }
        if self.records(RecordingFlag::StateCov) {
            for (i, a) in self.state_labels.iter().enumerate() {
                for b in &self.state_labels[i..] {
                    columns.push(format!("{}_{}_{}", COV_PREFIX, a, b));
                }
            }
        }
        columns.extend(aux_labels.iter().cloned());
        columns
    }

    /// One table row, in [`Unpacker::header`] order.
    pub fn row(&self, point: u64, result: &StepResult, aux_labels: &[String]) -> Result<Vec<String>, IoError> {
        let mut row = vec![
            point.to_string(),
            dates::format_date(result.timestamp)?,
            result.provenance.clone().unwrap_or_default(),
            result.sensor.map(|s| s.as_str().to_string()).unwrap_or_default(),
        ];

        let scalars = [
            (RecordingFlag::Measurement, result.z.to_string()),
            (RecordingFlag::Estimate, result.estimate.to_string()),
            (RecordingFlag::EstimatePredicted, result.estimate_predicted.to_string()),
            (RecordingFlag::Timestamp, result.timestamp.to_string()),
            (RecordingFlag::FractionOfYear, result.frac_of_year.to_string()),
        ];
        for (flag, value) in scalars {
            if self.records(flag) {
                row.push(value);
            }
        }

        if self.records(RecordingFlag::State) {
            row.extend(result.x.iter().map(|v| v.to_string()));
        }
        if let Some((cos, sin)) = self.amplitude_terms() {
            row.push(result.x[cos].hypot(result.x[sin]).to_string());
        }
        if self.records(RecordingFlag::StateCov) {
            let n = self.state_labels.len();
            for i in 0..n {
                for j in i..n {
                    row.push(result.p[[i, j]].to_string());
                }
            }
        }

        let values = aux_values(&result.aux);
        for label in aux_labels {
            let value = values
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, v)| v.to_string())
                .unwrap_or_default();
            row.push(value);
        }
        Ok(row)
    }
}

/// `label` for scalar outputs, `label_i` for vector outputs.
fn aux_values(aux: &[AuxOutput]) -> Vec<(String, f64)> {
    aux.iter()
        .flat_map(|a| {
            let scalar = a.values.len() == 1;
            a.values.iter().enumerate().map(move |(i, v)| {
                if scalar {
                    (a.label.clone(), *v)
                } else {
                    (format!("{}_{}", a.label, i), *v)
                }
            })
        })
        .collect()
}

/// Auxiliary column names across every result, in first-seen order. A
/// step missing one of them leaves that cell empty.
pub fn aux_labels(outcomes: &[PointOutcome]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    let results = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .flat_map(|results| results.iter());
    for result in results {
        for (label, _) in aux_values(&result.aux) {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
    }
    labels
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub(crate) fn write_csv_line<W: Write>(writer: &mut W, fields: &[String]) -> std::io::Result<()> {
    let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    writeln!(writer, "{}", line.join(","))
}

/// Write every successful point as CSV rows. Failed points are skipped.
/// Returns the number of data rows written.
pub fn write_csv<W: Write>(
    writer: &mut W,
    unpacker: &Unpacker,
    outcomes: &[PointOutcome],
) -> Result<usize, IoError> {
    let labels = aux_labels(outcomes);
    write_csv_line(writer, &unpacker.header(&labels))?;

    let mut rows = 0;
    for outcome in outcomes {
        let results = match &outcome.result {
            Ok(results) => results,
            Err(e) => {
                warn!("[EXPORT] skipping point {}: {}", outcome.point, e);
                continue;
            }
        };
        for result in results {
            write_csv_line(writer, &unpacker.row(outcome.point, result, &labels)?)?;
            rows += 1;
        }
    }
    Ok(rows)
}

#[derive(Serialize)]
struct PointExport<'a> {
    point: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<&'a [StepResult]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Pretty JSON array with one entry per point, carrying either its results
/// or its error message.
pub fn write_json<W: Write>(writer: &mut W, outcomes: &[PointOutcome]) -> Result<(), IoError> {
    let export: Vec<PointExport> = outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(results) => PointExport {
                point: o.point,
                results: Some(results.as_slice()),
                error: None,
            },
            Err(e) => PointExport {
                point: o.point,
                results: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    serde_json::to_writer_pretty(writer, &export)?;
    Ok(())
}

#[derive(Deserialize)]
struct PointImport {
    point: u64,
    #[serde(default)]
    results: Option<Vec<StepResult>>,
    #[serde(default)]
    error: Option<String>,
}

/// Read back a [`write_json`] document. Points that failed when the file was
/// written are dropped with a warning.
pub fn read_json<R: Read>(reader: R) -> Result<Vec<PointOutcome>, IoError> {
    let imported: Vec<PointImport> = serde_json::from_reader(BufReader::new(reader))?;
    Ok(imported
        .into_iter()
        .filter_map(|p| match p.results {
            Some(results) => Some(PointOutcome {
                point: p.point,
                result: Ok(results),
            }),
            None => {
                warn!(
                    "[EXPORT] point {} has no results: {}",
                    p.point,
                    p.error.as_deref().unwrap_or("unknown error")
                );
                None
            }
        })
        .collect())
}
