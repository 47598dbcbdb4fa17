pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::Sensor;

/// One named value of an input record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandValue {
    pub name: String,
    pub value: f64,
}

/// One time step of a point's input series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unix milliseconds
    pub timestamp: i64,
    /// Band values in schema order
    pub bands: Vec<BandValue>,
    /// Source tag copied onto the matching result (scene id, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<Sensor>,
}

impl Observation {
    pub fn new(timestamp: i64, bands: &[(&str, f64)]) -> Self {
        Observation {
            timestamp,
            bands: bands
                .iter()
                .map(|(name, value)| BandValue {
                    name: name.to_string(),
                    value: *value,
                })
                .collect(),
            provenance: None,
            sensor: None,
        }
    }

    pub fn with_sensor(mut self, sensor: Sensor) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_provenance(mut self, tag: &str) -> Self {
        self.provenance = Some(tag.to_string());
        self
    }

    pub fn band(&self, name: &str) -> Option<f64> {
        self.bands.iter().find(|b| b.name == name).map(|b| b.value)
    }

    pub fn first_band(&self) -> Option<&BandValue> {
        self.bands.first()
    }
}

/// Named auxiliary output produced by a step hook.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuxOutput {
    pub label: String,
    pub values: Vec<f64>,
}

impl AuxOutput {
    pub fn scalar(label: &str, value: f64) -> Self {
        AuxOutput {
            label: label.to_string(),
            values: vec![value],
        }
    }
}

/// Seed of the fold: initial state guess, its covariance, and any extra
/// outputs the first step's hooks may read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub x: StateVec,
    #[serde(rename = "P")]
    pub p: Matrix,
    #[serde(default)]
    pub extra: Vec<AuxOutput>,
}

impl InitialState {
    pub fn new(x: StateVec, p: Matrix) -> Self {
        InitialState {
            x,
            p,
            extra: Vec::new(),
        }
    }
}

/// Filter output for one step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Raw measurement, sentinel included. NaN is written as `null`.
    #[serde(deserialize_with = "nan_from_null")]
    pub z: f64,
    /// Posterior state (prior state on masked steps)
    pub x: StateVec,
    /// Posterior covariance (prior covariance on masked steps)
    #[serde(rename = "P")]
    pub p: Matrix,
    /// `H·x`
    pub estimate: f64,
    /// `H·x_bar`
    pub estimate_predicted: f64,
    pub timestamp: i64,
    pub frac_of_year: f64,
    /// Pre-hook outputs followed by post-hook outputs
    #[serde(default)]
    pub aux: Vec<AuxOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<Sensor>,
}

fn nan_from_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Option::<f64>::deserialize(deserializer).map(|v| v.unwrap_or(f64::NAN))
}
