//! Labels, the missing-measurement sentinel and the closed sets of
//! configuration values shared by the filter, the exporters and the CLI.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const ESTIMATE_LABEL: &str = "estimate";
pub const ESTIMATE_PREDICTED_LABEL: &str = "estimate_predicted";
pub const TIMESTAMP_LABEL: &str = "timestamp";
pub const FRACTION_OF_YEAR_LABEL: &str = "frac_of_year";
pub const DATE_LABEL: &str = "date";
pub const AMPLITUDE_LABEL: &str = "amplitude";
pub const POINT_INDEX_LABEL: &str = "point";
pub const PROVENANCE_LABEL: &str = "provenance";
pub const SENSOR_LABEL: &str = "sensor";

/// Measurements at or below this value mean "no observation".
pub const MASK_VALUE: f64 = -999.0;

/// Only one band is filtered per run.
pub const NUM_MEASURES: usize = 1;

/// Angular frequency applied to fractional-year time in the harmonic terms.
pub const FREQUENCY: f64 = 6.283;

/// Names of the fields in a filter result snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kalman {
    #[serde(rename = "F")]
    F,
    #[serde(rename = "Q")]
    Q,
    #[serde(rename = "H")]
    H,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "P")]
    P,
    #[serde(rename = "X")]
    X,
    #[serde(rename = "z")]
    Z,
}

impl Kalman {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kalman::F => "F",
            Kalman::Q => "Q",
            Kalman::H => "H",
            Kalman::R => "R",
            Kalman::P => "P",
            Kalman::X => "X",
            Kalman::Z => "z",
        }
    }
}

impl fmt::Display for Kalman {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix of flattened covariance columns.
pub const COV_PREFIX: &str = "cov";

/// Coefficients of a harmonic regression, in state-vector order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Harmonic {
    #[serde(rename = "INTP")]
    Intercept,
    #[serde(rename = "SLP")]
    Slope,
    #[serde(rename = "COS")]
    Cos,
    #[serde(rename = "SIN")]
    Sin,
    #[serde(rename = "COS2")]
    Cos2,
    #[serde(rename = "SIN2")]
    Sin2,
    #[serde(rename = "COS3")]
    Cos3,
    #[serde(rename = "SIN3")]
    Sin3,
}

impl Harmonic {
    pub fn tag(&self) -> &'static str {
        match self {
            Harmonic::Intercept => "INTP",
            Harmonic::Slope => "SLP",
            Harmonic::Cos => "COS",
            Harmonic::Sin => "SIN",
            Harmonic::Cos2 => "COS2",
            Harmonic::Sin2 => "SIN2",
            Harmonic::Cos3 => "COS3",
            Harmonic::Sin3 => "SIN3",
        }
    }
}

/// Spectral index bands a collection may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Index {
    Swir,
    Nbr,
    Ndvi,
}

impl Index {
    pub fn band_name(&self) -> &'static str {
        match self {
            Index::Swir => "swir",
            Index::Nbr => "nbr",
            Index::Ndvi => "ndvi",
        }
    }
}

/// Platform that acquired a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    L7,
    L8,
    L9,
    S2,
}

impl Sensor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensor::L7 => "L7",
            Sensor::L8 => "L8",
            Sensor::L9 => "L9",
            Sensor::S2 => "S2",
        }
    }
}

/// Column groups the exporter writes. `point`, `date`, `provenance`,
/// `sensor` and hook outputs are always written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum RecordingFlag {
    State,
    #[serde(rename = "state_covariance")]
    #[value(name = "state_covariance")]
    StateCov,
    Estimate,
    EstimatePredicted,
    Timestamp,
    #[serde(rename = "frac_of_year")]
    #[value(name = "frac_of_year")]
    FractionOfYear,
    Amplitude,
    Measurement,
}

impl RecordingFlag {
    pub const ALL: [RecordingFlag; 8] = [
        RecordingFlag::State,
        RecordingFlag::StateCov,
        RecordingFlag::Estimate,
        RecordingFlag::EstimatePredicted,
        RecordingFlag::Timestamp,
        RecordingFlag::FractionOfYear,
        RecordingFlag::Amplitude,
        RecordingFlag::Measurement,
    ];
}

/// State-space models the harmonic builder knows how to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KalmanModel {
    Unimodal,
    UnimodalWithSlope,
    Bimodal,
    BimodalWithSlope,
    Trimodal,
    TrimodalWithSlope,
}

impl KalmanModel {
    pub const ALL: [KalmanModel; 6] = [
        KalmanModel::Unimodal,
        KalmanModel::UnimodalWithSlope,
        KalmanModel::Bimodal,
        KalmanModel::BimodalWithSlope,
        KalmanModel::Trimodal,
        KalmanModel::TrimodalWithSlope,
    ];

    /// Number of sinusoid pairs (1 = annual, 2 = + semi-annual, 3 = + 4-monthly).
    pub fn modes(&self) -> usize {
        match self {
            KalmanModel::Unimodal | KalmanModel::UnimodalWithSlope => 1,
            KalmanModel::Bimodal | KalmanModel::BimodalWithSlope => 2,
            KalmanModel::Trimodal | KalmanModel::TrimodalWithSlope => 3,
        }
    }

    pub fn has_slope(&self) -> bool {
        matches!(
            self,
            KalmanModel::UnimodalWithSlope
                | KalmanModel::BimodalWithSlope
                | KalmanModel::TrimodalWithSlope
        )
    }

    /// Coefficients carried in the state vector, in order.
    pub fn harmonic_flags(&self) -> Vec<Harmonic> {
        let mut flags = vec![Harmonic::Intercept];
        if self.has_slope() {
            flags.push(Harmonic::Slope);
        }
        let pairs = [
            (Harmonic::Cos, Harmonic::Sin),
            (Harmonic::Cos2, Harmonic::Sin2),
            (Harmonic::Cos3, Harmonic::Sin3),
        ];
        for (cos, sin) in pairs.iter().take(self.modes()) {
            flags.push(*cos);
            flags.push(*sin);
        }
        flags
    }

    pub fn num_params(&self) -> usize {
        1 + usize::from(self.has_slope()) + 2 * self.modes()
    }
}
