//! Per-pixel Kalman filtering of satellite time series.
//!
//! Each point's records are folded through predict/update in time order,
//! with masked measurements carrying the prior state forward. Points are
//! independent and run in parallel over a [`collection::PointCollection`].

pub mod collection;
pub mod config;
pub mod constants;
pub mod dates;
pub mod error;
pub mod export;
pub mod filters;
pub mod fit_plot;
pub mod harmonic;
pub mod types;

pub use collection::{PointCollection, PointOutcome, PointSeries};
pub use config::{FilterConfig, ProcessNoise};
pub use error::{IoError, KalmanError, Result};
pub use filters::{FnModel, KalmanFilter, StateSpaceModel};
pub use harmonic::HarmonicModel;
pub use types::{AuxOutput, InitialState, Observation, StepResult};
