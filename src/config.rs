use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{KalmanModel, RecordingFlag, FREQUENCY, MASK_VALUE};
use crate::error::{IoError, KalmanError, Result};
use crate::export::Unpacker;
use crate::filters::KalmanFilter;
use crate::harmonic::HarmonicModel;
use crate::types::InitialState;

/// Process noise, either shared by every coefficient or given per coefficient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessNoise {
    Scalar(f64),
    PerCoefficient(Vec<f64>),
}

/// Run configuration. Every field has a default, so a JSON file only needs
/// the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    // ── Model ──
    pub model: KalmanModel,
    pub frequency: f64,

    // ── Noise ──
    pub q: ProcessNoise,
    pub r: f64,
    /// Initial covariance is `p0 · I`
    pub p0: f64,

    // ── Measurement ──
    pub band: Option<String>,
    pub mask_value: f64,

    // ── Output ──
    /// Column groups written by the exporter
    pub recording: Vec<RecordingFlag>,

    // ── Execution ──
    /// Worker threads, 0 = one per core
    pub threads: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            model: KalmanModel::Unimodal,
            frequency: FREQUENCY,
            q: ProcessNoise::Scalar(0.001),
            r: 0.003,
            p0: 0.1,
            band: None,
            mask_value: MASK_VALUE,
            recording: RecordingFlag::ALL.to_vec(),
            threads: 0,
        }
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KalmanError::InvalidParameters(format!(
            "{} must be a finite non-negative number, got {}",
            name, value
        )))
    }
}

impl FilterConfig {
    pub fn load(path: &Path) -> std::result::Result<Self, IoError> {
        let json = fs::read_to_string(path)?;
        let config: FilterConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_non_negative("r", self.r)?;
        check_non_negative("p0", self.p0)?;
        match &self.q {
            ProcessNoise::Scalar(q) => check_non_negative("q", *q)?,
            ProcessNoise::PerCoefficient(values) => {
                for q in values {
                    check_non_negative("q", *q)?;
                }
            }
        }
        if !self.frequency.is_finite() {
            return Err(KalmanError::InvalidParameters(format!(
                "frequency must be finite, got {}",
                self.frequency
            )));
        }
        Ok(())
    }

    pub fn harmonic_model(&self) -> Result<HarmonicModel> {
        let model = match &self.q {
            ProcessNoise::Scalar(q) => HarmonicModel::new(self.model, *q, self.r),
            ProcessNoise::PerCoefficient(values) => {
                HarmonicModel::new(self.model, 0.0, self.r).with_process_noise(values.clone())?
            }
        };
        Ok(model.with_frequency(self.frequency))
    }

    /// Filter with the configured band and mask applied.
    pub fn filter(&self) -> Result<KalmanFilter<HarmonicModel>> {
        self.validate()?;
        let filter = self
            .harmonic_model()?
            .into_filter()?
            .with_mask_value(self.mask_value);
        Ok(match &self.band {
            Some(band) => filter.with_measurement_band(band.clone()),
            None => filter,
        })
    }

    /// Exporter naming the model's coefficients and writing the recorded
    /// column groups.
    pub fn unpacker(&self) -> Result<Unpacker> {
        Ok(Unpacker::new(self.harmonic_model()?.labels()).with_recording(&self.recording))
    }

    /// Zero coefficients with `P0 = p0 · I`.
    pub fn seed(&self) -> InitialState {
        HarmonicModel::new(self.model, 0.0, self.r).initial_state(self.p0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FilterConfig =
            serde_json::from_str(r#"{"model": "bimodal", "r": 0.05}"#).unwrap();
        assert_eq!(config.model, KalmanModel::Bimodal);
        assert_eq!(config.r, 0.05);
        assert_eq!(config.mask_value, MASK_VALUE);
        assert_eq!(config.q, ProcessNoise::Scalar(0.001));
    }

    #[test]
    fn test_per_coefficient_noise() {
        let config: FilterConfig =
            serde_json::from_str(r#"{"q": [0.1, 0.01, 0.01]}"#).unwrap();
        let filter = config.filter().unwrap();
        assert_eq!(filter.num_params(), 3);

        let wrong: FilterConfig = serde_json::from_str(r#"{"q": [0.1, 0.01]}"#).unwrap();
        assert!(wrong.filter().is_err());
    }

    #[test]
    fn test_negative_noise_rejected() {
        let config = FilterConfig {
            r: -1.0,
            ..FilterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KalmanError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_seed_matches_model() {
        let config = FilterConfig {
            model: KalmanModel::TrimodalWithSlope,
            p0: 2.0,
            ..FilterConfig::default()
        };
        let seed = config.seed();
        assert_eq!(seed.x.len(), 8);
        assert_eq!(seed.p[[3, 3]], 2.0);
        assert_eq!(seed.p[[0, 1]], 0.0);
    }

    #[test]
    fn test_filter_carries_band_and_mask() {
        let config = FilterConfig {
            band: Some("nbr".to_string()),
            mask_value: 0.0,
            ..FilterConfig::default()
        };
        let filter = config.filter().unwrap();
        assert_eq!(filter.mask_value(), 0.0);
    }

    #[test]
    fn test_recording_from_json() {
        let config: FilterConfig =
            serde_json::from_str(r#"{"recording": ["estimate", "state", "frac_of_year"]}"#)
                .unwrap();
        assert_eq!(
            config.recording,
            vec![
                RecordingFlag::Estimate,
                RecordingFlag::State,
                RecordingFlag::FractionOfYear
            ]
        );

        let header = config.unpacker().unwrap().header(&[]);
        assert!(header.contains(&"INTP".to_string()));
        assert!(header.contains(&"frac_of_year".to_string()));
        assert!(!header.contains(&"z".to_string()));
        assert!(!header.iter().any(|h| h.starts_with("cov_")));

        assert_eq!(FilterConfig::default().recording, RecordingFlag::ALL.to_vec());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("eeek_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"model": "unimodal_with_slope", "threads": 2}"#).unwrap();

        let config = FilterConfig::load(&path).unwrap();
        assert_eq!(config.model, KalmanModel::UnimodalWithSlope);
        assert_eq!(config.threads, 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
