//! Point collections: independent per-pixel series filtered in parallel.
//!
//! # File Format
//! `.json` or `.json.gz`:
//! ```json
//! {"points": [{"point": 0, "records": [
//!     {"timestamp": 1451606400000, "bands": [{"name": "ndvi", "value": 0.41}]}
//! ]}]}
//! ```
//! A point may carry its own `seed` (`{"x": ..., "P": ...}`); otherwise the
//! run's default seed is used.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{IoError, KalmanError, Result};
use crate::filters::{KalmanFilter, StateSpaceModel};
use crate::types::{InitialState, Observation, StepResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointSeries {
    pub point: u64,
    pub records: Vec<Observation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<InitialState>,
}

impl PointSeries {
    pub fn new(point: u64, records: Vec<Observation>) -> Self {
        PointSeries {
            point,
            records,
            seed: None,
        }
    }

    /// Records must be in ascending time order.
    pub fn check_order(&self) -> Result<()> {
        for (i, pair) in self.records.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(KalmanError::InvalidParameters(format!(
                    "point {} record {} is earlier than record {}",
                    self.point,
                    i + 1,
                    i
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCollection {
    pub points: Vec<PointSeries>,
}

/// Filter output for one point; a failure only affects its own point.
#[derive(Clone, Debug, PartialEq)]
pub struct PointOutcome {
    pub point: u64,
    pub result: Result<Vec<StepResult>>,
}

impl PointCollection {
    pub fn new(points: Vec<PointSeries>) -> Self {
        PointCollection { points }
    }

    /// Load from `.json`, or `.json.gz` when the extension is `gz`.
    pub fn load(path: &Path) -> std::result::Result<Self, IoError> {
        let file = File::open(path)?;
        let collection = if path.extension().map(|e| e == "gz").unwrap_or(false) {
            Self::from_reader(GzDecoder::new(file))?
        } else {
            Self::from_reader(file)?
        };
        info!(
            "[COLLECTION] loaded {} points from {}",
            collection.len(),
            path.display()
        );
        Ok(collection)
    }

    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, IoError> {
        let collection: PointCollection = serde_json::from_reader(BufReader::new(reader))?;
        for series in &collection.points {
            series.check_order()?;
        }
        Ok(collection)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Fold every point independently on up to `threads` worker threads
    /// (`0` = one per available core). Outcomes come back in input order.
    pub fn run_parallel<M: StateSpaceModel>(
        &self,
        filter: &KalmanFilter<M>,
        seed: &InitialState,
        threads: usize,
    ) -> Result<Vec<PointOutcome>> {
        if self.points.is_empty() {
            return Ok(Vec::new());
        }

        let threads = if threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            threads
        };
        let threads = threads.min(self.points.len());
        let chunk_size = self.points.len().div_ceil(threads);

        let outcomes = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = self
                .points
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|series| run_point(filter, series, seed))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .zip(self.points.chunks(chunk_size))
                .flat_map(|(handle, chunk)| match handle.join() {
                    Ok(outcomes) => outcomes,
                    Err(_) => chunk
                        .iter()
                        .map(|series| PointOutcome {
                            point: series.point,
                            result: Err(KalmanError::WorkerPanicked),
                        })
                        .collect(),
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| KalmanError::WorkerPanicked)?;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(
            "[COLLECTION] filtered {} points ({} failed) on {} threads",
            outcomes.len(),
            failed,
            threads
        );
        Ok(outcomes)
    }
}

fn run_point<M: StateSpaceModel>(
    filter: &KalmanFilter<M>,
    series: &PointSeries,
    default_seed: &InitialState,
) -> PointOutcome {
    let seed = series.seed.as_ref().unwrap_or(default_seed);
    let result = filter.run(&series.records, seed);
    if let Err(e) = &result {
        warn!("[COLLECTION] point {} aborted: {}", series.point, e);
    }
    PointOutcome {
        point: series.point,
        result,
    }
}
