use approx::assert_abs_diff_eq;
use chrono::{TimeZone, Utc};
use ndarray::{array, Array1, Array2};

use eeek_rs::constants::KalmanModel;
use eeek_rs::export::{self, Unpacker};
use eeek_rs::filters::{predict, update};
use eeek_rs::{
    FilterConfig, FnModel, InitialState, KalmanFilter, Observation, PointCollection, PointSeries,
};

fn monthly(values: &[f64]) -> Vec<Observation> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let ts = Utc
                .with_ymd_and_hms(2016, 1 + i as u32, 1, 0, 0, 0)
                .unwrap()
                .timestamp_millis();
            Observation::new(ts, &[("ndvi", *v)])
        })
        .collect()
}

fn level_filter() -> KalmanFilter<FnModel> {
    let model = FnModel::constant(
        Array2::eye(3),
        Array2::eye(3) * 0.01,
        array![[1.0, 0.0, 0.0]],
        array![[0.1]],
    );
    KalmanFilter::new(model, 3).unwrap()
}

#[test]
fn test_level_series_with_gap() {
    let seed = InitialState::new(Array1::zeros(3), Array2::eye(3));
    let results = level_filter()
        .run(&monthly(&[1.0, 1.1, 0.9, -999.0, 1.2]), &seed)
        .unwrap();

    assert_eq!(results.len(), 5);
    // The gap carries step 2's state unchanged.
    assert_eq!(results[3].x, results[2].x);
    assert_eq!(results[3].p, results[2].p);
    assert_eq!(results[3].z, -999.0);

    assert_abs_diff_eq!(results[0].x[0], 1.01 / 1.11, epsilon = 1e-12);
    assert_abs_diff_eq!(results[2].estimate, 0.965788, epsilon = 1e-5);
    assert_abs_diff_eq!(results[4].estimate, 1.041316, epsilon = 1e-5);
    assert!((results[4].estimate - 1.0).abs() < 0.1);

    // Unobserved components only ever gain process noise.
    assert_abs_diff_eq!(results[4].x[1], 0.0);
    assert!(results[4].p[[1, 1]] > 1.0);
}

#[test]
fn test_update_keeps_covariance_symmetric() {
    let x = array![0.2, -0.1, 0.4];
    let p = array![[2.0, 0.3, 0.1], [0.3, 1.5, -0.2], [0.1, -0.2, 0.8]];
    let f = array![[1.0, 0.1, 0.0], [0.0, 1.0, 0.1], [0.0, 0.0, 1.0]];
    let q = Array2::eye(3) * 0.05;
    let h = array![[1.0, 0.5, -0.3]];
    let r = array![[0.2]];

    let prediction = predict(&x, &p, &f, &q).unwrap();
    let mut state = (prediction.x_bar, prediction.p_bar);
    for z in [0.7, 0.1, -0.4, 1.3] {
        let posterior = update(&state.0, &state.1, &array![z], &h, &r, 3).unwrap();
        let prediction = predict(&posterior.x, &posterior.p, &f, &q).unwrap();
        state = (prediction.x_bar, prediction.p_bar);
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(state.1[[i, j]], state.1[[j, i]], epsilon = 1e-10);
            }
        }
    }
}

#[test]
fn test_collection_end_to_end_csv() {
    let config = FilterConfig {
        model: KalmanModel::Unimodal,
        band: Some("ndvi".to_string()),
        threads: 2,
        ..FilterConfig::default()
    };
    let collection = PointCollection::new(vec![
        PointSeries::new(0, monthly(&[0.3, 0.35, -999.0, 0.4])),
        PointSeries::new(1, monthly(&[0.6, 0.62, 0.58])),
    ]);

    let outcomes = collection
        .run_parallel(&config.filter().unwrap(), &config.seed(), config.threads)
        .unwrap();
    assert!(outcomes.iter().all(|o| o.result.is_ok()));

    let unpacker = Unpacker::new(config.harmonic_model().unwrap().labels());
    let mut buffer = Vec::new();
    let rows = export::write_csv(&mut buffer, &unpacker, &outcomes).unwrap();
    assert_eq!(rows, 7);

    let text = String::from_utf8(buffer).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.contains("INTP,COS,SIN,amplitude"));
    assert!(text.lines().nth(3).unwrap().starts_with("0,2016-03-01,"));
}
