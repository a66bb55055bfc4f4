//! Next-day temperature forecast.
//!
//! Fits an ordinary least-squares line of temperature against capture time
//! (seconds since the epoch) and evaluates it 24 hours ahead. Samples are
//! shuffled with a fixed seed and split 80/20; the held-out part only feeds
//! the reported error.

use chrono::{Local, NaiveDateTime, Offset, TimeDelta, TimeZone};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use skylog_core::ForecastError;

use crate::types::Reading;

/// Seed for the train/held-out shuffle, fixed so repeated runs agree
pub const SPLIT_SEED: u64 = 42;
/// Share of samples held out from fitting
pub const HOLDOUT_FRACTION: f64 = 0.2;
/// Smallest sample count that leaves at least one training sample
pub const MIN_SAMPLES: usize = 2;

/// `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearModel {
    /// Least-squares fit over `(x, y)` pairs. `None` when there are no samples.
    ///
    /// With no spread in `x` (including a single sample) the line is flat at
    /// the mean of `y`.
    pub fn fit(samples: &[(f64, f64)]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f64;
        let mean_x = samples.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = samples.iter().map(|(_, y)| y).sum::<f64>() / n;

        let (sxx, sxy) = samples.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
            let dx = x - mean_x;
            (sxx + dx * dx, sxy + dx * (y - mean_y))
        });

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// A successful forecast
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Fahrenheit
    pub temperature: f64,
    pub target_time: NaiveDateTime,
    pub model: LinearModel,
    pub training_samples: usize,
    pub holdout_samples: usize,
    /// Mean absolute error over the held-out samples, in °F
    pub holdout_mae: Option<f64>,
}

/// Shuffle with a seeded RNG and split off `ceil(len * holdout_fraction)`
/// items. Returns `(training, holdout)`.
pub fn train_test_split<T: Clone>(
    samples: &[T],
    holdout_fraction: f64,
    seed: u64,
) -> (Vec<T>, Vec<T>) {
    let holdout_len = ((samples.len() as f64) * holdout_fraction).ceil() as usize;
    let holdout_len = holdout_len.min(samples.len());

    let mut indices: Vec<usize> = (0..samples.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (holdout_idx, training_idx) = indices.split_at(holdout_len);
    let pick = |idx: &[usize]| idx.iter().map(|&i| samples[i].clone()).collect::<Vec<_>>();
    (pick(training_idx), pick(holdout_idx))
}

/// Seconds since the epoch for a naive local timestamp.
fn local_epoch_seconds(datetime: &NaiveDateTime) -> f64 {
    let micros = match Local.from_local_datetime(datetime).earliest() {
        Some(local) => local.timestamp_micros(),
        // Skipped by a DST jump: use the offset in effect at that instant
        None => {
            let offset = Local.offset_from_utc_datetime(datetime).fix().local_minus_utc();
            datetime.and_utc().timestamp_micros() - i64::from(offset) * 1_000_000
        }
    };
    micros as f64 / 1_000_000.0
}

/// Predict the temperature 24 hours after `now`.
///
/// Only successful readings are used. With `city` set, other cities'
/// readings are ignored; `None` regresses over every stored reading.
pub fn predict_next_day(
    readings: &[Reading],
    city: Option<&str>,
    now: NaiveDateTime,
) -> Result<Prediction, ForecastError> {
    let samples: Vec<(f64, f64)> = readings
        .iter()
        .filter(|r| r.is_success())
        .filter(|r| city.map_or(true, |c| r.city() == c))
        .map(|r| (local_epoch_seconds(&r.datetime), r.temperature()))
        .collect();

    if samples.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(ForecastError::NonFinite);
    }

    if samples.len() < MIN_SAMPLES {
        return Err(ForecastError::InsufficientSamples {
            available: samples.len(),
            required: MIN_SAMPLES,
        });
    }

    let (training, holdout) = train_test_split(&samples, HOLDOUT_FRACTION, SPLIT_SEED);
    let model = LinearModel::fit(&training).ok_or(ForecastError::InsufficientSamples {
        available: samples.len(),
        required: MIN_SAMPLES,
    })?;

    let target_time = now + TimeDelta::days(1);
    let temperature = model.predict(local_epoch_seconds(&target_time));
    if !temperature.is_finite() {
        return Err(ForecastError::NonFinite);
    }

    let holdout_mae = (!holdout.is_empty()).then(|| {
        holdout
            .iter()
            .map(|(x, y)| (model.predict(*x) - y).abs())
            .sum::<f64>()
            / holdout.len() as f64
    });

    tracing::debug!(
        "Forecast fitted on {} samples (slope {:.3e} °F/s), held-out MAE {:?}",
        training.len(),
        model.slope,
        holdout_mae
    );

    Ok(Prediction {
        temperature,
        target_time,
        model,
        training_samples: training.len(),
        holdout_samples: holdout.len(),
        holdout_mae,
    })
}

/// Human-readable line for a forecast outcome. Failures become text too.
pub fn forecast_message(result: &Result<Prediction, ForecastError>) -> String {
    match result {
        Ok(prediction) => format!(
            "Predicted temperature for tomorrow: {:.2} °F",
            prediction.temperature
        ),
        Err(e) => format!("An error occurred while predicting tomorrow's temperature: {e}"),
    }
}
