/// Series construction: timestamp parsing, frequency inference, gap filling
/// and the train/holdout split. Everything downstream assumes the regular
/// grid built here, so frequency inference uses the median inter-arrival gap
/// (robust to a single outlier gap, unlike the mode).
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::config::PipelineConfig;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("time column '{column}' could not be parsed for {unparseable} of {total} rows")]
    UnparseableTimestamps {
        column: String,
        unparseable: usize,
        total: usize,
    },
    #[error("column '{column}' has non-numeric value '{value}'")]
    NonNumeric { column: String, value: String },
    #[error("column '{0}' not found in CSV")]
    MissingColumn(String),
    #[error("column '{0}' has no usable values")]
    EmptyColumn(String),
    #[error("too few observations after cleaning: {got} (minimum {min})")]
    TooFewObservations { got: usize, min: usize },
    #[error("gap of {run} consecutive missing points exceeds the interpolation tolerance of {max}")]
    GapTooLarge { run: usize, max: usize },
}

/// A cleaned, regularly spaced series ready for model fitting. The trailing
/// `len - train_end` points are the holdout window and are never fit on.
#[derive(Debug, Clone)]
pub struct SeriesDataset {
    pub timestamps: Vec<NaiveDateTime>,
    pub target: Vec<f64>,
    pub exogenous: BTreeMap<String, Vec<f64>>,
    /// Inferred sampling interval.
    pub freq: Duration,
    pub train_end: usize,
}

impl SeriesDataset {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn holdout_len(&self) -> usize {
        self.len() - self.train_end
    }

    pub fn train_target(&self) -> &[f64] {
        &self.target[..self.train_end]
    }

    pub fn holdout_target(&self) -> &[f64] {
        &self.target[self.train_end..]
    }

    pub fn last_timestamp(&self) -> NaiveDateTime {
        *self.timestamps.last().expect("dataset is never empty")
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a timestamp literal: common date/datetime formats, RFC 3339, or a
/// unix epoch in seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    // Unix epoch: seconds in ~1973..2286, otherwise milliseconds.
    if let Ok(n) = s.parse::<i64>() {
        if (100_000_000..10_000_000_000).contains(&n) {
            return DateTime::from_timestamp(n, 0).map(|dt| dt.naive_utc());
        }
        if (10_000_000_000..10_000_000_000_000).contains(&n) {
            return DateTime::from_timestamp_millis(n).map(|dt| dt.naive_utc());
        }
    }

    None
}

fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn column_index(headers: &[String], name: &str) -> Result<usize, DataError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| DataError::MissingColumn(name.to_string()))
}

/// Build a `SeriesDataset` from raw CSV rows.
///
/// Rows with unparseable timestamps are dropped (up to the configured
/// fraction); duplicate timestamps resolve last-write-wins; the series is
/// snapped onto a regular grid at the median inter-arrival gap, with interior
/// gaps linearly interpolated. The trailing `min(horizon, len/5)` points are
/// reserved as the holdout window.
pub fn build(
    headers: &[String],
    rows: &[Vec<String>],
    time_column: &str,
    target_column: &str,
    exogenous_columns: &[String],
    horizon: usize,
    cfg: &PipelineConfig,
) -> Result<SeriesDataset, DataError> {
    let time_idx = column_index(headers, time_column)?;
    let target_idx = column_index(headers, target_column)?;
    let exog_idx: Vec<(String, usize)> = exogenous_columns
        .iter()
        .map(|c| column_index(headers, c).map(|i| (c.clone(), i)))
        .collect::<Result<_, _>>()?;

    // Parse timestamps, tracking the unparseable fraction. Empty cells count
    // as unparseable: a row without a time axis cannot be placed.
    let mut unparseable = 0usize;
    // Last-write-wins dedup falls out of insertion order into the map.
    let mut observed: BTreeMap<NaiveDateTime, (Option<f64>, Vec<Option<f64>>)> = BTreeMap::new();

    for row in rows {
        let ts = row.get(time_idx).and_then(|cell| parse_timestamp(cell));
        let Some(ts) = ts else {
            unparseable += 1;
            continue;
        };

        let target_cell = row.get(target_idx).map(String::as_str).unwrap_or("");
        let target = match parse_number(target_cell) {
            Some(v) => Some(v),
            None if target_cell.trim().is_empty() => None,
            None => {
                return Err(DataError::NonNumeric {
                    column: target_column.to_string(),
                    value: target_cell.trim().to_string(),
                })
            }
        };

        let mut exog_vals = Vec::with_capacity(exog_idx.len());
        for (name, idx) in &exog_idx {
            let cell = row.get(*idx).map(String::as_str).unwrap_or("");
            let val = match parse_number(cell) {
                Some(v) => Some(v),
                None if cell.trim().is_empty() => None,
                None => {
                    return Err(DataError::NonNumeric {
                        column: name.clone(),
                        value: cell.trim().to_string(),
                    })
                }
            };
            exog_vals.push(val);
        }

        observed.insert(ts, (target, exog_vals));
    }

    let total = rows.len();
    if total == 0
        || (unparseable as f64 / total as f64) > cfg.max_unparseable_fraction
    {
        return Err(DataError::UnparseableTimestamps {
            column: time_column.to_string(),
            unparseable,
            total,
        });
    }

    if observed.len() < 2 {
        return Err(DataError::TooFewObservations {
            got: observed.len(),
            min: cfg.min_observations,
        });
    }

    // Median inter-arrival gap becomes the resampling grid step.
    let stamps: Vec<NaiveDateTime> = observed.keys().copied().collect();
    let mut gaps: Vec<i64> = stamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds())
        .collect();
    gaps.sort_unstable();
    let step_secs = median(&gaps).max(1);
    let step = Duration::seconds(step_secs);

    // Snap observations onto the grid; collisions keep the later row.
    let t0 = stamps[0];
    let span = (*stamps.last().expect("at least two stamps") - t0).num_seconds();
    let n_slots = (span as f64 / step_secs as f64).round() as usize + 1;

    let mut target_slots: Vec<Option<f64>> = vec![None; n_slots];
    let mut exog_slots: Vec<Vec<Option<f64>>> = vec![vec![None; n_slots]; exog_idx.len()];
    for (ts, (target, exog_vals)) in &observed {
        let slot = (((*ts - t0).num_seconds()) as f64 / step_secs as f64).round() as usize;
        let slot = slot.min(n_slots - 1);
        target_slots[slot] = *target;
        for (k, v) in exog_vals.iter().enumerate() {
            if v.is_some() {
                exog_slots[k][slot] = *v;
            }
        }
    }

    // Leading/trailing gaps are dropped rather than extrapolated.
    let first = target_slots
        .iter()
        .position(Option::is_some)
        .ok_or_else(|| DataError::EmptyColumn(target_column.to_string()))?;
    let last = target_slots
        .iter()
        .rposition(Option::is_some)
        .expect("position() found a value");

    let mut target = interpolate(&target_slots[first..=last], cfg.max_gap_run)?;
    let mut timestamps: Vec<NaiveDateTime> = (first..=last)
        .map(|i| t0 + step * i as i32)
        .collect();

    let mut exogenous = BTreeMap::new();
    for ((name, _), slots) in exog_idx.iter().zip(exog_slots.iter()) {
        let window = &slots[first..=last];
        if window.iter().all(Option::is_none) {
            return Err(DataError::EmptyColumn(name.clone()));
        }
        let filled = interpolate_with_edges(window, cfg.max_gap_run)?;
        exogenous.insert(name.clone(), filled);
    }

    let n = target.len();
    if n < cfg.min_observations {
        return Err(DataError::TooFewObservations {
            got: n,
            min: cfg.min_observations,
        });
    }

    // Holdout: trailing min(horizon, n/5) points, at least one, never the
    // whole series.
    let holdout = horizon.min(n / 5).max(1).min(n - 1);
    let train_end = n - holdout;

    target.shrink_to_fit();
    timestamps.shrink_to_fit();

    Ok(SeriesDataset {
        timestamps,
        target,
        exogenous,
        freq: step,
        train_end,
    })
}

fn median(sorted: &[i64]) -> i64 {
    let n = sorted.len();
    if n == 0 {
        return 1;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2
    }
}

/// Linear interpolation of interior `None` runs. The first and last entries
/// must be present. A run longer than `max_run` is an error.
fn interpolate(slots: &[Option<f64>], max_run: usize) -> Result<Vec<f64>, DataError> {
    let mut out = Vec::with_capacity(slots.len());
    let mut i = 0usize;
    while i < slots.len() {
        match slots[i] {
            Some(v) => {
                out.push(v);
                i += 1;
            }
            None => {
                let start = i;
                while i < slots.len() && slots[i].is_none() {
                    i += 1;
                }
                let run = i - start;
                if run > max_run {
                    return Err(DataError::GapTooLarge { run, max: max_run });
                }
                let prev = out[start - 1];
                let next = slots[i].expect("interior run is bounded by values");
                for k in 0..run {
                    let frac = (k + 1) as f64 / (run + 1) as f64;
                    out.push(prev + (next - prev) * frac);
                }
            }
        }
    }
    Ok(out)
}

/// Like `interpolate`, but tolerates missing leading/trailing values by
/// extending the nearest observation. Used for exogenous series, whose edges
/// may be empty where the target is not.
fn interpolate_with_edges(slots: &[Option<f64>], max_run: usize) -> Result<Vec<f64>, DataError> {
    let first = slots.iter().position(Option::is_some).unwrap_or(0);
    let last = slots.iter().rposition(Option::is_some).unwrap_or(0);
    let mut padded: Vec<Option<f64>> = slots.to_vec();
    for i in 0..first {
        padded[i] = slots[first];
    }
    for i in last + 1..slots.len() {
        padded[i] = slots[last];
    }
    interpolate(&padded, max_run)
}
