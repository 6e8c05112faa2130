//! Temporal consistency tests.
//!
//! Every check here assumes a homogeneous time step on the index, with
//! missing timestamps filled by `NaN` rows.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use super::calculate::{nan_max, quantile, sample_std};
use crate::error::{QcError, Result};
use crate::models::{FlagFrame, ObservationFrame, QcOutcome, Season};

/// Difference between consecutive observations.
///
/// A value is wrong when its step to the previous or next observation exceeds
/// `wrong_limit` and suspect when it exceeds `suspect_limit` only. Residuals
/// are the larger step minus `suspect_limit`.
pub fn step_check(
    x: &ObservationFrame,
    suspect_limit: f64,
    wrong_limit: f64,
    flag_suspect: i32,
    flag_wrong: i32,
) -> Result<QcOutcome> {
    validate_step_limits(suspect_limit, wrong_limit)?;
    Ok(step_impl(
        x,
        |_| (suspect_limit, wrong_limit),
        |_, _| true,
        flag_suspect,
        flag_wrong,
    ))
}

/// Step test with per-season limits ordered DJF, MAM, JJA, SON.
///
/// Neighbours from another season are treated as missing.
pub fn step_check_seasonal(
    x: &ObservationFrame,
    suspect_limits: [f64; 4],
    wrong_limits: [f64; 4],
    flag_suspect: i32,
    flag_wrong: i32,
) -> Result<QcOutcome> {
    for (s, w) in suspect_limits.iter().zip(&wrong_limits) {
        validate_step_limits(*s, *w)?;
    }

    let seasons: Vec<Season> = x.index().iter().map(Season::of).collect();
    Ok(step_impl(
        x,
        |row| {
            let i = seasons[row].as_index();
            (suspect_limits[i], wrong_limits[i])
        },
        |a, b| seasons[a] == seasons[b],
        flag_suspect,
        flag_wrong,
    ))
}

fn step_impl(
    x: &ObservationFrame,
    limits_for_row: impl Fn(usize) -> (f64, f64),
    same_group: impl Fn(usize, usize) -> bool,
    flag_suspect: i32,
    flag_wrong: i32,
) -> QcOutcome {
    let mut flags = FlagFrame::like(x, 0);
    let mut residuals = ObservationFrame::like(x, f64::NAN);
    let n_rows = x.n_rows();

    for row in 0..n_rows {
        let (suspect, wrong) = limits_for_row(row);
        let has_next = row + 1 < n_rows && same_group(row, row + 1);
        let has_prev = row > 0 && same_group(row, row - 1);

        for col in 0..x.n_stations() {
            let value = x.get(row, col);
            let next = if has_next { x.get(row + 1, col) } else { f64::NAN };
            let prev = if has_prev { x.get(row - 1, col) } else { f64::NAN };

            let step_next = (value - next).abs();
            let step_prev = (prev - value).abs();

            let is_wrong = step_next > wrong || step_prev > wrong;
            let is_suspect = (step_next > suspect || step_prev > suspect) && !is_wrong;

            if is_wrong {
                flags.set(row, col, flag_wrong);
            } else if is_suspect {
                flags.set(row, col, flag_suspect);
            }

            let res_next = step_next - suspect;
            let res_prev = step_prev - suspect;
            residuals.set(
                row,
                col,
                if res_next >= res_prev { res_next } else { res_prev },
            );
        }
    }

    QcOutcome::new(flags, residuals)
}

fn validate_step_limits(suspect: f64, wrong: f64) -> Result<()> {
    if suspect < 0.0 || wrong < 0.0 {
        return Err(QcError::InvalidParameter(
            "Step limits must be non-negative".to_string(),
        ));
    }
    if suspect > wrong {
        return Err(QcError::InvalidParameter(format!(
            "Suspect step limit {} exceeds wrong step limit {}",
            suspect, wrong
        )));
    }
    Ok(())
}

/// Not Observed Change persistence test.
///
/// A value is flagged when it equals each of the `n` preceding observations.
/// The residual is the largest absolute difference to those observations: as
/// it tends to zero the series is more persistent.
pub fn persistence_noc(x: &ObservationFrame, n: usize, flag: i32) -> Result<QcOutcome> {
    if n == 0 {
        return Err(QcError::InvalidParameter(
            "Persistence test needs at least one preceding step".to_string(),
        ));
    }

    let mut flags = FlagFrame::like(x, 0);
    let mut residuals = ObservationFrame::like(x, f64::NAN);

    for row in 0..x.n_rows() {
        for col in 0..x.n_stations() {
            let value = x.get(row, col);
            let mut unchanged = true;
            let mut max_diff = 0.0;

            for lag in 1..=n {
                let diff = (value - x.lagged(row, col, lag as isize)).abs();
                unchanged &= diff == 0.0;
                max_diff = if lag == 1 { diff } else { nan_max(max_diff, diff) };
            }

            if unchanged {
                flags.set(row, col, flag);
            }
            residuals.set(row, col, max_diff);
        }
    }

    Ok(QcOutcome::new(flags, residuals))
}

/// Statistic used to measure variability inside a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariabilityMethod {
    /// Sample standard deviation
    Std,
    /// Absolute maximum minus minimum
    MaxMin,
    /// Interquartile range
    Iqr,
}

impl VariabilityMethod {
    fn measure(&self, values: &mut [f64]) -> f64 {
        match self {
            VariabilityMethod::Std => sample_std(values),
            VariabilityMethod::MaxMin => {
                if values.is_empty() {
                    return f64::NAN;
                }
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                max - min
            }
            VariabilityMethod::Iqr => {
                values.sort_by(|a, b| a.total_cmp(b));
                quantile(values, 0.75) - quantile(values, 0.25)
            }
        }
    }
}

impl FromStr for VariabilityMethod {
    type Err = QcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "STD" => Ok(VariabilityMethod::Std),
            "MAX_MIN" => Ok(VariabilityMethod::MaxMin),
            "IQR" => Ok(VariabilityMethod::Iqr),
            _ => Err(QcError::InvalidParameter(format!(
                "Variability method '{}' not found. Available methods are: STD, MAX_MIN and IQR",
                s
            ))),
        }
    }
}

impl fmt::Display for VariabilityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariabilityMethod::Std => "STD",
            VariabilityMethod::MaxMin => "MAX_MIN",
            VariabilityMethod::Iqr => "IQR",
        };
        f.write_str(name)
    }
}

/// Minimum variability persistence test.
///
/// The index is split into consecutive windows of `window` length anchored at
/// midnight of the first day. For every window and station the variability is
/// measured with `method` over the present values; windows whose share of
/// present values (relative to `window / time_step`) is at most
/// `min_valid_percent` get no statistic. Present values in a window whose
/// variability is below `min_variability` are flagged. Residuals are
/// `min_variability - variability`.
pub fn persistence_variability(
    x: &ObservationFrame,
    window: Duration,
    min_valid_percent: f64,
    method: VariabilityMethod,
    min_variability: f64,
    flag: i32,
) -> Result<QcOutcome> {
    if window < Duration::seconds(1) {
        return Err(QcError::InvalidParameter(format!(
            "Variability window must be at least one second, got {}",
            window
        )));
    }

    let mut flags = FlagFrame::like(x, 0);
    let mut residuals = ObservationFrame::like(x, f64::NAN);
    if x.n_rows() == 0 {
        return Ok(QcOutcome::new(flags, residuals));
    }

    let step = x.time_step().unwrap_or(window);
    let expected = window.num_seconds() as f64 / step.num_seconds().max(1) as f64;
    let bins = window_bins(x.index(), window);

    let mut buffer = Vec::new();
    for rows in bins {
        for col in 0..x.n_stations() {
            buffer.clear();
            buffer.extend(
                rows.clone()
                    .map(|row| x.get(row, col))
                    .filter(|v| !v.is_nan()),
            );

            let valid_percent = buffer.len() as f64 / expected * 100.0;
            let variability = if valid_percent <= min_valid_percent {
                f64::NAN
            } else {
                method.measure(&mut buffer)
            };

            for row in rows.clone() {
                if variability < min_variability && !x.get(row, col).is_nan() {
                    flags.set(row, col, flag);
                }
                residuals.set(row, col, min_variability - variability);
            }
        }
    }

    Ok(QcOutcome::new(flags, residuals))
}

/// Contiguous row ranges sharing a window, anchored at midnight of the first day
fn window_bins(index: &[NaiveDateTime], window: Duration) -> Vec<Range<usize>> {
    let Some(first) = index.first() else {
        return Vec::new();
    };
    let origin = first.date().and_time(NaiveTime::default());
    let window_secs = window.num_seconds();
    let bin_of = |ts: &NaiveDateTime| (*ts - origin).num_seconds().div_euclid(window_secs);

    let mut bins = Vec::new();
    let mut start = 0;
    for row in 1..index.len() {
        if bin_of(&index[row]) != bin_of(&index[start]) {
            bins.push(start..row);
            start = row;
        }
    }
    bins.push(start..index.len());
    bins
}

/// Isolated observation test for rainfall and other discrete variables.
///
/// A present, non-zero value is flagged when, for every `i` in `1..=n`, the
/// sum of the observations `i` steps before and after is zero. The residual is
/// the value minus the sum of its `2n` neighbours.
pub fn isolated(x: &ObservationFrame, n: usize, flag: i32) -> Result<QcOutcome> {
    if n == 0 {
        return Err(QcError::InvalidParameter(
            "Isolation test needs at least one neighbouring step".to_string(),
        ));
    }

    let mut flags = FlagFrame::like(x, 0);
    let mut residuals = ObservationFrame::like(x, f64::NAN);

    for row in 0..x.n_rows() {
        for col in 0..x.n_stations() {
            let value = x.get(row, col);
            let mut isolated = !value.is_nan() && value != 0.0;
            let mut neighbours = 0.0;

            for lag in 1..=n as isize {
                let pair = x.lagged(row, col, lag) + x.lagged(row, col, -lag);
                isolated &= pair == 0.0;
                neighbours += pair;
            }

            if isolated {
                flags.set(row, col, flag);
            }
            residuals.set(row, col, value - neighbours);
        }
    }

    Ok(QcOutcome::new(flags, residuals))
}
