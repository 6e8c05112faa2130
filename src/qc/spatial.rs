//! Spatial consistency: Hubbard weighted regression against neighbour stations.
//!
//! Hubbard, K. G., et al. "Performance of quality assurance procedures for an
//! applied climate information system." Journal of Atmospheric and Oceanic
//! Technology 22.1 (2005): 105-112.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;
use tracing::{debug, info, warn};
use validator::Validate;

use super::calculate::{station_neighbors, LinearFit, MIN_RMSE};
use crate::error::{QcError, Result};
use crate::models::outcome::limit_residual;
use crate::models::{FlagFrame, ObservationFrame, Station};
use crate::utils::constants::{
    DEFAULT_HUBBARD_FACTOR, DEFAULT_MAX_MISSING_PERCENT, DEFAULT_MIN_NEIGHBORS, DEFAULT_N_MAX,
    DEFAULT_SEARCH_RADIUS, DEFAULT_T_MAX, FLAG_DEFAULT,
};
use crate::utils::progress::ProgressReporter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct HubbardParams {
    /// First timestamp to test (inclusive)
    pub start: NaiveDateTime,

    /// Last timestamp to test (inclusive)
    pub end: NaiveDateTime,

    /// Maximum number of best-fit neighbours used for the estimate
    #[serde(default = "default_n_max")]
    #[validate(range(min = 1))]
    pub n_max: usize,

    /// Number of time steps in the regression window
    #[serde(default = "default_t_max")]
    #[validate(range(min = 2))]
    pub t_max: usize,

    /// Neighbour search radius in decimal degrees
    #[serde(default = "default_search_radius")]
    #[validate(range(exclusive_min = 0.0))]
    pub search_radius: f64,

    #[serde(default = "default_min_neighbors")]
    #[validate(range(min = 1))]
    pub min_neighbors: usize,

    /// Highest percentage of missing values tolerated in a regression window
    #[serde(default = "default_max_missing_percent")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_missing_percent: f64,

    /// Multiple of the standard error defining the acceptance interval
    #[serde(default = "default_factor")]
    #[validate(range(exclusive_min = 0.0))]
    pub factor: f64,

    #[serde(default = "default_flag")]
    pub flag: i32,
}

fn default_n_max() -> usize {
    DEFAULT_N_MAX
}
fn default_t_max() -> usize {
    DEFAULT_T_MAX
}
fn default_search_radius() -> f64 {
    DEFAULT_SEARCH_RADIUS
}
fn default_min_neighbors() -> usize {
    DEFAULT_MIN_NEIGHBORS
}
fn default_max_missing_percent() -> f64 {
    DEFAULT_MAX_MISSING_PERCENT
}
fn default_factor() -> f64 {
    DEFAULT_HUBBARD_FACTOR
}
fn default_flag() -> i32 {
    FLAG_DEFAULT
}

impl HubbardParams {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            n_max: DEFAULT_N_MAX,
            t_max: DEFAULT_T_MAX,
            search_radius: DEFAULT_SEARCH_RADIUS,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            max_missing_percent: DEFAULT_MAX_MISSING_PERCENT,
            factor: DEFAULT_HUBBARD_FACTOR,
            flag: FLAG_DEFAULT,
        }
    }
}

/// Estimates and test results over the tested span
#[derive(Debug, Clone)]
pub struct SpatialOutcome {
    /// Estimated observations, `NaN` where no estimate was possible
    pub estimates: ObservationFrame,
    /// Standard error of the estimates, `NaN` where no estimate was possible
    pub std_errors: ObservationFrame,
    pub flags: FlagFrame,
    pub residuals: ObservationFrame,
}

/// Spatial weighted regression test.
///
/// For every station, neighbours within `search_radius` are regressed against
/// the station over a window of `t_max` steps around each tested time. The
/// `n_max` neighbours with the smallest regression RMSE give weighted
/// estimates; observations outside `estimate ± factor * std_error` are flagged.
/// `stations` must provide coordinates for every column of `x`.
pub fn hubbard_consistency(
    stations: &[Station],
    x: &ObservationFrame,
    params: &HubbardParams,
    progress: Option<&ProgressReporter>,
) -> Result<SpatialOutcome> {
    params.validate()?;
    let stations = order_stations(stations, x)?;

    let first = x
        .row_position(params.start)
        .ok_or(QcError::TimestampNotFound(params.start))?;
    let last = x
        .row_position(params.end)
        .ok_or(QcError::TimestampNotFound(params.end))?;
    if last < first {
        return Err(QcError::InvalidParameter(format!(
            "Test end {} precedes start {}",
            params.end, params.start
        )));
    }

    info!(
        min_neighbors = params.min_neighbors,
        search_radius = params.search_radius,
        "Starting spatial regression test"
    );
    if x.n_rows() < params.t_max {
        warn!(
            rows = x.n_rows(),
            t_max = params.t_max,
            "Regression window larger than series length, statistics could be inaccurate"
        );
    }

    let columns: Vec<Vec<f64>> = (0..x.n_stations()).map(|c| x.column(c)).collect();
    let span = first..last + 1;

    let per_station: Vec<Vec<(f64, f64)>> = (0..x.n_stations())
        .into_par_iter()
        .map(|target| {
            let neighbors = station_neighbors(&stations, target, params.search_radius);
            let result = if neighbors.len() < params.min_neighbors {
                warn!(
                    station = %x.stations()[target],
                    found = neighbors.len(),
                    required = params.min_neighbors,
                    "Not enough neighbours for spatial estimate"
                );
                vec![(f64::NAN, f64::NAN); span.len()]
            } else {
                estimate_station(&columns, target, &neighbors, span.clone(), params)
            };

            if let Some(p) = progress {
                p.increment(1);
            }
            result
        })
        .collect();

    let template = x.slice_positions(first, last + 1);
    let mut estimates = ObservationFrame::like(&template, f64::NAN);
    let mut std_errors = ObservationFrame::like(&template, f64::NAN);
    let mut flags = FlagFrame::like(&template, 0);
    let mut residuals = ObservationFrame::like(&template, f64::NAN);

    for (col, values) in per_station.iter().enumerate() {
        for (row, &(estimate, std_error)) in values.iter().enumerate() {
            let observed = template.get(row, col);
            let lower = estimate - params.factor * std_error;
            let upper = estimate + params.factor * std_error;

            estimates.set(row, col, estimate);
            std_errors.set(row, col, std_error);
            if observed > upper || observed < lower {
                flags.set(row, col, params.flag);
            }
            residuals.set(row, col, limit_residual(observed, lower, upper));
        }
    }

    debug!(flagged = flags.flagged_count(), "Spatial regression test finished");

    Ok(SpatialOutcome {
        estimates,
        std_errors,
        flags,
        residuals,
    })
}

/// Stations ordered like the frame columns
fn order_stations(stations: &[Station], x: &ObservationFrame) -> Result<Vec<Station>> {
    x.stations()
        .iter()
        .map(|id| {
            stations
                .iter()
                .find(|s| &s.id == id)
                .cloned()
                .ok_or_else(|| QcError::StationNotFound(id.clone()))
        })
        .collect()
}

/// Rows used to fit the regression for the observation at `time`
fn regression_window(time: usize, len: usize, t_max: usize) -> Range<usize> {
    if time < t_max {
        0..(time + t_max).min(len)
    } else if time + t_max > len {
        time - t_max..len
    } else {
        time - t_max / 2..(time + t_max / 2).min(len)
    }
}

fn missing_percent(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 100.0;
    }
    values.iter().filter(|v| v.is_nan()).count() as f64 / values.len() as f64 * 100.0
}

fn estimate_station(
    columns: &[Vec<f64>],
    target: usize,
    neighbors: &[usize],
    span: Range<usize>,
    params: &HubbardParams,
) -> Vec<(f64, f64)> {
    let len = columns[target].len();

    span.map(|time| {
        let window = regression_window(time, len, params.t_max);
        let station_window = &columns[target][window.clone()];
        if missing_percent(station_window) > params.max_missing_percent {
            return (f64::NAN, f64::NAN);
        }

        let valid: Vec<usize> = neighbors
            .iter()
            .copied()
            .filter(|&n| missing_percent(&columns[n][window.clone()]) < params.max_missing_percent)
            .collect();
        if valid.len() < params.min_neighbors {
            return (f64::NAN, f64::NAN);
        }

        // (rmse, estimate at `time`) for each valid neighbour
        let mut candidates: Vec<(f64, f64)> = valid
            .iter()
            .map(|&n| {
                let neighbour_window = &columns[n][window.clone()];
                match LinearFit::fit(neighbour_window, station_window) {
                    Some(fit) => {
                        let rmse = fit.rmse(neighbour_window, station_window).max(MIN_RMSE);
                        let at_time = columns[n][time];
                        let estimate = if at_time.is_nan() {
                            f64::NAN
                        } else {
                            fit.predict(at_time)
                        };
                        (rmse, estimate)
                    }
                    None => (f64::NAN, f64::NAN),
                }
            })
            .collect();

        candidates.sort_by(|a, b| compare_rmse(a.0, b.0));
        let selected: Vec<(f64, f64)> = candidates
            .into_iter()
            .take(params.n_max)
            .filter(|(rmse, estimate)| !rmse.is_nan() && !estimate.is_nan())
            .collect();

        if selected.len() < params.min_neighbors {
            return (f64::NAN, f64::NAN);
        }
        weighted_estimate(&selected)
    })
    .collect()
}

/// Ascending RMSE with missing values last; stable for ties
fn compare_rmse(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Weighted estimate and standard error from `(rmse, estimate)` pairs.
///
/// Positive and negative estimates contribute separately as
/// `±sqrt(Σ e²/σ² / Σ 1/σ²)` (sums of each sign over the weights of all
/// neighbours), which reduces to the plain weighted root mean square when all
/// estimates share a sign. The standard error is `sqrt(k / Σ 1/σ²)`.
fn weighted_estimate(selected: &[(f64, f64)]) -> (f64, f64) {
    let total_weight: f64 = selected.iter().map(|(rmse, _)| 1.0 / (rmse * rmse)).sum();

    let (positive, negative) =
        selected
            .iter()
            .fold((0.0, 0.0), |(pos, neg), &(rmse, estimate)| {
                let term = estimate * estimate / (rmse * rmse);
                if estimate >= 0.0 {
                    (pos + term, neg)
                } else {
                    (pos, neg + term)
                }
            });

    let estimate = (positive / total_weight).sqrt() - (negative / total_weight).sqrt();
    let std_error = (selected.len() as f64 / total_weight).sqrt();
    (estimate, std_error)
}
