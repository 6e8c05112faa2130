//! Range tests against instrumental and climatological limits.

use crate::error::{QcError, Result};
use crate::models::outcome::limit_residual;
use crate::models::{FlagFrame, ObservationFrame, QcOutcome, Season};

/// Flag values outside the instrumental range `[min, max]`.
///
/// Residuals are positive for values outside the range and `NaN` for missing
/// observations.
pub fn range_check(x: &ObservationFrame, min: f64, max: f64, flag: i32) -> Result<QcOutcome> {
    validate_limits(min, max)?;
    Ok(apply_limits(x, flag, |_| (min, max)))
}

/// Flag values outside seasonal climatological limits.
///
/// `mins` and `maxs` are ordered DJF, MAM, JJA, SON.
pub fn range_check_seasonal(
    x: &ObservationFrame,
    mins: [f64; 4],
    maxs: [f64; 4],
    flag: i32,
) -> Result<QcOutcome> {
    for (min, max) in mins.iter().zip(&maxs) {
        validate_limits(*min, *max)?;
    }

    Ok(apply_limits(x, flag, |row| {
        let season = Season::of(&x.index()[row]).as_index();
        (mins[season], maxs[season])
    }))
}

fn apply_limits(
    x: &ObservationFrame,
    flag: i32,
    limits_for_row: impl Fn(usize) -> (f64, f64),
) -> QcOutcome {
    let mut flags = FlagFrame::like(x, 0);
    let mut residuals = ObservationFrame::like(x, f64::NAN);

    for row in 0..x.n_rows() {
        let (min, max) = limits_for_row(row);
        for col in 0..x.n_stations() {
            let value = x.get(row, col);
            if value > max || value < min {
                flags.set(row, col, flag);
            }
            residuals.set(row, col, limit_residual(value, min, max));
        }
    }

    QcOutcome::new(flags, residuals)
}

fn validate_limits(min: f64, max: f64) -> Result<()> {
    if min > max {
        return Err(QcError::InvalidParameter(format!(
            "Lower limit {} exceeds upper limit {}",
            min, max
        )));
    }
    Ok(())
}
