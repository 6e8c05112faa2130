//! Reconstruction of missing or flagged observations.

use tracing::{debug, warn};

use crate::error::{QcError, Result};
use crate::models::{common_stations, FlagFrame, ObservationFrame};
use crate::utils::constants::FLAG_RECONSTRUCTED;

/// Reconstructed series together with the cells that were filled
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub values: ObservationFrame,
    /// `FLAG_RECONSTRUCTED` where a value was filled, 0 elsewhere
    pub filled: FlagFrame,
}

impl Reconstruction {
    pub fn filled_count(&self) -> usize {
        self.filled.flagged_count()
    }
}

/// Replace flagged observations with `NaN`
pub fn mask_flagged(x: &ObservationFrame, flags: &FlagFrame) -> Result<ObservationFrame> {
    x.ensure_same_shape(flags)?;

    let mut masked = x.clone();
    for row in 0..x.n_rows() {
        for col in 0..x.n_stations() {
            if flags.is_flagged(row, col) {
                masked.set(row, col, f64::NAN);
            }
        }
    }
    Ok(masked)
}

/// Fill missing (and, when `flags` is given, flagged) observations with model
/// estimates, e.g. those of the spatial regression test.
///
/// `estimates` may cover a subset of the timestamps and stations of `x`; only
/// the overlap is considered. Cells without an estimate are left untouched.
pub fn fill_from_estimates(
    x: &ObservationFrame,
    flags: Option<&FlagFrame>,
    estimates: &ObservationFrame,
) -> Result<Reconstruction> {
    if let Some(flags) = flags {
        x.ensure_same_shape(flags)?;
    }

    let mut values = x.clone();
    let mut filled = FlagFrame::like(x, 0);
    let pairs = common_stations(estimates, x);

    for (est_row, timestamp) in estimates.index().iter().enumerate() {
        let Some(row) = x.row_position(*timestamp) else {
            continue;
        };
        for &(est_col, col) in &pairs {
            let estimate = estimates.get(est_row, est_col);
            let needs_value =
                x.get(row, col).is_nan() || flags.is_some_and(|f| f.is_flagged(row, col));
            if needs_value && !estimate.is_nan() {
                values.set(row, col, estimate);
                filled.set(row, col, FLAG_RECONSTRUCTED);
            }
        }
    }

    let reconstruction = Reconstruction { values, filled };
    debug!(
        filled = reconstruction.filled_count(),
        "Filled observations from estimates"
    );
    Ok(reconstruction)
}

/// Linear interpolation in time across interior gaps of at most `max_gap`
/// consecutive missing values. Leading and trailing gaps stay missing.
pub fn interpolate_gaps(x: &ObservationFrame, max_gap: usize) -> Result<Reconstruction> {
    if max_gap == 0 {
        return Err(QcError::InvalidParameter(
            "Maximum gap length must be at least 1".to_string(),
        ));
    }

    let mut values = x.clone();
    let mut filled = FlagFrame::like(x, 0);
    let index = x.index();

    for col in 0..x.n_stations() {
        let mut last_present: Option<usize> = None;
        for row in 0..x.n_rows() {
            let value = x.get(row, col);
            if value.is_nan() {
                continue;
            }

            if let Some(before) = last_present {
                let gap = row - before - 1;
                if gap > 0 && gap <= max_gap {
                    let start_value = x.get(before, col);
                    let span = (index[row] - index[before]).num_seconds() as f64;
                    for missing in before + 1..row {
                        let offset = (index[missing] - index[before]).num_seconds() as f64;
                        let interpolated = start_value + (value - start_value) * offset / span;
                        values.set(missing, col, interpolated);
                        filled.set(missing, col, FLAG_RECONSTRUCTED);
                    }
                }
            }
            last_present = Some(row);
        }
    }

    Ok(Reconstruction { values, filled })
}

/// Full reconstruction pass: fill from `estimates` when given, blank flagged
/// cells that received no estimate, then interpolate gaps of at most `max_gap`
/// steps when given.
pub fn reconstruct(
    x: &ObservationFrame,
    flags: Option<&FlagFrame>,
    estimates: Option<&ObservationFrame>,
    max_gap: Option<usize>,
) -> Result<Reconstruction> {
    let mut result = match estimates {
        Some(estimates) => fill_from_estimates(x, flags, estimates)?,
        None => Reconstruction {
            values: x.clone(),
            filled: FlagFrame::like(x, 0),
        },
    };

    if let Some(flags) = flags {
        let mut unresolved = flags.clone();
        for row in 0..unresolved.n_rows() {
            for col in 0..unresolved.n_stations() {
                if result.filled.is_flagged(row, col) {
                    unresolved.set(row, col, 0);
                }
            }
        }
        result.values = mask_flagged(&result.values, &unresolved)?;
    }

    if let Some(max_gap) = max_gap {
        let interpolated = interpolate_gaps(&result.values, max_gap)?;
        result.filled = result.filled.merge_max(&interpolated.filled)?;
        result.values = interpolated.values;
    }

    let still_missing = result.values.missing_count();
    if still_missing > 0 {
        warn!(missing = still_missing, "Values remain missing after reconstruction");
    }
    Ok(result)
}
