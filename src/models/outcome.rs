use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::frame::{FlagFrame, ObservationFrame};

/// Meteorological season of a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Djf,
    Mam,
    Jja,
    Son,
}

impl Season {
    pub fn of(timestamp: &NaiveDateTime) -> Self {
        match timestamp.month() {
            12 | 1 | 2 => Season::Djf,
            3..=5 => Season::Mam,
            6..=8 => Season::Jja,
            _ => Season::Son,
        }
    }

    /// Position in per-season limit arrays (DJF, MAM, JJA, SON)
    pub fn as_index(&self) -> usize {
        *self as usize
    }
}

/// Flags and residuals produced by a single check
#[derive(Debug, Clone)]
pub struct QcOutcome {
    pub flags: FlagFrame,
    pub residuals: ObservationFrame,
}

impl QcOutcome {
    pub fn new(flags: FlagFrame, residuals: ObservationFrame) -> Self {
        Self { flags, residuals }
    }

    pub fn flagged_count(&self) -> usize {
        self.flags.flagged_count()
    }
}

/// Residual for a two-sided limit test: the larger of the distances below
/// `lower` and above `upper`, `NaN` when the value is missing.
#[inline]
pub(crate) fn limit_residual(value: f64, lower: f64, upper: f64) -> f64 {
    let below = lower - value;
    let above = value - upper;
    if below >= above {
        below
    } else {
        above
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_of_timestamp() {
        let at = |m: u32| {
            chrono::NaiveDate::from_ymd_opt(2020, m, 15)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        };
        assert_eq!(Season::of(&at(12)), Season::Djf);
        assert_eq!(Season::of(&at(2)), Season::Djf);
        assert_eq!(Season::of(&at(4)), Season::Mam);
        assert_eq!(Season::of(&at(8)), Season::Jja);
        assert_eq!(Season::of(&at(11)), Season::Son);
        assert_eq!(Season::Jja.as_index(), 2);
    }

    #[test]
    fn test_limit_residual() {
        assert_eq!(limit_residual(55.0, -30.0, 50.0), 5.0);
        assert_eq!(limit_residual(-35.0, -30.0, 50.0), 5.0);
        assert_eq!(limit_residual(10.0, -30.0, 50.0), -40.0);
        assert!(limit_residual(f64::NAN, -30.0, 50.0).is_nan());
    }
}
