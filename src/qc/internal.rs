//! Internal consistency tests between related variables.
//!
//! Tests combining two variables need identical time indexes and apply only
//! to stations measuring both; other stations are never flagged.

use super::calculate::{dewpoint, round1};
use crate::error::{QcError, Result};
use crate::models::outcome::limit_residual;
use crate::models::{common_stations, ensure_same_index, FlagFrame, Frame, ObservationFrame, QcOutcome};
use chrono::Datelike;

/// Check that averaged values lie between the corresponding maximum and minimum.
pub fn max_min(
    avg: &ObservationFrame,
    max: &ObservationFrame,
    min: &ObservationFrame,
    flag: i32,
) -> Result<QcOutcome> {
    avg.ensure_same_shape(max)?;
    avg.ensure_same_shape(min)?;

    let mut flags = FlagFrame::like(avg, 0);
    let mut residuals = ObservationFrame::like(avg, f64::NAN);

    for row in 0..avg.n_rows() {
        for col in 0..avg.n_stations() {
            let (a, hi, lo) = (avg.get(row, col), max.get(row, col), min.get(row, col));
            let present = !a.is_nan() && !hi.is_nan() && !lo.is_nan();
            if present && (a > hi || a < lo) {
                flags.set(row, col, flag);
            }
            residuals.set(row, col, limit_residual(a, lo, hi));
        }
    }

    Ok(QcOutcome::new(flags, residuals))
}

/// Result of the dewpoint consistency test
#[derive(Debug, Clone)]
pub struct DewpointOutcome {
    /// Flags over the stations of the temperature frame
    pub temperature_flags: FlagFrame,
    /// Flags over the stations of the humidity frame
    pub humidity_flags: FlagFrame,
    /// `dewpoint - temperature` over the stations measuring both
    pub residuals: ObservationFrame,
    /// Derived dewpoint (°C, 0.1 resolution) over the stations measuring both
    pub dewpoint: ObservationFrame,
}

/// Check that the dewpoint derived from temperature and relative humidity is
/// below the temperature. Both variables are flagged where it is not.
pub fn dewpoint_check(
    temperature: &ObservationFrame,
    humidity: &ObservationFrame,
    flag: i32,
) -> Result<DewpointOutcome> {
    ensure_same_index(temperature, humidity)?;
    let pairs = common_stations(temperature, humidity);

    let mut temperature_flags = FlagFrame::like(temperature, 0);
    let mut humidity_flags = FlagFrame::like(humidity, 0);

    let temp_cols: Vec<usize> = pairs.iter().map(|&(t, _)| t).collect();
    let mut dew = temperature.select_stations(&temp_cols);
    let mut residuals = dew.clone();

    for row in 0..temperature.n_rows() {
        for (k, &(t_col, h_col)) in pairs.iter().enumerate() {
            let t = temperature.get(row, t_col);
            let td = round1(dewpoint(t, humidity.get(row, h_col)));
            if td >= t {
                temperature_flags.set(row, t_col, flag);
                humidity_flags.set(row, h_col, flag);
            }
            dew.set(row, k, td);
            residuals.set(row, k, td - t);
        }
    }

    Ok(DewpointOutcome {
        temperature_flags,
        humidity_flags,
        residuals,
        dewpoint: dew,
    })
}

/// Flags of the wind consistency test, one frame per variable
#[derive(Debug, Clone)]
pub struct WindOutcome {
    /// Flags over the stations of the speed frame
    pub speed_flags: FlagFrame,
    /// Flags over the stations of the direction frame
    pub direction_flags: FlagFrame,
}

/// Wind speed and direction must agree on calm conditions: a null direction
/// needs a null speed and vice versa. Only flags are produced.
pub fn wind_consistency(
    speed: &ObservationFrame,
    direction: &ObservationFrame,
    flag: i32,
) -> Result<WindOutcome> {
    ensure_same_index(speed, direction)?;
    let pairs = common_stations(speed, direction);

    let mut speed_flags = FlagFrame::like(speed, 0);
    let mut direction_flags = FlagFrame::like(direction, 0);
    for row in 0..speed.n_rows() {
        for &(s_col, d_col) in &pairs {
            let ws = speed.get(row, s_col);
            let wd = direction.get(row, d_col);
            let calm_direction = wd == 0.0 && ws != 0.0 && !ws.is_nan();
            let calm_speed = wd != 0.0 && !wd.is_nan() && ws == 0.0;
            if calm_direction || calm_speed {
                speed_flags.set(row, s_col, flag);
                direction_flags.set(row, d_col, flag);
            }
        }
    }

    Ok(WindOutcome {
        speed_flags,
        direction_flags,
    })
}

/// Precipitation with freezing temperature is flagged unless the raingauge is heated.
pub fn heated_raingauge(
    precipitation: &ObservationFrame,
    temperature: &ObservationFrame,
    heated: &[String],
    flag: i32,
) -> Result<FlagFrame> {
    for station in heated {
        if precipitation.station_index(station).is_none() {
            return Err(QcError::StationNotFound(station.clone()));
        }
    }

    let mut flags = flag_pairs(precipitation, temperature, flag, |prec, temp| {
        prec > 0.0 && temp < 0.0
    })?;

    for station in heated {
        if let Some(col) = precipitation.station_index(station) {
            for row in 0..flags.n_rows() {
                flags.set(row, col, 0);
            }
        }
    }

    Ok(flags)
}

/// Snow depth above the instrumental tolerance during the grass growth months
/// `start_month..=end_month` is flagged.
pub fn snow_grass(
    snow_depth: &ObservationFrame,
    tolerance: f64,
    start_month: u32,
    end_month: u32,
    flag: i32,
) -> Result<FlagFrame> {
    if !(1..=12).contains(&start_month) || !(1..=12).contains(&end_month) {
        return Err(QcError::InvalidParameter(format!(
            "Grass growth months must be within 1..=12, got {}..={}",
            start_month, end_month
        )));
    }
    if start_month > end_month {
        return Err(QcError::InvalidParameter(format!(
            "Grass growth start month {} is after end month {}",
            start_month, end_month
        )));
    }

    let mut flags = FlagFrame::like(snow_depth, 0);
    for (row, ts) in snow_depth.index().iter().enumerate() {
        if !(start_month..=end_month).contains(&ts.month()) {
            continue;
        }
        for col in 0..snow_depth.n_stations() {
            if snow_depth.get(row, col) > tolerance {
                flags.set(row, col, flag);
            }
        }
    }

    Ok(flags)
}

/// Relative humidity below `rh_min` while precipitation occurs is flagged.
pub fn humidity_precipitation(
    humidity: &ObservationFrame,
    precipitation: &ObservationFrame,
    rh_min: f64,
    flag: i32,
) -> Result<FlagFrame> {
    flag_pairs(humidity, precipitation, flag, |rh, prec| {
        prec > 0.0 && rh < rh_min
    })
}

/// Leaf wetness while relative humidity is below `rh_min` is flagged.
pub fn leaf_wetness_humidity(
    leaf_wetness: &ObservationFrame,
    humidity: &ObservationFrame,
    rh_min: f64,
    flag: i32,
) -> Result<FlagFrame> {
    flag_pairs(leaf_wetness, humidity, flag, |lw, rh| lw > 0.0 && rh < rh_min)
}

/// Flags over `target`'s stations where `predicate(target, other)` holds for
/// stations present in both frames
fn flag_pairs(
    target: &ObservationFrame,
    other: &ObservationFrame,
    flag: i32,
    predicate: impl Fn(f64, f64) -> bool,
) -> Result<FlagFrame> {
    ensure_same_index(target, other)?;

    let mut flags: FlagFrame = Frame::like(target, 0);
    let pairs = common_stations(target, other);
    for row in 0..target.n_rows() {
        for &(t_col, o_col) in &pairs {
            if predicate(target.get(row, t_col), other.get(row, o_col)) {
                flags.set(row, t_col, flag);
            }
        }
    }

    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::test_support::*;

    fn named(frame: ObservationFrame, names: &[&str]) -> ObservationFrame {
        let columns = (0..frame.n_stations()).map(|c| frame.column(c)).collect();
        Frame::from_columns(
            frame.index().to_vec(),
            names.iter().map(|s| s.to_string()).collect(),
            columns,
        )
        .unwrap()
    }

    #[test]
    fn test_max_min() {
        let avg = hourly_frame(vec![vec![10.0, 25.0, 5.0, f64::NAN]]);
        let max = hourly_frame(vec![vec![15.0, 20.0, 8.0, 10.0]]);
        let min = hourly_frame(vec![vec![5.0, 12.0, 6.0, 2.0]]);

        let outcome = max_min(&avg, &max, &min, 1).unwrap();
        assert_eq!(outcome.flags.column(0), vec![0, 1, 1, 0]);
        assert_eq!(outcome.residuals.get(1, 0), 5.0);
        assert_eq!(outcome.residuals.get(2, 0), 1.0);
        assert!(outcome.residuals.get(3, 0).is_nan());
    }

    #[test]
    fn test_max_min_shape_mismatch() {
        let avg = hourly_frame(vec![vec![10.0, 25.0]]);
        let other = hourly_frame(vec![vec![10.0, 25.0], vec![1.0, 2.0]]);
        assert!(max_min(&avg, &other, &avg, 1).is_err());
    }

    #[test]
    fn test_dewpoint_check_common_stations() {
        let temp = named(hourly_frame(vec![vec![20.0, 20.0], vec![10.0, 10.0]]), &["A", "B"]);
        let rh = named(hourly_frame(vec![vec![50.0, 101.0], vec![60.0, 60.0]]), &["A", "C"]);

        let outcome = dewpoint_check(&temp, &rh, 1).unwrap();
        // supersaturated reading makes dewpoint exceed temperature
        assert_eq!(outcome.temperature_flags.column(0), vec![0, 1]);
        assert_eq!(outcome.humidity_flags.column(0), vec![0, 1]);
        // station B has no humidity sensor
        assert_eq!(outcome.temperature_flags.column(1), vec![0, 0]);
        assert_eq!(outcome.dewpoint.stations(), &["A".to_string()]);
        assert_eq!(outcome.dewpoint.get(0, 0), 9.3);
        assert!((outcome.residuals.get(0, 0) + 10.7).abs() < 1e-9);
    }

    #[test]
    fn test_wind_consistency() {
        let speed = hourly_frame(vec![vec![0.0, 3.0, 0.0, f64::NAN, 2.0]]);
        let direction = hourly_frame(vec![vec![0.0, 0.0, 180.0, 0.0, 90.0]]);
        let outcome = wind_consistency(&speed, &direction, 1).unwrap();
        assert_eq!(outcome.speed_flags.column(0), vec![0, 1, 1, 0, 0]);
        assert_eq!(outcome.direction_flags, outcome.speed_flags);
    }

    #[test]
    fn test_wind_consistency_partial_stations() {
        let speed = named(hourly_frame(vec![vec![3.0, 0.0], vec![3.0, 0.0]]), &["A", "B"]);
        let direction = named(hourly_frame(vec![vec![0.0, 90.0]]), &["A"]);

        let outcome = wind_consistency(&speed, &direction, 1).unwrap();
        assert_eq!(outcome.speed_flags.shape(), (2, 2));
        assert_eq!(outcome.speed_flags.column(0), vec![1, 0]);
        // station B has no vane
        assert_eq!(outcome.speed_flags.column(1), vec![0, 0]);
        assert_eq!(outcome.direction_flags.shape(), (2, 1));
        assert_eq!(outcome.direction_flags.column(0), vec![1, 0]);
    }

    #[test]
    fn test_max_min_station_mismatch() {
        let avg = named(hourly_frame(vec![vec![10.0], vec![12.0]]), &["A", "B"]);
        let max = named(hourly_frame(vec![vec![15.0], vec![16.0]]), &["A", "C"]);
        let err = max_min(&avg, &max, &avg, 1).unwrap_err();
        assert!(matches!(err, QcError::StationMismatch(_)));
        assert!(err.to_string().contains("got [A, C]"));
    }

    #[test]
    fn test_heated_raingauge() {
        let prec = named(hourly_frame(vec![vec![1.0, 0.0], vec![2.0, 0.4]]), &["A", "B"]);
        let temp = named(hourly_frame(vec![vec![-2.0, -3.0], vec![-1.0, -1.0]]), &["A", "B"]);

        let flags = heated_raingauge(&prec, &temp, &[], 1).unwrap();
        assert_eq!(flags.column(0), vec![1, 0]);
        assert_eq!(flags.column(1), vec![1, 1]);

        let flags = heated_raingauge(&prec, &temp, &["B".to_string()], 1).unwrap();
        assert_eq!(flags.column(1), vec![0, 0]);

        assert!(heated_raingauge(&prec, &temp, &["Z".to_string()], 1).is_err());
    }

    #[test]
    fn test_snow_grass() {
        let index = vec![ts(2020, 1, 10, 0), ts(2020, 6, 10, 0), ts(2020, 11, 10, 0)];
        let snow = Frame::new(index, station_names(1), vec![30.0, 4.0, 2.0]).unwrap();
        let flags = snow_grass(&snow, 3.0, 5, 9, 1).unwrap();
        assert_eq!(flags.column(0), vec![0, 1, 0]);
        assert!(snow_grass(&snow, 3.0, 9, 5, 1).is_err());
        assert!(snow_grass(&snow, 3.0, 0, 5, 1).is_err());
    }

    #[test]
    fn test_humidity_and_leaf_wetness() {
        let rh = hourly_frame(vec![vec![20.0, 90.0, 20.0]]);
        let prec = hourly_frame(vec![vec![1.2, 1.2, 0.0]]);
        let flags = humidity_precipitation(&rh, &prec, 30.0, 1).unwrap();
        assert_eq!(flags.column(0), vec![1, 0, 0]);

        let lw = hourly_frame(vec![vec![10.0, 10.0, 0.0]]);
        let flags = leaf_wetness_humidity(&lw, &rh, 30.0, 1).unwrap();
        assert_eq!(flags.column(0), vec![1, 0, 0]);
    }

    #[test]
    fn test_humidity_precipitation_partial_stations() {
        let rh = named(hourly_frame(vec![vec![20.0, 20.0], vec![20.0, 20.0]]), &["A", "B"]);
        let prec = named(hourly_frame(vec![vec![0.0, 0.0], vec![1.0, 0.0]]), &["C", "B"]);

        let flags = humidity_precipitation(&rh, &prec, 30.0, 1).unwrap();
        assert_eq!(flags.stations(), rh.stations());
        assert_eq!(flags.column(0), vec![0, 0]);
        assert_eq!(flags.column(1), vec![1, 0]);
    }

    #[test]
    fn test_two_variable_checks_need_same_index() {
        let rh = hourly_frame(vec![vec![20.0, 20.0]]);
        let prec = hourly_frame(vec![vec![1.0, 1.0, 1.0]]);
        assert!(matches!(
            humidity_precipitation(&rh, &prec, 30.0, 1),
            Err(QcError::IndexMismatch(_))
        ));
        assert!(matches!(
            wind_consistency(&rh, &prec, 1),
            Err(QcError::IndexMismatch(_))
        ));
    }
}
