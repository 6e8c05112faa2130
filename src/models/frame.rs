use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;

use crate::error::{QcError, Result};

/// Rectangular time x station table stored row-major.
///
/// Rows follow a strictly increasing time index and columns are labelled by
/// unique station identifiers. Observations use `f64` with `NaN` as the
/// missing marker; flags use `i32` with 0 meaning "passed".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame<T> {
    index: Vec<NaiveDateTime>,
    stations: Vec<String>,
    values: Vec<T>,
}

pub type ObservationFrame = Frame<f64>;
pub type FlagFrame = Frame<i32>;

impl<T: Copy> Frame<T> {
    pub fn new(index: Vec<NaiveDateTime>, stations: Vec<String>, values: Vec<T>) -> Result<Self> {
        let expected = index.len() * stations.len();
        if values.len() != expected {
            return Err(QcError::InvalidFormat(format!(
                "Frame of {} rows x {} stations needs {} values, got {}",
                index.len(),
                stations.len(),
                expected,
                values.len()
            )));
        }

        if let Some(pos) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(QcError::IndexMismatch(format!(
                "Time index is not strictly increasing at {}",
                index[pos + 1]
            )));
        }

        let mut seen = HashSet::with_capacity(stations.len());
        for station in &stations {
            if !seen.insert(station.as_str()) {
                return Err(QcError::InvalidFormat(format!(
                    "Duplicate station label: '{}'",
                    station
                )));
            }
        }

        Ok(Self {
            index,
            stations,
            values,
        })
    }

    /// Build a frame from per-station columns
    pub fn from_columns(
        index: Vec<NaiveDateTime>,
        stations: Vec<String>,
        columns: Vec<Vec<T>>,
    ) -> Result<Self> {
        if columns.len() != stations.len() {
            return Err(QcError::InvalidFormat(format!(
                "{} columns given for {} stations",
                columns.len(),
                stations.len()
            )));
        }

        let n_rows = index.len();
        let mut values = Vec::with_capacity(n_rows * stations.len());
        for row in 0..n_rows {
            for column in &columns {
                let value = column.get(row).copied().ok_or_else(|| {
                    QcError::InvalidFormat(format!("Column shorter than index ({} rows)", n_rows))
                })?;
                values.push(value);
            }
        }

        Self::new(index, stations, values)
    }

    /// Frame over `index` and `stations` with every cell set to `value`
    pub fn filled(index: Vec<NaiveDateTime>, stations: Vec<String>, value: T) -> Result<Self> {
        let values = vec![value; index.len() * stations.len()];
        Self::new(index, stations, values)
    }

    /// Frame with the same index and stations as `other`, every cell set to `value`
    pub fn like<U>(other: &Frame<U>, value: T) -> Self {
        Self {
            index: other.index.clone(),
            stations: other.stations.clone(),
            values: vec![value; other.index.len() * other.stations.len()],
        }
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_stations(&self) -> usize {
        self.stations.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_stations())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.values[row * self.stations.len() + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        let n = self.stations.len();
        self.values[row * n + col] = value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        let n = self.stations.len();
        &self.values[row * n..(row + 1) * n]
    }

    pub fn column(&self, col: usize) -> Vec<T> {
        (0..self.n_rows()).map(|row| self.get(row, col)).collect()
    }

    pub fn station_index(&self, station: &str) -> Option<usize> {
        self.stations.iter().position(|s| s == station)
    }

    pub fn row_position(&self, timestamp: NaiveDateTime) -> Option<usize> {
        self.index.binary_search(&timestamp).ok()
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Frame<U> {
        Frame {
            index: self.index.clone(),
            stations: self.stations.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Rows between two timestamps, both inclusive
    pub fn slice_rows(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        let first = self
            .row_position(start)
            .ok_or(QcError::TimestampNotFound(start))?;
        let last = self
            .row_position(end)
            .ok_or(QcError::TimestampNotFound(end))?;
        if last < first {
            return Err(QcError::InvalidParameter(format!(
                "Slice end {} precedes start {}",
                end, start
            )));
        }

        Ok(self.slice_positions(first, last + 1))
    }

    pub(crate) fn slice_positions(&self, first: usize, end: usize) -> Self {
        let n = self.stations.len();
        Self {
            index: self.index[first..end].to_vec(),
            stations: self.stations.clone(),
            values: self.values[first * n..end * n].to_vec(),
        }
    }

    /// Keep only the columns at the given positions, in that order
    pub fn select_stations(&self, columns: &[usize]) -> Self {
        let mut values = Vec::with_capacity(self.n_rows() * columns.len());
        for row in 0..self.n_rows() {
            for &col in columns {
                values.push(self.get(row, col));
            }
        }

        Self {
            index: self.index.clone(),
            stations: columns.iter().map(|&c| self.stations[c].clone()).collect(),
            values,
        }
    }

    /// Copy every cell of `part` into this frame at the same timestamp and station.
    /// All of `part`'s timestamps and stations must exist here.
    pub fn overlay(&mut self, part: &Frame<T>) -> Result<()> {
        let columns = part
            .stations
            .iter()
            .map(|s| {
                self.station_index(s)
                    .ok_or_else(|| QcError::StationNotFound(s.clone()))
            })
            .collect::<Result<Vec<usize>>>()?;

        for (part_row, ts) in part.index.iter().enumerate() {
            let row = self
                .row_position(*ts)
                .ok_or(QcError::TimestampNotFound(*ts))?;
            for (part_col, &col) in columns.iter().enumerate() {
                self.set(row, col, part.get(part_row, part_col));
            }
        }
        Ok(())
    }

    /// Error unless `other` has the same index and the same stations in the same order
    pub fn ensure_same_shape<U>(&self, other: &Frame<U>) -> Result<()> {
        let actual = (other.index.len(), other.stations.len());
        if self.shape() != actual {
            return Err(QcError::ShapeMismatch {
                expected: self.shape(),
                actual,
            });
        }
        ensure_same_index(self, other)?;
        if self.stations != other.stations {
            return Err(QcError::StationMismatch(format!(
                "expected [{}], got [{}]",
                self.stations.join(", "),
                other.stations.join(", ")
            )));
        }
        Ok(())
    }
}

impl ObservationFrame {
    /// Value `lag` rows before `row` (negative lag looks ahead); `NaN` outside the frame
    #[inline]
    pub fn lagged(&self, row: usize, col: usize, lag: isize) -> f64 {
        let target = row as isize - lag;
        if target < 0 || target >= self.n_rows() as isize {
            f64::NAN
        } else {
            self.get(target as usize, col)
        }
    }

    /// Whole frame moved down by `periods` rows, `NaN` where no source row exists
    pub fn shift(&self, periods: isize) -> ObservationFrame {
        let mut shifted = ObservationFrame::like(self, f64::NAN);
        for row in 0..self.n_rows() {
            for col in 0..self.n_stations() {
                shifted.set(row, col, self.lagged(row, col, periods));
            }
        }
        shifted
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// Fraction of non-missing cells across the whole frame
    pub fn valid_fraction(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        1.0 - self.missing_count() as f64 / self.values.len() as f64
    }

    /// Smallest positive spacing of the time index
    pub fn time_step(&self) -> Option<Duration> {
        self.index.windows(2).map(|w| w[1] - w[0]).min()
    }
}

impl FlagFrame {
    pub fn flagged_count(&self) -> usize {
        self.values.iter().filter(|&&f| f != 0).count()
    }

    pub fn column_flagged_count(&self, col: usize) -> usize {
        (0..self.n_rows()).filter(|&row| self.get(row, col) != 0).count()
    }

    pub fn is_flagged(&self, row: usize, col: usize) -> bool {
        self.get(row, col) != 0
    }

    /// Cell-wise maximum of two flag frames with identical index and stations
    pub fn merge_max(&self, other: &FlagFrame) -> Result<FlagFrame> {
        self.ensure_same_shape(other)?;

        Ok(Frame {
            index: self.index.clone(),
            stations: self.stations.clone(),
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(&a, &b)| a.max(b))
                .collect(),
        })
    }
}

/// Column positions of stations present in both frames, in the order of `a`
pub fn common_stations<A, B>(a: &Frame<A>, b: &Frame<B>) -> Vec<(usize, usize)> {
    a.stations
        .iter()
        .enumerate()
        .filter_map(|(i, s)| b.stations.iter().position(|o| o == s).map(|j| (i, j)))
        .collect()
}

pub fn ensure_same_index<A, B>(a: &Frame<A>, b: &Frame<B>) -> Result<()> {
    if a.index != b.index {
        return Err(QcError::IndexMismatch(format!(
            "frames cover {} and {} timestamps with different index values",
            a.index.len(),
            b.index.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    /// Hourly index of `len` steps from `start`
    pub fn hourly_index(start: NaiveDateTime, len: usize) -> Vec<NaiveDateTime> {
        (0..len)
            .map(|h| start + Duration::hours(h as i64))
            .collect()
    }

    pub fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    pub fn station_names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ST{:02}", i + 1)).collect()
    }

    /// Hourly frame built from columns
    pub fn hourly_frame(columns: Vec<Vec<f64>>) -> ObservationFrame {
        let len = columns.first().map_or(0, |c| c.len());
        let stations = station_names(columns.len());
        Frame::from_columns(hourly_index(ts(2019, 6, 1, 0), len), stations, columns).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_frame_construction_checks_length() {
        let index = hourly_index(ts(2020, 1, 1, 0), 3);
        let result = Frame::new(index, station_names(2), vec![0.0; 5]);
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_rejects_unsorted_index() {
        let mut index = hourly_index(ts(2020, 1, 1, 0), 3);
        index.swap(0, 1);
        assert!(Frame::new(index, station_names(1), vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_frame_rejects_duplicate_stations() {
        let index = hourly_index(ts(2020, 1, 1, 0), 1);
        let stations = vec!["A".to_string(), "A".to_string()];
        assert!(Frame::new(index, stations, vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_row_major_layout() {
        let frame = hourly_frame(vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]);
        assert_eq!(frame.shape(), (3, 2));
        assert_eq!(frame.get(1, 1), 20.0);
        assert_eq!(frame.row(2), &[3.0, 30.0]);
        assert_eq!(frame.column(0), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_lagged_values() {
        let frame = hourly_frame(vec![vec![1.0, 2.0, 3.0]]);
        assert_eq!(frame.lagged(1, 0, 1), 1.0);
        assert_eq!(frame.lagged(1, 0, -1), 3.0);
        assert!(frame.lagged(0, 0, 1).is_nan());
        assert!(frame.lagged(2, 0, -1).is_nan());
    }

    #[test]
    fn test_shift_and_filled() {
        let frame = hourly_frame(vec![vec![1.0, 2.0, 3.0]]);
        let down = frame.shift(1);
        assert!(down.get(0, 0).is_nan());
        assert_eq!(down.column(0)[1..], [1.0, 2.0]);
        let up = frame.shift(-2);
        assert_eq!(up.get(0, 0), 3.0);
        assert!(up.get(1, 0).is_nan());

        let zeros = FlagFrame::filled(frame.index().to_vec(), station_names(2), 0).unwrap();
        assert_eq!(zeros.shape(), (3, 2));
        assert_eq!(zeros.flagged_count(), 0);
    }

    #[test]
    fn test_slice_rows_inclusive() {
        let frame = hourly_frame(vec![vec![1.0, 2.0, 3.0, 4.0]]);
        let sliced = frame
            .slice_rows(ts(2019, 6, 1, 1), ts(2019, 6, 1, 2))
            .unwrap();
        assert_eq!(sliced.column(0), vec![2.0, 3.0]);
        assert!(frame
            .slice_rows(ts(2019, 6, 1, 1), ts(2019, 7, 1, 0))
            .is_err());
    }

    #[test]
    fn test_overlay_span() {
        let mut full: FlagFrame = hourly_frame(vec![vec![0.0; 4], vec![0.0; 4]]).map(|v| v as i32);
        let part = full
            .slice_rows(ts(2019, 6, 1, 1), ts(2019, 6, 1, 2))
            .unwrap()
            .select_stations(&[1])
            .map(|_| 3);
        full.overlay(&part).unwrap();
        assert_eq!(full.column(0), vec![0, 0, 0, 0]);
        assert_eq!(full.column(1), vec![0, 3, 3, 0]);

        let foreign = Frame::new(vec![ts(2020, 1, 1, 0)], station_names(1), vec![1]).unwrap();
        assert!(full.overlay(&foreign).is_err());
    }

    #[test]
    fn test_shape_errors_name_the_difference() {
        let a = FlagFrame::filled(hourly_index(ts(2020, 1, 1, 0), 2), station_names(2), 0).unwrap();
        let renamed =
            FlagFrame::filled(a.index().to_vec(), vec!["ST01".into(), "XX".into()], 1).unwrap();
        let err = a.merge_max(&renamed).unwrap_err();
        assert!(matches!(err, QcError::StationMismatch(_)));
        assert!(err.to_string().contains("got [ST01, XX]"));

        let later = FlagFrame::filled(hourly_index(ts(2020, 1, 2, 0), 2), station_names(2), 0).unwrap();
        assert!(matches!(
            ensure_same_index(&a, &later),
            Err(QcError::IndexMismatch(_))
        ));
        assert!(matches!(
            a.merge_max(&later),
            Err(QcError::IndexMismatch(_))
        ));

        let wider = FlagFrame::filled(a.index().to_vec(), station_names(3), 0).unwrap();
        assert!(matches!(
            a.merge_max(&wider),
            Err(QcError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_merge_max_and_counts() {
        let a: FlagFrame = hourly_frame(vec![vec![0.0, 1.0, 0.0]]).map(|v| v as i32);
        let b: FlagFrame = hourly_frame(vec![vec![2.0, 0.0, 0.0]]).map(|v| v as i32);
        let merged = a.merge_max(&b).unwrap();
        assert_eq!(merged.column(0), vec![2, 1, 0]);
        assert_eq!(merged.flagged_count(), 2);
    }

    #[test]
    fn test_common_stations_and_time_step() {
        let a = hourly_frame(vec![vec![1.0], vec![2.0], vec![3.0]]);
        let b = a.select_stations(&[2, 0]);
        assert_eq!(common_stations(&a, &b), vec![(0, 1), (2, 0)]);
        assert_eq!(a.time_step(), None);

        let c = hourly_frame(vec![vec![1.0, f64::NAN, 3.0]]);
        assert_eq!(c.time_step(), Some(Duration::hours(1)));
        assert_eq!(c.missing_count(), 1);
        assert!((c.valid_fraction() - 2.0 / 3.0).abs() < 1e-12);
    }
}
