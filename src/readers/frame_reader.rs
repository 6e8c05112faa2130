use crate::error::{QcError, Result};
use crate::models::{FlagFrame, Frame, ObservationFrame};
use crate::utils::constants::{
    DATE_FORMAT, DEFAULT_BUFFER_SIZE, DEFAULT_MISSING_SENTINEL, MISSING_TOKENS, TIMESTAMP_FORMATS,
};
use chrono::{NaiveDate, NaiveDateTime};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Reader for wide CSV tables: a timestamp column followed by one column per station.
pub struct FrameReader {
    missing_sentinel: String,
    use_mmap: bool,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            missing_sentinel: DEFAULT_MISSING_SENTINEL.to_string(),
            use_mmap: false,
        }
    }

    pub fn with_mmap(use_mmap: bool) -> Self {
        Self {
            use_mmap,
            ..Self::new()
        }
    }

    pub fn with_missing_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.missing_sentinel = sentinel.into();
        self
    }

    /// Read an observation table; missing cells become `NaN`
    pub fn read(&self, path: &Path) -> Result<ObservationFrame> {
        let frame = self.read_with(path, |cell| self.parse_value(cell))?;
        debug!(
            path = %path.display(),
            rows = frame.n_rows(),
            stations = frame.n_stations(),
            "Read observation table"
        );
        Ok(frame)
    }

    /// Read a flag table written by a previous run; empty cells count as passed
    pub fn read_flags(&self, path: &Path) -> Result<FlagFrame> {
        self.read_with(path, parse_flag)
    }

    fn read_with<T: Copy>(
        &self,
        path: &Path,
        parse: impl Fn(&str) -> Result<T>,
    ) -> Result<Frame<T>> {
        let file = File::open(path)?;
        if self.use_mmap {
            let mmap = unsafe { Mmap::map(&file)? };
            parse_table(&mmap[..], parse)
        } else {
            parse_table(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file), parse)
        }
    }

    fn parse_value(&self, cell: &str) -> Result<f64> {
        if MISSING_TOKENS.contains(&cell) || cell == self.missing_sentinel {
            return Ok(f64::NAN);
        }
        cell.parse::<f64>()
            .map_err(|_| QcError::InvalidFormat(format!("Invalid observation value: '{}'", cell)))
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a timestamp in any of the accepted formats; bare dates map to midnight
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }

    let date = NaiveDate::parse_from_str(value, DATE_FORMAT)?;
    Ok(date.and_time(chrono::NaiveTime::default()))
}

fn parse_flag(cell: &str) -> Result<i32> {
    if cell.is_empty() {
        return Ok(0);
    }
    cell.parse::<i32>()
        .map_err(|_| QcError::InvalidFormat(format!("Invalid flag value: '{}'", cell)))
}

fn parse_table<R: Read, T: Copy>(
    source: R,
    parse: impl Fn(&str) -> Result<T>,
) -> Result<Frame<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(QcError::InvalidFormat(
            "Expected a timestamp column followed by at least one station column".to_string(),
        ));
    }
    let stations: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows: Vec<(NaiveDateTime, Vec<T>)> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let timestamp = parse_timestamp(&record[0]).map_err(|_| {
            QcError::InvalidFormat(format!(
                "Invalid timestamp '{}' on data row {}",
                &record[0],
                line + 1
            ))
        })?;

        let values = record
            .iter()
            .skip(1)
            .map(&parse)
            .collect::<Result<Vec<T>>>()?;
        if values.len() != stations.len() {
            return Err(QcError::InvalidFormat(format!(
                "Data row {} has {} values for {} stations",
                line + 1,
                values.len(),
                stations.len()
            )));
        }
        rows.push((timestamp, values));
    }

    rows.sort_by_key(|(ts, _)| *ts);
    if let Some(pair) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(QcError::IndexMismatch(format!(
            "Duplicate timestamp {}",
            pair[0].0
        )));
    }

    let mut index = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len() * stations.len());
    for (timestamp, row) in rows {
        index.push(timestamp);
        values.extend(row);
    }

    Frame::new(index, stations, values)
}
