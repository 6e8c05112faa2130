use crate::error::Result;
use crate::models::Frame;
use crate::utils::constants::{DEFAULT_BUFFER_SIZE, OUTPUT_TIMESTAMP_FORMAT};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Cell rendering for wide CSV output
pub trait CsvCell: Copy {
    fn to_cell(&self) -> String;
}

impl CsvCell for f64 {
    fn to_cell(&self) -> String {
        if self.is_nan() {
            String::new()
        } else {
            self.to_string()
        }
    }
}

impl CsvCell for i32 {
    fn to_cell(&self) -> String {
        self.to_string()
    }
}

/// Writes frames as wide CSV tables in the layout `FrameReader` reads
pub struct FrameWriter {
    timestamp_format: String,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self {
            timestamp_format: OUTPUT_TIMESTAMP_FORMAT.to_string(),
        }
    }

    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    pub fn write<T: CsvCell>(&self, frame: &Frame<T>, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file));

        let mut header = Vec::with_capacity(frame.n_stations() + 1);
        header.push("time".to_string());
        header.extend(frame.stations().iter().cloned());
        writer.write_record(&header)?;

        for (row, timestamp) in frame.index().iter().enumerate() {
            let mut record = Vec::with_capacity(frame.n_stations() + 1);
            record.push(timestamp.format(&self.timestamp_format).to_string());
            record.extend(frame.row(row).iter().map(CsvCell::to_cell));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::test_support::hourly_frame;
    use crate::readers::FrameReader;
    use tempfile::TempDir;

    #[test]
    fn test_write_observations() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("obs.csv");
        let frame = hourly_frame(vec![vec![1.5, f64::NAN], vec![-2.0, 3.0]]);

        FrameWriter::new().write(&frame, &path)?;
        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "time,ST01,ST02");
        assert_eq!(lines[1], "2019-06-01 00:00:00,1.5,-2");
        assert_eq!(lines[2], "2019-06-01 01:00:00,,3");

        let back = FrameReader::new().read(&path)?;
        assert_eq!(back.index(), frame.index());
        assert!(back.get(1, 0).is_nan());
        Ok(())
    }

    #[test]
    fn test_write_flags() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("flags.csv");
        let flags = hourly_frame(vec![vec![1.0, 0.0]]).map(|v| v as i32);

        FrameWriter::new().write(&flags, &path)?;
        let back = FrameReader::new().read_flags(&path)?;
        assert_eq!(back, flags);
        Ok(())
    }

    #[test]
    fn test_custom_timestamp_format() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("iso.csv");
        let frame = hourly_frame(vec![vec![4.0, 5.0]]);

        FrameWriter::new()
            .with_timestamp_format("%Y-%m-%dT%H:%M")
            .write(&frame, &path)?;
        let content = std::fs::read_to_string(&path)?;
        assert!(content.lines().nth(2).unwrap().starts_with("2019-06-01T01:00,"));

        let back = FrameReader::new().read(&path)?;
        assert_eq!(back.index(), frame.index());
        Ok(())
    }
}
