use crate::error::{QcError, Result};
use crate::models::{FlagFrame, ObservationFrame};
use crate::utils::constants::{
    COMPRESSION_GZIP, COMPRESSION_LZ4, COMPRESSION_NONE, COMPRESSION_SNAPPY, COMPRESSION_ZSTD,
    DEFAULT_CHUNK_SIZE, DEFAULT_ROW_GROUP_SIZE,
};
use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// One observation with its QC result, the row layout of the Parquet output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcRecord {
    pub timestamp: NaiveDateTime,
    pub station: String,
    pub value: Option<f64>,
    pub flag: i32,
    pub residual: Option<f64>,
}

impl QcRecord {
    /// Flatten frames into long-format records, row by row.
    /// `flags` and `residuals` must match the shape of `values`.
    pub fn from_frames(
        values: &ObservationFrame,
        flags: &FlagFrame,
        residuals: Option<&ObservationFrame>,
    ) -> Result<Vec<QcRecord>> {
        values.ensure_same_shape(flags)?;
        if let Some(residuals) = residuals {
            values.ensure_same_shape(residuals)?;
        }

        let mut records = Vec::with_capacity(values.n_rows() * values.n_stations());
        for (row, timestamp) in values.index().iter().enumerate() {
            for (col, station) in values.stations().iter().enumerate() {
                records.push(QcRecord {
                    timestamp: *timestamp,
                    station: station.clone(),
                    value: non_nan(values.get(row, col)),
                    flag: flags.get(row, col),
                    residual: residuals.and_then(|r| non_nan(r.get(row, col))),
                });
            }
        }
        Ok(records)
    }
}

fn non_nan(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            COMPRESSION_SNAPPY => Compression::SNAPPY,
            COMPRESSION_GZIP => Compression::GZIP(GzipLevel::default()),
            COMPRESSION_LZ4 => Compression::LZ4,
            COMPRESSION_ZSTD => Compression::ZSTD(ZstdLevel::default()),
            COMPRESSION_NONE => Compression::UNCOMPRESSED,
            _ => {
                return Err(QcError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Write QC records to a Parquet file
    pub fn write_records(&self, records: &[QcRecord], path: &Path) -> Result<()> {
        self.write_records_batched(records, path, DEFAULT_CHUNK_SIZE)
    }

    /// Write records in batches for memory efficiency
    pub fn write_records_batched(
        &self,
        records: &[QcRecord],
        path: &Path,
        batch_size: usize,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let schema = Self::create_schema();
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        for chunk in records.chunks(batch_size.max(1)) {
            let batch = Self::records_to_batch(chunk, schema.clone())?;
            writer.write(&batch)?;
        }

        writer.close()?;
        Ok(())
    }

    fn create_schema() -> Arc<Schema> {
        let fields = vec![
            Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Second, None),
                false,
            ),
            Field::new("station", DataType::Utf8, false),
            Field::new("value", DataType::Float64, true),
            Field::new("flag", DataType::Int32, false),
            Field::new("residual", DataType::Float64, true),
        ];

        Arc::new(Schema::new(fields))
    }

    fn records_to_batch(records: &[QcRecord], schema: Arc<Schema>) -> Result<RecordBatch> {
        let timestamps: Vec<i64> = records
            .iter()
            .map(|r| r.timestamp.and_utc().timestamp())
            .collect();
        let stations: Vec<&str> = records.iter().map(|r| r.station.as_str()).collect();
        let values: Vec<Option<f64>> = records.iter().map(|r| r.value).collect();
        let flags: Vec<i32> = records.iter().map(|r| r.flag).collect();
        let residuals: Vec<Option<f64>> = records.iter().map(|r| r.residual).collect();

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampSecondArray::from(timestamps)),
                Arc::new(StringArray::from(stations)),
                Arc::new(Float64Array::from(values)),
                Arc::new(Int32Array::from(flags)),
                Arc::new(Float64Array::from(residuals)),
            ],
        )?;

        Ok(batch)
    }

    /// Read up to `limit` records from the start of a Parquet file
    pub fn read_sample_records(&self, path: &Path, limit: usize) -> Result<Vec<QcRecord>> {
        let file = File::open(path)?;
        let parquet_reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(limit.clamp(1, 8192))
            .build()?;

        let mut records = Vec::new();
        for batch_result in parquet_reader {
            let batch = batch_result?;

            let timestamps = column::<TimestampSecondArray>(&batch, 0, "timestamp")?;
            let stations = column::<StringArray>(&batch, 1, "station")?;
            let values = column::<Float64Array>(&batch, 2, "value")?;
            let flags = column::<Int32Array>(&batch, 3, "flag")?;
            let residuals = column::<Float64Array>(&batch, 4, "residual")?;

            for i in 0..batch.num_rows() {
                if records.len() >= limit {
                    return Ok(records);
                }

                let timestamp = DateTime::from_timestamp(timestamps.value(i), 0)
                    .map(|dt| dt.naive_utc())
                    .ok_or_else(|| {
                        QcError::InvalidFormat(format!(
                            "Timestamp out of range: {}",
                            timestamps.value(i)
                        ))
                    })?;

                records.push(QcRecord {
                    timestamp,
                    station: stations.value(i).to_string(),
                    value: (!values.is_null(i)).then(|| values.value(i)),
                    flag: flags.value(i),
                    residual: (!residuals.is_null(i)).then(|| residuals.value(i)),
                });
            }
        }

        Ok(records)
    }

    /// Get file statistics
    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let file_metadata = metadata.file_metadata();
        let row_groups = metadata.num_row_groups();
        let total_rows = file_metadata.num_rows();
        let file_size = std::fs::metadata(path)?.len();

        let row_group_sizes = (0..row_groups)
            .map(|i| metadata.row_group(i).num_rows())
            .collect();

        // the column chunks carry the codec actually used for the file
        let compression = if row_groups > 0 && metadata.row_group(0).num_columns() > 0 {
            metadata.row_group(0).column(0).compression()
        } else {
            self.compression
        };

        Ok(ParquetFileInfo {
            total_rows,
            row_groups: row_groups as i32,
            row_group_sizes,
            file_size,
            compression,
        })
    }
}

fn column<'a, A: 'static>(batch: &'a RecordBatch, index: usize, name: &str) -> Result<&'a A> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| QcError::InvalidFormat(format!("Invalid {} column type", name)))
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        let avg_rows = if self.row_groups > 0 {
            self.total_rows as f64 / self.row_groups as f64
        } else {
            0.0
        };
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} MB\n\
            - Compression: {:?}\n\
            - Avg rows per group: {:.0}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.compression,
            avg_rows
        )
    }
}
