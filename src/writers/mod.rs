pub mod frame_writer;
pub mod parquet_writer;

pub use frame_writer::{CsvCell, FrameWriter};
pub use parquet_writer::{ParquetFileInfo, ParquetWriter, QcRecord};
