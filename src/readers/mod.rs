pub mod concurrent_reader;
pub mod frame_reader;
pub mod station_reader;

pub use concurrent_reader::ConcurrentReader;
pub use frame_reader::{parse_timestamp, FrameReader};
pub use station_reader::StationReader;
