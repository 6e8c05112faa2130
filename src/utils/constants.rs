/// Missing value sentinel accepted by the readers
pub const DEFAULT_MISSING_SENTINEL: &str = "-9999";

/// Cell contents read as missing in addition to the sentinel
pub const MISSING_TOKENS: [&str; 5] = ["", "NA", "NaN", "nan", "null"];

/// Timestamp formats accepted in the index column
pub const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp format used by the writers
pub const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Spatial regression defaults
pub const DEFAULT_N_MAX: usize = 5;
pub const DEFAULT_T_MAX: usize = 48;
pub const DEFAULT_SEARCH_RADIUS: f64 = 0.3;
pub const DEFAULT_MIN_NEIGHBORS: usize = 3;
pub const DEFAULT_MAX_MISSING_PERCENT: f64 = 50.0;
pub const DEFAULT_HUBBARD_FACTOR: f64 = 4.0;

/// Flag values
pub const FLAG_DEFAULT: i32 = 1;
pub const FLAG_RECONSTRUCTED: i32 = 1;

/// Processing defaults
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 100_000;
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB

/// Environment prefix for configuration overrides
pub const CONFIG_ENV_PREFIX: &str = "METQC";

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
