pub mod constants;
pub mod coordinates;
pub mod filename;
pub mod progress;

pub use constants::*;
pub use coordinates::{dms_to_decimal, haversine_distance, mean_nearest_spacing, parse_coordinate};
pub use filename::{generate_default_output_dir, result_file_name, with_stem_suffix};
pub use progress::ProgressReporter;
