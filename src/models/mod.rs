pub mod frame;
pub mod outcome;
pub mod station;

pub use frame::{common_stations, ensure_same_index, FlagFrame, Frame, ObservationFrame};
pub use outcome::{QcOutcome, Season};
pub use station::Station;
