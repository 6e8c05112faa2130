pub mod calculate;
pub mod internal;
pub mod range;
pub mod spatial;
pub mod temporal;

pub use internal::{
    dewpoint_check, heated_raingauge, humidity_precipitation, leaf_wetness_humidity, max_min,
    snow_grass, wind_consistency, DewpointOutcome, WindOutcome,
};
pub use range::{range_check, range_check_seasonal};
pub use spatial::{hubbard_consistency, HubbardParams, SpatialOutcome};
pub use temporal::{
    isolated, persistence_noc, persistence_variability, step_check, step_check_seasonal,
    VariabilityMethod,
};
