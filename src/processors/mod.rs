pub mod config;
pub mod report;
pub mod runner;

pub use config::{CheckSpec, QcConfig, VariableSource};
pub use report::{CheckSummary, QcRunReport, StationStatistics, VariableSummary};
pub use runner::{combine_flags, execute, CheckResult, QcRun, QcRunner};
