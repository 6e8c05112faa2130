pub mod cli;
pub mod error;
pub mod models;
pub mod processors;
pub mod qc;
pub mod readers;
pub mod reconstruct;
pub mod utils;
pub mod writers;

pub use error::{QcError, Result};
