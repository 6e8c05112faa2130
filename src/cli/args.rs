use crate::utils::constants::{
    DEFAULT_HUBBARD_FACTOR, DEFAULT_MAX_MISSING_PERCENT, DEFAULT_MIN_NEIGHBORS, DEFAULT_N_MAX,
    DEFAULT_SEARCH_RADIUS, DEFAULT_T_MAX, FLAG_DEFAULT,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "met-qc")]
#[command(about = "Quality control and reconstruction of meteorological station data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the checks listed in a configuration file
    Run {
        #[arg(short, long, help = "TOML configuration file")]
        config: PathBuf,

        #[arg(
            short,
            long,
            help = "Output directory [default: output/met-qc-{YYMMDD}]"
        )]
        output_dir: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: OutputFormat,

        #[arg(long, default_value = "snappy")]
        compression: String,

        #[arg(long, default_value_t = num_cpus::get())]
        max_workers: usize,
    },

    /// Spatial regression test of a single variable against neighbour stations
    Spatial {
        #[arg(short, long, help = "Wide CSV of observations")]
        input: PathBuf,

        #[arg(short, long, help = "Station coordinates CSV")]
        stations: PathBuf,

        #[arg(long, help = "First timestamp to test")]
        start: String,

        #[arg(long, help = "Last timestamp to test")]
        end: String,

        #[arg(long, default_value_t = DEFAULT_N_MAX)]
        n_max: usize,

        #[arg(long, default_value_t = DEFAULT_T_MAX)]
        t_max: usize,

        #[arg(long, default_value_t = DEFAULT_SEARCH_RADIUS, help = "Search radius in decimal degrees")]
        radius: f64,

        #[arg(long, default_value_t = DEFAULT_MIN_NEIGHBORS)]
        min_neighbors: usize,

        #[arg(long, default_value_t = DEFAULT_MAX_MISSING_PERCENT)]
        max_missing: f64,

        #[arg(long, default_value_t = DEFAULT_HUBBARD_FACTOR)]
        factor: f64,

        #[arg(long, default_value_t = FLAG_DEFAULT)]
        flag: i32,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Fill missing or flagged observations
    Reconstruct {
        #[arg(short, long, help = "Wide CSV of observations")]
        input: PathBuf,

        #[arg(long, help = "Flag table; flagged cells are treated as missing")]
        flags: Option<PathBuf>,

        #[arg(long, help = "Estimates table, e.g. from the spatial command")]
        estimates: Option<PathBuf>,

        #[arg(long, help = "Interpolate interior gaps up to this many steps")]
        max_gap: Option<usize>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Summarise an observation table or a Parquet result file
    Inspect {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value = "5")]
        sample: usize,
    },
}
