use crate::error::{QcError, Result};
use crate::qc::{HubbardParams, VariabilityMethod};
use crate::utils::constants::{CONFIG_ENV_PREFIX, FLAG_DEFAULT};
use chrono::Duration;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use validator::Validate;

/// A QC run: which variable tables to load and which checks to apply.
///
/// Loaded from TOML; any key can be overridden from the environment with the
/// `METQC__` prefix, e.g. `METQC__STATIONS=/data/stations.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QcConfig {
    #[validate(length(min = 1))]
    pub variables: Vec<VariableSource>,

    /// Station coordinates, required by the spatial check
    #[serde(default)]
    pub stations: Option<PathBuf>,

    /// Extra cell value read as missing
    #[serde(default)]
    pub missing_sentinel: Option<String>,

    #[serde(default)]
    pub use_mmap: bool,

    #[validate(length(min = 1))]
    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSource {
    pub name: String,
    pub path: PathBuf,
}

fn default_flag() -> i32 {
    FLAG_DEFAULT
}

fn default_wrong_flag() -> i32 {
    2
}

/// One configured check, tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckSpec {
    Range {
        variable: String,
        min: f64,
        max: f64,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    RangeSeasonal {
        variable: String,
        /// DJF, MAM, JJA, SON
        mins: [f64; 4],
        maxs: [f64; 4],
        #[serde(default = "default_flag")]
        flag: i32,
    },
    Step {
        variable: String,
        suspect: f64,
        wrong: f64,
        #[serde(default = "default_flag")]
        flag_suspect: i32,
        #[serde(default = "default_wrong_flag")]
        flag_wrong: i32,
    },
    StepSeasonal {
        variable: String,
        suspect: [f64; 4],
        wrong: [f64; 4],
        #[serde(default = "default_flag")]
        flag_suspect: i32,
        #[serde(default = "default_wrong_flag")]
        flag_wrong: i32,
    },
    PersistenceNoc {
        variable: String,
        steps: usize,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    PersistenceVariability {
        variable: String,
        window_hours: i64,
        min_valid_percent: f64,
        method: VariabilityMethod,
        min_variability: f64,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    Isolated {
        variable: String,
        steps: usize,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    MaxMin {
        avg: String,
        max: String,
        min: String,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    Dewpoint {
        temperature: String,
        humidity: String,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    Wind {
        speed: String,
        direction: String,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    HeatedRaingauge {
        precipitation: String,
        temperature: String,
        #[serde(default)]
        heated: Vec<String>,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    SnowGrass {
        variable: String,
        tolerance: f64,
        start_month: u32,
        end_month: u32,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    HumidityPrecipitation {
        humidity: String,
        precipitation: String,
        rh_min: f64,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    LeafWetness {
        leaf_wetness: String,
        humidity: String,
        rh_min: f64,
        #[serde(default = "default_flag")]
        flag: i32,
    },
    Hubbard {
        variable: String,
        #[serde(flatten)]
        params: HubbardParams,
    },
}

impl CheckSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            CheckSpec::Range { .. } => "range",
            CheckSpec::RangeSeasonal { .. } => "range_seasonal",
            CheckSpec::Step { .. } => "step",
            CheckSpec::StepSeasonal { .. } => "step_seasonal",
            CheckSpec::PersistenceNoc { .. } => "persistence_noc",
            CheckSpec::PersistenceVariability { .. } => "persistence_variability",
            CheckSpec::Isolated { .. } => "isolated",
            CheckSpec::MaxMin { .. } => "max_min",
            CheckSpec::Dewpoint { .. } => "dewpoint",
            CheckSpec::Wind { .. } => "wind",
            CheckSpec::HeatedRaingauge { .. } => "heated_raingauge",
            CheckSpec::SnowGrass { .. } => "snow_grass",
            CheckSpec::HumidityPrecipitation { .. } => "humidity_precipitation",
            CheckSpec::LeafWetness { .. } => "leaf_wetness",
            CheckSpec::Hubbard { .. } => "hubbard",
        }
    }

    /// Variables read by the check, the flagged one first
    pub fn variables(&self) -> Vec<&str> {
        let names: Vec<&String> = match self {
            CheckSpec::Range { variable, .. }
            | CheckSpec::RangeSeasonal { variable, .. }
            | CheckSpec::Step { variable, .. }
            | CheckSpec::StepSeasonal { variable, .. }
            | CheckSpec::PersistenceNoc { variable, .. }
            | CheckSpec::PersistenceVariability { variable, .. }
            | CheckSpec::Isolated { variable, .. }
            | CheckSpec::SnowGrass { variable, .. }
            | CheckSpec::Hubbard { variable, .. } => vec![variable],
            CheckSpec::MaxMin { avg, max, min, .. } => vec![avg, max, min],
            CheckSpec::Dewpoint {
                temperature,
                humidity,
                ..
            } => vec![temperature, humidity],
            CheckSpec::Wind {
                speed, direction, ..
            } => vec![speed, direction],
            CheckSpec::HeatedRaingauge {
                precipitation,
                temperature,
                ..
            } => vec![precipitation, temperature],
            CheckSpec::HumidityPrecipitation {
                humidity,
                precipitation,
                ..
            } => vec![humidity, precipitation],
            CheckSpec::LeafWetness {
                leaf_wetness,
                humidity,
                ..
            } => vec![leaf_wetness, humidity],
        };
        names.into_iter().map(String::as_str).collect()
    }

    /// Label used in reports and output file names, e.g. `temperature:step`
    pub fn label(&self) -> String {
        format!("{}:{}", self.variables().join("+"), self.kind())
    }
}

impl QcConfig {
    /// Load from a TOML file with environment overrides. Relative data paths
    /// are resolved against the directory of the file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(env_source())
            .build()?;

        let mut config: QcConfig = settings.try_deserialize()?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.check()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .add_source(env_source())
            .build()?;

        let config: QcConfig = settings.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus cross references between checks and variables
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        let mut names = HashSet::new();
        for variable in &self.variables {
            if !names.insert(variable.name.as_str()) {
                return Err(QcError::Config(format!(
                    "Variable '{}' is declared more than once",
                    variable.name
                )));
            }
        }

        for check in &self.checks {
            for variable in check.variables() {
                if !names.contains(variable) {
                    return Err(QcError::UnknownVariable(format!(
                        "{} (used by {})",
                        variable,
                        check.kind()
                    )));
                }
            }

            if let CheckSpec::PersistenceVariability { window_hours, .. } = check {
                window_duration(*window_hours)?;
            }

            if let CheckSpec::Hubbard { params, .. } = check {
                params.validate()?;
                if self.stations.is_none() {
                    return Err(QcError::Config(
                        "The hubbard check needs a stations file".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn sources(&self) -> Vec<(String, PathBuf)> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.path.clone()))
            .collect()
    }

    fn resolve_paths(&mut self, base: &Path) {
        for variable in &mut self.variables {
            if variable.path.is_relative() {
                variable.path = base.join(&variable.path);
            }
        }
        if let Some(stations) = self.stations.as_mut() {
            if stations.is_relative() {
                *stations = base.join(&*stations);
            }
        }
    }
}

/// Variability window from a configured number of hours
pub(crate) fn window_duration(hours: i64) -> Result<Duration> {
    Duration::try_hours(hours)
        .filter(|w| *w > Duration::zero())
        .ok_or_else(|| {
            QcError::InvalidParameter(format!(
                "Variability window of {} hours is out of range",
                hours
            ))
        })
}

fn env_source() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
stations = "stations.csv"

[[variables]]
name = "temperature"
path = "temperature.csv"

[[variables]]
name = "humidity"
path = "humidity.csv"

[[checks]]
kind = "range"
variable = "temperature"
min = -40
max = 50

[[checks]]
kind = "step_seasonal"
variable = "temperature"
suspect = [4, 5, 6, 5]
wrong = [8, 10, 12, 10]

[[checks]]
kind = "persistence_variability"
variable = "humidity"
window_hours = 24
min_valid_percent = 75
method = "IQR"
min_variability = 0.5

[[checks]]
kind = "dewpoint"
temperature = "temperature"
humidity = "humidity"
flag = 3

[[checks]]
kind = "hubbard"
variable = "temperature"
start = "2020-01-02T00:00:00"
end = "2020-01-03T00:00:00"
n_max = 3
"#;

    #[test]
    fn test_parse_sample_config() -> Result<()> {
        let config = QcConfig::from_toml_str(SAMPLE)?;
        assert_eq!(config.variables.len(), 2);
        assert_eq!(config.checks.len(), 5);

        match &config.checks[0] {
            CheckSpec::Range { min, max, flag, .. } => {
                assert_eq!((*min, *max, *flag), (-40.0, 50.0, 1));
            }
            other => panic!("unexpected check {:?}", other),
        }
        match &config.checks[1] {
            CheckSpec::StepSeasonal {
                wrong, flag_wrong, ..
            } => {
                assert_eq!(wrong[2], 12.0);
                assert_eq!(*flag_wrong, 2);
            }
            other => panic!("unexpected check {:?}", other),
        }
        match &config.checks[2] {
            CheckSpec::PersistenceVariability { method, .. } => {
                assert_eq!(*method, VariabilityMethod::Iqr)
            }
            other => panic!("unexpected check {:?}", other),
        }
        match &config.checks[4] {
            CheckSpec::Hubbard { params, .. } => {
                assert_eq!(params.n_max, 3);
                assert_eq!(params.t_max, 48);
                assert_eq!(params.factor, 4.0);
            }
            other => panic!("unexpected check {:?}", other),
        }

        assert_eq!(config.checks[3].label(), "temperature+humidity:dewpoint");
        Ok(())
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let toml = r#"
[[variables]]
name = "temperature"
path = "t.csv"

[[checks]]
kind = "wind"
speed = "wind_speed"
direction = "wind_dir"
"#;
        assert!(matches!(
            QcConfig::from_toml_str(toml),
            Err(QcError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_variability_window_range_checked() {
        for hours in ["0", "9223372036854775807"] {
            let toml = format!(
                r#"
[[variables]]
name = "rh"
path = "rh.csv"

[[checks]]
kind = "persistence_variability"
variable = "rh"
window_hours = {}
min_valid_percent = 50
method = "STD"
min_variability = 1
"#,
                hours
            );
            assert!(matches!(
                QcConfig::from_toml_str(&toml),
                Err(QcError::InvalidParameter(_))
            ));
        }
        assert_eq!(window_duration(24).unwrap(), Duration::hours(24));
    }

    #[test]
    fn test_hubbard_requires_stations() {
        let toml = r#"
[[variables]]
name = "t"
path = "t.csv"

[[checks]]
kind = "hubbard"
variable = "t"
start = "2020-01-02T00:00:00"
end = "2020-01-03T00:00:00"
"#;
        assert!(matches!(
            QcConfig::from_toml_str(toml),
            Err(QcError::Config(_))
        ));
    }

    #[test]
    fn test_empty_checks_rejected() {
        let toml = r#"
checks = []

[[variables]]
name = "t"
path = "t.csv"
"#;
        assert!(QcConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_from_file_resolves_relative_paths() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("qc.toml");
        let mut file = std::fs::File::create(&path)?;
        write!(file, "{}", SAMPLE)?;

        let config = QcConfig::from_file(&path)?;
        assert_eq!(config.variables[0].path, dir.path().join("temperature.csv"));
        assert_eq!(config.stations, Some(dir.path().join("stations.csv")));
        Ok(())
    }

    #[test]
    fn test_environment_override() -> Result<()> {
        std::env::set_var("METQC__MISSING_SENTINEL", "-999.9");
        let config = QcConfig::from_toml_str(SAMPLE);
        std::env::remove_var("METQC__MISSING_SENTINEL");

        assert_eq!(config?.missing_sentinel.as_deref(), Some("-999.9"));
        Ok(())
    }
}
