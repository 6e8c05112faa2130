use crate::error::{QcError, Result};
use crate::models::{FlagFrame, ObservationFrame, QcOutcome, Station};
use crate::processors::config::{window_duration, CheckSpec, QcConfig};
use crate::processors::report::QcRunReport;
use crate::qc;
use crate::utils::progress::ProgressReporter;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Output of a single configured check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub label: String,
    pub kind: &'static str,
    /// Flags per affected variable, over that variable's full frame
    pub flags: Vec<(String, FlagFrame)>,
    /// Residuals of the flagged variable where the check produces them
    pub residuals: Option<(String, ObservationFrame)>,
    /// Spatial estimates over the tested span
    pub estimates: Option<(String, ObservationFrame)>,
}

impl CheckResult {
    fn flags_only(check: &CheckSpec, flags: Vec<(String, FlagFrame)>) -> Self {
        Self {
            label: check.label(),
            kind: check.kind(),
            flags,
            residuals: None,
            estimates: None,
        }
    }

    pub fn flagged_count(&self) -> usize {
        self.flags.iter().map(|(_, f)| f.flagged_count()).sum()
    }
}

/// Results of a whole configured run
#[derive(Debug)]
pub struct QcRun {
    pub results: Vec<CheckResult>,
    /// Cell-wise maximum of all flags per variable
    pub combined: BTreeMap<String, FlagFrame>,
    pub report: QcRunReport,
}

pub struct QcRunner {
    max_workers: usize,
    silent: bool,
}

impl QcRunner {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            silent: false,
        }
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Execute every check of `config` against the loaded variables
    pub fn run(
        &self,
        config: &QcConfig,
        frames: &HashMap<String, ObservationFrame>,
        stations: Option<&[Station]>,
    ) -> Result<QcRun> {
        let progress = ProgressReporter::new(
            config.checks.len() as u64,
            &format!("Running {} checks...", config.checks.len()),
            self.silent,
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .map_err(|e| QcError::Config(e.to_string()))?;

        let results: Vec<CheckResult> = pool.install(|| {
            config
                .checks
                .par_iter()
                .map(|check| {
                    let result = execute(check, frames, stations);
                    progress.set_message(&format!("Finished {}", check.label()));
                    progress.increment(1);
                    result
                })
                .collect::<Result<Vec<_>>>()
        })?;

        progress.finish_with_message("Checks complete");

        let combined = combine_flags(frames, &results)?;
        for result in &results {
            info!(
                check = %result.label,
                flagged = result.flagged_count(),
                "Check finished"
            );
        }

        let report = QcRunReport::build(frames, &results, &combined);
        Ok(QcRun {
            results,
            combined,
            report,
        })
    }
}

impl Default for QcRunner {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

fn frame<'a>(frames: &'a HashMap<String, ObservationFrame>, name: &str) -> Result<&'a ObservationFrame> {
    frames
        .get(name)
        .ok_or_else(|| QcError::UnknownVariable(name.to_string()))
}

/// Run one check and attribute its flags to the variables involved
pub fn execute(
    check: &CheckSpec,
    frames: &HashMap<String, ObservationFrame>,
    stations: Option<&[Station]>,
) -> Result<CheckResult> {
    debug!(check = %check.label(), "Starting check");

    let single = |variable: &String, outcome: QcOutcome| CheckResult {
        label: check.label(),
        kind: check.kind(),
        flags: vec![(variable.clone(), outcome.flags)],
        residuals: Some((variable.clone(), outcome.residuals)),
        estimates: None,
    };

    let result = match check {
        CheckSpec::Range {
            variable,
            min,
            max,
            flag,
        } => single(
            variable,
            qc::range_check(frame(frames, variable)?, *min, *max, *flag)?,
        ),
        CheckSpec::RangeSeasonal {
            variable,
            mins,
            maxs,
            flag,
        } => single(
            variable,
            qc::range_check_seasonal(frame(frames, variable)?, *mins, *maxs, *flag)?,
        ),
        CheckSpec::Step {
            variable,
            suspect,
            wrong,
            flag_suspect,
            flag_wrong,
        } => single(
            variable,
            qc::step_check(
                frame(frames, variable)?,
                *suspect,
                *wrong,
                *flag_suspect,
                *flag_wrong,
            )?,
        ),
        CheckSpec::StepSeasonal {
            variable,
            suspect,
            wrong,
            flag_suspect,
            flag_wrong,
        } => single(
            variable,
            qc::step_check_seasonal(
                frame(frames, variable)?,
                *suspect,
                *wrong,
                *flag_suspect,
                *flag_wrong,
            )?,
        ),
        CheckSpec::PersistenceNoc {
            variable,
            steps,
            flag,
        } => single(
            variable,
            qc::persistence_noc(frame(frames, variable)?, *steps, *flag)?,
        ),
        CheckSpec::PersistenceVariability {
            variable,
            window_hours,
            min_valid_percent,
            method,
            min_variability,
            flag,
        } => single(
            variable,
            qc::persistence_variability(
                frame(frames, variable)?,
                window_duration(*window_hours)?,
                *min_valid_percent,
                *method,
                *min_variability,
                *flag,
            )?,
        ),
        CheckSpec::Isolated {
            variable,
            steps,
            flag,
        } => single(
            variable,
            qc::isolated(frame(frames, variable)?, *steps, *flag)?,
        ),
        CheckSpec::MaxMin {
            avg,
            max,
            min,
            flag,
        } => {
            let outcome = qc::max_min(
                frame(frames, avg)?,
                frame(frames, max)?,
                frame(frames, min)?,
                *flag,
            )?;
            CheckResult {
                label: check.label(),
                kind: check.kind(),
                flags: vec![
                    (avg.clone(), outcome.flags.clone()),
                    (max.clone(), outcome.flags.clone()),
                    (min.clone(), outcome.flags),
                ],
                residuals: Some((avg.clone(), outcome.residuals)),
                estimates: None,
            }
        }
        CheckSpec::Dewpoint {
            temperature,
            humidity,
            flag,
        } => {
            let t = frame(frames, temperature)?;
            let outcome = qc::dewpoint_check(t, frame(frames, humidity)?, *flag)?;

            // residuals cover the common stations only
            let mut residuals = ObservationFrame::like(t, f64::NAN);
            residuals.overlay(&outcome.residuals)?;

            CheckResult {
                label: check.label(),
                kind: check.kind(),
                flags: vec![
                    (temperature.clone(), outcome.temperature_flags),
                    (humidity.clone(), outcome.humidity_flags),
                ],
                residuals: Some((temperature.clone(), residuals)),
                estimates: None,
            }
        }
        CheckSpec::Wind {
            speed,
            direction,
            flag,
        } => {
            let outcome =
                qc::wind_consistency(frame(frames, speed)?, frame(frames, direction)?, *flag)?;
            CheckResult::flags_only(
                check,
                vec![
                    (speed.clone(), outcome.speed_flags),
                    (direction.clone(), outcome.direction_flags),
                ],
            )
        }
        CheckSpec::HeatedRaingauge {
            precipitation,
            temperature,
            heated,
            flag,
        } => {
            let flags = qc::heated_raingauge(
                frame(frames, precipitation)?,
                frame(frames, temperature)?,
                heated,
                *flag,
            )?;
            CheckResult::flags_only(check, vec![(precipitation.clone(), flags)])
        }
        CheckSpec::SnowGrass {
            variable,
            tolerance,
            start_month,
            end_month,
            flag,
        } => {
            let flags = qc::snow_grass(
                frame(frames, variable)?,
                *tolerance,
                *start_month,
                *end_month,
                *flag,
            )?;
            CheckResult::flags_only(check, vec![(variable.clone(), flags)])
        }
        CheckSpec::HumidityPrecipitation {
            humidity,
            precipitation,
            rh_min,
            flag,
        } => {
            let flags = qc::humidity_precipitation(
                frame(frames, humidity)?,
                frame(frames, precipitation)?,
                *rh_min,
                *flag,
            )?;
            CheckResult::flags_only(check, vec![(humidity.clone(), flags)])
        }
        CheckSpec::LeafWetness {
            leaf_wetness,
            humidity,
            rh_min,
            flag,
        } => {
            let flags = qc::leaf_wetness_humidity(
                frame(frames, leaf_wetness)?,
                frame(frames, humidity)?,
                *rh_min,
                *flag,
            )?;
            CheckResult::flags_only(check, vec![(leaf_wetness.clone(), flags)])
        }
        CheckSpec::Hubbard { variable, params } => {
            let stations = stations.ok_or_else(|| {
                QcError::MissingData("station coordinates for the hubbard check".to_string())
            })?;
            let x = frame(frames, variable)?;
            let outcome = qc::hubbard_consistency(stations, x, params, None)?;

            let mut flags = FlagFrame::like(x, 0);
            flags.overlay(&outcome.flags)?;
            let mut residuals = ObservationFrame::like(x, f64::NAN);
            residuals.overlay(&outcome.residuals)?;

            CheckResult {
                label: check.label(),
                kind: check.kind(),
                flags: vec![(variable.clone(), flags)],
                residuals: Some((variable.clone(), residuals)),
                estimates: Some((variable.clone(), outcome.estimates)),
            }
        }
    };

    Ok(result)
}

/// Merge the flags of all checks per variable with a cell-wise maximum
pub fn combine_flags(
    frames: &HashMap<String, ObservationFrame>,
    results: &[CheckResult],
) -> Result<BTreeMap<String, FlagFrame>> {
    let mut combined: BTreeMap<String, FlagFrame> = BTreeMap::new();
    for result in results {
        for (variable, flags) in &result.flags {
            let current = match combined.remove(variable) {
                Some(current) => current,
                None => FlagFrame::like(frame(frames, variable)?, 0),
            };
            combined.insert(variable.clone(), current.merge_max(flags)?);
        }
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::test_support::*;
    use crate::qc::HubbardParams;
    use pretty_assertions::assert_eq;

    fn frames() -> HashMap<String, ObservationFrame> {
        let mut frames = HashMap::new();
        frames.insert(
            "temperature".to_string(),
            hourly_frame(vec![vec![10.0, 11.0, 60.0, 12.0], vec![9.0, 9.5, 10.0, 10.5]]),
        );
        frames.insert(
            "humidity".to_string(),
            hourly_frame(vec![vec![80.0, 85.0, 90.0, 101.0], vec![70.0; 4]]),
        );
        frames
    }

    fn config(toml: &str) -> QcConfig {
        QcConfig::from_toml_str(toml).unwrap()
    }

    const TWO_CHECKS: &str = r#"
[[variables]]
name = "temperature"
path = "t.csv"

[[variables]]
name = "humidity"
path = "rh.csv"

[[checks]]
kind = "range"
variable = "temperature"
min = -40
max = 50

[[checks]]
kind = "step"
variable = "temperature"
suspect = 10
wrong = 30
flag_suspect = 1
flag_wrong = 2

[[checks]]
kind = "range"
variable = "humidity"
min = 0
max = 100
flag = 5
"#;

    #[test]
    fn test_run_combines_flags_per_variable() -> Result<()> {
        let frames = frames();
        let run = QcRunner::new(2)
            .with_silent(true)
            .run(&config(TWO_CHECKS), &frames, None)?;

        assert_eq!(run.results.len(), 3);
        assert_eq!(run.results[0].label, "temperature:range");

        // range flags row 2 with 1, the jump flags rows 1 to 3 with 2
        let temperature = &run.combined["temperature"];
        assert_eq!(temperature.column(0), vec![0, 2, 2, 2]);
        assert_eq!(temperature.column(1), vec![0, 0, 0, 0]);

        let humidity = &run.combined["humidity"];
        assert_eq!(humidity.column(0), vec![0, 0, 0, 5]);
        Ok(())
    }

    #[test]
    fn test_execute_two_variable_check() -> Result<()> {
        let frames = frames();
        let check = CheckSpec::Dewpoint {
            temperature: "temperature".to_string(),
            humidity: "humidity".to_string(),
            flag: 1,
        };
        let result = execute(&check, &frames, None)?;
        assert_eq!(result.flags.len(), 2);
        assert_eq!(result.flags[0].0, "temperature");
        assert_eq!(result.flags[1].0, "humidity");

        let (variable, residuals) = result.residuals.as_ref().unwrap();
        assert_eq!(variable, "temperature");
        assert_eq!(residuals.shape(), frames["temperature"].shape());
        assert!(residuals.get(0, 0) < 0.0);
        Ok(())
    }

    #[test]
    fn test_dewpoint_residuals_cover_common_stations() -> Result<()> {
        let mut frames = frames();
        frames.insert(
            "humidity".to_string(),
            hourly_frame(vec![vec![80.0, 85.0, 90.0, 95.0]]),
        );
        let check = CheckSpec::Dewpoint {
            temperature: "temperature".to_string(),
            humidity: "humidity".to_string(),
            flag: 1,
        };
        let result = execute(&check, &frames, None)?;
        let (_, residuals) = result.residuals.as_ref().unwrap();
        assert_eq!(residuals.n_stations(), 2);
        assert!(!residuals.get(1, 0).is_nan());
        assert!(residuals.column(1).iter().all(|v| v.is_nan()));
        assert_eq!(result.flags[1].1.n_stations(), 1);
        Ok(())
    }

    #[test]
    fn test_wind_flags_follow_each_variable() -> Result<()> {
        let mut frames = HashMap::new();
        frames.insert(
            "speed".to_string(),
            hourly_frame(vec![vec![2.0, 0.0], vec![1.0, 1.0]]),
        );
        frames.insert("direction".to_string(), hourly_frame(vec![vec![0.0, 0.0]]));
        let check = CheckSpec::Wind {
            speed: "speed".to_string(),
            direction: "direction".to_string(),
            flag: 4,
        };
        let result = execute(&check, &frames, None)?;
        assert_eq!(result.flags[0].1.column(0), vec![4, 0]);
        assert_eq!(result.flags[0].1.column(1), vec![0, 0]);
        assert_eq!(result.flags[1].1.shape(), (2, 1));
        assert_eq!(result.flags[1].1.column(0), vec![4, 0]);
        Ok(())
    }

    #[test]
    fn test_out_of_range_window_is_an_error() {
        let frames = frames();
        for window_hours in [0, -3, i64::MAX] {
            let check = CheckSpec::PersistenceVariability {
                variable: "temperature".to_string(),
                window_hours,
                min_valid_percent: 50.0,
                method: qc::VariabilityMethod::Std,
                min_variability: 0.1,
                flag: 1,
            };
            assert!(matches!(
                execute(&check, &frames, None),
                Err(QcError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_missing_variable_fails() {
        let frames = frames();
        let check = CheckSpec::PersistenceNoc {
            variable: "pressure".to_string(),
            steps: 3,
            flag: 1,
        };
        assert!(matches!(
            execute(&check, &frames, None),
            Err(QcError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_hubbard_requires_stations() {
        let frames = frames();
        let check = CheckSpec::Hubbard {
            variable: "temperature".to_string(),
            params: HubbardParams::new(ts(2019, 6, 1, 1), ts(2019, 6, 1, 2)),
        };
        assert!(matches!(
            execute(&check, &frames, None),
            Err(QcError::MissingData(_))
        ));
    }

    #[test]
    fn test_hubbard_span_embedded_in_full_frame() -> Result<()> {
        let n = 120;
        let base: Vec<f64> = (0..n).map(|i| 15.0 + (i as f64 * 0.26).sin() * 5.0).collect();
        let columns: Vec<Vec<f64>> = (0..4)
            .map(|s| base.iter().map(|v| v + s as f64 * 0.5).collect())
            .collect();
        let x = hourly_frame(columns);
        let stations: Vec<Station> = (0..4)
            .map(|i| Station::new(format!("ST{:02}", i + 1), 43.0 + i as f64 * 0.05, 12.0, None))
            .collect();

        let mut frames = HashMap::new();
        frames.insert("temperature".to_string(), x.clone());

        let mut params = HubbardParams::new(x.index()[60], x.index()[70]);
        params.min_neighbors = 2;
        let check = CheckSpec::Hubbard {
            variable: "temperature".to_string(),
            params,
        };

        let result = execute(&check, &frames, Some(&stations))?;
        let flags = &result.flags[0].1;
        assert_eq!(flags.shape(), x.shape());
        assert_eq!(flags.flagged_count(), 0);

        let (_, residuals) = result.residuals.as_ref().unwrap();
        assert!(residuals.get(10, 0).is_nan());
        assert!(!residuals.get(65, 0).is_nan());
        assert_eq!(result.estimates.as_ref().unwrap().1.n_rows(), 11);
        Ok(())
    }
}
