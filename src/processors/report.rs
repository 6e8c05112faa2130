use crate::error::Result;
use crate::models::{FlagFrame, ObservationFrame};
use crate::processors::runner::CheckResult;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct QcRunReport {
    pub checks: Vec<CheckSummary>,
    pub variables: BTreeMap<String, VariableSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub label: String,
    pub kind: String,
    pub flagged: usize,
    pub cells: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub total_cells: usize,
    pub missing: usize,
    pub flagged: usize,
    pub stations: Vec<StationStatistics>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StationStatistics {
    pub station: String,
    pub total_records: usize,
    pub missing_records: usize,
    pub flagged_records: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl StationStatistics {
    fn compute(station: &str, values: &[f64], flags: Option<&[i32]>) -> Self {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let (min, max, mean) = if present.is_empty() {
            (None, None, None)
        } else {
            (
                Some(present.iter().copied().fold(f64::INFINITY, f64::min)),
                Some(present.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                Some(present.iter().sum::<f64>() / present.len() as f64),
            )
        };

        Self {
            station: station.to_string(),
            total_records: values.len(),
            missing_records: values.len() - present.len(),
            flagged_records: flags.map_or(0, |f| f.iter().filter(|&&v| v != 0).count()),
            min,
            max,
            mean,
        }
    }

    pub fn missing_percent(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        100.0 * self.missing_records as f64 / self.total_records as f64
    }
}

impl VariableSummary {
    pub fn from_frame(frame: &ObservationFrame, flags: Option<&FlagFrame>) -> Self {
        let stations = frame
            .stations()
            .iter()
            .enumerate()
            .map(|(col, station)| {
                let station_flags = flags.map(|f| f.column(col));
                StationStatistics::compute(station, &frame.column(col), station_flags.as_deref())
            })
            .collect();

        Self {
            start: frame.index().first().copied(),
            end: frame.index().last().copied(),
            total_cells: frame.values().len(),
            missing: frame.missing_count(),
            flagged: flags.map_or(0, FlagFrame::flagged_count),
            stations,
        }
    }
}

impl QcRunReport {
    pub fn build(
        frames: &HashMap<String, ObservationFrame>,
        results: &[CheckResult],
        combined: &BTreeMap<String, FlagFrame>,
    ) -> Self {
        let checks = results
            .iter()
            .map(|r| CheckSummary {
                label: r.label.clone(),
                kind: r.kind.to_string(),
                flagged: r.flagged_count(),
                cells: r.flags.iter().map(|(_, f)| f.values().len()).sum(),
            })
            .collect();

        let variables = frames
            .iter()
            .map(|(name, frame)| {
                (
                    name.clone(),
                    VariableSummary::from_frame(frame, combined.get(name)),
                )
            })
            .collect();

        Self { checks, variables }
    }

    pub fn generate_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("=== Quality Control Report ===\n");
        summary.push_str(&format!("Checks run: {}\n", self.checks.len()));
        for check in &self.checks {
            summary.push_str(&format!(
                "  {:<40} {:>8} flagged ({:.2}%)\n",
                check.label,
                check.flagged,
                percent(check.flagged, check.cells)
            ));
        }

        for (name, variable) in &self.variables {
            summary.push_str(&format!("\nVariable: {}\n", name));
            if let (Some(start), Some(end)) = (variable.start, variable.end) {
                summary.push_str(&format!("  Period: {} to {}\n", start, end));
            }
            summary.push_str(&format!(
                "  Missing: {} ({:.1}%)\n",
                variable.missing,
                percent(variable.missing, variable.total_cells)
            ));
            summary.push_str(&format!(
                "  Flagged: {} ({:.1}%)\n",
                variable.flagged,
                percent(variable.flagged, variable.total_cells)
            ));

            let mut worst: Vec<&StationStatistics> = variable
                .stations
                .iter()
                .filter(|s| s.flagged_records > 0)
                .collect();
            worst.sort_by(|a, b| b.flagged_records.cmp(&a.flagged_records));
            if !worst.is_empty() {
                summary.push_str("  Most flagged stations:\n");
                for (i, station) in worst.iter().take(10).enumerate() {
                    summary.push_str(&format!(
                        "    {}. {}: {} flagged, {:.1}% missing\n",
                        i + 1,
                        station.station,
                        station.flagged_records,
                        station.missing_percent()
                    ));
                }
            }
        }

        summary
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}
