use crate::cli::args::{Cli, Commands, OutputFormat};
use crate::error::{QcError, Result};
use crate::models::ObservationFrame;
use crate::processors::{QcConfig, QcRun, QcRunner, VariableSummary};
use crate::qc::{hubbard_consistency, HubbardParams};
use crate::readers::{parse_timestamp, ConcurrentReader, FrameReader, StationReader};
use crate::reconstruct::reconstruct;
use crate::utils::coordinates::mean_nearest_spacing;
use crate::utils::filename::{generate_default_output_dir, result_file_name, with_stem_suffix};
use crate::utils::progress::ProgressReporter;
use crate::writers::{FrameWriter, ParquetWriter, QcRecord};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            config,
            output_dir,
            format,
            compression,
            max_workers,
        } => {
            let config = QcConfig::from_file(&config)?;
            let output_dir = output_dir.unwrap_or_else(generate_default_output_dir);
            info!(
                variables = config.variables.len(),
                checks = config.checks.len(),
                output = %output_dir.display(),
                "Starting QC run"
            );

            let reader = ConcurrentReader::new(max_workers)
                .with_mmap(config.use_mmap)
                .with_missing_sentinel(config.missing_sentinel.clone());
            let frames = reader.read_variables(config.sources()).await?;

            let stations = match &config.stations {
                Some(path) => Some(StationReader::new().read_stations(path)?),
                None => None,
            };

            let runner = QcRunner::new(max_workers);
            let run = runner.run(&config, &frames, stations.as_deref())?;

            std::fs::create_dir_all(&output_dir)?;
            match format {
                OutputFormat::Csv => write_csv_results(&run, &output_dir)?,
                OutputFormat::Parquet => {
                    let writer = ParquetWriter::new().with_compression(&compression)?;
                    write_parquet_results(&run, &frames, &writer, &output_dir)?
                }
            }

            let report_path = output_dir.join("report.json");
            run.report.write_json(&report_path)?;

            println!("\n{}", run.report.generate_summary());
            println!("Results written to {}", output_dir.display());
        }

        Commands::Spatial {
            input,
            stations,
            start,
            end,
            n_max,
            t_max,
            radius,
            min_neighbors,
            max_missing,
            factor,
            flag,
            output_dir,
        } => {
            let x = FrameReader::new().read(&input)?;
            let stations = StationReader::new().read_stations_for(&stations, &x)?;
            if let Some((deg, km)) = mean_nearest_spacing(&stations) {
                info!(
                    mean_spacing_deg = deg,
                    mean_spacing_km = km,
                    radius,
                    "Station network spacing"
                );
            }

            let params = HubbardParams {
                start: parse_timestamp(&start)?,
                end: parse_timestamp(&end)?,
                n_max,
                t_max,
                search_radius: radius,
                min_neighbors,
                max_missing_percent: max_missing,
                factor,
                flag,
            };

            let progress =
                ProgressReporter::new(x.n_stations() as u64, "Spatial regression...", false);
            let outcome = hubbard_consistency(&stations, &x, &params, Some(&progress))?;
            progress.finish_with_message(&format!(
                "Flagged {} observations",
                outcome.flags.flagged_count()
            ));

            let output_dir = output_dir.unwrap_or_else(generate_default_output_dir);
            let stem = file_stem(&input);
            let writer = FrameWriter::new();
            writer.write(
                &outcome.estimates,
                &output_dir.join(result_file_name(&stem, "hubbard", "estimates", "csv")),
            )?;
            writer.write(
                &outcome.std_errors,
                &output_dir.join(result_file_name(&stem, "hubbard", "std_errors", "csv")),
            )?;
            writer.write(
                &outcome.flags,
                &output_dir.join(result_file_name(&stem, "hubbard", "flags", "csv")),
            )?;
            writer.write(
                &outcome.residuals,
                &output_dir.join(result_file_name(&stem, "hubbard", "residuals", "csv")),
            )?;
            println!("Results written to {}", output_dir.display());
        }

        Commands::Reconstruct {
            input,
            flags,
            estimates,
            max_gap,
            output,
        } => {
            if estimates.is_none() && max_gap.is_none() && flags.is_none() {
                return Err(QcError::InvalidParameter(
                    "Nothing to do: give --flags, --estimates or --max-gap".to_string(),
                ));
            }

            let reader = FrameReader::new();
            let x = reader.read(&input)?;
            let flags = flags.map(|p| reader.read_flags(&p)).transpose()?;
            let estimates = estimates.map(|p| reader.read(&p)).transpose()?;

            let result = reconstruct(&x, flags.as_ref(), estimates.as_ref(), max_gap)?;

            let writer = FrameWriter::new();
            writer.write(&result.values, &output)?;
            writer.write(&result.filled, &with_stem_suffix(&output, "filled"))?;

            println!(
                "Reconstructed {} values; output written to {}",
                result.filled_count(),
                output.display()
            );
        }

        Commands::Inspect { input, sample } => {
            if input.extension().and_then(|e| e.to_str()) == Some("parquet") {
                inspect_parquet(&input, sample)?;
            } else {
                inspect_table(&input, sample)?;
            }
        }
    }

    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string())
}

/// Position-prefixed check name so repeated checks of one kind do not collide
fn check_name(position: usize, kind: &str) -> String {
    format!("{:02}_{}", position + 1, kind)
}

fn write_csv_results(run: &QcRun, output_dir: &Path) -> Result<()> {
    let writer = FrameWriter::new();
    for (i, result) in run.results.iter().enumerate() {
        let check = check_name(i, result.kind);
        for (variable, flags) in &result.flags {
            writer.write(
                flags,
                &output_dir.join(result_file_name(variable, &check, "flags", "csv")),
            )?;
        }
        if let Some((variable, residuals)) = &result.residuals {
            writer.write(
                residuals,
                &output_dir.join(result_file_name(variable, &check, "residuals", "csv")),
            )?;
        }
        if let Some((variable, estimates)) = &result.estimates {
            writer.write(
                estimates,
                &output_dir.join(result_file_name(variable, &check, "estimates", "csv")),
            )?;
        }
    }

    for (variable, flags) in &run.combined {
        writer.write(
            flags,
            &output_dir.join(result_file_name(variable, "combined", "flags", "csv")),
        )?;
    }
    Ok(())
}

fn write_parquet_results(
    run: &QcRun,
    frames: &HashMap<String, ObservationFrame>,
    writer: &ParquetWriter,
    output_dir: &Path,
) -> Result<()> {
    for (i, result) in run.results.iter().enumerate() {
        let check = check_name(i, result.kind);
        for (variable, flags) in &result.flags {
            let values = frames
                .get(variable)
                .ok_or_else(|| QcError::UnknownVariable(variable.clone()))?;
            let residuals = result
                .residuals
                .as_ref()
                .filter(|(name, _)| name == variable)
                .map(|(_, r)| r);
            let records = QcRecord::from_frames(values, flags, residuals)?;
            let path = output_dir.join(result_file_name(variable, &check, "qc", "parquet"));
            writer.write_records(&records, &path)?;
        }
    }

    for (variable, flags) in &run.combined {
        let values = frames
            .get(variable)
            .ok_or_else(|| QcError::UnknownVariable(variable.clone()))?;
        let records = QcRecord::from_frames(values, flags, None)?;
        let path = output_dir.join(result_file_name(variable, "combined", "qc", "parquet"));
        writer.write_records(&records, &path)?;
        info!(file = %path.display(), "{}", writer.get_file_info(&path)?.summary());
    }
    Ok(())
}

fn inspect_table(input: &Path, sample: usize) -> Result<()> {
    let frame = FrameReader::new().read(input)?;
    let summary = VariableSummary::from_frame(&frame, None);

    println!("Table: {}", input.display());
    println!("Stations: {}", frame.n_stations());
    println!("Rows: {}", frame.n_rows());
    if let (Some(start), Some(end)) = (summary.start, summary.end) {
        println!("Period: {} to {}", start, end);
    }
    match frame.time_step() {
        Some(step) => println!("Time step: {} min", step.num_minutes()),
        None => println!("Time step: n/a"),
    }
    println!(
        "Missing: {} ({:.1}%)",
        summary.missing,
        100.0 * (1.0 - frame.valid_fraction())
    );

    println!("\nPer station:");
    for station in &summary.stations {
        println!(
            "  {:<20} missing {:>5.1}%  min {:>8}  max {:>8}  mean {:>8}",
            station.station,
            station.missing_percent(),
            fmt_opt(station.min),
            fmt_opt(station.max),
            fmt_opt(station.mean)
        );
    }

    if sample > 0 {
        println!("\nFirst {} rows:", sample.min(frame.n_rows()));
        for (row, ts) in frame.index().iter().take(sample).enumerate() {
            let cells: Vec<String> = frame.row(row).iter().map(|v| fmt_opt(Some(*v))).collect();
            println!("  {}  {}", ts, cells.join("  "));
        }
    }
    Ok(())
}

fn inspect_parquet(input: &Path, sample: usize) -> Result<()> {
    let writer = ParquetWriter::new();
    let info = writer.get_file_info(input)?;
    println!("{}", info.summary());

    if sample > 0 {
        println!("\nSample Records (showing {} records):", sample);
        for (i, record) in writer.read_sample_records(input, sample)?.iter().enumerate() {
            println!(
                "{}. {} {}: value={} flag={} residual={}",
                i + 1,
                record.timestamp,
                record.station,
                fmt_opt(record.value),
                record.flag,
                fmt_opt(record.residual)
            );
        }
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{:.2}", v),
        _ => "-".to_string(),
    }
}
