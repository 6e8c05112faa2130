use chrono::{Datelike, Local};
use std::path::{Path, PathBuf};

/// Default output directory with format: output/met-qc-{YYMMDD}
pub fn generate_default_output_dir() -> PathBuf {
    let now = Local::now();
    let year = now.year() % 100;

    let dirname = format!("met-qc-{:02}{:02}{:02}", year, now.month(), now.day());
    PathBuf::from("output").join(dirname)
}

/// Output file name for a check result, e.g. `temperature_range_flags.csv`
pub fn result_file_name(variable: &str, check: &str, kind: &str, extension: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        sanitize(variable),
        sanitize(check),
        kind,
        extension
    )
}

/// Sibling path with `suffix` appended to the file stem, e.g. `temp.csv` -> `temp_filled.csv`
pub fn with_stem_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(name)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_default_output_dir() {
        let dir = generate_default_output_dir();
        let dir_str = dir.to_string_lossy();

        assert!(dir_str.starts_with("output"));
        let name = dir.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("met-qc-"));
        assert_eq!(name.len(), "met-qc-".len() + 6);
    }

    #[test]
    fn test_result_file_name() {
        assert_eq!(
            result_file_name("Air Temp", "step_seasonal", "flags", "csv"),
            "air_temp_step_seasonal_flags.csv"
        );
    }

    #[test]
    fn test_with_stem_suffix() {
        assert_eq!(
            with_stem_suffix(Path::new("data/temp.csv"), "filled"),
            PathBuf::from("data/temp_filled.csv")
        );
        assert_eq!(
            with_stem_suffix(Path::new("temp"), "mask"),
            PathBuf::from("temp_mask")
        );
    }
}
