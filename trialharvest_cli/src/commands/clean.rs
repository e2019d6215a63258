//! The `clean` subcommand: write an analysis-ready copy of a dataset CSV.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use trialharvest_lib::store::{read_records, write_clean_records};
use trialharvest_lib::{Cleaner, HarvestConfig};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CleanArgs {
    /// Dataset CSV to clean (defaults to the configured dataset)
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Output CSV path, or a directory for `<input>_clean.csv`
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Copy the input to `<input>_backup_<timestamp>.csv` first
    #[arg(long)]
    pub backup: bool,
}

pub fn run(args: &CleanArgs, config: &HarvestConfig, format: &OutputFormat) -> Result<()> {
    let input = args.input.clone().unwrap_or_else(|| config.store.dataset.clone());
    let out = clean_output_path(&input, args.out.as_deref(), &config.store.output_dir);

    if args.backup {
        let backup = backup_path(&input);
        std::fs::copy(&input, &backup)
            .with_context(|| format!("backing up {} to {}", input.display(), backup.display()))?;
        eprintln!("Backed up {} to {}", input.display(), backup.display());
    }

    let records = read_records(&input).with_context(|| format!("reading {}", input.display()))?;
    let (cleaned, report) = Cleaner::default().clean(records);
    write_clean_records(&out, &cleaned)?;

    output::print_clean_report(&report, format);
    println!("{}", out.display());
    Ok(())
}

/// Cleaned copy of a written increment, next to it as `<stem>_clean.csv`.
pub fn clean_increment(increment: &Path) -> Result<PathBuf> {
    let records = read_records(increment)?;
    let (cleaned, report) = Cleaner::default().clean(records);
    let out = increment.with_file_name(format!("{}_clean.csv", file_stem(increment)));
    write_clean_records(&out, &cleaned)?;
    eprintln!(
        "Cleaned snapshot: {} of {} rows kept in {}",
        report.rows_out,
        report.rows_in,
        out.display()
    );
    Ok(out)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

/// A `.csv` output is used as given; any other output is a directory.
/// Without one the copy goes to `<output_dir>/clean/`.
fn clean_output_path(input: &Path, out: Option<&Path>, output_dir: &Path) -> PathBuf {
    let name = format!("{}_clean.csv", file_stem(input));
    match out {
        Some(path) if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv")) => {
            path.to_path_buf()
        }
        Some(dir) => dir.join(name),
        None => output_dir.join("clean").join(name),
    }
}

fn backup_path(input: &Path) -> PathBuf {
    input.with_file_name(format!(
        "{}_backup_{}.csv",
        file_stem(input),
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use trialharvest_lib::store::write_records;
    use trialharvest_lib::{Identifier, Record};

    fn trial(id: u64, title: &str) -> Record {
        let at = NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap();
        let mut record = Record::new(Identifier::new(id), title, at);
        record.fields.insert("임상시험 단계".into(), "3상".into());
        record.fields.insert("임상시험 기간".into(), "2025-01-02 ~ 2027-06-30".into());
        record
    }

    #[test]
    fn output_path_rules() {
        let input = Path::new("data/clinical_trials_full.csv");
        let outputs = Path::new("outputs");
        assert_eq!(
            clean_output_path(input, None, outputs),
            PathBuf::from("outputs/clean/clinical_trials_full_clean.csv")
        );
        assert_eq!(
            clean_output_path(input, Some(Path::new("x/out.CSV")), outputs),
            PathBuf::from("x/out.CSV")
        );
        assert_eq!(
            clean_output_path(input, Some(Path::new("exports")), outputs),
            PathBuf::from("exports/clinical_trials_full_clean.csv")
        );
    }

    #[test]
    fn increment_gets_a_cleaned_sibling() {
        let dir = TempDir::new().unwrap();
        let increment = dir.path().join("increment_20250314_092653.csv");
        write_records(
            &increment,
            &[
                trial(202500051, "[모집중] 3상 시험"),
                trial(202500052, "임상시험 정보 목록으로"),
            ],
        )
        .unwrap();

        let out = clean_increment(&increment).unwrap();

        assert_eq!(out, dir.path().join("increment_20250314_092653_clean.csv"));
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(!text.starts_with('\u{feff}'));
        assert!(!text.lines().next().unwrap().contains("크롤링일시"));

        let cleaned = read_records(&out).unwrap();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].title, "3상 시험");
        assert_eq!(cleaned[0].status, "모집중");
        assert_eq!(cleaned[0].fields["임상시험 시작월"], "2025-01");
        assert_eq!(cleaned[0].fields["임상시험 종료월"], "2027-06");
    }
}
