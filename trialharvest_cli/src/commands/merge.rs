//! The `merge` subcommand: combine dataset CSV files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use trialharvest_lib::merge_datasets;
use trialharvest_lib::store::{read_records, write_records};

#[derive(Args)]
pub struct MergeArgs {
    /// Output CSV path
    #[arg(long)]
    pub out: PathBuf,

    /// Dataset CSV files; the first file holding an identifier wins
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
}

pub fn run(args: &MergeArgs) -> Result<()> {
    let mut datasets = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let records = read_records(input).with_context(|| format!("reading {}", input.display()))?;
        eprintln!("{}: {} records", input.display(), records.len());
        datasets.push(records);
    }

    let merged = merge_datasets(datasets);
    write_records(&args.out, &merged)?;
    eprintln!("Wrote {} records to {}", merged.len(), args.out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use trialharvest_lib::{Identifier, Record};

    fn rec(id: u64, title: &str) -> Record {
        let at = NaiveDate::from_ymd_opt(2025, 2, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Record::new(Identifier::new(id), title, at)
    }

    #[test]
    fn first_input_wins_and_output_is_sorted() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        write_records(&a, &[rec(3, "a3"), rec(1, "a1")]).unwrap();
        write_records(&b, &[rec(1, "b1"), rec(2, "b2")]).unwrap();

        let out = dir.path().join("merged/all.csv");
        run(&MergeArgs {
            out: out.clone(),
            inputs: vec![a, b],
        })
        .unwrap();

        let titles: Vec<String> = read_records(&out)
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["a1", "b2", "a3"]);
    }
}
