use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::loan::{Loan, RawLoan};

/// Where loan rows are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanSource {
    Stdin,
    File(std::path::PathBuf),
}

impl LoanSource {
    pub fn from_arg(raw: &str) -> Self {
        if raw.trim() == "-" {
            Self::Stdin
        } else {
            Self::File(std::path::PathBuf::from(raw))
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Stdin => "<stdin>".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Reads and parses every loan from `source`.
///
/// Any invalid date aborts the load with the offending row id.
#[tracing::instrument(skip(tz, now))]
pub fn load_loans(source: &LoanSource, tz: Tz, now: DateTime<Utc>) -> anyhow::Result<Vec<Loan>> {
    let name = source.describe();
    let raw = match source {
        LoanSource::Stdin => read_raw_loans(io::stdin().lock(), &name)?,
        LoanSource::File(path) => load_raw_file(path)?,
    };

    let loans = raw
        .into_iter()
        .map(|row| {
            let id = row.id;
            Loan::from_raw(row, tz, now).with_context(|| format!("loan {id} in {name}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    info!(source = %name, count = loans.len(), "loaded loans");
    Ok(loans)
}

#[tracing::instrument(skip(path))]
fn load_raw_file(path: &Path) -> anyhow::Result<Vec<RawLoan>> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_raw_loans(BufReader::new(file), &path.display().to_string())
}

/// Accepts either a JSON array of loans or one loan object per line.
pub fn read_raw_loans<R: BufRead>(mut reader: R, name: &str) -> anyhow::Result<Vec<RawLoan>> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .with_context(|| format!("failed reading {name}"))?;

    if text.trim_start().starts_with('[') {
        debug!(source = name, "parsing json array");
        return serde_json::from_str(&text).with_context(|| format!("failed parsing {name}"));
    }

    debug!(source = name, "parsing jsonl");
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: RawLoan = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {name} line {}", idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{LoanSource, read_raw_loans};

    #[test]
    fn reads_jsonl_skipping_blank_lines() {
        let input = "{\"id\":1,\"due\":\"2024-01-10\"}\n\n{\"id\":2,\"due\":\"2024-01-11\",\"returned\":\"2024-01-11\"}\n";
        let rows = read_raw_loans(Cursor::new(input), "test").expect("parse jsonl");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].returned.as_deref(), Some("2024-01-11"));
    }

    #[test]
    fn reads_json_array() {
        let input = "  [{\"id\":3,\"title\":\"Fortress Besieged\",\"due\":\"2024-02-01\"}]";
        let rows = read_raw_loans(Cursor::new(input), "test").expect("parse array");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Fortress Besieged");
    }

    #[test]
    fn reports_bad_line_number() {
        let input = "{\"id\":1,\"due\":\"2024-01-10\"}\nnot json\n";
        let err = read_raw_loans(Cursor::new(input), "loans.jsonl").expect_err("bad line");
        assert!(format!("{err:#}").contains("loans.jsonl line 2"));
    }

    #[test]
    fn dash_means_stdin() {
        assert_eq!(LoanSource::from_arg("-"), LoanSource::Stdin);
        assert!(matches!(LoanSource::from_arg("loans.jsonl"), LoanSource::File(_)));
    }
}
