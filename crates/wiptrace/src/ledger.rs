//! The result ledger: an append-only CSV, one row per processed serial.
//!
//! The ledger is the resumability mechanism for multi-session runs: a run
//! skips every serial already recorded in its ledger file, so interrupted
//! batches can simply be re-run against the same path. Appends are not
//! locked; two runs must never share one ledger file concurrently (the
//! intended cross-run parallelism is one ledger per batch). Partial rows
//! from an interrupted append are tolerated and removed by [`clean_ledger`].

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ScrapeError;

/// Fixed five-column schema. The header line is written unquoted.
pub const LEDGER_HEADER: &str =
    "Serial Number,Part Number,Error Code,Error Description,Last Station Known";

/// Valid data line: a 13-digit serial (quoted or not) then a comma.
static DATA_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"?\d{13}"?,"#).unwrap());

/// Batch ledger filenames produced by scrape runs: `output_batch<N>.csv`.
static BATCH_OUTPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^output_batch\d+\.csv$").unwrap());

/// One recorded lookup outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub serial_number: String,
    pub part_number: String,
    pub error_code: String,
    pub error_description: String,
    pub last_station_known: String,
}

/// Append-only accumulator over one ledger file, with an indexed
/// processed-serial set.
///
/// The set is loaded once from the serial column at open time and kept in
/// sync on every append; a missing file means nothing has been processed.
pub struct Ledger {
    path: PathBuf,
    seen: HashSet<String>,
}

impl Ledger {
    /// Opens a ledger at `path`, indexing already-recorded serials. The
    /// file is not created until the first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ScrapeError> {
        let path = path.into();
        let mut seen = HashSet::new();
        if path.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_path(&path)?;
            for record in reader.records() {
                // Unreadable lines never fail a resume; clean drops them.
                let Ok(record) = record else { continue };
                if let Some(serial) = record.get(0) {
                    if !serial.is_empty() {
                        seen.insert(serial.to_string());
                    }
                }
            }
            debug!(ledger = %path.display(), indexed = seen.len(), "Indexed existing ledger");
        }
        Ok(Ledger { path, seen })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of serials recorded in this ledger.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// True iff `serial` has already been recorded in this ledger file.
    pub fn is_processed(&self, serial: &str) -> bool {
        self.seen.contains(serial)
    }

    /// Appends one result row, bootstrapping the header line when the file
    /// does not exist yet. Exactly one append per call.
    pub fn append(&mut self, row: &ResultRow) -> Result<(), ScrapeError> {
        let bootstrap = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if bootstrap {
            writeln!(file, "{LEDGER_HEADER}")?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(file);
        writer.write_record([
            &row.serial_number,
            &row.part_number,
            &row.error_code,
            &row.error_description,
            &row.last_station_known,
        ])?;
        writer.flush()?;

        self.seen.insert(row.serial_number.clone());
        Ok(())
    }
}

/// Counters reported after merging batch ledgers.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub files: usize,
    pub rows: usize,
}

/// Counters reported after cleaning a combined ledger.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub input_lines: usize,
    pub kept_lines: usize,
}

/// Finds `output_batch<N>.csv` files in `dir`, sorted by filename.
pub fn find_batch_outputs(dir: &Path) -> Result<Vec<PathBuf>, ScrapeError> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| BATCH_OUTPUT.is_match(n)) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Concatenates several ledger files sharing the fixed schema into one:
/// the first header encountered is kept, blank lines are skipped, and data
/// lines appear in file-then-line order.
pub fn merge_ledgers(inputs: &[PathBuf], output: &Path) -> Result<MergeStats, ScrapeError> {
    if inputs.is_empty() {
        return Err(ScrapeError::PreconditionMissing(
            "no batch ledger files to merge".to_string(),
        ));
    }

    let mut out = File::create(output)?;
    let mut stats = MergeStats::default();
    let mut header_written = false;

    for input in inputs {
        let reader = BufReader::new(File::open(input)?);
        let mut file_rows = 0usize;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if i == 0 {
                if !header_written {
                    writeln!(out, "{line}")?;
                    header_written = true;
                }
                continue;
            }
            writeln!(out, "{line}")?;
            file_rows += 1;
        }
        info!(file = %input.display(), rows = file_rows, "Merged batch ledger");
        stats.files += 1;
        stats.rows += file_rows;
    }

    Ok(stats)
}

/// Filters a combined ledger down to its header plus well-formed data rows.
///
/// The header is the first line whose text case-insensitively contains
/// `serial`; a data row must start with a 13-digit serial (quoted or not)
/// followed by a comma. Everything else — truncated rows, partial writes
/// from interrupted appends — is dropped.
pub fn clean_ledger(input: &Path, output: &Path) -> Result<CleanStats, ScrapeError> {
    if !input.exists() {
        return Err(ScrapeError::PreconditionMissing(format!(
            "input file {} not found",
            input.display()
        )));
    }

    let reader = BufReader::new(File::open(input)?);
    let mut out = File::create(output)?;
    let mut stats = CleanStats::default();
    let mut header_found = false;

    for line in reader.lines() {
        let line = line?;
        stats.input_lines += 1;
        if !header_found && line.to_lowercase().contains("serial") {
            writeln!(out, "{line}")?;
            stats.kept_lines += 1;
            header_found = true;
            continue;
        }
        if DATA_LINE.is_match(&line) {
            writeln!(out, "{line}")?;
            stats.kept_lines += 1;
        }
    }

    Ok(stats)
}
