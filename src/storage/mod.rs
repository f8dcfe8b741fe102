//! Persistence layer.
//!
//! CSV sinks and sources for every pipeline stage, plus the JSON
//! simulation summary. Output paths go through [`OutputGuard`] first.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::snapshots::{SnapshotRow, TickRow};
use crate::types::BetRecord;

// ---------------------------------------------------------------------------
// Output guard
// ---------------------------------------------------------------------------

/// Decides whether a stage may write its output file.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputGuard {
    pub overwrite: bool,
    pub dry_run: bool,
}

impl OutputGuard {
    pub fn new(overwrite: bool, dry_run: bool) -> Self {
        Self { overwrite, dry_run }
    }

    /// True when `path` should be written. Logs the reason when not.
    pub fn permits(&self, path: &Path) -> bool {
        if self.dry_run {
            info!(path = %path.display(), "Dry run, not writing output");
            return false;
        }
        if path.exists() && !self.overwrite {
            warn!(path = %path.display(), "Output exists, pass --overwrite to replace it");
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    Ok(())
}

fn create_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

/// Write any serializable records as CSV with a header row.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<usize> {
    let mut wtr = create_writer(path)?;
    for record in records {
        wtr.serialize(record)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    wtr.flush().with_context(|| format!("Failed to flush {}", path.display()))?;
    debug!(path = %path.display(), rows = records.len(), "CSV written");
    Ok(records.len())
}

/// Write extracted snapshot rows. The columns follow the row kind, and a
/// scan only ever produces one kind.
pub fn write_snapshot_rows(path: &Path, rows: &[SnapshotRow]) -> Result<usize> {
    let mut wtr = create_writer(path)?;
    for row in rows {
        let written = match row {
            SnapshotRow::Metadata(r) => wtr.serialize(r),
            SnapshotRow::Ltp(r) => wtr.serialize(r),
            SnapshotRow::Tick(r) => wtr.serialize(r),
        };
        written.with_context(|| format!("Failed to write row for market {}", row.market_id()))?;
    }
    wtr.flush().with_context(|| format!("Failed to flush {}", path.display()))?;
    info!(path = %path.display(), rows = rows.len(), "Snapshot rows written");
    Ok(rows.len())
}

/// Write a JSON document, pretty-printed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise JSON")?;
    ensure_parent(path)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Records read from a CSV, plus the number of rows that did not decode.
#[derive(Debug, Clone)]
pub struct CsvLoad<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

/// Read a CSV with headers. Rows that fail to decode are skipped and
/// counted; an unreadable file or header is an error.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<CsvLoad<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    rdr.headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (i, row) in rdr.deserialize::<T>().enumerate() {
        match row {
            Ok(r) => records.push(r),
            Err(e) => {
                skipped += 1;
                debug!(path = %path.display(), row = i + 1, error = %e, "Skipping undecodable row");
            }
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Some rows could not be decoded");
    }
    info!(path = %path.display(), rows = records.len(), "CSV loaded");
    Ok(CsvLoad { records, skipped })
}

pub fn read_bets(path: &Path) -> Result<CsvLoad<BetRecord>> {
    read_records(path)
}

pub fn read_ticks(path: &Path) -> Result<CsvLoad<TickRow>> {
    read_records(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
