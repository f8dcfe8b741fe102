//! Date-bounded directory scans.
//!
//! Snapshot archives are laid out as `<year>/<Mon>/<day>/<event id>/<market file>`.
//! Files are selected by the date in that path, parsed independently on
//! blocking worker threads, and their rows merged in completion order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::builder::parse_file;
use super::{BuildStats, ExtractionMode, SnapshotRow};
use crate::types::{PipelineError, HEAD_TO_HEAD_MARKET_TYPE};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub mode: ExtractionMode,
    /// Market types treated as two-team head-to-head markets.
    pub market_types: Vec<String>,
    /// Upper bound on files parsed concurrently.
    pub max_parallel_files: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Full,
            market_types: vec![HEAD_TO_HEAD_MARKET_TYPE.to_string()],
            max_parallel_files: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        if start > end {
            return Err(PipelineError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, PipelineError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| PipelineError::InvalidDate(s.to_string()))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

/// Read the archive date from a file path.
///
/// Year, abbreviated month and day are the 5th, 4th and 3rd components
/// counting back from the file name. Anything else yields `None`.
pub fn date_from_path(path: &Path) -> Option<NaiveDate> {
    let parts: Vec<&str> = path
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    if parts.len() < 5 {
        return None;
    }
    let n = parts.len();
    let (year, month, day) = (parts[n - 5], parts[n - 4], parts[n - 3]);
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if month.len() != 3 || !month.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{year}-{month}-{day}"), "%Y-%b-%d").ok()
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Merged result of a directory scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub rows: Vec<SnapshotRow>,
    pub files_seen: usize,
    pub files_in_range: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub stats: BuildStats,
}

pub struct DirectoryScanner {
    config: ScanConfig,
}

impl DirectoryScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// All files under `root` whose path date falls inside `range`, sorted.
    pub fn select_files(&self, root: &Path, range: &DateRange) -> Result<(Vec<PathBuf>, usize), PipelineError> {
        select_files(root, range)
    }

    /// Scan `root` for files in `range` and parse each one.
    ///
    /// A file that cannot be read is logged and counted; the scan goes on.
    pub async fn scan(&self, root: &Path, range: &DateRange) -> Result<ScanReport, PipelineError> {
        let walk_root = root.to_path_buf();
        let walk_range = *range;
        let (files, files_seen) = tokio::task::spawn_blocking(move || select_files(&walk_root, &walk_range))
            .await
            .map_err(|e| PipelineError::UnreadableRoot {
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })??;

        info!(
            root = %root.display(),
            start = %range.start(),
            end = %range.end(),
            mode = %self.config.mode,
            seen = files_seen,
            in_range = files.len(),
            "Scanning snapshot files"
        );

        let mut report = ScanReport {
            files_seen,
            files_in_range: files.len(),
            ..Default::default()
        };

        let permits = Arc::new(Semaphore::new(self.config.max_parallel_files.max(1)));
        let market_types = Arc::new(self.config.market_types.clone());
        let mode = self.config.mode;
        let mut tasks = JoinSet::new();

        for path in files {
            let permits = permits.clone();
            let market_types = market_types.clone();
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let file = path.clone();
                let result = tokio::task::spawn_blocking(move || parse_file(&file, mode, &market_types)).await;
                (path, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (path, result) = match joined {
                Ok(r) => r,
                Err(e) => {
                    report.files_failed += 1;
                    warn!(error = %e, "Snapshot task aborted");
                    continue;
                }
            };
            match result {
                Ok(Ok(snapshot)) => {
                    debug!(file = %path.display(), stats = %snapshot.stats, "Parsed snapshot file");
                    report.files_parsed += 1;
                    report.stats += snapshot.stats;
                    report.rows.extend(snapshot.rows);
                }
                Ok(Err(e)) => {
                    report.files_failed += 1;
                    warn!(file = %path.display(), error = format!("{e:#}"), "Skipping unreadable snapshot file");
                }
                Err(e) => {
                    report.files_failed += 1;
                    warn!(file = %path.display(), error = %e, "Snapshot parser panicked");
                }
            }
        }

        info!(
            parsed = report.files_parsed,
            failed = report.files_failed,
            rows = report.rows.len(),
            stats = %report.stats,
            "Scan complete"
        );
        Ok(report)
    }
}

/// Walk `root` and keep the files whose path date falls inside `range`.
///
/// Returns the selected files, sorted, and the number of files seen.
fn select_files(root: &Path, range: &DateRange) -> Result<(Vec<PathBuf>, usize), PipelineError> {
    let entries = fs::read_dir(root).map_err(|source| PipelineError::UnreadableRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let mut all = Vec::new();
    collect_files(entries, &mut all);
    let seen = all.len();

    let mut selected: Vec<PathBuf> = all
        .into_iter()
        .filter(|p| date_from_path(p).is_some_and(|d| range.contains(d)))
        .collect();
    selected.sort();
    Ok((selected, seen))
}

fn collect_files(entries: fs::ReadDir, out: &mut Vec<PathBuf>) {
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => match fs::read_dir(&path) {
                Ok(children) => collect_files(children, out),
                Err(e) => warn!(dir = %path.display(), error = %e, "Skipping unreadable directory"),
            },
            Ok(t) if t.is_file() => out.push(path),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot stat entry"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
