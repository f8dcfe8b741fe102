//! Exchange snapshot extraction.
//!
//! Turns change-stream files into tabular rows:
//! - `parser` decodes one line / opens a (possibly compressed) file
//! - `builder` folds a file's events into rows for one extraction mode
//! - `scanner` selects files by the date in their path and merges results

pub mod builder;
pub mod parser;
pub mod scanner;

use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

// ---------------------------------------------------------------------------
// Extraction mode
// ---------------------------------------------------------------------------

/// Which rows the builder materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// One row per head-to-head market definition.
    Metadata,
    /// One row per traded-price tick, no name resolution.
    LtpOnly,
    /// Opening rows plus every resolved pre-start tick.
    Full,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Metadata => write!(f, "metadata"),
            ExtractionMode::LtpOnly => write!(f, "ltp_only"),
            ExtractionMode::Full => write!(f, "full"),
        }
    }
}

impl FromStr for ExtractionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metadata" => Ok(ExtractionMode::Metadata),
            "ltp_only" | "ltp-only" => Ok(ExtractionMode::LtpOnly),
            "full" => Ok(ExtractionMode::Full),
            other => Err(PipelineError::UnknownMode(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Output rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub market_id: String,
    pub market_time: DateTime<Utc>,
    pub market_name: String,
    pub runner_1: String,
    pub runner_2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtpRow {
    pub market_id: String,
    /// Publish time, epoch milliseconds.
    pub timestamp: i64,
    pub selection_id: u64,
    pub ltp: f64,
}

/// Full-mode row. Opening rows carry no price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRow {
    pub market_id: String,
    pub market_time: DateTime<Utc>,
    /// Publish time, epoch milliseconds.
    pub timestamp: i64,
    pub selection_id: u64,
    pub runner_name: String,
    pub ltp: Option<f64>,
    pub traded_volume: Option<f64>,
    pub back_price: Option<f64>,
    pub lay_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotRow {
    Metadata(MetadataRow),
    Ltp(LtpRow),
    Tick(TickRow),
}

impl SnapshotRow {
    pub fn market_id(&self) -> &str {
        match self {
            SnapshotRow::Metadata(r) => &r.market_id,
            SnapshotRow::Ltp(r) => &r.market_id,
            SnapshotRow::Tick(r) => &r.market_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Per-record diagnostic counters. Summed across files by the scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub lines_read: u64,
    pub malformed_lines: u64,
    pub blank_lines: u64,
    /// Decoded lines whose operation is not a market change.
    pub ignored_events: u64,
    pub rows_emitted: u64,
    /// Definitions for markets that are not two-runner head-to-head.
    pub skipped_markets: u64,
    /// Ticks for markets with no definition yet, or unknown selection ids.
    pub unresolved_ticks: u64,
    /// Ticks published after the market start time.
    pub post_start_ticks: u64,
    pub invalid_prices: u64,
}

impl AddAssign for BuildStats {
    fn add_assign(&mut self, other: Self) {
        self.lines_read += other.lines_read;
        self.malformed_lines += other.malformed_lines;
        self.blank_lines += other.blank_lines;
        self.ignored_events += other.ignored_events;
        self.rows_emitted += other.rows_emitted;
        self.skipped_markets += other.skipped_markets;
        self.unresolved_ticks += other.unresolved_ticks;
        self.post_start_ticks += other.post_start_ticks;
        self.invalid_prices += other.invalid_prices;
    }
}

impl fmt::Display for BuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lines={} rows={} malformed={} blank={} ignored={} skipped_markets={} unresolved={} post_start={} invalid_prices={}",
            self.lines_read,
            self.rows_emitted,
            self.malformed_lines,
            self.blank_lines,
            self.ignored_events,
            self.skipped_markets,
            self.unresolved_ticks,
            self.post_start_ticks,
            self.invalid_prices,
        )
    }
}

/// Everything extracted from one file.
#[derive(Debug, Clone, Default)]
pub struct FileSnapshot {
    pub rows: Vec<SnapshotRow>,
    pub stats: BuildStats,
}
