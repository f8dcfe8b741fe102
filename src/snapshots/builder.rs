//! Per-file market state and row emission.
//!
//! The builder keeps the most recent definition for every market id seen
//! in the file and emits rows for the configured `ExtractionMode`. State
//! never outlives one file.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::parser::{decode_line, open_snapshot};
use super::{BuildStats, ExtractionMode, FileSnapshot, LtpRow, MetadataRow, SnapshotRow, TickRow};
use crate::types::{ChangeEvent, MarketChange, MarketDefinition, RunnerChange};

pub struct MarketSnapshotBuilder {
    mode: ExtractionMode,
    market_types: Vec<String>,
    definitions: HashMap<String, MarketDefinition>,
    /// Markets whose two opening rows have been written (full mode).
    opened: HashSet<String>,
    rows: Vec<SnapshotRow>,
    stats: BuildStats,
}

impl MarketSnapshotBuilder {
    pub fn new(mode: ExtractionMode, market_types: Vec<String>) -> Self {
        Self {
            mode,
            market_types,
            definitions: HashMap::new(),
            opened: HashSet::new(),
            rows: Vec::new(),
            stats: BuildStats::default(),
        }
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Decode and apply one raw line. Malformed lines are counted and skipped.
    pub fn push_line(&mut self, line: &str) {
        self.stats.lines_read += 1;
        if line.trim().is_empty() {
            self.stats.blank_lines += 1;
            return;
        }
        match decode_line(line) {
            Ok(Some(event)) => self.apply(&event),
            Ok(None) => self.stats.ignored_events += 1,
            Err(e) => {
                self.stats.malformed_lines += 1;
                debug!(line = self.stats.lines_read, error = %e, "Skipping undecodable line");
            }
        }
    }

    /// Apply one raw line that may not be valid UTF-8.
    pub fn push_bytes(&mut self, line: &[u8]) {
        match std::str::from_utf8(line) {
            Ok(text) => self.push_line(text),
            Err(e) => {
                self.stats.lines_read += 1;
                self.stats.malformed_lines += 1;
                debug!(line = self.stats.lines_read, error = %e, "Skipping line that is not UTF-8");
            }
        }
    }

    /// Apply one decoded event, in file order.
    pub fn apply(&mut self, event: &ChangeEvent) {
        if !event.is_market_change() {
            self.stats.ignored_events += 1;
            return;
        }
        for change in &event.market_changes {
            self.apply_market_change(event.publish_time, change);
        }
    }

    fn apply_market_change(&mut self, publish_time: i64, change: &MarketChange) {
        if let Some(def) = &change.market_definition {
            self.record_definition(publish_time, &change.id, def);
        }

        match self.mode {
            ExtractionMode::Metadata => {}
            ExtractionMode::LtpOnly => {
                for rc in &change.runner_changes {
                    self.emit_ltp(publish_time, &change.id, rc);
                }
            }
            ExtractionMode::Full => {
                for rc in &change.runner_changes {
                    self.emit_tick(publish_time, &change.id, rc);
                }
            }
        }
    }

    fn record_definition(&mut self, publish_time: i64, market_id: &str, def: &MarketDefinition) {
        if !def.is_head_to_head(&self.market_types) {
            self.stats.skipped_markets += 1;
            debug!(
                market_id,
                runners = def.runners.len(),
                market_type = ?def.market_type,
                "Market is not a two-runner head-to-head market"
            );
            // A republished definition can change the runner set; forget
            // whatever we knew so later ticks do not resolve against it.
            self.definitions.remove(market_id);
            return;
        }

        match self.mode {
            ExtractionMode::Metadata => {
                self.push(SnapshotRow::Metadata(MetadataRow {
                    market_id: market_id.to_string(),
                    market_time: def.market_time,
                    market_name: def.name.clone().unwrap_or_default(),
                    runner_1: def.runners[0].name.clone(),
                    runner_2: def.runners[1].name.clone(),
                }));
            }
            ExtractionMode::Full => {
                if publish_time <= def.start_millis() && !self.opened.contains(market_id) {
                    self.opened.insert(market_id.to_string());
                    for runner in &def.runners {
                        self.push(SnapshotRow::Tick(TickRow {
                            market_id: market_id.to_string(),
                            market_time: def.market_time,
                            timestamp: publish_time,
                            selection_id: runner.id,
                            runner_name: runner.name.clone(),
                            ltp: None,
                            traded_volume: None,
                            back_price: None,
                            lay_price: None,
                        }));
                    }
                }
            }
            ExtractionMode::LtpOnly => {}
        }

        self.definitions.insert(market_id.to_string(), def.clone());
    }

    fn emit_ltp(&mut self, publish_time: i64, market_id: &str, rc: &RunnerChange) {
        if rc.has_invalid_ltp() {
            self.stats.invalid_prices += 1;
            return;
        }
        // Liquidity-only updates carry no trade.
        let Some(ltp) = rc.valid_ltp() else {
            return;
        };
        self.push(SnapshotRow::Ltp(LtpRow {
            market_id: market_id.to_string(),
            timestamp: publish_time,
            selection_id: rc.id,
            ltp,
        }));
    }

    fn emit_tick(&mut self, publish_time: i64, market_id: &str, rc: &RunnerChange) {
        let Some(def) = self.definitions.get(market_id) else {
            self.stats.unresolved_ticks += 1;
            return;
        };
        if publish_time > def.start_millis() {
            self.stats.post_start_ticks += 1;
            return;
        }
        let Some(runner) = def.runner(rc.id) else {
            self.stats.unresolved_ticks += 1;
            debug!(market_id, selection_id = rc.id, "Selection not in market definition");
            return;
        };
        if rc.has_invalid_ltp() {
            self.stats.invalid_prices += 1;
        }

        let row = TickRow {
            market_id: market_id.to_string(),
            market_time: def.market_time,
            timestamp: publish_time,
            selection_id: rc.id,
            runner_name: runner.name.clone(),
            ltp: rc.valid_ltp(),
            traded_volume: rc.traded_volume,
            back_price: rc.best_back(),
            lay_price: rc.best_lay(),
        };
        self.push(SnapshotRow::Tick(row));
    }

    fn push(&mut self, row: SnapshotRow) {
        self.stats.rows_emitted += 1;
        self.rows.push(row);
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn finish(self) -> FileSnapshot {
        FileSnapshot { rows: self.rows, stats: self.stats }
    }
}

/// Fold every line of a reader into rows.
///
/// Decode failures, including invalid UTF-8, are per-line; an I/O failure
/// (including a corrupt compressed stream) fails the whole file.
pub fn build_from_reader<R: BufRead>(
    mut reader: R,
    mode: ExtractionMode,
    market_types: &[String],
) -> std::io::Result<FileSnapshot> {
    let mut builder = MarketSnapshotBuilder::new(mode, market_types.to_vec());
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        builder.push_bytes(line);
    }
    Ok(builder.finish())
}

/// Open and fold one snapshot file.
pub fn parse_file(path: &Path, mode: ExtractionMode, market_types: &[String]) -> Result<FileSnapshot> {
    let reader = open_snapshot(path)?;
    build_from_reader(reader, mode, market_types)
        .with_context(|| format!("Failed to read snapshot stream {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
