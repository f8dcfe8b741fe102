//! Snapshot tree on disk through to value bets.
//!
//! Builds a small archive tree with bzip2, gzip and plain files, scans it,
//! and feeds the rows through the feature, candidate and detection stages
//! via the CSV sinks.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use courtside::model::build_candidates;
use courtside::model::implied::ImpliedProbabilityModel;
use courtside::snapshots::scanner::{DateRange, DirectoryScanner, ScanConfig};
use courtside::snapshots::{ExtractionMode, SnapshotRow};
use courtside::storage;
use courtside::strategy::detect_value_bets;
use courtside::strategy::filter::{FilterConfig, ValueBetFilter};
use courtside::strategy::odds::{build_match_odds, MatchOdds};

/// 2024-01-15T12:00:00Z
const START_15: i64 = 1_705_320_000_000;
/// 2024-01-16T12:00:00Z
const START_16: i64 = START_15 + 86_400_000;

fn temp_root() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("courtside_it_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn definition(pt: i64, market_id: &str, market_time: &str, a: &str, b: &str) -> String {
    format!(
        r#"{{"op":"mcm","pt":{pt},"mc":[{{"id":"{market_id}","marketDefinition":{{"marketTime":"{market_time}","marketType":"MATCH_ODDS","name":"Match Odds","eventName":"{a} v {b}","runners":[{{"id":11,"name":"{a}"}},{{"id":22,"name":"{b}"}}]}}}}]}}"#
    )
}

fn tick(pt: i64, market_id: &str, selection: u64, ltp: f64) -> String {
    format!(r#"{{"op":"mcm","pt":{pt},"mc":[{{"id":"{market_id}","rc":[{{"id":{selection},"ltp":{ltp},"tv":50.0}}]}}]}}"#)
}

fn market_file(root: &Path, date: (&str, &str, &str), event: &str, name: &str) -> PathBuf {
    let dir = root.join("PRO").join(date.0).join(date.1).join(date.2).join(event);
    fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn write_bz2(path: &Path, lines: &[String]) {
    let file = fs::File::create(path).unwrap();
    let mut enc = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
    enc.write_all(lines.join("\n").as_bytes()).unwrap();
    enc.finish().unwrap();
}

fn write_gz(path: &Path, lines: &[String]) {
    let file = fs::File::create(path).unwrap();
    let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    enc.write_all(lines.join("\n").as_bytes()).unwrap();
    enc.finish().unwrap();
}

/// Two in-range markets, one out-of-range file, one corrupt file and one
/// file outside the dated layout.
fn build_tree(root: &Path) {
    write_bz2(
        &market_file(root, ("2024", "Jan", "15"), "33000001", "1.100.bz2"),
        &[
            r#"{"op":"connection","connectionId":"abc"}"#.to_string(),
            definition(START_15 - 3_600_000, "1.100", "2024-01-15T12:00:00Z", "Alice", "Bob"),
            tick(START_15 - 600_000, "1.100", 11, 2.6),
            tick(START_15 - 300_000, "1.100", 22, 1.6),
            "{truncated".to_string(),
            tick(START_15 - 60_000, "1.100", 11, 2.5),
            tick(START_15 + 60_000, "1.100", 22, 1.2),
        ],
    );
    write_gz(
        &market_file(root, ("2024", "Jan", "16"), "33000002", "1.200.gz"),
        &[
            definition(START_16 - 3_600_000, "1.200", "2024-01-16T12:00:00Z", "Carol", "Dan"),
            tick(START_16 - 120_000, "1.200", 11, 1.8),
            tick(START_16 - 90_000, "1.200", 22, 2.2),
            tick(START_16 - 30_000, "1.200", 99, 3.0),
        ],
    );
    fs::write(
        market_file(root, ("2024", "Feb", "1"), "33000003", "1.300"),
        definition(0, "1.300", "2024-02-01T12:00:00Z", "Erin", "Finn"),
    )
    .unwrap();
    fs::write(market_file(root, ("2024", "Jan", "15"), "33000004", "1.400.bz2"), b"not bzip2").unwrap();

    let notes = root.join("notes");
    fs::create_dir_all(&notes).unwrap();
    fs::write(notes.join("readme.txt"), "{}").unwrap();
}

#[tokio::test]
async fn test_scan_tree_full_mode() {
    let root = temp_root();
    build_tree(&root);

    let scanner = DirectoryScanner::new(ScanConfig::default());
    let range = DateRange::parse("2024-01-15", "2024-01-31").unwrap();
    let report = scanner.scan(&root, &range).await.unwrap();

    assert_eq!(report.files_in_range, 3);
    assert_eq!(report.files_parsed, 2);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.stats.malformed_lines, 1);
    assert_eq!(report.stats.post_start_ticks, 1);
    assert_eq!(report.stats.unresolved_ticks, 1);

    // 2 markets x 2 opening rows + 3 + 2 pre-start ticks
    assert_eq!(report.rows.len(), 9);
    for row in &report.rows {
        let SnapshotRow::Tick(t) = row else {
            panic!("full mode produced a non-tick row");
        };
        assert!(t.timestamp <= t.market_time.timestamp_millis());
        assert_ne!(t.market_id, "1.300");
    }

    fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_scan_tree_metadata_and_ltp_modes() {
    let root = temp_root();
    build_tree(&root);
    let range = DateRange::parse("2024-01-01", "2024-12-31").unwrap();

    let meta = DirectoryScanner::new(ScanConfig { mode: ExtractionMode::Metadata, ..ScanConfig::default() })
        .scan(&root, &range)
        .await
        .unwrap();
    let mut ids: Vec<&str> = meta.rows.iter().map(|r| r.market_id()).collect();
    ids.sort();
    assert_eq!(ids, vec!["1.100", "1.200", "1.300"]);

    let ltp = DirectoryScanner::new(ScanConfig { mode: ExtractionMode::LtpOnly, ..ScanConfig::default() })
        .scan(&root, &range)
        .await
        .unwrap();
    // Every traded tick, including post-start and unknown selections
    assert_eq!(ltp.rows.len(), 7);

    fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_rows_to_value_bets_through_csv() {
    let root = temp_root();
    build_tree(&root);
    let range = DateRange::parse("2024-01-15", "2024-01-16").unwrap();
    let report = DirectoryScanner::new(ScanConfig::default()).scan(&root, &range).await.unwrap();

    let out = root.join("out");
    let rows_csv = out.join("rows.csv");
    storage::write_snapshot_rows(&rows_csv, &report.rows).unwrap();

    let ticks = storage::read_ticks(&rows_csv).unwrap();
    assert_eq!(ticks.skipped, 0);
    assert_eq!(ticks.records.len(), 9);

    let mut odds = build_match_odds(&ticks.records);
    odds.sort_by(|a, b| a.market_id.cmp(&b.market_id));
    assert_eq!(odds.len(), 2);
    assert_eq!(odds[0].runner_1, "Alice");
    assert_eq!(odds[0].ltp_1, Some(2.5));
    // Post-start 1.2 never reached the rows
    assert_eq!(odds[0].ltp_2, Some(1.6));
    assert_eq!(odds[1].ltp_1, Some(1.8));

    let odds_csv = out.join("odds.csv");
    storage::write_records(&odds_csv, &odds).unwrap();
    let markets = storage::read_records::<MatchOdds>(&odds_csv).unwrap();
    assert_eq!(markets.records, odds);

    let candidates = build_candidates(&ImpliedProbabilityModel, &markets.records);
    assert_eq!(candidates.len(), 4);
    let p_sum: f64 = candidates[..2].iter().map(|b| b.predicted_prob.unwrap()).sum();
    assert!((p_sum - 1.0).abs() < 1e-12);

    // The normalized market price can only find value when the book is
    // under-round; both books here are over-round.
    let filter = ValueBetFilter::new(FilterConfig::default());
    let (bets, summary) = detect_value_bets(candidates.clone(), &filter);
    assert!(bets.is_empty());
    assert_eq!(summary.considered, 4);

    // Relaxed thresholds select the favourites
    let relaxed = ValueBetFilter::new(FilterConfig {
        ev_threshold: -0.1,
        confidence_threshold: 0.5,
        ..FilterConfig::default()
    });
    let (bets, _) = detect_value_bets(candidates, &relaxed);
    assert!(!bets.is_empty());
    for b in &bets {
        assert!(b.expected_value.unwrap() >= -0.1);
        assert!(b.predicted_prob.unwrap() >= 0.5);
    }

    fs::remove_dir_all(&root).unwrap();
}
