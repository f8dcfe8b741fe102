//! Value-bet CSV through the bankroll simulator and back out to disk.

use std::fs;
use std::path::PathBuf;

use courtside::backtest::{BankrollSimulator, SimulationConfig, StakingStrategy};
use courtside::config::AppConfig;
use courtside::storage::{self, OutputGuard};

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("courtside_sim_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_simulation_from_csv() {
    let dir = temp_dir();
    let bets_csv = dir.join("value_bets.csv");
    // Second row has no outcome, third has a garbage odds cell
    fs::write(
        &bets_csv,
        "match_id,player_1,player_2,odds,predicted_prob,expected_value,kelly_fraction,winner\n\
         1.1,Alice,Bob,2.0,0.525,0.05,0.05,1\n\
         1.2,Carol,Dan,2.0,0.6,0.2,0.2,\n\
         1.3,Erin,Finn,abc,0.6,0.2,0.2,1\n\
         1.4,Gus,Hal,3.0,0.4,0.2,0.0952380952380952,0\n",
    )
    .unwrap();

    let loaded = storage::read_bets(&bets_csv).unwrap();
    assert_eq!(loaded.skipped, 1);
    assert_eq!(loaded.records.len(), 3);

    let cfg = AppConfig::from_toml("[simulation]\ncap_fraction = 1.0\n").unwrap();
    let report = BankrollSimulator::new(cfg.simulation).run(&loaded.records);

    let series = report.bankroll_series();
    assert_eq!(series.len(), 3);
    assert!((series[0] - 1050.0).abs() < 1e-9);
    assert!((series[1] - 1050.0).abs() < 1e-9);
    assert!((series[2] - 950.0).abs() < 1e-6);
    assert_eq!(report.invalid_rows, 1);
    assert!((report.max_drawdown - 100.0 / 1050.0).abs() < 1e-6);

    let guard = OutputGuard::new(false, false);
    let trajectory_csv = dir.join("trajectory.csv");
    let summary_json = dir.join("trajectory.json");
    assert!(guard.permits(&trajectory_csv));
    storage::write_records(&trajectory_csv, &report.trajectory).unwrap();
    storage::write_json(&summary_json, &report).unwrap();

    let text = fs::read_to_string(&trajectory_csv).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("step,match_id,odds,stake,won,pnl,bankroll,peak,drawdown,skipped")
    );
    assert_eq!(lines.count(), 3);
    assert!(text.contains("missing_outcome"));

    let summary: serde_json::Value = serde_json::from_str(&fs::read_to_string(&summary_json).unwrap()).unwrap();
    assert_eq!(summary["bets_placed"], 2);
    assert_eq!(summary["strategy"], "kelly");
    assert!(summary.get("trajectory").is_none());

    // A second run without --overwrite leaves the output alone
    assert!(!guard.permits(&trajectory_csv));
    assert!(OutputGuard::new(true, false).permits(&trajectory_csv));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_flat_and_kelly_diverge_on_same_bets() {
    let dir = temp_dir();
    let bets_csv = dir.join("bets.csv");
    fs::write(
        &bets_csv,
        "match_id,odds,expected_value,kelly_fraction,w\n\
         a,2.5,0.1,0.04,1\n\
         b,1.8,0.08,0.1,0\n\
         c,3.2,0.12,0.03,1\n",
    )
    .unwrap();
    let bets = storage::read_bets(&bets_csv).unwrap().records;

    let kelly = BankrollSimulator::new(SimulationConfig::default()).run(&bets);
    let flat = BankrollSimulator::new(SimulationConfig {
        strategy: StakingStrategy::Flat,
        fixed_stake: 20.0,
        ..SimulationConfig::default()
    })
    .run(&bets);

    // Flat: +30, -20, +44
    assert!((flat.final_bankroll - 1054.0).abs() < 1e-9);
    assert_eq!(flat.bets_placed, 3);
    assert_eq!(kelly.bets_placed, 3);
    assert!(kelly.final_bankroll != flat.final_bankroll);
    assert!((flat.roi - 54.0 / 60.0).abs() < 1e-12);

    fs::remove_dir_all(&dir).unwrap();
}
