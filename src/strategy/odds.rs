//! Odds features per market.
//!
//! Folds full-mode tick rows into one row per two-runner market with the
//! last pre-start traded price of each runner, the implied probabilities
//! and the book overround.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::snapshots::TickRow;

/// `1 / odds` for a usable decimal price.
pub fn implied_probability(odds: f64) -> Option<f64> {
    (odds.is_finite() && odds > 0.0).then(|| 1.0 / odds)
}

/// Sum of both sides' implied probabilities. Above 1.0 is the book margin.
pub fn overround(odds_1: f64, odds_2: f64) -> Option<f64> {
    Some(implied_probability(odds_1)? + implied_probability(odds_2)?)
}

/// Inputs handed to the probability model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchFeatures {
    pub implied_prob_1: f64,
    pub implied_prob_2: f64,
    pub implied_prob_diff: f64,
    pub odds_margin: f64,
}

/// One two-runner market with its final pre-start prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOdds {
    pub market_id: String,
    pub market_time: DateTime<Utc>,
    pub runner_1: String,
    pub runner_2: String,
    pub selection_id_1: u64,
    pub selection_id_2: u64,
    pub ltp_1: Option<f64>,
    pub ltp_2: Option<f64>,
    pub implied_prob_1: Option<f64>,
    pub implied_prob_2: Option<f64>,
    pub implied_prob_diff: Option<f64>,
    pub odds_margin: Option<f64>,
}

impl MatchOdds {
    /// Model features, when both runners traded before the start.
    pub fn features(&self) -> Option<MatchFeatures> {
        Some(MatchFeatures {
            implied_prob_1: self.implied_prob_1?,
            implied_prob_2: self.implied_prob_2?,
            implied_prob_diff: self.implied_prob_diff?,
            odds_margin: self.odds_margin?,
        })
    }
}

struct RunnerPrice {
    selection_id: u64,
    name: String,
    /// (publish time, ltp) of the latest traded tick.
    last: Option<(i64, f64)>,
}

struct MarketAccumulator {
    market_time: DateTime<Utc>,
    runners: Vec<RunnerPrice>,
}

/// Build one `MatchOdds` per market from full-mode rows.
///
/// Runner order follows first appearance, which for a single file is the
/// order of the market definition. Markets that do not end up with exactly
/// two runners are dropped.
pub fn build_match_odds(rows: &[TickRow]) -> Vec<MatchOdds> {
    let mut order: Vec<String> = Vec::new();
    let mut markets: HashMap<String, MarketAccumulator> = HashMap::new();

    for row in rows {
        let acc = markets.entry(row.market_id.clone()).or_insert_with(|| {
            order.push(row.market_id.clone());
            MarketAccumulator { market_time: row.market_time, runners: Vec::new() }
        });

        let idx = match acc.runners.iter().position(|r| r.selection_id == row.selection_id) {
            Some(i) => i,
            None => {
                acc.runners.push(RunnerPrice {
                    selection_id: row.selection_id,
                    name: row.runner_name.clone(),
                    last: None,
                });
                acc.runners.len() - 1
            }
        };

        if let Some(ltp) = row.ltp {
            let runner = &mut acc.runners[idx];
            // Later rows win ties
            if runner.last.map_or(true, |(t, _)| row.timestamp >= t) {
                runner.last = Some((row.timestamp, ltp));
            }
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for market_id in order {
        let Some(acc) = markets.remove(&market_id) else {
            continue;
        };
        let [r1, r2] = match <[RunnerPrice; 2]>::try_from(acc.runners) {
            Ok(pair) => pair,
            Err(runners) => {
                debug!(market_id = %market_id, runners = runners.len(), "Not a two-runner market");
                continue;
            }
        };

        let ltp_1 = r1.last.map(|(_, p)| p);
        let ltp_2 = r2.last.map(|(_, p)| p);
        let implied_prob_1 = ltp_1.and_then(implied_probability);
        let implied_prob_2 = ltp_2.and_then(implied_probability);
        let implied_prob_diff = implied_prob_1.zip(implied_prob_2).map(|(a, b)| a - b);
        let odds_margin = implied_prob_1.zip(implied_prob_2).map(|(a, b)| a + b);

        out.push(MatchOdds {
            market_id,
            market_time: acc.market_time,
            runner_1: r1.name,
            runner_2: r2.name,
            selection_id_1: r1.selection_id,
            selection_id_2: r2.selection_id,
            ltp_1,
            ltp_2,
            implied_prob_1,
            implied_prob_2,
            implied_prob_diff,
            odds_margin,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
