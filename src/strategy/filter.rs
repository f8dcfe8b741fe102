//! Value-bet selection.
//!
//! Keeps the bets whose EV, confidence, odds and market overround all sit
//! inside the configured thresholds. Every bound is inclusive.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::types::BetRecord;

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml / CLI)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Minimum expected value per unit staked.
    pub ev_threshold: f64,
    /// Minimum model confidence.
    pub confidence_threshold: f64,
    /// Maximum decimal odds.
    pub max_odds: f64,
    /// Maximum market overround (sum of implied probabilities).
    pub max_margin: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ev_threshold: 0.05,
            confidence_threshold: 0.55,
            max_odds: 7.0,
            max_margin: 1.15,
        }
    }
}

/// Why a bet was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LowExpectedValue,
    LowConfidence,
    OddsTooLong,
    MarginTooWide,
}

/// Counts for one filtering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterSummary {
    pub considered: usize,
    pub selected: usize,
    pub low_ev: usize,
    pub low_confidence: usize,
    pub odds_too_long: usize,
    pub margin_too_wide: usize,
}

pub struct ValueBetFilter {
    config: FilterConfig,
}

impl ValueBetFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Check one bet. A missing EV, confidence or odds fails its criterion;
    /// a missing margin does not.
    pub fn check(&self, bet: &BetRecord) -> Result<(), Rejection> {
        if !bet.expected_value.is_some_and(|ev| ev >= self.config.ev_threshold) {
            return Err(Rejection::LowExpectedValue);
        }
        if !bet.confidence().is_some_and(|c| c >= self.config.confidence_threshold) {
            return Err(Rejection::LowConfidence);
        }
        if !bet.odds.is_some_and(|o| o <= self.config.max_odds) {
            return Err(Rejection::OddsTooLong);
        }
        if let Some(margin) = bet.odds_margin {
            if margin.is_nan() || margin > self.config.max_margin {
                return Err(Rejection::MarginTooWide);
            }
        }
        Ok(())
    }

    /// Return the subsequence of `bets` that passes every criterion, in order.
    /// An empty result is a normal outcome.
    pub fn filter(&self, bets: &[BetRecord]) -> (Vec<BetRecord>, FilterSummary) {
        let mut summary = FilterSummary { considered: bets.len(), ..Default::default() };
        let mut selected = Vec::new();

        for bet in bets {
            match self.check(bet) {
                Ok(()) => selected.push(bet.clone()),
                Err(reason) => {
                    debug!(match_id = %bet.match_id, ?reason, "Bet filtered out");
                    match reason {
                        Rejection::LowExpectedValue => summary.low_ev += 1,
                        Rejection::LowConfidence => summary.low_confidence += 1,
                        Rejection::OddsTooLong => summary.odds_too_long += 1,
                        Rejection::MarginTooWide => summary.margin_too_wide += 1,
                    }
                }
            }
        }
        summary.selected = selected.len();

        if selected.is_empty() {
            warn!(considered = summary.considered, "No value bets found after filtering");
        } else {
            info!(
                selected = summary.selected,
                considered = summary.considered,
                low_ev = summary.low_ev,
                low_confidence = summary.low_confidence,
                odds_too_long = summary.odds_too_long,
                margin_too_wide = summary.margin_too_wide,
                "Value bets selected"
            );
        }
        (selected, summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::value::enrich_bets;

    fn bet(id: &str, prob: f64, odds: f64) -> BetRecord {
        BetRecord {
            match_id: id.to_string(),
            player_1: format!("{id}-a"),
            player_2: format!("{id}-b"),
            odds: Some(odds),
            predicted_prob: Some(prob),
            winner: Some(1.0),
            ..Default::default()
        }
    }

    fn sample() -> Vec<BetRecord> {
        // EV: m1 0.2, m2 -0.05, m3 0.2, m4 0.2
        let mut bets = vec![
            bet("m1", 0.6, 2.0),
            bet("m2", 0.5, 1.9),
            bet("m3", 0.2, 6.0),
            bet("m4", 0.8, 1.5),
        ];
        enrich_bets(&mut bets);
        bets
    }

    fn ids(bets: &[BetRecord]) -> Vec<&str> {
        bets.iter().map(|b| b.match_id.as_str()).collect()
    }

    #[test]
    fn test_filter_by_ev_and_confidence() {
        let f = ValueBetFilter::new(FilterConfig {
            ev_threshold: 0.05,
            confidence_threshold: 0.5,
            max_odds: 7.0,
            ..FilterConfig::default()
        });
        let (selected, summary) = f.filter(&sample());
        assert_eq!(ids(&selected), vec!["m1", "m4"]);
        assert_eq!(summary.low_ev, 1);
        assert_eq!(summary.low_confidence, 1);
    }

    #[test]
    fn test_high_ev_threshold_selects_nothing() {
        let f = ValueBetFilter::new(FilterConfig {
            ev_threshold: 0.21,
            confidence_threshold: 0.0,
            ..FilterConfig::default()
        });
        let (selected, summary) = f.filter(&sample());
        assert!(selected.is_empty());
        assert_eq!(summary.considered, 4);
    }

    #[test]
    fn test_max_odds() {
        let f = ValueBetFilter::new(FilterConfig {
            ev_threshold: 0.05,
            confidence_threshold: 0.0,
            max_odds: 5.0,
            ..FilterConfig::default()
        });
        let (selected, _) = f.filter(&sample());
        assert_eq!(ids(&selected), vec!["m1", "m4"]);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let f = ValueBetFilter::new(FilterConfig {
            ev_threshold: 0.25,
            confidence_threshold: 0.5,
            max_odds: 2.5,
            max_margin: 1.05,
        });
        let b = BetRecord {
            odds: Some(2.5),
            expected_value: Some(0.25),
            confidence_score: Some(0.5),
            odds_margin: Some(1.05),
            ..Default::default()
        };
        assert_eq!(f.check(&b), Ok(()));
    }

    #[test]
    fn test_margin() {
        let f = ValueBetFilter::new(FilterConfig::default());
        let mut b = BetRecord {
            odds: Some(2.0),
            expected_value: Some(0.3),
            confidence_score: Some(0.9),
            odds_margin: Some(1.2),
            ..Default::default()
        };
        assert_eq!(f.check(&b), Err(Rejection::MarginTooWide));
        b.odds_margin = None;
        assert_eq!(f.check(&b), Ok(()));
        b.odds_margin = Some(f64::NAN);
        assert_eq!(f.check(&b), Err(Rejection::MarginTooWide));
    }

    #[test]
    fn test_missing_fields_fail() {
        let f = ValueBetFilter::new(FilterConfig::default());
        assert_eq!(f.check(&BetRecord::default()), Err(Rejection::LowExpectedValue));
        let b = BetRecord { expected_value: Some(1.0), confidence_score: Some(1.0), ..Default::default() };
        assert_eq!(f.check(&b), Err(Rejection::OddsTooLong));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let f = ValueBetFilter::new(FilterConfig { confidence_threshold: 0.1, ..FilterConfig::default() });
        let (once, _) = f.filter(&sample());
        let (twice, _) = f.filter(&once);
        assert_eq!(once, twice);
    }
}
