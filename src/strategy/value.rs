//! Expected value and Kelly fraction.
//!
//! For a back bet at decimal odds `o` with win probability `p`:
//!   EV    = p(o - 1) - (1 - p)
//!   Kelly = EV / (o - 1)
//! Probabilities are clamped away from 0 and 1, and any non-finite result
//! is reported as zero.

use tracing::debug;

use crate::types::BetRecord;

/// Probabilities are clamped to `[PROBABILITY_EPSILON, 1 - PROBABILITY_EPSILON]`.
pub const PROBABILITY_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueMetrics {
    pub expected_value: f64,
    pub kelly_fraction: f64,
}

/// Compute EV and Kelly fraction for one (probability, odds) pair.
pub fn value_metrics(probability: f64, odds: f64) -> ValueMetrics {
    let p = probability.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
    let net_odds = odds - 1.0;

    let expected_value = finite_or_zero(p * net_odds - (1.0 - p));

    // No stake is possible at odds <= 1.0
    let kelly_fraction = if odds > 1.0 {
        finite_or_zero(expected_value / net_odds)
    } else {
        0.0
    };

    ValueMetrics { expected_value, kelly_fraction }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

/// Fill `expected_value` and `kelly_fraction` on every record that has both
/// odds and a predicted probability. Returns how many were enriched.
pub fn enrich_bets(bets: &mut [BetRecord]) -> usize {
    let mut enriched = 0;
    for bet in bets.iter_mut() {
        let (Some(p), Some(o)) = (bet.predicted_prob, bet.odds) else {
            debug!(match_id = %bet.match_id, "Missing odds or probability, metrics left as-is");
            continue;
        };
        let m = value_metrics(p, o);
        bet.expected_value = Some(m.expected_value);
        bet.kelly_fraction = Some(m.kelly_fraction);
        enriched += 1;
    }
    enriched
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
