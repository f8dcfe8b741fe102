//! Win-probability models.
//!
//! The classifier itself lives outside this crate. `ProbabilityModel` is
//! the seam it plugs into; `implied` provides a market-implied baseline.

pub mod implied;

#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use crate::strategy::odds::{MatchFeatures, MatchOdds};
use crate::types::BetRecord;

/// Abstraction over probability models.
///
/// Implementors map one market's features to the probability that
/// runner 1 wins.
#[cfg_attr(test, automock)]
pub trait ProbabilityModel: Send + Sync {
    fn predict(&self, features: &MatchFeatures) -> f64;

    /// Model identifier string.
    fn name(&self) -> &str;
}

/// Turn each market into two bet candidates, one per runner.
///
/// Markets without features (a runner never traded) or with a prediction
/// outside `[0, 1]` are skipped.
pub fn build_candidates(model: &dyn ProbabilityModel, markets: &[MatchOdds]) -> Vec<BetRecord> {
    let mut out = Vec::with_capacity(markets.len() * 2);
    let mut skipped = 0usize;

    for m in markets {
        let Some(features) = m.features() else {
            skipped += 1;
            debug!(market_id = %m.market_id, "No pre-start prices for both runners");
            continue;
        };
        let p1 = model.predict(&features);
        if !(0.0..=1.0).contains(&p1) {
            skipped += 1;
            warn!(market_id = %m.market_id, model = model.name(), p1, "Prediction outside [0, 1]");
            continue;
        }

        let sides = [
            (m.selection_id_1, &m.runner_1, &m.runner_2, m.ltp_1, p1),
            (m.selection_id_2, &m.runner_2, &m.runner_1, m.ltp_2, 1.0 - p1),
        ];
        for (selection_id, backed, opponent, odds, p) in sides {
            out.push(BetRecord {
                match_id: m.market_id.clone(),
                player_1: backed.clone(),
                player_2: opponent.clone(),
                selection_id: Some(selection_id),
                odds,
                predicted_prob: Some(p),
                confidence_score: Some(p),
                odds_margin: m.odds_margin,
                ..Default::default()
            });
        }
    }

    info!(
        model = model.name(),
        markets = markets.len(),
        candidates = out.len(),
        skipped,
        "Built bet candidates"
    );
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
