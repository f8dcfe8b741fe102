//! Strategy: odds features, EV/Kelly metrics and value-bet selection.

pub mod filter;
pub mod odds;
pub mod value;

use tracing::info;

use crate::types::BetRecord;
use filter::{FilterSummary, ValueBetFilter};
use value::enrich_bets;

/// Enrich candidates with EV/Kelly metrics, then keep the value bets.
///
/// Candidates are consumed; the returned bets keep input order.
pub fn detect_value_bets(
    mut candidates: Vec<BetRecord>,
    filter: &ValueBetFilter,
) -> (Vec<BetRecord>, FilterSummary) {
    let enriched = enrich_bets(&mut candidates);
    info!(candidates = candidates.len(), enriched, "Computed value metrics");
    filter.filter(&candidates)
}
