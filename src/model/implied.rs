//! Market-implied baseline model.
//!
//! Removes the overround from the two implied probabilities and reports
//! runner 1's normalized share. Any edge it finds comes from price
//! movement between the two final trades, so it mostly serves as a
//! sanity check for the downstream stages.

use super::ProbabilityModel;
use crate::strategy::odds::MatchFeatures;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImpliedProbabilityModel;

impl ProbabilityModel for ImpliedProbabilityModel {
    fn predict(&self, features: &MatchFeatures) -> f64 {
        let total = features.implied_prob_1 + features.implied_prob_2;
        if total > 0.0 && total.is_finite() {
            features.implied_prob_1 / total
        } else {
            0.5
        }
    }

    fn name(&self) -> &str {
        "market-implied"
    }
}
