//! Sequential bankroll simulation.
//!
//! Replays an ordered list of value bets against a bankroll: each bet is
//! staked from the bankroll left by the previous one, so the run is
//! strictly sequential. Bad rows never abort the run; they become
//! zero-stake steps and are counted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{BetRecord, PipelineError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingStrategy {
    /// Stake a capped Kelly fraction of the current bankroll.
    Kelly,
    /// Stake a fixed amount per bet.
    Flat,
}

impl fmt::Display for StakingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakingStrategy::Kelly => write!(f, "kelly"),
            StakingStrategy::Flat => write!(f, "flat"),
        }
    }
}

impl FromStr for StakingStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kelly" => Ok(StakingStrategy::Kelly),
            "flat" => Ok(StakingStrategy::Flat),
            other => Err(PipelineError::UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_bankroll: f64,
    pub strategy: StakingStrategy,
    /// Stake per bet under the flat strategy.
    pub fixed_stake: f64,
    /// Maximum fraction of bankroll per Kelly bet.
    pub cap_fraction: f64,
    /// Fractional Kelly multiplier (1.0 = full Kelly).
    pub kelly_multiplier: f64,
    /// Bets above these odds are skipped.
    pub odds_cap: f64,
    /// Bets below this EV are skipped.
    pub ev_threshold: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_bankroll: 1000.0,
            strategy: StakingStrategy::Kelly,
            fixed_stake: 10.0,
            cap_fraction: 0.05,
            kelly_multiplier: 1.0,
            odds_cap: 100.0,
            ev_threshold: 0.0,
        }
    }
}

impl SimulationConfig {
    /// Reject values the staking rules cannot work with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
        if !self.initial_bankroll.is_finite() {
            return invalid(format!("initial_bankroll must be finite, got {}", self.initial_bankroll));
        }
        if !(0.0..=1.0).contains(&self.cap_fraction) {
            return invalid(format!("cap_fraction must be in [0, 1], got {}", self.cap_fraction));
        }
        if !self.kelly_multiplier.is_finite() || self.kelly_multiplier < 0.0 {
            return invalid(format!("kelly_multiplier must be finite and >= 0, got {}", self.kelly_multiplier));
        }
        if !self.fixed_stake.is_finite() || self.fixed_stake < 0.0 {
            return invalid(format!("fixed_stake must be finite and >= 0, got {}", self.fixed_stake));
        }
        if self.odds_cap.is_nan() || self.ev_threshold.is_nan() {
            return invalid("odds_cap and ev_threshold must be numbers".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Bankroll, running peak and worst peak-to-trough decline.
///
/// The bankroll is not floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BankrollState {
    pub bankroll: f64,
    pub peak: f64,
    pub max_drawdown: f64,
}

impl BankrollState {
    pub fn new(initial_bankroll: f64) -> Self {
        Self { bankroll: initial_bankroll, peak: initial_bankroll, max_drawdown: 0.0 }
    }

    /// Current drawdown from peak as a fraction (0.0 = at peak).
    pub fn drawdown(&self) -> f64 {
        if self.peak > 0.0 {
            (self.peak - self.bankroll) / self.peak
        } else {
            0.0
        }
    }

    /// Apply a profit or loss, then update peak and max drawdown.
    fn settle(&mut self, pnl: f64) {
        self.bankroll += pnl;
        if self.bankroll > self.peak {
            self.peak = self.bankroll;
        }
        let dd = self.drawdown();
        if dd > self.max_drawdown {
            self.max_drawdown = dd;
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a bet was not staked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingOdds,
    MissingOutcome,
    MissingKelly,
    InvalidOdds,
    OddsAboveCap,
    BelowEvThreshold,
    NoStake,
}

impl SkipReason {
    /// Whether the row itself is unusable, as opposed to filtered by policy.
    pub fn is_invalid_row(&self) -> bool {
        matches!(
            self,
            SkipReason::MissingOdds | SkipReason::MissingOutcome | SkipReason::MissingKelly | SkipReason::InvalidOdds
        )
    }
}

/// One trajectory row per input bet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationStep {
    pub step: usize,
    pub match_id: String,
    pub odds: Option<f64>,
    pub stake: f64,
    pub won: Option<bool>,
    pub pnl: f64,
    pub bankroll: f64,
    pub peak: f64,
    pub drawdown: f64,
    pub skipped: Option<SkipReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub strategy: StakingStrategy,
    pub initial_bankroll: f64,
    pub final_bankroll: f64,
    pub peak_bankroll: f64,
    pub max_drawdown: f64,
    pub bets_placed: usize,
    pub wins: usize,
    pub losses: usize,
    pub skipped: usize,
    /// Rows missing odds, outcome or Kelly fraction.
    pub invalid_rows: usize,
    pub total_staked: f64,
    pub total_pnl: f64,
    pub roi: f64,
    #[serde(skip)]
    pub trajectory: Vec<SimulationStep>,
}

impl SimulationReport {
    /// Bankroll after each bet, in input order.
    pub fn bankroll_series(&self) -> Vec<f64> {
        self.trajectory.iter().map(|s| s.bankroll).collect()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | bankroll {:.2} -> {:.2} (peak {:.2}) | max_dd={:.1}% | bets={} (W{}/L{}) skipped={} invalid={} | roi={:.2}%",
            self.strategy,
            self.initial_bankroll,
            self.final_bankroll,
            self.peak_bankroll,
            self.max_drawdown * 100.0,
            self.bets_placed,
            self.wins,
            self.losses,
            self.skipped,
            self.invalid_rows,
            self.roi * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct BankrollSimulator {
    config: SimulationConfig,
}

impl BankrollSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run the bets in order and return the full trajectory and summary.
    pub fn run(&self, bets: &[BetRecord]) -> SimulationReport {
        let mut state = BankrollState::new(self.config.initial_bankroll);
        let mut trajectory = Vec::with_capacity(bets.len());
        let (mut wins, mut losses, mut skipped, mut invalid_rows) = (0, 0, 0, 0);
        let mut total_staked = 0.0;

        for (step, bet) in bets.iter().enumerate() {
            let decision = self.stake_for(bet, state.bankroll);
            let (stake, won, pnl, skip) = match decision {
                Ok((stake, odds, won)) => {
                    let pnl = if won { stake * (odds - 1.0) } else { -stake };
                    (stake, Some(won), pnl, None)
                }
                Err(reason) => (0.0, bet.outcome(), 0.0, Some(reason)),
            };

            state.settle(pnl);

            match skip {
                None => {
                    total_staked += stake;
                    if won == Some(true) {
                        wins += 1;
                    } else {
                        losses += 1;
                    }
                }
                Some(reason) => {
                    skipped += 1;
                    if reason.is_invalid_row() {
                        invalid_rows += 1;
                    }
                    debug!(step, match_id = %bet.match_id, ?reason, "Bet skipped");
                }
            }

            trajectory.push(SimulationStep {
                step,
                match_id: bet.match_id.clone(),
                odds: bet.odds,
                stake,
                won,
                pnl,
                bankroll: state.bankroll,
                peak: state.peak,
                drawdown: state.drawdown(),
                skipped: skip,
            });
        }

        let total_pnl = state.bankroll - self.config.initial_bankroll;
        let roi = if total_staked > 0.0 { total_pnl / total_staked } else { 0.0 };

        let report = SimulationReport {
            strategy: self.config.strategy,
            initial_bankroll: self.config.initial_bankroll,
            final_bankroll: state.bankroll,
            peak_bankroll: state.peak,
            max_drawdown: state.max_drawdown,
            bets_placed: wins + losses,
            wins,
            losses,
            skipped,
            invalid_rows,
            total_staked,
            total_pnl,
            roi,
            trajectory,
        };
        info!(summary = %report, "Simulation complete");
        report
    }

    /// Decide the stake for one bet given the bankroll before it.
    ///
    /// Returns `(stake, odds, won)` for a placed bet, or why it was skipped.
    fn stake_for(&self, bet: &BetRecord, bankroll: f64) -> Result<(f64, f64, bool), SkipReason> {
        let odds = bet.odds.filter(|o| !o.is_nan()).ok_or(SkipReason::MissingOdds)?;
        let won = bet.outcome().ok_or(SkipReason::MissingOutcome)?;
        if !odds.is_finite() || odds <= 1.0 {
            return Err(SkipReason::InvalidOdds);
        }
        if odds > self.config.odds_cap {
            return Err(SkipReason::OddsAboveCap);
        }
        // A missing EV is only a problem when a threshold could reject it
        if bet.expected_value.is_some_and(|ev| ev < self.config.ev_threshold) {
            return Err(SkipReason::BelowEvThreshold);
        }

        let stake = match self.config.strategy {
            StakingStrategy::Kelly => {
                let kelly = bet
                    .kelly_fraction
                    .filter(|k| k.is_finite())
                    .ok_or(SkipReason::MissingKelly)?;
                // Not clamp(): it panics on a NaN or negative cap
                let fraction = (kelly * self.config.kelly_multiplier)
                    .max(0.0)
                    .min(self.config.cap_fraction);
                bankroll * fraction
            }
            StakingStrategy::Flat => self.config.fixed_stake,
        };
        if !stake.is_finite() {
            return Err(SkipReason::NoStake);
        }

        // No borrowing
        let stake = stake.min(bankroll.max(0.0));
        if stake <= 0.0 {
            return Err(SkipReason::NoStake);
        }
        Ok((stake, odds, won))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
