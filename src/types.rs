//! Shared types for COURTSIDE.
//!
//! Wire types for the exchange change stream, the bet record that flows
//! through the value/filter/simulation stages, and the domain error enums.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Operation tag carried by market-change messages.
pub const MARKET_CHANGE_OP: &str = "mcm";

/// Market type tag for a two-team head-to-head market.
pub const HEAD_TO_HEAD_MARKET_TYPE: &str = "MATCH_ODDS";

// ---------------------------------------------------------------------------
// Change stream
// ---------------------------------------------------------------------------

/// One decoded line of a change-stream file.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEvent {
    pub op: String,
    /// Publish time, milliseconds since epoch.
    #[serde(rename = "pt", default)]
    pub publish_time: i64,
    #[serde(rename = "mc", default)]
    pub market_changes: Vec<MarketChange>,
}

impl ChangeEvent {
    pub fn is_market_change(&self) -> bool {
        self.op == MARKET_CHANGE_OP
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketChange {
    pub id: String,
    #[serde(default)]
    pub market_definition: Option<MarketDefinition>,
    #[serde(rename = "rc", default)]
    pub runner_changes: Vec<RunnerChange>,
}

/// Market definition, sent on the first message for a market and whenever
/// the exchange republishes it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDefinition {
    pub market_time: DateTime<Utc>,
    #[serde(default)]
    pub market_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub runners: Vec<Runner>,
}

impl MarketDefinition {
    /// Whether this definition describes a two-runner market of one of
    /// the accepted head-to-head types.
    pub fn is_head_to_head(&self, accepted_types: &[String]) -> bool {
        self.runners.len() == 2
            && self
                .market_type
                .as_deref()
                .is_some_and(|t| accepted_types.iter().any(|a| a == t))
    }

    /// Look up a declared runner by selection id.
    pub fn runner(&self, selection_id: u64) -> Option<&Runner> {
        self.runners.iter().find(|r| r.id == selection_id)
    }

    /// Start time in epoch milliseconds, comparable with `publish_time`.
    pub fn start_millis(&self) -> i64 {
        self.market_time.timestamp_millis()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Runner {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Incremental price tick for one selection.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerChange {
    pub id: u64,
    #[serde(default)]
    pub ltp: Option<f64>,
    #[serde(rename = "tv", default)]
    pub traded_volume: Option<f64>,
    #[serde(rename = "atb", default)]
    pub available_to_back: Option<Vec<PriceSize>>,
    #[serde(rename = "atl", default)]
    pub available_to_lay: Option<Vec<PriceSize>>,
}

impl RunnerChange {
    /// The last traded price, if present and a usable decimal price.
    pub fn valid_ltp(&self) -> Option<f64> {
        self.ltp.filter(|p| p.is_finite() && *p >= 1.0)
    }

    /// Whether an `ltp` field was sent but is not a usable price.
    pub fn has_invalid_ltp(&self) -> bool {
        self.ltp.is_some() && self.valid_ltp().is_none()
    }

    pub fn best_back(&self) -> Option<f64> {
        best_price(self.available_to_back.as_deref())
    }

    pub fn best_lay(&self) -> Option<f64> {
        best_price(self.available_to_lay.as_deref())
    }
}

fn best_price(ladder: Option<&[PriceSize]>) -> Option<f64> {
    ladder?.iter().find(|l| l.size > 0.0).map(|l| l.price)
}

/// A `[price, size]` ladder level.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f64; 2]")]
pub struct PriceSize {
    pub price: f64,
    pub size: f64,
}

impl From<[f64; 2]> for PriceSize {
    fn from([price, size]: [f64; 2]) -> Self {
        Self { price, size }
    }
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// One candidate or value bet: a selection in a match, its odds, the model's
/// win probability, derived metrics, and the outcome when known.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BetRecord {
    #[serde(default)]
    pub match_id: String,
    #[serde(alias = "playerOne", default)]
    pub player_1: String,
    #[serde(alias = "playerTwo", default)]
    pub player_2: String,
    #[serde(default)]
    pub selection_id: Option<u64>,
    #[serde(default)]
    pub odds: Option<f64>,
    #[serde(default)]
    pub predicted_prob: Option<f64>,
    #[serde(default)]
    pub expected_value: Option<f64>,
    #[serde(default)]
    pub kelly_fraction: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub odds_margin: Option<f64>,
    /// 1 = selection won, 0 = lost.
    #[serde(alias = "result", alias = "w", default)]
    pub winner: Option<f64>,
}

impl BetRecord {
    /// Confidence used for filtering: explicit score, else the model probability.
    pub fn confidence(&self) -> Option<f64> {
        self.confidence_score.or(self.predicted_prob)
    }

    /// Outcome as a boolean. Any value other than exactly 0 or 1 is unknown.
    pub fn outcome(&self) -> Option<bool> {
        match self.winner {
            Some(w) if w == 1.0 => Some(true),
            Some(w) if w == 0.0 => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for BetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} v {} @ {} (p={}, ev={})",
            self.match_id,
            self.player_1,
            self.player_2,
            fmt_opt(self.odds),
            fmt_opt(self.predicted_prob),
            fmt_opt(self.expected_value),
        )
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.3}")).unwrap_or_else(|| "-".to_string())
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal configuration / run errors. Anything here aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Cannot read snapshot root {}: {source}", path.display())]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown extraction mode '{0}' (expected metadata, ltp_only or full)")]
    UnknownMode(String),

    #[error("Unknown staking strategy '{0}' (expected kelly or flat)")]
    UnknownStrategy(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Per-line decode failure. Never aborts the surrounding file.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Market-change payload does not match schema: {0}")]
    Schema(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
