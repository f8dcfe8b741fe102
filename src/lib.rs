//! COURTSIDE — exchange snapshots to value bets to bankroll trajectories.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod backtest;
pub mod config;
pub mod model;
pub mod snapshots;
pub mod storage;
pub mod strategy;
pub mod types;
