//! Backtesting: replay selected value bets against a bankroll.

pub mod simulator;

pub use simulator::{BankrollSimulator, SimulationConfig, SimulationReport, StakingStrategy};
