//! fxtrader — deterministic multi-currency FX strategy backtester.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. All monetary arithmetic goes
//! through an [`domain::arithmetic::ArithmeticContext`] chosen per run.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
