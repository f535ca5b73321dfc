//! Core domain types and logic.

pub mod arithmetic;
pub mod currency;
pub mod rates;
pub mod account;
pub mod orders;
pub mod history;
pub mod window;
pub mod strategy;
pub mod run_result;
pub mod engine;
pub mod metrics;
pub mod config_validation;
pub mod error;
