//! Rebalance Bot Library
//!
//! Core components of the CoinSpot portfolio rebalancing bot: the
//! forecasting maths, the portfolio service, the four scheduled strategies
//! and the exchange and SQLite adapters they run on.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod task_runner;
