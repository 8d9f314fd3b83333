//! Novelty library - quiet hours and the daily reminder slot
//!
//! This module exports internal components for the daemon and integration testing.

pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod evaluator;
pub mod lifecycle;
pub mod policy;
pub mod quiet_period;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod store;
pub mod time;

#[cfg(test)]
mod model;
