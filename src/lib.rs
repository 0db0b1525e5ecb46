//! Sentinel Trading System Library
//!
//! Core components of the sentinel trading loop: signal and risk gating,
//! order execution, stop protection, ledger reconciliation and telemetry.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod task_runner;
