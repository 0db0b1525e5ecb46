pub mod indicators;
pub mod oracle_registry;
pub mod order_executor;
pub mod position_mirror;
pub mod protection;
pub mod reconciliation;
pub mod risk_gate;
pub mod signal_gate;
