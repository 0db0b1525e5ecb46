use crate::domain::entities::account::AccountInfo;
use crate::domain::entities::position::Position;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct RiskGateConfig {
    /// Free margin must be at least this fraction of the balance
    pub min_free_margin_ratio: f64,
    /// Cap on simultaneously open, owned positions
    pub max_open_positions: usize,
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            min_free_margin_ratio: 0.05,
            max_open_positions: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RiskRejection {
    InsufficientFreeMargin { free_margin: f64, required: f64 },
    SymbolAlreadyOpen { symbol: String },
    PositionCapReached { open: usize, cap: usize },
}

impl std::fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskRejection::InsufficientFreeMargin { free_margin, required } => write!(
                f,
                "free margin {:.2} below required {:.2}",
                free_margin, required
            ),
            RiskRejection::SymbolAlreadyOpen { symbol } => {
                write!(f, "{} already has an open position", symbol)
            }
            RiskRejection::PositionCapReached { open, cap } => {
                write!(f, "{} open positions, cap is {}", open, cap)
            }
        }
    }
}

/// Outcome of the pre-trade checks. Every check runs, so a rejected
/// assessment lists all the reasons at once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskAssessment {
    pub rejections: Vec<RiskRejection>,
}

impl RiskAssessment {
    pub fn is_approved(&self) -> bool {
        self.rejections.is_empty()
    }
}

/// Pre-trade checks on margin, per-instrument exposure and position count.
pub struct RiskGate {
    config: RiskGateConfig,
}

impl RiskGate {
    pub fn new(config: RiskGateConfig) -> Self {
        Self { config }
    }

    /// `owned_positions` must only hold this system's open positions,
    /// including any opened earlier in the current cycle.
    pub fn assess(&self, account: &AccountInfo, owned_positions: &[Position], symbol: &str) -> RiskAssessment {
        let mut rejections = Vec::new();

        let required = account.balance * self.config.min_free_margin_ratio;
        if account.free_margin < required {
            rejections.push(RiskRejection::InsufficientFreeMargin {
                free_margin: account.free_margin,
                required,
            });
        }

        if owned_positions.iter().any(|p| p.symbol == symbol) {
            rejections.push(RiskRejection::SymbolAlreadyOpen {
                symbol: symbol.to_string(),
            });
        }

        if owned_positions.len() >= self.config.max_open_positions {
            rejections.push(RiskRejection::PositionCapReached {
                open: owned_positions.len(),
                cap: self.config.max_open_positions,
            });
        }

        RiskAssessment { rejections }
    }
}
