use crate::domain::entities::direction::Direction;
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::fill_mode::FillMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market order with attached stop and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub fill_mode: FillMode,
    pub owner_tag: u64,
    pub comment: String,
}

impl OrderRequest {
    /// Builds a request, checking that the stop sits on the losing side of
    /// the entry and the target on the winning side.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: String,
        direction: Direction,
        volume: f64,
        price: f64,
        stop_price: f64,
        target_price: f64,
        fill_mode: FillMode,
        owner_tag: u64,
    ) -> Result<Self, ValidationError> {
        if symbol.trim().is_empty() {
            return Err(ValidationError::InvalidSymbol("empty symbol".to_string()));
        }
        if !volume.is_finite() || volume <= 0.0 {
            return Err(ValidationError::InvalidVolume(volume.to_string()));
        }
        for value in [price, stop_price, target_price] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::InvalidPrice(value.to_string()));
            }
        }
        if direction.favorable_distance(price, stop_price) >= 0.0 {
            return Err(ValidationError::InvalidPrice(format!(
                "stop {} is not below entry {} for {}",
                stop_price, price, direction
            )));
        }
        if direction.favorable_distance(price, target_price) <= 0.0 {
            return Err(ValidationError::InvalidPrice(format!(
                "target {} is not beyond entry {} for {}",
                target_price, price, direction
            )));
        }

        Ok(OrderRequest {
            symbol,
            direction,
            volume,
            price,
            stop_price,
            target_price,
            fill_mode,
            owner_tag,
            comment: String::new(),
        })
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Venue confirmation of an executed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    /// Ticket of the resulting position.
    pub ticket: u64,
    pub deal_ticket: u64,
    pub price: f64,
    pub volume: f64,
    pub filled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_order_requires_stop_below_entry() {
        let ok = OrderRequest::new("EURUSD".into(), Direction::Long, 0.1, 1.1, 1.09, 1.12, FillMode::FillOrKill, 1);
        assert!(ok.is_ok());

        let inverted = OrderRequest::new("EURUSD".into(), Direction::Long, 0.1, 1.1, 1.11, 1.12, FillMode::FillOrKill, 1);
        assert!(inverted.is_err());
    }

    #[test]
    fn test_short_order_requires_target_below_entry() {
        let ok = OrderRequest::new("EURUSD".into(), Direction::Short, 0.1, 1.1, 1.11, 1.08, FillMode::Return, 1);
        assert!(ok.is_ok());

        let inverted = OrderRequest::new("EURUSD".into(), Direction::Short, 0.1, 1.1, 1.11, 1.12, FillMode::Return, 1);
        assert!(inverted.is_err());
    }

    #[test]
    fn test_rejects_zero_volume() {
        let result = OrderRequest::new("EURUSD".into(), Direction::Long, 0.0, 1.1, 1.09, 1.12, FillMode::Return, 1);
        assert!(matches!(result, Err(ValidationError::InvalidVolume(_))));
    }
}
