use super::LedgerScope;
use crate::domain::entities::deal::{Deal, DealEntry, DealType};
use crate::domain::entities::direction::Direction;
use crate::domain::entities::trade_record::{TradeRecord, TradeSide, BALANCE_SYMBOL};

/// What a venue deal means for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealClass {
    /// Deposit or withdrawal
    Balance,
    /// Settles all or part of a position
    Closing,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Opening,
    /// Balance entry that moved no money
    Administrative,
    ForeignOwner,
    UnsupportedType,
}

pub fn classify(deal: &Deal, scope: LedgerScope, owner_tag: u64) -> DealClass {
    match deal.deal_type {
        DealType::Balance => {
            if deal.profit == 0.0 && deal.commission == 0.0 && deal.swap == 0.0 {
                DealClass::Ignored(IgnoreReason::Administrative)
            } else {
                DealClass::Balance
            }
        }
        DealType::Buy | DealType::Sell => {
            if deal.entry == DealEntry::In {
                DealClass::Ignored(IgnoreReason::Opening)
            } else if scope == LedgerScope::Owned && deal.owner_tag != owner_tag {
                DealClass::Ignored(IgnoreReason::ForeignOwner)
            } else {
                DealClass::Closing
            }
        }
        DealType::Other(_) => DealClass::Ignored(IgnoreReason::UnsupportedType),
    }
}

/// Direction of the position a closing deal settles. Closing a long takes
/// a sell, so the sides are swapped.
pub fn closed_direction(close: &Deal) -> Option<Direction> {
    match close.deal_type {
        DealType::Sell => Some(Direction::Long),
        DealType::Buy => Some(Direction::Short),
        _ => None,
    }
}

/// The deal that opened the position `close` settles.
///
/// Prefers the earliest plain opening deal. A position opened by a reversal
/// has no such deal, so the earliest in/out sibling before the close is the
/// fallback.
pub fn opening_sibling<'a>(close: &Deal, siblings: &'a [Deal]) -> Option<&'a Deal> {
    let related = siblings
        .iter()
        .filter(|d| d.position_id == close.position_id && d.ticket != close.ticket);

    related
        .clone()
        .filter(|d| d.entry == DealEntry::In)
        .min_by_key(|d| d.timestamp)
        .or_else(|| {
            related
                .filter(|d| d.entry == DealEntry::InOut && d.timestamp < close.timestamp)
                .min_by_key(|d| d.timestamp)
        })
}

/// Ledger row for a closing deal. Without an opening deal the close's own
/// price and time stand in for the open.
pub fn closing_record(close: &Deal, open: Option<&Deal>) -> Option<TradeRecord> {
    let direction = closed_direction(close)?;
    let (open_price, open_time) = match open {
        Some(open) => (open.price, open.timestamp),
        None => (close.price, close.timestamp),
    };
    Some(TradeRecord {
        ticket: close.ticket,
        symbol: close.symbol.clone(),
        side: TradeSide::from(direction),
        volume: close.volume,
        open_price,
        open_time,
        close_price: close.price,
        net_profit: close.net_profit(),
        close_time: close.timestamp,
        owner_tag: close.owner_tag,
    })
}

pub fn balance_record(deal: &Deal) -> TradeRecord {
    TradeRecord {
        ticket: deal.ticket,
        symbol: BALANCE_SYMBOL.to_string(),
        side: TradeSide::Balance,
        volume: 0.0,
        open_price: 0.0,
        open_time: deal.timestamp,
        close_price: 0.0,
        net_profit: deal.net_profit(),
        close_time: deal.timestamp,
        owner_tag: deal.owner_tag,
    }
}
