use super::classifier::{balance_record, classify, closing_record, opening_sibling, DealClass};
use super::{ReconciliationConfig, ReconciliationError, ReconciliationReport};
use crate::domain::entities::deal::{Deal, DealQuery};
use crate::domain::entities::trade_record::TradeRecord;
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::repositories::venue_client::VenueClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Copies closed trades and balance movements from the venue into the ledger.
pub struct ReconciliationEngine {
    venue: Arc<dyn VenueClient>,
    ledger: Arc<dyn LedgerStore>,
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(venue: Arc<dyn VenueClient>, ledger: Arc<dyn LedgerStore>, config: ReconciliationConfig) -> Self {
        Self {
            venue,
            ledger,
            config,
        }
    }

    /// Run one pass over the lookback window ending at `now`.
    ///
    /// Every venue query finishes before anything is written, and the new
    /// rows go in as a single batch. Any failure leaves the ledger as it was.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconciliationReport, ReconciliationError> {
        let window_start = now - self.config.lookback;
        let window_end = now + self.config.forward_allowance;
        let mut report = ReconciliationReport {
            window_start,
            window_end,
            deals_scanned: 0,
            candidates: 0,
            already_recorded: 0,
            inserted: 0,
            balance_records: 0,
            degraded_links: 0,
        };

        let deals = self
            .venue
            .deals(&DealQuery::range(window_start, window_end))
            .await?;
        report.deals_scanned = deals.len();

        let candidates: Vec<(&Deal, DealClass)> = deals
            .iter()
            .map(|d| (d, classify(d, self.config.scope, self.config.owner_tag)))
            .filter(|(_, class)| matches!(class, DealClass::Balance | DealClass::Closing))
            .collect();
        report.candidates = candidates.len();
        if candidates.is_empty() {
            return Ok(report);
        }

        // Only used to avoid re-resolving known closes; the ledger's unique
        // ticket constraint is what prevents duplicates.
        let tickets: Vec<u64> = candidates.iter().map(|(d, _)| d.ticket).collect();
        let known = self.ledger.known_tickets(&tickets).await?;
        report.already_recorded = known.len();

        let mut sibling_cache: HashMap<u64, Vec<Deal>> = HashMap::new();
        let mut records: Vec<TradeRecord> = Vec::new();

        for (deal, class) in candidates.into_iter().filter(|(d, _)| !known.contains(&d.ticket)) {
            match class {
                DealClass::Balance => {
                    report.balance_records += 1;
                    records.push(balance_record(deal));
                }
                DealClass::Closing => {
                    let open = match opening_sibling(deal, &deals) {
                        Some(open) => Some(open.clone()),
                        None => self.fetch_opening(deal, &mut sibling_cache).await?,
                    };
                    if open.is_none() {
                        report.degraded_links += 1;
                        warn!(
                            ticket = deal.ticket,
                            position_id = deal.position_id,
                            symbol = %deal.symbol,
                            "No opening deal found, recording close price/time as open"
                        );
                    }
                    if let Some(record) = closing_record(deal, open.as_ref()) {
                        records.push(record);
                    }
                }
                DealClass::Ignored(_) => {}
            }
        }

        if records.is_empty() {
            debug!("Reconciliation: nothing new in {} deals", report.deals_scanned);
            return Ok(report);
        }

        report.inserted = self.ledger.insert_trades_if_absent(&records).await?;
        info!(
            inserted = report.inserted,
            balance_records = report.balance_records,
            degraded_links = report.degraded_links,
            scanned = report.deals_scanned,
            "Reconciliation recorded new ledger rows"
        );

        Ok(report)
    }

    /// Look up the opening deal outside the scanned window.
    async fn fetch_opening(
        &self,
        close: &Deal,
        cache: &mut HashMap<u64, Vec<Deal>>,
    ) -> Result<Option<Deal>, ReconciliationError> {
        if close.position_id == 0 {
            return Ok(None);
        }
        if !cache.contains_key(&close.position_id) {
            let query = DealQuery::range(DateTime::<Utc>::UNIX_EPOCH, close.timestamp).for_position(close.position_id);
            let siblings = self.venue.deals(&query).await?;
            cache.insert(close.position_id, siblings);
        }
        Ok(cache
            .get(&close.position_id)
            .and_then(|siblings| opening_sibling(close, siblings))
            .cloned())
    }
}
