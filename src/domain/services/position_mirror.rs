use crate::domain::entities::position::Position;
use crate::domain::errors::VenueError;
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::repositories::venue_client::VenueClient;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of one mirror refresh
#[derive(Debug, Clone)]
pub struct MirrorRefresh {
    /// Owned positions currently open at the venue
    pub positions: Vec<Position>,
    /// False when the ledger write failed; the previous snapshot stays
    pub persisted: bool,
}

/// Keeps the ledger's open-position table equal to the venue's open,
/// owned positions.
pub struct PositionMirror {
    venue: Arc<dyn VenueClient>,
    ledger: Arc<dyn LedgerStore>,
    owner_tag: u64,
}

impl PositionMirror {
    pub fn new(venue: Arc<dyn VenueClient>, ledger: Arc<dyn LedgerStore>, owner_tag: u64) -> Self {
        Self {
            venue,
            ledger,
            owner_tag,
        }
    }

    /// Fetch owned positions and swap them into the ledger.
    ///
    /// A venue failure is returned and the mirror is left untouched. A ledger
    /// failure is logged; the fetched positions are still returned so the
    /// rest of the cycle can use them.
    pub async fn refresh(&self) -> Result<MirrorRefresh, VenueError> {
        let reported = self.venue.open_positions(Some(self.owner_tag)).await?;
        let total = reported.len();
        let positions: Vec<Position> = reported
            .into_iter()
            .filter(|p| p.is_owned_by(self.owner_tag))
            .collect();
        if positions.len() != total {
            warn!(
                "Venue returned {} positions without owner tag {}",
                total - positions.len(),
                self.owner_tag
            );
        }

        let persisted = match self.ledger.replace_open_positions(&positions).await {
            Ok(()) => {
                debug!("Position mirror refreshed with {} positions", positions.len());
                true
            }
            Err(e) => {
                error!("Failed to replace position mirror: {}", e);
                false
            }
        };

        Ok(MirrorRefresh {
            positions,
            persisted,
        })
    }
}
