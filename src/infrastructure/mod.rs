pub mod http_oracle;
pub mod paper_venue;

pub use http_oracle::{HttpModelProvider, NeutralModelProvider};
pub use paper_venue::{PaperSymbol, PaperVenue, PaperVenueConfig};
