use thiserror::Error;

/// Venue reason code for an order whose filling mode the symbol refuses.
pub const REASON_UNSUPPORTED_FILLING: u32 = 10030;

/// Failures reported by the execution venue.
///
/// `Unavailable` covers connectivity problems and null responses. It is
/// transient and the caller retries on the next cycle. `Rejected` is a
/// definitive answer from the venue carrying its own reason code.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VenueError {
    #[error("Venue unavailable: {0}")]
    Unavailable(String),

    #[error("Venue rejected request (code {code}): {reason}")]
    Rejected { code: u32, reason: String },

    #[error("Invalid venue request: {0}")]
    InvalidRequest(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl VenueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Unavailable(_))
    }

    /// Reason code when the venue gave one.
    pub fn reason_code(&self) -> Option<u32> {
        match self {
            VenueError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The venue refused the order's filling mode; another mode may work.
    pub fn is_unsupported_filling(&self) -> bool {
        self.reason_code() == Some(REASON_UNSUPPORTED_FILLING)
    }
}

/// Ledger store failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger query failed: {0}")]
    Query(String),

    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),
}

/// Oracle (predictive model service) failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle returned malformed response: {0}")]
    MalformedResponse(String),

    #[error("No model for symbol: {0}")]
    NoModel(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid candle: {0}")]
    InvalidCandle(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),
}

impl From<ValidationError> for String {
    fn from(error: ValidationError) -> Self {
        error.to_string()
    }
}
