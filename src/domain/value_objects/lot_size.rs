/// Per-instrument-class order volume.
///
/// Instruments whose name contains one of the high-notional markers (crypto,
/// metals) trade a smaller volume than everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct LotSizeTable {
    high_notional_markers: Vec<String>,
    high_notional_volume: f64,
    default_volume: f64,
}

impl LotSizeTable {
    pub fn new(high_notional_markers: Vec<String>, high_notional_volume: f64, default_volume: f64) -> Self {
        Self {
            high_notional_markers: high_notional_markers
                .into_iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
            high_notional_volume,
            default_volume,
        }
    }

    pub fn volume_for(&self, symbol: &str) -> f64 {
        let symbol = symbol.to_ascii_uppercase();
        if self
            .high_notional_markers
            .iter()
            .any(|marker| symbol.contains(marker.as_str()))
        {
            self.high_notional_volume
        } else {
            self.default_volume
        }
    }
}

impl Default for LotSizeTable {
    fn default() -> Self {
        Self::new(
            vec!["BTC".to_string(), "XAU".to_string(), "ETH".to_string()],
            0.01,
            0.1,
        )
    }
}
