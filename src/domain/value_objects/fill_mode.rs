use serde::{Deserialize, Serialize};

/// Bit set in a symbol's filling-mode mask when fill-or-kill is accepted.
pub const FILLING_FOK: u32 = 1;
/// Bit set when immediate-or-cancel is accepted.
pub const FILLING_IOC: u32 = 2;

/// Order fill policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMode {
    FillOrKill,
    ImmediateOrCancel,
    /// Best effort: any unfilled remainder stays working.
    Return,
}

impl FillMode {
    const PREFERENCE: [FillMode; 3] = [FillMode::FillOrKill, FillMode::ImmediateOrCancel, FillMode::Return];

    /// Picks the first mode the venue supports, in the order
    /// fill-or-kill, immediate-or-cancel, best-effort.
    pub fn negotiate(supported_mask: u32) -> Self {
        Self::candidates(supported_mask)[0]
    }

    /// Every mode in submission order: the advertised ones by preference,
    /// then the unadvertised ones. Venues do not always report their mask
    /// accurately, so nothing is ruled out.
    pub fn candidates(supported_mask: u32) -> Vec<FillMode> {
        let (mut advertised, rest): (Vec<FillMode>, Vec<FillMode>) = Self::PREFERENCE
            .into_iter()
            .partition(|mode| mode.is_supported_by(supported_mask));
        advertised.extend(rest);
        advertised
    }

    /// Whether a symbol with `supported_mask` accepts this mode.
    /// Best effort is always accepted.
    pub fn is_supported_by(self, supported_mask: u32) -> bool {
        match self {
            FillMode::FillOrKill => supported_mask & FILLING_FOK != 0,
            FillMode::ImmediateOrCancel => supported_mask & FILLING_IOC != 0,
            FillMode::Return => true,
        }
    }
}

impl std::fmt::Display for FillMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FillMode::FillOrKill => write!(f, "FOK"),
            FillMode::ImmediateOrCancel => write!(f, "IOC"),
            FillMode::Return => write!(f, "RETURN"),
        }
    }
}
