// =============================================================================
// Shared types used across the signal-generation engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Trade direction a signal or analyzer advisory points in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

/// Coarse Wyckoff regime label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WyckoffPhase {
    Accumulation,
    Markup,
    Distribution,
    Markdown,
    Unknown,
}

impl std::fmt::Display for WyckoffPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accumulation => write!(f, "ACCUMULATION"),
            Self::Markup => write!(f, "MARKUP"),
            Self::Distribution => write!(f, "DISTRIBUTION"),
            Self::Markdown => write!(f, "MARKDOWN"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Lifecycle status of a persisted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Hit,
    Stopped,
    Expired,
}

impl Default for SignalStatus {
    fn default() -> Self {
        Self::Pending
    }
}
