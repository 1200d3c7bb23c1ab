// =============================================================================
// Pattern & momentum analyzers
// =============================================================================
//
// Each analyzer implements a single capability: look at a bar history for one
// (symbol, interval) and return an advisory opinion. The fuser holds a list
// of enabled analyzers selected at construction and never matches on concrete
// analyzer type.

pub mod elliott;
pub mod macd_analyzer;
pub mod rsi_analyzer;
pub mod wyckoff;

use crate::candle::Candle;
use crate::types::Direction;

/// Advisory opinion returned by every analyzer. `direction: None` means the
/// analyzer has no opinion on this bar history (including "insufficient
/// history", which is not an error).
#[derive(Debug, Clone, Default)]
pub struct AnalyzerResult {
    pub direction: Option<Direction>,
    pub confidence: f64,
    pub rationale: Vec<String>,
    pub detail: AnalyzerDetail,
}

impl AnalyzerResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.direction.is_none()
    }
}

/// Diagnostic payload specific to whichever analyzer produced the result.
/// Most analyzers leave this `None`; Wyckoff and Elliott populate it so the
/// fuser can read the phase label / wave pivots without downcasting.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerDetail {
    pub wyckoff_phase: Option<crate::types::WyckoffPhase>,
    pub elliott_wave_count: Option<String>,
    /// Present only when the Elliott analyzer found a complete impulse; the
    /// fuser's Elliott-wave SL/TP mode consumes these, falling back to ATR
    /// mode when absent.
    pub elliott_waves: Option<ElliottWaveLevels>,
}

#[derive(Debug, Clone, Copy)]
pub struct ElliottWaveLevels {
    pub wave_1: f64,
    pub wave_3: f64,
    pub wave_4_price: f64,
}

/// Capability every analyzer implements.
pub trait Analyzer: Send + Sync {
    /// Human-readable name used in rationale strings and logging.
    fn name(&self) -> &'static str;

    /// Analyzes `candles` (oldest first, most recent last) for `symbol` on
    /// `interval` and returns an advisory. Must be deterministic: identical
    /// inputs yield identical output, with no hidden clock reads.
    fn analyze(&self, candles: &[Candle], symbol: &str, interval: &str) -> AnalyzerResult;
}
