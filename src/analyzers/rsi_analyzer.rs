// =============================================================================
// RSI momentum analyzer
// =============================================================================

use crate::analyzers::{Analyzer, AnalyzerDetail, AnalyzerResult};
use crate::candle::Candle;
use crate::indicators::rsi::calculate_rsi;
use crate::types::Direction;

const PERIOD: usize = 14;
const OVERSOLD: f64 = 30.0;
const OVERBOUGHT: f64 = 70.0;

pub struct RsiAnalyzer;

impl RsiAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RsiAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for RsiAnalyzer {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn analyze(&self, candles: &[Candle], _symbol: &str, _interval: &str) -> AnalyzerResult {
        if candles.len() < PERIOD + 1 {
            return AnalyzerResult::none();
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let series = calculate_rsi(&closes, PERIOD);
        let Some(&rsi) = series.last() else {
            return AnalyzerResult::none();
        };

        if rsi < OVERSOLD {
            let confidence = (((OVERSOLD - rsi) / OVERSOLD) + 0.5).min(1.0);
            return AnalyzerResult {
                direction: Some(Direction::Long),
                confidence,
                rationale: vec![format!("RSI {:.1} oversold (< {:.0})", rsi, OVERSOLD)],
                detail: AnalyzerDetail::default(),
            };
        }

        if rsi > OVERBOUGHT {
            let confidence = (((rsi - OVERBOUGHT) / (100.0 - OVERBOUGHT)) + 0.5).min(1.0);
            return AnalyzerResult {
                direction: Some(Direction::Short),
                confidence,
                rationale: vec![format!("RSI {:.1} overbought (> {:.0})", rsi, OVERBOUGHT)],
                detail: AnalyzerDetail::default(),
            };
        }

        AnalyzerResult {
            direction: None,
            confidence: 0.0,
            rationale: vec![format!("RSI {:.1} neutral", rsi)],
            detail: AnalyzerDetail::default(),
        }
    }
}
