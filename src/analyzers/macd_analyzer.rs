// =============================================================================
// MACD momentum analyzer
// =============================================================================

use crate::analyzers::{Analyzer, AnalyzerDetail, AnalyzerResult};
use crate::candle::Candle;
use crate::indicators::macd::calculate_macd;
use crate::types::Direction;

const FAST: usize = 12;
const SLOW: usize = 26;
const SIGNAL: usize = 9;
const MIN_CANDLES: usize = SLOW + SIGNAL + 10;

pub struct MacdAnalyzer;

impl MacdAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacdAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for MacdAnalyzer {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn analyze(&self, candles: &[Candle], _symbol: &str, _interval: &str) -> AnalyzerResult {
        if candles.len() < MIN_CANDLES {
            return AnalyzerResult::none();
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let Some(series) = calculate_macd(&closes, FAST, SLOW, SIGNAL) else {
            return AnalyzerResult::none();
        };
        if series.len() < 2 {
            return AnalyzerResult::none();
        }

        let current = series[series.len() - 1];
        let previous = series[series.len() - 2];

        if previous.histogram < 0.0 && current.histogram > 0.0 {
            let histogram_strength = (current.histogram.abs() * 100.0).min(0.4);
            let zero_line_bonus = if current.macd > 0.0 { 0.2 } else { 0.1 };
            let confidence = (0.5 + histogram_strength + zero_line_bonus).min(1.0);
            return AnalyzerResult {
                direction: Some(Direction::Long),
                confidence,
                rationale: vec![format!(
                    "MACD bullish crossover, histogram {:.4}",
                    current.histogram
                )],
                detail: AnalyzerDetail::default(),
            };
        }

        if previous.histogram > 0.0 && current.histogram < 0.0 {
            let histogram_strength = (current.histogram.abs() * 100.0).min(0.4);
            let zero_line_bonus = if current.macd < 0.0 { 0.2 } else { 0.1 };
            let confidence = (0.5 + histogram_strength + zero_line_bonus).min(1.0);
            return AnalyzerResult {
                direction: Some(Direction::Short),
                confidence,
                rationale: vec![format!(
                    "MACD bearish crossover, histogram {:.4}",
                    current.histogram
                )],
                detail: AnalyzerDetail::default(),
            };
        }

        AnalyzerResult {
            direction: None,
            confidence: 0.0,
            rationale: vec!["no MACD crossover".to_string()],
            detail: AnalyzerDetail::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 100.0,
            quote_volume: 100.0 * close,
            trades_count: 1,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
            is_closed: true,
        }
    }

    #[test]
    fn insufficient_history_returns_empty() {
        let candles: Vec<Candle> = (0..30).map(|i| candle(100.0 + i as f64)).collect();
        assert!(MacdAnalyzer::new().analyze(&candles, "BTCUSDT", "1h").is_empty());
    }

    #[test]
    fn dip_then_recovery_can_emit_long() {
        // A decline followed by a sharp recovery should eventually flip the
        // histogram from negative to positive.
        let mut closes = Vec::new();
        for i in 0..40 {
            closes.push(candle(150.0 - i as f64 * 1.5));
        }
        for i in 0..20 {
            closes.push(candle(90.0 + i as f64 * 4.0));
        }
        let result = MacdAnalyzer::new().analyze(&closes, "BTCUSDT", "1h");
        if let Some(direction) = result.direction {
            assert_eq!(direction, Direction::Long);
            assert!(result.confidence >= 0.5);
        }
    }
}
