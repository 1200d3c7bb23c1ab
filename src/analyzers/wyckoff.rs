// =============================================================================
// Wyckoff Method analyzer
// =============================================================================
//
// Phase classifier on the trailing 30 bars plus a spring (bullish) / upthrust
// (bearish) detector on the trailing 20 bars excluding the last 5. Emits LONG
// only when a spring coincides with an ACCUMULATION phase, SHORT only when
// an upthrust coincides with DISTRIBUTION.

use crate::analyzers::{Analyzer, AnalyzerDetail, AnalyzerResult};
use crate::candle::Candle;
use crate::types::{Direction, WyckoffPhase};

const MIN_CANDLES: usize = 50;
const PHASE_WINDOW: usize = 30;

#[derive(Debug, Clone, Copy)]
struct Spring {
    support_level: f64,
    spring_low: f64,
    spring_close: f64,
    recovery_strength: f64,
    volume_ratio: f64,
    confidence: f64,
    candles_ago: usize,
}

#[derive(Debug, Clone, Copy)]
struct Upthrust {
    resistance_level: f64,
    upthrust_high: f64,
    upthrust_close: f64,
    rejection_strength: f64,
    volume_ratio: f64,
    confidence: f64,
    candles_ago: usize,
}

pub struct WyckoffAnalyzer;

impl WyckoffAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn detect_phase(candles: &[Candle]) -> WyckoffPhase {
        let recent = &candles[candles.len() - PHASE_WINDOW..];
        let highs: Vec<f64> = recent.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = recent.iter().map(|c| c.low).collect();
        let closes: Vec<f64> = recent.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = recent.iter().map(|c| c.volume).collect();

        let max_high = highs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min_low = lows.iter().cloned().fold(f64::INFINITY, f64::min);
        let range_percent = if min_low != 0.0 {
            (max_high - min_low) / min_low * 100.0
        } else {
            0.0
        };

        let first_half_mean = mean(&closes[..15]);
        let second_half_mean = mean(&closes[15..]);
        let trend = second_half_mean - first_half_mean;

        let overall_volume_mean = mean(&volumes);
        let recent_volume_mean = mean(&volumes[volumes.len() - 5..]);
        let volume_ratio = if overall_volume_mean != 0.0 {
            recent_volume_mean / overall_volume_mean
        } else {
            0.0
        };

        if range_percent < 5.0 && volume_ratio > 1.2 {
            if trend > 0.0 {
                WyckoffPhase::Accumulation
            } else {
                WyckoffPhase::Distribution
            }
        } else if trend > 0.0 && range_percent > 5.0 {
            WyckoffPhase::Markup
        } else if trend < 0.0 && range_percent > 5.0 {
            WyckoffPhase::Markdown
        } else {
            WyckoffPhase::Unknown
        }
    }

    fn detect_spring(candles: &[Candle]) -> Option<Spring> {
        let len = candles.len();
        if len < 20 {
            return None;
        }
        let support_candles = &candles[len - 20..len - 5];
        let support_level = support_candles
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min);
        let avg_volume = mean(&support_candles.iter().map(|c| c.volume).collect::<Vec<_>>());

        let recent = &candles[len - 5..];
        for (i, c) in recent.iter().enumerate() {
            if c.low < support_level && c.close > support_level {
                let range = c.high - c.low;
                if range <= 0.0 {
                    continue;
                }
                let recovery_strength = (c.close - c.low) / range;
                let volume_ratio = if avg_volume != 0.0 {
                    c.volume / avg_volume
                } else {
                    0.0
                };
                let recency_bonus = if i == recent.len() - 1 { 0.2 } else { 0.1 };
                let confidence =
                    (recovery_strength * 0.4 + (volume_ratio / 2.0).min(0.4) + recency_bonus)
                        .min(1.0);

                if confidence < 0.5 {
                    continue;
                }

                return Some(Spring {
                    support_level,
                    spring_low: c.low,
                    spring_close: c.close,
                    recovery_strength,
                    volume_ratio,
                    confidence,
                    candles_ago: recent.len() - 1 - i,
                });
            }
        }
        None
    }

    fn detect_upthrust(candles: &[Candle]) -> Option<Upthrust> {
        let len = candles.len();
        if len < 20 {
            return None;
        }
        let resistance_candles = &candles[len - 20..len - 5];
        let resistance_level = resistance_candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let avg_volume = mean(
            &resistance_candles
                .iter()
                .map(|c| c.volume)
                .collect::<Vec<_>>(),
        );

        let recent = &candles[len - 5..];
        for (i, c) in recent.iter().enumerate() {
            if c.high > resistance_level && c.close < resistance_level {
                let range = c.high - c.low;
                if range <= 0.0 {
                    continue;
                }
                let rejection_strength = (c.high - c.close) / range;
                let volume_ratio = if avg_volume != 0.0 {
                    c.volume / avg_volume
                } else {
                    0.0
                };
                let recency_bonus = if i == recent.len() - 1 { 0.2 } else { 0.1 };
                let confidence =
                    (rejection_strength * 0.4 + (volume_ratio / 2.0).min(0.4) + recency_bonus)
                        .min(1.0);

                if confidence < 0.5 {
                    continue;
                }

                return Some(Upthrust {
                    resistance_level,
                    upthrust_high: c.high,
                    upthrust_close: c.close,
                    rejection_strength,
                    volume_ratio,
                    confidence,
                    candles_ago: recent.len() - 1 - i,
                });
            }
        }
        None
    }
}

impl Default for WyckoffAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for WyckoffAnalyzer {
    fn name(&self) -> &'static str {
        "wyckoff"
    }

    fn analyze(&self, candles: &[Candle], _symbol: &str, _interval: &str) -> AnalyzerResult {
        if candles.len() < MIN_CANDLES {
            return AnalyzerResult::none();
        }

        let phase = Self::detect_phase(candles);
        let spring = Self::detect_spring(candles);
        let upthrust = Self::detect_upthrust(candles);

        let detail = AnalyzerDetail {
            wyckoff_phase: Some(phase),
            ..Default::default()
        };

        if let (Some(spring), WyckoffPhase::Accumulation) = (spring, phase) {
            let volume_desc = if spring.volume_ratio > 1.5 {
                "strong"
            } else {
                "moderate"
            };
            return AnalyzerResult {
                direction: Some(Direction::Long),
                confidence: spring.confidence,
                rationale: vec![format!(
                    "spring at {:.4} (support {:.4}), recovery {:.0}%, {} volume ({:.1}x), {} bars ago, phase {}",
                    spring.spring_low,
                    spring.support_level,
                    spring.recovery_strength * 100.0,
                    volume_desc,
                    spring.volume_ratio,
                    spring.candles_ago,
                    phase,
                )],
                detail,
            };
        }

        if let (Some(upthrust), WyckoffPhase::Distribution) = (upthrust, phase) {
            let volume_desc = if upthrust.volume_ratio > 1.5 {
                "strong"
            } else {
                "moderate"
            };
            return AnalyzerResult {
                direction: Some(Direction::Short),
                confidence: upthrust.confidence,
                rationale: vec![format!(
                    "upthrust at {:.4} (resistance {:.4}), rejection {:.0}%, {} volume ({:.1}x), {} bars ago, phase {}",
                    upthrust.upthrust_high,
                    upthrust.resistance_level,
                    upthrust.rejection_strength * 100.0,
                    volume_desc,
                    upthrust.volume_ratio,
                    upthrust.candles_ago,
                    phase,
                )],
                detail,
            };
        }

        AnalyzerResult {
            direction: None,
            confidence: 0.0,
            rationale: vec![format!("phase {}, no spring/upthrust confirmation", phase)],
            detail,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
