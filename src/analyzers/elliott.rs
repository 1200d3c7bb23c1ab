// =============================================================================
// Elliott Wave analyzer
// =============================================================================
//
// Pivot finder (window w=5) feeding a 5-wave impulse counter and a 3-wave ABC
// correction counter over the most recent 10 pivots. A completed impulse
// signals the *reversal* (expecting the correction that follows); a
// completed ABC correction signals *resumption* of the prior trend.

use crate::analyzers::{Analyzer, AnalyzerDetail, AnalyzerResult, ElliottWaveLevels};
use crate::candle::Candle;
use crate::types::Direction;

const MIN_CANDLES: usize = 50;
const PIVOT_WINDOW: usize = 5;
const RECENT_PIVOTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy)]
struct Pivot {
    kind: PivotKind,
    price: f64,
}

struct WaveCount {
    direction: Direction,
    wave_count: &'static str,
    confidence: f64,
    waves: Option<ElliottWaveLevels>,
}

pub struct ElliottAnalyzer;

impl ElliottAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn find_pivots(candles: &[Candle]) -> Vec<Pivot> {
        let len = candles.len();
        let mut pivots = Vec::new();
        if len <= 2 * PIVOT_WINDOW {
            return pivots;
        }
        for i in PIVOT_WINDOW..len - PIVOT_WINDOW {
            let window = &candles[i - PIVOT_WINDOW..=i + PIVOT_WINDOW];
            let high = candles[i].high;
            let low = candles[i].low;

            let is_swing_high = window
                .iter()
                .enumerate()
                .all(|(j, c)| j == PIVOT_WINDOW || c.high < high);
            if is_swing_high {
                pivots.push(Pivot {
                    kind: PivotKind::High,
                    price: high,
                });
                continue;
            }

            let is_swing_low = window
                .iter()
                .enumerate()
                .all(|(j, c)| j == PIVOT_WINDOW || c.low > low);
            if is_swing_low {
                pivots.push(Pivot {
                    kind: PivotKind::Low,
                    price: low,
                });
            }
        }
        pivots
    }

    fn wave_confidence(waves: [f64; 5]) -> f64 {
        let [w1, w2, w3, w4, w5] = waves;
        let _ = w2;
        let _ = w4;
        let mut confidence: f64 = 0.5;
        let max_wave = waves.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if w3 == max_wave {
            confidence += 0.2;
        }
        if w3 > 1.618 * w1 {
            confidence += 0.15;
        }
        if w5 < w3 {
            confidence += 0.15;
        }
        confidence.min(1.0)
    }

    fn find_impulse_pattern(pivots: &[Pivot]) -> Option<WaveCount> {
        if pivots.len() < 6 {
            return None;
        }
        let p = &pivots[pivots.len() - 6..];
        let prices: Vec<f64> = p.iter().map(|x| x.price).collect();
        let kinds: Vec<PivotKind> = p.iter().map(|x| x.kind).collect();

        let up_pattern = [
            PivotKind::Low,
            PivotKind::High,
            PivotKind::Low,
            PivotKind::High,
            PivotKind::Low,
            PivotKind::High,
        ];
        let down_pattern = [
            PivotKind::High,
            PivotKind::Low,
            PivotKind::High,
            PivotKind::Low,
            PivotKind::High,
            PivotKind::Low,
        ];

        if kinds == up_pattern {
            let (p0, p1, p2, p3, p4, p5) = (
                prices[0], prices[1], prices[2], prices[3], prices[4], prices[5],
            );
            let wave1 = p1 - p0;
            let wave2 = p1 - p2;
            let wave3 = p3 - p2;
            let wave4 = p3 - p4;
            let wave5 = p5 - p4;

            let rule1 = wave1 > 0.0 && wave2 / wave1 < 1.0;
            let rule2 = wave3 >= wave1 && wave3 >= wave5;
            let rule3 = p4 > p1;

            if rule1 && rule2 && rule3 {
                return Some(WaveCount {
                    direction: Direction::Short,
                    wave_count: "impulse_up_complete",
                    confidence: Self::wave_confidence([wave1, wave2, wave3, wave4, wave5]),
                    waves: Some(ElliottWaveLevels {
                        wave_1: wave1,
                        wave_3: wave3,
                        wave_4_price: p4,
                    }),
                });
            }
        }

        if kinds == down_pattern {
            let (p0, p1, p2, p3, p4, p5) = (
                prices[0], prices[1], prices[2], prices[3], prices[4], prices[5],
            );
            let wave1 = p0 - p1;
            let wave2 = p2 - p1;
            let wave3 = p2 - p3;
            let wave4 = p4 - p3;
            let wave5 = p4 - p5;

            let rule1 = wave1 > 0.0 && wave2 / wave1 < 1.0;
            let rule2 = wave3 >= wave1 && wave3 >= wave5;
            let rule3 = p4 < p1;

            if rule1 && rule2 && rule3 {
                return Some(WaveCount {
                    direction: Direction::Long,
                    wave_count: "impulse_down_complete",
                    confidence: Self::wave_confidence([wave1, wave2, wave3, wave4, wave5]),
                    waves: Some(ElliottWaveLevels {
                        wave_1: wave1,
                        wave_3: wave3,
                        wave_4_price: p4,
                    }),
                });
            }
        }

        None
    }

    fn find_correction_pattern(pivots: &[Pivot]) -> Option<WaveCount> {
        if pivots.len() < 4 {
            return None;
        }
        let p = &pivots[pivots.len() - 4..];
        let prices: Vec<f64> = p.iter().map(|x| x.price).collect();
        let kinds: Vec<PivotKind> = p.iter().map(|x| x.kind).collect();

        // ABC after an uptrend: high -> low -> high -> low.
        if kinds
            == [
                PivotKind::High,
                PivotKind::Low,
                PivotKind::High,
                PivotKind::Low,
            ]
        {
            let (p0, p1, p2, p3) = (prices[0], prices[1], prices[2], prices[3]);
            let wave_a = p0 - p1;
            let wave_c = p2 - p3;
            if wave_a > 0.0 {
                let ratio = wave_c / wave_a;
                if (0.8..=1.618).contains(&ratio) {
                    let confidence: f64 = if (0.95..=1.05).contains(&ratio) {
                        0.8
                    } else {
                        0.5
                    };
                    return Some(WaveCount {
                        direction: Direction::Long,
                        wave_count: "correction_complete",
                        confidence,
                        waves: None,
                    });
                }
            }
        }

        // ABC after a downtrend: low -> high -> low -> high.
        if kinds
            == [
                PivotKind::Low,
                PivotKind::High,
                PivotKind::Low,
                PivotKind::High,
            ]
        {
            let (p0, p1, p2, p3) = (prices[0], prices[1], prices[2], prices[3]);
            let wave_a = p1 - p0;
            let wave_c = p3 - p2;
            if wave_a > 0.0 {
                let ratio = wave_c / wave_a;
                if (0.8..=1.618).contains(&ratio) {
                    let confidence: f64 = if (0.95..=1.05).contains(&ratio) {
                        0.8
                    } else {
                        0.5
                    };
                    return Some(WaveCount {
                        direction: Direction::Short,
                        wave_count: "correction_complete",
                        confidence,
                        waves: None,
                    });
                }
            }
        }

        None
    }

    fn count_waves(pivots: &[Pivot]) -> Option<WaveCount> {
        let start = pivots.len().saturating_sub(RECENT_PIVOTS);
        let recent = &pivots[start..];
        Self::find_impulse_pattern(recent).or_else(|| Self::find_correction_pattern(recent))
    }
}

impl Default for ElliottAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for ElliottAnalyzer {
    fn name(&self) -> &'static str {
        "elliott"
    }

    fn analyze(&self, candles: &[Candle], _symbol: &str, _interval: &str) -> AnalyzerResult {
        if candles.len() < MIN_CANDLES {
            return AnalyzerResult::none();
        }

        let pivots = Self::find_pivots(candles);
        let Some(count) = Self::count_waves(&pivots) else {
            return AnalyzerResult {
                direction: None,
                confidence: 0.0,
                rationale: vec!["no complete wave pattern in recent pivots".to_string()],
                detail: AnalyzerDetail::default(),
            };
        };

        AnalyzerResult {
            direction: Some(count.direction),
            confidence: count.confidence,
            rationale: vec![format!(
                "{} (confidence {:.0}%)",
                count.wave_count.replace('_', " "),
                count.confidence * 100.0
            )],
            detail: AnalyzerDetail {
                elliott_wave_count: Some(count.wave_count.to_string()),
                elliott_waves: count.waves,
                ..Default::default()
            },
        }
    }
}
