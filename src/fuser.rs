// =============================================================================
// Signal fuser — per-bar-close orchestrator
// =============================================================================
//
// Runs every enabled analyzer, applies the tiered fusion rules, enforces
// cooldown/conflict/anti-spam suppression, computes stop-loss/take-profit,
// and persists + notifies on a successful emit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::analyzers::elliott::ElliottAnalyzer;
use crate::analyzers::macd_analyzer::MacdAnalyzer;
use crate::analyzers::rsi_analyzer::RsiAnalyzer;
use crate::analyzers::wyckoff::WyckoffAnalyzer;
use crate::analyzers::{Analyzer, AnalyzerResult, ElliottWaveLevels};
use crate::candle::Candle;
use crate::config::Config;
use crate::indicators::atr::calculate_atr;
use crate::indicators::ema::calculate_ema;
use crate::indicators::macd::current_macd;
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::volume::check_volume_surge;
use crate::indicators::vwap::calculate_vwap;
use crate::metrics::Metrics;
use crate::notifier::Notifier;
use crate::store::{calculate_signal_risk_reward, Signal, SignalStore};
use crate::types::Direction;

const MIN_CANDLES: usize = 50;
const ATR_PERIOD: usize = 14;
const ELLIOTT_WAVE_TP_RATIO: f64 = 1.0;

struct FusionOutcome {
    direction: Direction,
    confidence: f64,
    tier: &'static str,
    elliott_contributed: bool,
}

/// Pure tiered-fusion decision. Tiers are tried top-down; the first match
/// wins.
fn fuse_tier(
    wyckoff: &AnalyzerResult,
    elliott: &AnalyzerResult,
    rsi: &AnalyzerResult,
    macd: &AnalyzerResult,
) -> Option<FusionOutcome> {
    // Tier 1: Wyckoff & Elliott both emit, same direction.
    if let (Some(wd), Some(ed)) = (wyckoff.direction, elliott.direction) {
        if wd == ed {
            let mut confidence = (wyckoff.confidence + elliott.confidence) / 2.0;
            if rsi.direction == Some(wd) {
                confidence += 0.05;
            }
            if macd.direction == Some(wd) {
                confidence += 0.05;
            }
            return Some(FusionOutcome {
                direction: wd,
                confidence: confidence.min(0.95),
                tier: "1",
                elliott_contributed: true,
            });
        }
    }

    // Tier 2: Wyckoff XOR Elliott emits, and RSI+MACD both agree with it.
    let pattern = match (wyckoff.direction, elliott.direction) {
        (Some(d), None) => Some((d, wyckoff.confidence, false)),
        (None, Some(d)) => Some((d, elliott.confidence, true)),
        _ => None,
    };
    if let Some((d, pattern_confidence, is_elliott)) = pattern {
        if rsi.direction == Some(d) && macd.direction == Some(d) {
            let confidence = (pattern_confidence + rsi.confidence + macd.confidence) / 3.0;
            return Some(FusionOutcome {
                direction: d,
                confidence,
                tier: "2",
                elliott_contributed: is_elliott,
            });
        }
    }

    // Tier 3: RSI & MACD emit same direction, no pattern contribution.
    if let (Some(rd), Some(md)) = (rsi.direction, macd.direction) {
        if rd == md {
            return Some(FusionOutcome {
                direction: rd,
                confidence: (rsi.confidence + macd.confidence) / 2.0,
                tier: "3",
                elliott_contributed: false,
            });
        }
    }

    // Tier 3.5: RSI alone (>=0.90) or MACD alone (>=0.75).
    if let Some(rd) = rsi.direction {
        if rsi.confidence >= 0.90 {
            return Some(FusionOutcome {
                direction: rd,
                confidence: rsi.confidence * 0.85,
                tier: "3.5",
                elliott_contributed: false,
            });
        }
    }
    if let Some(md) = macd.direction {
        if macd.confidence >= 0.75 {
            return Some(FusionOutcome {
                direction: md,
                confidence: macd.confidence * 0.85,
                tier: "3.5",
                elliott_contributed: false,
            });
        }
    }

    // Tier 4: Wyckoff alone (>=0.75) or Elliott alone (>=0.75).
    if let Some(wd) = wyckoff.direction {
        if wyckoff.confidence >= 0.75 {
            return Some(FusionOutcome {
                direction: wd,
                confidence: wyckoff.confidence * 0.9,
                tier: "4",
                elliott_contributed: false,
            });
        }
    }
    if let Some(ed) = elliott.direction {
        if elliott.confidence >= 0.75 {
            return Some(FusionOutcome {
                direction: ed,
                confidence: elliott.confidence * 0.9,
                tier: "4",
                elliott_contributed: true,
            });
        }
    }

    None
}

/// Independent indicator-confirmation checks. Mirrors the distinct (looser)
/// thresholds used for confirmation versus the RSI/MACD analyzers'
/// direction-emitting thresholds — confirmation is a softer corroboration
/// signal, not a standalone opinion.
fn indicator_confirmations(candles: &[Candle], direction: Direction, current_price: f64) -> Vec<String> {
    if candles.len() < 30 {
        return Vec::new();
    }

    let mut confirmations = Vec::new();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    if let Some(&rsi) = calculate_rsi(&closes, 14).last() {
        match direction {
            Direction::Long if rsi < 40.0 => confirmations.push("RSI oversold (bullish)".to_string()),
            Direction::Short if rsi > 60.0 => confirmations.push("RSI overbought (bearish)".to_string()),
            _ => {}
        }
    }

    let ema9 = calculate_ema(&closes, 9);
    let ema21 = calculate_ema(&closes, 21);
    if let (Some(&e9), Some(&e21)) = (ema9.last(), ema21.last()) {
        match direction {
            Direction::Long if e9 > e21 => confirmations.push("EMA bullish crossover".to_string()),
            Direction::Short if e9 < e21 => confirmations.push("EMA bearish crossover".to_string()),
            _ => {}
        }
    }

    let tail_20 = &candles[candles.len() - 20..];
    if let Some(vwap) = calculate_vwap(tail_20) {
        match direction {
            Direction::Long if current_price < vwap => {
                confirmations.push("price below VWAP (potential support)".to_string())
            }
            Direction::Short if current_price > vwap => {
                confirmations.push("price above VWAP (potential resistance)".to_string())
            }
            _ => {}
        }
    }

    if check_volume_surge(candles, 1.5) {
        confirmations.push("volume surge detected".to_string());
    }

    if let Some(macd) = current_macd(&closes) {
        match direction {
            Direction::Long if macd.histogram > 0.0 => confirmations.push("MACD bullish".to_string()),
            Direction::Short if macd.histogram < 0.0 => confirmations.push("MACD bearish".to_string()),
            _ => {}
        }
    }

    confirmations
}

/// Computed stop-loss/take-profit geometry for one signal.
struct RiskTargets {
    stop_loss: f64,
    take_profit: f64,
    take_profit_2: f64,
    take_profit_3: f64,
    atr: Option<f64>,
    mode: &'static str,
}

fn elliott_stop_take(entry: f64, direction: Direction, waves: &ElliottWaveLevels) -> Option<(f64, f64)> {
    let buffer = waves.wave_4_price.abs() * 0.001;
    let (stop_loss, take_profit) = match direction {
        Direction::Long => (
            waves.wave_4_price - buffer,
            entry + waves.wave_1.abs() * ELLIOTT_WAVE_TP_RATIO,
        ),
        Direction::Short => (
            waves.wave_4_price + buffer,
            entry - waves.wave_1.abs() * ELLIOTT_WAVE_TP_RATIO,
        ),
    };

    let valid = match direction {
        Direction::Long => stop_loss < entry && take_profit > entry,
        Direction::Short => stop_loss > entry && take_profit < entry,
    };
    valid.then_some((stop_loss, take_profit))
}

fn compute_risk_targets(
    entry: f64,
    direction: Direction,
    candles: &[Candle],
    elliott_waves: Option<&ElliottWaveLevels>,
    reward_risk_floor: f64,
) -> RiskTargets {
    let window_start = candles.len().saturating_sub(30);
    let atr = calculate_atr(&candles[window_start..], ATR_PERIOD);

    let (mut stop_loss, mut take_profit, mode) = elliott_waves
        .and_then(|waves| elliott_stop_take(entry, direction, waves))
        .map(|(sl, tp)| (sl, tp, "elliott"))
        .unwrap_or_else(|| {
            let (sl, tp) = match (atr, direction) {
                (Some(atr), Direction::Long) => (entry - 2.0 * atr, entry + 3.0 * atr),
                (Some(atr), Direction::Short) => (entry + 2.0 * atr, entry - 3.0 * atr),
                (None, Direction::Long) => (entry * 0.98, entry * 1.03),
                (None, Direction::Short) => (entry * 1.02, entry * 0.97),
            };
            (sl, tp, "atr")
        });

    let risk = (entry - stop_loss).abs();
    let mut reward = (take_profit - entry).abs();
    if risk > 0.0 && reward / risk < reward_risk_floor {
        reward = risk * reward_risk_floor;
        take_profit = match direction {
            Direction::Long => entry + reward,
            Direction::Short => entry - reward,
        };
    }

    let primary_distance = (take_profit - entry).abs();
    let (take_profit_2, take_profit_3) = match direction {
        Direction::Long => (entry + 1.5 * primary_distance, entry + 2.0 * primary_distance),
        Direction::Short => (entry - 1.5 * primary_distance, entry - 2.0 * primary_distance),
    };

    RiskTargets {
        stop_loss,
        take_profit,
        take_profit_2,
        take_profit_3,
        atr,
        mode,
    }
}

#[derive(Debug, Clone, Copy)]
struct LastSymbolEmit {
    direction: Direction,
    time: f64,
    entry_price: f64,
}

/// Evaluates every suppression rule for one candidate emission. Pure and
/// independently testable: callers supply `now` rather than reading the
/// clock internally.
fn check_suppression(
    last_key_time: Option<f64>,
    last_symbol_emit: Option<LastSymbolEmit>,
    candidate_direction: Direction,
    candidate_price: f64,
    now: f64,
    cooldown_secs: f64,
    symbol_cooldown_secs: f64,
    conflict_window_secs: f64,
    anti_spam_window_secs: f64,
    anti_spam_min_move_pct: f64,
) -> Result<(), &'static str> {
    if let Some(t) = last_key_time {
        if now - t < cooldown_secs {
            return Err("cooldown");
        }
    }

    if let Some(last) = last_symbol_emit {
        let elapsed = now - last.time;
        if last.direction != candidate_direction {
            if elapsed < conflict_window_secs {
                return Err("conflicting direction");
            }
        } else if elapsed < symbol_cooldown_secs {
            if elapsed < anti_spam_window_secs {
                let move_pct = (candidate_price - last.entry_price).abs() / last.entry_price;
                if move_pct < anti_spam_min_move_pct {
                    return Err("anti-spam: insufficient price movement");
                }
            } else {
                return Err("symbol cooldown");
            }
        }
    }

    Ok(())
}

pub struct SignalFuser {
    analyzers: Vec<Box<dyn Analyzer>>,
    elliott_enabled: bool,
    store: Arc<dyn SignalStore>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    min_confidence: f64,
    cooldown_secs: f64,
    symbol_cooldown_secs: f64,
    conflict_window_secs: f64,
    anti_spam_window_secs: f64,
    anti_spam_min_move_pct: f64,
    reward_risk_floor: f64,
    last_signal_time: RwLock<HashMap<(String, String), f64>>,
    last_signal_type: RwLock<HashMap<String, LastSymbolEmit>>,
}

impl SignalFuser {
    pub fn new(
        config: &Config,
        store: Arc<dyn SignalStore>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mut analyzers: Vec<Box<dyn Analyzer>> = Vec::new();
        if config.enable_wyckoff {
            analyzers.push(Box::new(WyckoffAnalyzer::new()));
        }
        if config.enable_elliott {
            analyzers.push(Box::new(ElliottAnalyzer::new()));
        }
        analyzers.push(Box::new(RsiAnalyzer::new()));
        analyzers.push(Box::new(MacdAnalyzer::new()));

        Self {
            analyzers,
            elliott_enabled: config.enable_elliott,
            store,
            notifier,
            metrics,
            min_confidence: config.min_confidence,
            cooldown_secs: config.signal_cooldown_secs as f64,
            symbol_cooldown_secs: config.symbol_cooldown_secs as f64,
            conflict_window_secs: config.conflict_window_secs as f64,
            anti_spam_window_secs: config.anti_spam_window_secs as f64,
            anti_spam_min_move_pct: config.anti_spam_min_move_pct,
            reward_risk_floor: config.reward_risk_floor,
            last_signal_time: RwLock::new(HashMap::new()),
            last_signal_type: RwLock::new(HashMap::new()),
        }
    }

    fn run_analyzers(&self, candles: &[Candle], symbol: &str, interval: &str) -> AnalyzerSet {
        let empty = AnalyzerResult::none;
        let mut wyckoff = empty();
        let mut elliott = empty();
        let mut rsi = empty();
        let mut macd = empty();

        for analyzer in &self.analyzers {
            let result = analyzer.analyze(candles, symbol, interval);
            match analyzer.name() {
                "wyckoff" => wyckoff = result,
                "elliott" => elliott = result,
                "rsi" => rsi = result,
                "macd" => macd = result,
                _ => {}
            }
        }

        AnalyzerSet {
            wyckoff,
            elliott,
            rsi,
            macd,
        }
    }

    /// Generates a signal for one bar-close, if the fusion and suppression
    /// rules allow it. `suppress` is set to `false` by the backtest driver so
    /// the fuser behaves as a pure function of bar history.
    #[instrument(skip(self, candles), fields(symbol = %symbol, interval = %interval))]
    pub async fn generate_signal(
        &self,
        symbol: &str,
        interval: &str,
        candles: &[Candle],
        suppress: bool,
    ) -> Option<Signal> {
        if candles.len() < MIN_CANDLES {
            debug!("insufficient candles for analysis");
            return None;
        }

        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        let key = (symbol.to_string(), interval.to_string());

        if suppress {
            let last_key_time = self.last_signal_time.read().get(&key).copied();
            if let Some(t) = last_key_time {
                if now - t < self.cooldown_secs {
                    debug!(elapsed = now - t, "signal cooldown active");
                    return None;
                }
            }
        }

        let current_price = candles.last()?.close;
        let AnalyzerSet {
            wyckoff,
            elliott,
            rsi,
            macd,
        } = self.run_analyzers(candles, symbol, interval);

        let outcome = fuse_tier(&wyckoff, &elliott, &rsi, &macd)?;

        let confirmations = indicator_confirmations(candles, outcome.direction, current_price);
        let confirmation_bonus = (confirmations.len() as f64 * 0.03).min(0.15);
        let final_confidence = (outcome.confidence + confirmation_bonus).min(1.0);

        if final_confidence < self.min_confidence {
            debug!(confidence = final_confidence, "below minimum confidence, skipped");
            return None;
        }

        if suppress {
            let last_symbol_emit = self.last_signal_type.read().get(symbol).copied();
            if let Err(reason) = check_suppression(
                self.last_signal_time.read().get(&key).copied(),
                last_symbol_emit,
                outcome.direction,
                current_price,
                now,
                self.cooldown_secs,
                self.symbol_cooldown_secs,
                self.conflict_window_secs,
                self.anti_spam_window_secs,
                self.anti_spam_min_move_pct,
            ) {
                warn!(reason, "signal suppressed");
                return None;
            }
        }

        let elliott_waves = if self.elliott_enabled && outcome.elliott_contributed {
            elliott.detail.elliott_waves.as_ref()
        } else {
            None
        };
        let targets = compute_risk_targets(
            current_price,
            outcome.direction,
            candles,
            elliott_waves,
            self.reward_risk_floor,
        );

        let mut rationale_parts = Vec::new();
        if wyckoff.direction == Some(outcome.direction) {
            rationale_parts.push(format!(
                "Wyckoff ({:.0}%): {}",
                wyckoff.confidence * 100.0,
                wyckoff.rationale.join("; ")
            ));
        }
        if elliott.direction == Some(outcome.direction) {
            rationale_parts.push(format!(
                "Elliott Wave ({:.0}%): {}",
                elliott.confidence * 100.0,
                elliott.rationale.join("; ")
            ));
        }
        if !confirmations.is_empty() {
            rationale_parts.push(format!("Indicators: {}", confirmations.join(", ")));
        }
        let risk_reward = calculate_signal_risk_reward(
            current_price,
            targets.stop_loss,
            targets.take_profit,
            outcome.direction,
        );
        rationale_parts.push(format!("Risk/Reward: {:.2}:1", risk_reward.risk_reward_ratio));
        let rationale = rationale_parts.join("\n");

        let signal = Signal {
            id: 0,
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            direction: outcome.direction,
            entry_price: current_price,
            stop_loss: targets.stop_loss,
            take_profit: targets.take_profit,
            take_profit_2: targets.take_profit_2,
            take_profit_3: targets.take_profit_3,
            confidence: final_confidence,
            wyckoff_phase: wyckoff.detail.wyckoff_phase,
            elliott_wave_count: elliott.detail.elliott_wave_count.clone(),
            indicators: json!({
                "tier": outcome.tier,
                "confirmations": confirmations,
                "atr": targets.atr,
                "risk_mode": targets.mode,
            }),
            rationale,
            atr: targets.atr,
            risk_reward,
            created_at: Utc::now(),
            status: crate::types::SignalStatus::default(),
        };

        let Ok(signal_id) = self.store.insert_signal(signal.clone()).await else {
            warn!("signal persistence failed, cooldown left unchanged for retry");
            return None;
        };
        let mut persisted = signal;
        persisted.id = signal_id;

        self.last_signal_time.write().insert(key, now);
        self.last_signal_type.write().insert(
            symbol.to_string(),
            LastSymbolEmit {
                direction: outcome.direction,
                time: now,
                entry_price: current_price,
            },
        );

        self.metrics
            .increment_signal(symbol, interval, outcome.direction);
        self.notifier.notify(&persisted).await;

        info!(
            direction = %persisted.direction,
            confidence = persisted.confidence,
            tier = outcome.tier,
            entry = persisted.entry_price,
            stop_loss = persisted.stop_loss,
            take_profit = persisted.take_profit,
            "signal emitted",
        );

        Some(persisted)
    }
}

struct AnalyzerSet {
    wyckoff: AnalyzerResult,
    elliott: AnalyzerResult,
    rsi: AnalyzerResult,
    macd: AnalyzerResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LogFormat};
    use crate::metrics::Metrics;
    use crate::notifier::LoggingNotifier;
    use crate::store::InMemorySignalStore;

    /// Minimal literal config, built in-process to avoid racing other tests'
    /// `std::env::set_var` calls against `Config::load()`.
    fn test_config(enable_wyckoff: bool, enable_elliott: bool) -> Config {
        Config {
            symbols: vec!["BTCUSDT".to_string()],
            timeframes: vec!["1h".to_string()],
            min_confidence: 0.65,
            // Zeroed so the per-key cooldown gate never masks the anti-spam
            // suppression rule under test, which runs all calls in the same
            // wall-clock instant.
            signal_cooldown_secs: 0,
            symbol_cooldown_secs: 3600,
            conflict_window_secs: 3600,
            anti_spam_window_secs: 3600,
            anti_spam_min_move_pct: 0.015,
            reward_risk_floor: 1.2,
            enable_wyckoff,
            enable_elliott,
            ws_reconnect_delay_secs: 5,
            ws_max_retries: -1,
            binance_rate_limit_per_minute: 1200,
            max_candles_per_request: 1500,
            window_size: 500,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            store_url: None,
            store_key: None,
            notifier_token: None,
            notifier_channel: None,
        }
    }

    fn test_fuser(config: &Config) -> SignalFuser {
        let store = Arc::new(InMemorySignalStore::new());
        let notifier = Arc::new(LoggingNotifier::new());
        let metrics = Arc::new(Metrics::new());
        SignalFuser::new(config, store, notifier, metrics)
    }

    fn flat_candle(open_time: i64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high,
            low,
            close,
            volume,
            quote_volume: volume * close,
            trades_count: 10,
            taker_buy_volume: volume * 0.5,
            taker_buy_quote_volume: volume * close * 0.5,
            is_closed: true,
        }
    }

    /// 55 tight-range bars around 100, then a spring bar (low undercuts
    /// support, closes back above it on a volume surge) — the same setup
    /// `WyckoffAnalyzer` recognizes as an accumulation spring.
    fn spring_scenario_candles() -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..55)
            .map(|i| flat_candle(i * 60_000, 101.0, 99.0, 100.0, 1000.0))
            .collect();
        candles.push(flat_candle(55 * 60_000, 101.0, 94.0, 101.0, 3000.0));
        candles
    }

    /// Scenario 1: a spring-triggered LONG emits with confidence >= 0.65 and
    /// ATR-sized stop-loss/take-profit at the documented 2x/3x multiples.
    /// Elliott is disabled so the wyckoff-alone tier (4) drives the signal
    /// and risk targets fall back to ATR mode deterministically.
    #[tokio::test]
    async fn scenario_spring_triggered_long_signal() {
        let candles = spring_scenario_candles();
        let config = test_config(true, false);
        let fuser = test_fuser(&config);

        let signal = fuser
            .generate_signal("BTCUSDT", "1h", &candles, false)
            .await
            .expect("spring setup should emit a signal");

        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.confidence >= 0.65, "confidence was {}", signal.confidence);

        let entry = candles.last().unwrap().close;
        let window_start = candles.len().saturating_sub(30);
        let atr = calculate_atr(&candles[window_start..], ATR_PERIOD).expect("atr should be available");
        let expected_sl = entry - 2.0 * atr;
        let expected_tp = entry + 3.0 * atr;
        assert!(
            (signal.stop_loss - expected_sl).abs() < 1e-6,
            "stop_loss {} != expected {}",
            signal.stop_loss,
            expected_sl
        );
        assert!(
            (signal.take_profit - expected_tp).abs() < 1e-6,
            "take_profit {} != expected {}",
            signal.take_profit,
            expected_tp
        );
    }

    /// Scenario 3: same-direction anti-spam. A first spring emits LONG; a
    /// second candle set only 0.5% above the first's entry, fed shortly
    /// after, must be suppressed, while a third set ~2% above entry allows
    /// a fresh emission.
    #[tokio::test]
    async fn scenario_anti_spam_rejects_small_move_then_allows_large_move() {
        let config = test_config(true, false);
        let fuser = test_fuser(&config);

        let base = spring_scenario_candles();
        let first = fuser
            .generate_signal("BTCUSDT", "1h", &base, true)
            .await
            .expect("first spring should emit");
        assert_eq!(first.direction, Direction::Long);
        let entry = first.entry_price;

        // Same setup, price nudged +0.5% — within the anti-spam window,
        // below the 1.5% minimum move, must be suppressed.
        let mut small_move = base.clone();
        let last = small_move.last_mut().unwrap();
        let bumped = entry * 1.005;
        last.close = bumped;
        last.high = bumped + 1.0;
        let suppressed = fuser.generate_signal("BTCUSDT", "1h", &small_move, true).await;
        assert!(suppressed.is_none(), "0.5% re-emission should be suppressed");

        // Same setup, price up ~2% — clears the anti-spam floor, must emit.
        let mut large_move = base.clone();
        let last = large_move.last_mut().unwrap();
        let bumped = entry * 1.02;
        last.close = bumped;
        last.high = bumped + 1.0;
        let allowed = fuser.generate_signal("BTCUSDT", "1h", &large_move, true).await;
        assert!(allowed.is_some(), "2% re-emission should be allowed");
        assert_eq!(allowed.unwrap().direction, Direction::Long);
    }

    fn result(direction: Option<Direction>, confidence: f64) -> AnalyzerResult {
        AnalyzerResult {
            direction,
            confidence,
            rationale: Vec::new(),
            detail: Default::default(),
        }
    }

    #[test]
    fn tier1_requires_agreement_and_caps_at_095() {
        let wy = result(Some(Direction::Long), 0.9);
        let el = result(Some(Direction::Long), 0.9);
        let rsi = result(Some(Direction::Long), 0.6);
        let macd = result(Some(Direction::Long), 0.6);
        let outcome = fuse_tier(&wy, &el, &rsi, &macd).unwrap();
        assert_eq!(outcome.tier, "1");
        assert_eq!(outcome.confidence, 0.95);
    }

    #[test]
    fn disagreement_between_patterns_yields_no_tier1() {
        let wy = result(Some(Direction::Long), 0.9);
        let el = result(Some(Direction::Short), 0.9);
        let rsi = result(None, 0.0);
        let macd = result(None, 0.0);
        assert!(fuse_tier(&wy, &el, &rsi, &macd).is_none());
    }

    #[test]
    fn tier2_needs_momentum_agreement() {
        let wy = result(Some(Direction::Long), 0.6);
        let el = result(None, 0.0);
        let rsi = result(Some(Direction::Long), 0.55);
        let macd = result(Some(Direction::Long), 0.7);
        let outcome = fuse_tier(&wy, &el, &rsi, &macd).unwrap();
        assert_eq!(outcome.tier, "2");
        assert!((outcome.confidence - (0.6 + 0.55 + 0.7) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn tier3_rsi_macd_agree_with_no_pattern() {
        let none = result(None, 0.0);
        let rsi = result(Some(Direction::Long), 0.57);
        let macd = result(Some(Direction::Long), 0.75);
        let outcome = fuse_tier(&none, &none, &rsi, &macd).unwrap();
        assert_eq!(outcome.tier, "3");
        assert!((outcome.confidence - 0.66).abs() < 1e-9);
    }

    #[test]
    fn tier3_5_strong_rsi_alone() {
        let none = result(None, 0.0);
        let rsi = result(Some(Direction::Short), 0.95);
        let outcome = fuse_tier(&none, &none, &rsi, &none).unwrap();
        assert_eq!(outcome.tier, "3.5");
        assert!((outcome.confidence - 0.95 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn tier4_strong_wyckoff_alone() {
        let none = result(None, 0.0);
        let wy = result(Some(Direction::Long), 0.8);
        let outcome = fuse_tier(&wy, &none, &none, &none).unwrap();
        assert_eq!(outcome.tier, "4");
        assert!((outcome.confidence - 0.8 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn weak_signals_fuse_to_none() {
        let none = result(None, 0.0);
        let weak = result(Some(Direction::Long), 0.5);
        assert!(fuse_tier(&weak, &none, &none, &none).is_none());
    }

    #[test]
    fn suppression_blocks_within_key_cooldown() {
        let err = check_suppression(Some(100.0), None, Direction::Long, 100.0, 150.0, 300.0, 3600.0, 3600.0, 3600.0, 0.015)
            .unwrap_err();
        assert_eq!(err, "cooldown");
    }

    #[test]
    fn suppression_blocks_opposite_direction_within_conflict_window() {
        let last = LastSymbolEmit {
            direction: Direction::Long,
            time: 0.0,
            entry_price: 100.0,
        };
        let err = check_suppression(None, Some(last), Direction::Short, 101.0, 600.0, 300.0, 3600.0, 3600.0, 3600.0, 0.015)
            .unwrap_err();
        assert_eq!(err, "conflicting direction");
    }

    #[test]
    fn suppression_blocks_same_direction_without_sufficient_move() {
        let last = LastSymbolEmit {
            direction: Direction::Long,
            time: 0.0,
            entry_price: 101.0,
        };
        let err = check_suppression(None, Some(last), Direction::Long, 101.5, 1200.0, 300.0, 3600.0, 3600.0, 3600.0, 0.015)
            .unwrap_err();
        assert_eq!(err, "anti-spam: insufficient price movement");
    }

    #[test]
    fn suppression_allows_same_direction_with_sufficient_move() {
        let last = LastSymbolEmit {
            direction: Direction::Long,
            time: 0.0,
            entry_price: 101.0,
        };
        let result = check_suppression(None, Some(last), Direction::Long, 103.0, 1200.0, 300.0, 3600.0, 3600.0, 3600.0, 0.015);
        assert!(result.is_ok());
    }

    #[test]
    fn suppression_allows_same_direction_past_every_window() {
        let last = LastSymbolEmit {
            direction: Direction::Long,
            time: 0.0,
            entry_price: 101.0,
        };
        let result = check_suppression(None, Some(last), Direction::Long, 101.1, 4000.0, 300.0, 3600.0, 3600.0, 3600.0, 0.015);
        assert!(result.is_ok());
    }

    #[test]
    fn atr_mode_sizes_sl_tp_and_extended_targets() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| Candle {
                open_time: i * 60_000,
                close_time: i * 60_000 + 59_999,
                open: 100.0,
                high: 102.0,
                low: 98.0,
                close: 100.0,
                volume: 10.0,
                quote_volume: 1000.0,
                trades_count: 1,
                taker_buy_volume: 5.0,
                taker_buy_quote_volume: 500.0,
                is_closed: true,
            })
            .collect();
        let targets = compute_risk_targets(100.0, Direction::Long, &candles, None, 1.2);
        assert_eq!(targets.mode, "atr");
        assert!(targets.stop_loss < 100.0);
        assert!(targets.take_profit > 100.0);
        assert!(targets.take_profit_2 > targets.take_profit);
        assert!(targets.take_profit_3 > targets.take_profit_2);
    }

    #[test]
    fn widens_take_profit_to_meet_reward_risk_floor() {
        let waves = ElliottWaveLevels {
            wave_1: 1.0,
            wave_3: 2.0,
            wave_4_price: 95.0,
        };
        let candles = vec![
            Candle {
                open_time: 0,
                close_time: 59_999,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 10.0,
                quote_volume: 1000.0,
                trades_count: 1,
                taker_buy_volume: 5.0,
                taker_buy_quote_volume: 500.0,
                is_closed: true,
            };
            40
        ];
        // wave_1=1.0 would give TP=101.0 against SL~95 (risk=5), far below a
        // 1.2 floor; the floor widening must kick in.
        let targets = compute_risk_targets(100.0, Direction::Long, &candles, Some(&waves), 1.2);
        assert_eq!(targets.mode, "elliott");
        let risk = 100.0 - targets.stop_loss;
        let reward = targets.take_profit - 100.0;
        assert!(reward / risk >= 1.2 - 1e-9);
    }
}
