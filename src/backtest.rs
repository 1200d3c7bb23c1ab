// =============================================================================
// Backtest driver
// =============================================================================
//
// Replays a historical bar series through the SAME fuser used live, with
// suppression disabled, so results are a pure function of bar history.
// Simulates a single open position at a time; commission is deducted on
// both entry and exit notional.

use tracing::{debug, info};

use crate::candle::Candle;
use crate::fuser::SignalFuser;
use crate::types::Direction;

#[derive(Debug, Clone, Copy)]
pub struct BacktestConfig {
    pub initial_balance: f64,
    pub position_size_percent: f64,
    pub commission: f64,
    /// Mirrors the original engine's `allow_single_method`: whether a
    /// tier-3.5/4 (single-analyzer) signal is allowed to open a position.
    pub allow_single: bool,
    /// Confidence floor applied to single-analyzer-tier signals when
    /// `allow_single` is set.
    pub single_confidence: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            position_size_percent: 0.02,
            commission: 0.001,
            allow_single: false,
            single_confidence: 0.75,
        }
    }
}

fn is_single_method_tier(signal: &crate::store::Signal) -> bool {
    matches!(signal.indicators.get("tier").and_then(|v| v.as_str()), Some("3.5") | Some("4"))
}

#[derive(Debug, Clone)]
pub struct Trade {
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub confidence: f64,
    pub entry_time: i64,
    pub exit_price: f64,
    pub exit_reason: &'static str,
    pub pnl: f64,
    pub balance_after: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResults {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub total_pnl_percent: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_drawdown: f64,
    pub final_balance: f64,
    pub trades: Vec<Trade>,
}

struct OpenPosition {
    direction: Direction,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    size: f64,
    confidence: f64,
    entry_time: i64,
    balance_before: f64,
}

pub struct BacktestEngine {
    fuser: SignalFuser,
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(fuser: SignalFuser, config: BacktestConfig) -> Self {
        Self { fuser, config }
    }

    /// Runs the backtest over `candles` for `(symbol, interval)`. Returns the
    /// same results regardless of how many times it is invoked over the same
    /// series (no suppression state carries across calls: each call builds
    /// its own `SignalFuser`-internal cooldown maps are bypassed entirely
    /// since `suppress` is always `false` here).
    pub async fn run(&self, candles: &[Candle], symbol: &str, interval: &str) -> BacktestResults {
        info!(symbol, interval, candles = candles.len(), "starting backtest");

        let mut balance = self.config.initial_balance;
        let mut trades: Vec<Trade> = Vec::new();
        let mut open_position: Option<OpenPosition> = None;

        const MIN_CANDLES: usize = 50;
        for i in MIN_CANDLES..candles.len() {
            let historical = &candles[..i];
            let current = &candles[i];
            let current_price = current.close;

            if let Some(pos) = open_position.take() {
                let exit = match pos.direction {
                    Direction::Long => {
                        if current.low <= pos.stop_loss {
                            Some((pos.stop_loss, "SL"))
                        } else if current.high >= pos.take_profit {
                            Some((pos.take_profit, "TP"))
                        } else {
                            None
                        }
                    }
                    Direction::Short => {
                        if current.low <= pos.take_profit {
                            Some((pos.take_profit, "TP"))
                        } else if current.high >= pos.stop_loss {
                            Some((pos.stop_loss, "SL"))
                        } else {
                            None
                        }
                    }
                };

                if let Some((exit_price, reason)) = exit {
                    let trade = close_trade(&pos, exit_price, reason, self.config.commission, &mut balance);
                    debug!(direction = %trade.direction, pnl = trade.pnl, reason = trade.exit_reason, "trade closed");
                    trades.push(trade);
                } else {
                    open_position = Some(pos);
                }
            }

            if open_position.is_none() {
                if let Some(signal) = self
                    .fuser
                    .generate_signal(symbol, interval, historical, false)
                    .await
                {
                    if is_single_method_tier(&signal)
                        && (!self.config.allow_single
                            || signal.confidence < self.config.single_confidence)
                    {
                        continue;
                    }

                    let position_value = balance * self.config.position_size_percent;
                    let size = position_value / current_price;
                    debug!(direction = %signal.direction, entry = current_price, "opened position");
                    open_position = Some(OpenPosition {
                        direction: signal.direction,
                        entry_price: current_price,
                        stop_loss: signal.stop_loss,
                        take_profit: signal.take_profit,
                        size,
                        confidence: signal.confidence,
                        entry_time: current.open_time,
                        balance_before: balance,
                    });
                }
            }
        }

        if let Some(pos) = open_position.take() {
            let final_price = candles.last().map(|c| c.close).unwrap_or(pos.entry_price);
            let trade = close_trade(&pos, final_price, "EOD", self.config.commission, &mut balance);
            trades.push(trade);
        }

        let results = summarize(trades, balance, self.config.initial_balance);
        info!(
            trades = results.total_trades,
            final_balance = results.final_balance,
            "backtest complete",
        );
        results
    }
}

fn close_trade(
    pos: &OpenPosition,
    exit_price: f64,
    reason: &'static str,
    commission: f64,
    balance: &mut f64,
) -> Trade {
    let mut pnl = match pos.direction {
        Direction::Long => (exit_price - pos.entry_price) * pos.size,
        Direction::Short => (pos.entry_price - exit_price) * pos.size,
    };
    pnl -= pos.entry_price * pos.size * commission;
    pnl -= exit_price * pos.size * commission;
    *balance = pos.balance_before + pnl;

    Trade {
        direction: pos.direction,
        entry_price: pos.entry_price,
        stop_loss: pos.stop_loss,
        take_profit: pos.take_profit,
        size: pos.size,
        confidence: pos.confidence,
        entry_time: pos.entry_time,
        exit_price,
        exit_reason: reason,
        pnl,
        balance_after: *balance,
    }
}

fn summarize(trades: Vec<Trade>, final_balance: f64, initial_balance: f64) -> BacktestResults {
    if trades.is_empty() {
        return BacktestResults {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            total_pnl_percent: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            max_drawdown: 0.0,
            final_balance,
            trades,
        };
    }

    let winning: Vec<&Trade> = trades.iter().filter(|t| t.pnl > 0.0).collect();
    let losing: Vec<&Trade> = trades.iter().filter(|t| t.pnl <= 0.0).collect();
    let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
    let total_pnl_percent = ((final_balance - initial_balance) / initial_balance) * 100.0;

    let mut peak = initial_balance;
    let mut max_drawdown = 0.0_f64;
    for trade in &trades {
        if trade.balance_after > peak {
            peak = trade.balance_after;
        }
        let dd = ((peak - trade.balance_after) / peak) * 100.0;
        max_drawdown = max_drawdown.max(dd);
    }

    BacktestResults {
        total_trades: trades.len(),
        winning_trades: winning.len(),
        losing_trades: losing.len(),
        win_rate: winning.len() as f64 / trades.len() as f64,
        total_pnl,
        total_pnl_percent,
        avg_win: if winning.is_empty() {
            0.0
        } else {
            winning.iter().map(|t| t.pnl).sum::<f64>() / winning.len() as f64
        },
        avg_loss: if losing.is_empty() {
            0.0
        } else {
            losing.iter().map(|t| t.pnl).sum::<f64>() / losing.len() as f64
        },
        largest_win: winning.iter().map(|t| t.pnl).fold(0.0, f64::max),
        largest_loss: losing.iter().map(|t| t.pnl).fold(0.0, f64::min),
        max_drawdown,
        final_balance,
        trades,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::Metrics;
    use crate::notifier::LoggingNotifier;
    use crate::store::InMemorySignalStore;
    use std::env;
    use std::sync::Arc;

    fn candle(i: i64, close: f64, high: f64, low: f64) -> Candle {
        Candle {
            open_time: i * 60_000,
            close_time: i * 60_000 + 59_999,
            open: close,
            high,
            low,
            close,
            volume: 100.0,
            quote_volume: close * 100.0,
            trades_count: 10,
            taker_buy_volume: 50.0,
            taker_buy_quote_volume: close * 50.0,
            is_closed: true,
        }
    }

    fn build_engine() -> BacktestEngine {
        env::remove_var("MIN_CONFIDENCE");
        let config = Config::load().unwrap();
        let store = Arc::new(InMemorySignalStore::new());
        let notifier = Arc::new(LoggingNotifier::new());
        let metrics = Arc::new(Metrics::new());
        let fuser = SignalFuser::new(&config, store, notifier, metrics);
        BacktestEngine::new(fuser, BacktestConfig::default())
    }

    #[tokio::test]
    async fn empty_history_yields_zero_trades() {
        let engine = build_engine();
        let candles: Vec<Candle> = (0..40).map(|i| candle(i, 100.0, 100.5, 99.5)).collect();
        let results = engine.run(&candles, "BTCUSDT", "1h").await;
        assert_eq!(results.total_trades, 0);
        assert_eq!(results.final_balance, engine.config.initial_balance);
    }

    #[tokio::test]
    async fn flat_series_never_opens_a_position() {
        let engine = build_engine();
        let candles: Vec<Candle> = (0..200).map(|i| candle(i, 100.0, 100.1, 99.9)).collect();
        let results = engine.run(&candles, "BTCUSDT", "1h").await;
        assert_eq!(results.total_trades, 0);
    }

    /// Scenario 6: the backtest must be a pure function of the candle series
    /// — running it twice over an identical slice must yield identical
    /// trades, proving no suppression/cooldown state leaks across runs (the
    /// fuser is constructed fresh each time and `suppress` is always false).
    #[tokio::test]
    async fn backtest_idempotence_same_series_twice() {
        let candles: Vec<Candle> = (0..300)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.3).sin() * 8.0;
                candle(i, base + 0.5, base + 2.5, base - 2.5)
            })
            .collect();

        let results_a = build_engine().run(&candles, "BTCUSDT", "1h").await;
        let results_b = build_engine().run(&candles, "BTCUSDT", "1h").await;

        assert_eq!(results_a.total_trades, results_b.total_trades);
        assert!(
            results_a.total_trades > 0,
            "expected the oscillating series to open at least one trade"
        );

        for (a, b) in results_a.trades.iter().zip(results_b.trades.iter()) {
            assert_eq!(a.direction, b.direction);
            assert_eq!(a.entry_price, b.entry_price);
            assert_eq!(a.exit_price, b.exit_price);
            assert_eq!(a.exit_reason, b.exit_reason);
            assert_eq!(a.pnl, b.pnl);
        }
        assert_eq!(results_a.final_balance, results_b.final_balance);
    }

    #[test]
    fn summarize_tracks_drawdown_and_win_rate() {
        let trades = vec![
            Trade {
                direction: Direction::Long,
                entry_price: 100.0,
                stop_loss: 98.0,
                take_profit: 103.0,
                size: 1.0,
                confidence: 0.7,
                entry_time: 0,
                exit_price: 103.0,
                exit_reason: "TP",
                pnl: 300.0,
                balance_after: 10_300.0,
            },
            Trade {
                direction: Direction::Long,
                entry_price: 103.0,
                stop_loss: 100.0,
                take_profit: 108.0,
                size: 1.0,
                confidence: 0.7,
                entry_time: 1,
                exit_price: 100.0,
                exit_reason: "SL",
                pnl: -300.0,
                balance_after: 10_000.0,
            },
        ];
        let results = summarize(trades, 10_000.0, 10_000.0);
        assert_eq!(results.total_trades, 2);
        assert_eq!(results.winning_trades, 1);
        assert_eq!(results.losing_trades, 1);
        assert!((results.win_rate - 0.5).abs() < 1e-9);
        assert!(results.max_drawdown > 0.0);
    }
}
