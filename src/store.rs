// =============================================================================
// Persistent store — trait boundary + in-memory implementation
// =============================================================================
//
// `SignalStore` stands in for the managed Postgres database in the original
// system. Only an in-memory implementation ships here; a networked backend
// is a matter of adding a second `impl SignalStore for ...`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::candle::Candle;
use crate::types::{Direction, SignalStatus, WyckoffPhase};

pub type SymbolId = u64;
pub type SignalId = u64;

/// Risk/reward metrics for one signal, grounded on the same ratio formula
/// used by the fuser's stop-loss/take-profit floor check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskReward {
    pub risk: f64,
    pub reward: f64,
    pub risk_reward_ratio: f64,
    pub risk_percent: f64,
    pub reward_percent: f64,
}

pub fn calculate_signal_risk_reward(
    entry: f64,
    stop_loss: f64,
    take_profit: f64,
    direction: Direction,
) -> RiskReward {
    let (risk, reward) = match direction {
        Direction::Long => ((entry - stop_loss).abs(), (take_profit - entry).abs()),
        Direction::Short => ((stop_loss - entry).abs(), (entry - take_profit).abs()),
    };
    let risk_reward_ratio = if risk > 0.0 { reward / risk } else { 0.0 };
    RiskReward {
        risk,
        reward,
        risk_reward_ratio,
        risk_percent: (risk / entry) * 100.0,
        reward_percent: (reward / entry) * 100.0,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub symbol: String,
    pub interval: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub take_profit_2: f64,
    pub take_profit_3: f64,
    pub confidence: f64,
    pub wyckoff_phase: Option<WyckoffPhase>,
    pub elliott_wave_count: Option<String>,
    pub indicators: JsonValue,
    pub rationale: String,
    pub atr: Option<f64>,
    pub risk_reward: RiskReward,
    pub created_at: DateTime<Utc>,
    pub status: SignalStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCandle {
    pub symbol_id: SymbolId,
    pub interval: String,
    pub candle: Candle,
}

/// Trait boundary for the persistence layer. Every method is async so a
/// networked backend (Postgres, etc.) can be dropped in without touching
/// callers.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn get_or_create_symbol(
        &self,
        symbol: &str,
        exchange: &str,
        quote_asset: &str,
    ) -> anyhow::Result<SymbolId>;

    /// Duplicate `(symbol_id, interval, open_time)` is benign and ignored,
    /// not an error.
    async fn insert_candle(
        &self,
        symbol_id: SymbolId,
        interval: &str,
        candle: Candle,
    ) -> anyhow::Result<()>;

    async fn bulk_insert_candles(
        &self,
        symbol_id: SymbolId,
        interval: &str,
        candles: &[Candle],
    ) -> anyhow::Result<()>;

    async fn insert_signal(&self, signal: Signal) -> anyhow::Result<SignalId>;

    async fn get_candles(
        &self,
        symbol_id: SymbolId,
        interval: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn get_recent_signals(
        &self,
        symbol: Option<&str>,
        interval: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<Signal>>;

    async fn update_signal_status(&self, id: SignalId, status: SignalStatus) -> anyhow::Result<()>;
}

#[derive(Default)]
struct Inner {
    symbols: HashMap<String, SymbolId>,
    candles: HashMap<(SymbolId, String), HashMap<i64, Candle>>,
    signals: Vec<Signal>,
}

/// The sole shipped `SignalStore` implementation: guarded by
/// `parking_lot::RwLock`, no external database dependency. Sufficient for
/// `health-check` and the backtest driver to exercise the full contract.
pub struct InMemorySignalStore {
    inner: RwLock<Inner>,
    next_symbol_id: AtomicU64,
    next_signal_id: AtomicU64,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_symbol_id: AtomicU64::new(1),
            next_signal_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemorySignalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn get_or_create_symbol(
        &self,
        symbol: &str,
        _exchange: &str,
        _quote_asset: &str,
    ) -> anyhow::Result<SymbolId> {
        let mut inner = self.inner.write();
        if let Some(id) = inner.symbols.get(symbol) {
            return Ok(*id);
        }
        let id = self.next_symbol_id.fetch_add(1, Ordering::SeqCst);
        inner.symbols.insert(symbol.to_string(), id);
        Ok(id)
    }

    async fn insert_candle(
        &self,
        symbol_id: SymbolId,
        interval: &str,
        candle: Candle,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        let key = (symbol_id, interval.to_string());
        inner
            .candles
            .entry(key)
            .or_default()
            .entry(candle.open_time)
            .or_insert(candle);
        Ok(())
    }

    async fn bulk_insert_candles(
        &self,
        symbol_id: SymbolId,
        interval: &str,
        candles: &[Candle],
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        let key = (symbol_id, interval.to_string());
        let map = inner.candles.entry(key).or_default();
        for candle in candles {
            map.entry(candle.open_time).or_insert(*candle);
        }
        Ok(())
    }

    async fn insert_signal(&self, mut signal: Signal) -> anyhow::Result<SignalId> {
        let id = self.next_signal_id.fetch_add(1, Ordering::SeqCst);
        signal.id = id;
        self.inner.write().signals.push(signal);
        Ok(id)
    }

    async fn get_candles(
        &self,
        symbol_id: SymbolId,
        interval: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        let inner = self.inner.read();
        let key = (symbol_id, interval.to_string());
        let Some(map) = inner.candles.get(&key) else {
            return Ok(Vec::new());
        };
        let mut candles: Vec<Candle> = map.values().copied().collect();
        candles.sort_by_key(|c| c.open_time);
        if candles.len() > limit {
            let start = candles.len() - limit;
            candles.drain(..start);
        }
        Ok(candles)
    }

    async fn get_recent_signals(
        &self,
        symbol: Option<&str>,
        interval: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<Signal>> {
        let inner = self.inner.read();
        let mut matched: Vec<Signal> = inner
            .signals
            .iter()
            .rev()
            .filter(|s| symbol.map_or(true, |sym| s.symbol == sym))
            .filter(|s| interval.map_or(true, |iv| s.interval == iv))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        Ok(matched)
    }

    async fn update_signal_status(&self, id: SignalId, status: SignalStatus) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        if let Some(signal) = inner.signals.iter_mut().find(|s| s.id == id) {
            signal.status = status;
        }
        Ok(())
    }
}
