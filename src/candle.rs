// =============================================================================
// Candle aggregator
// =============================================================================
//
// Maintains a bounded rolling window per (symbol, interval), detects bar-close
// transitions, and fans out a bar-close event to every registered listener
// concurrently so that symbols whose bars close at the same instant are
// analyzed in parallel rather than serialized.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::store::SignalStore;

/// Exchange/quote-asset tag every candle is persisted under. This engine
/// only ever talks to Binance spot USDT pairs, matching the original
/// system's `quote_asset: str = "USDT"` default.
const EXCHANGE: &str = "BINANCE";
const QUOTE_ASSET: &str = "USDT";

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades_count: u64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub is_closed: bool,
}

/// Identifies a rolling window: one symbol crossed with one bar interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandleKey {
    pub symbol: String,
    pub interval: String,
}

impl CandleKey {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
        }
    }
}

impl fmt::Display for CandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

/// A listener invoked once per closed bar. Boxed so the aggregator can hold a
/// heterogeneous set (fuser, metrics, diagnostics) without generics leaking
/// into `CandleAggregator`.
pub type CloseListener = Arc<
    dyn Fn(CandleKey, Candle) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send
        + Sync,
>;

pub struct CandleAggregator {
    buffers: RwLock<HashMap<CandleKey, VecDeque<Candle>>>,
    max_candles: usize,
    listeners: RwLock<Vec<CloseListener>>,
    store: Arc<dyn SignalStore>,
}

impl CandleAggregator {
    pub fn new(max_candles: usize, store: Arc<dyn SignalStore>) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_candles,
            listeners: RwLock::new(Vec::new()),
            store,
        }
    }

    /// Registers a listener to run on every bar-close event.
    pub fn on_candle_close(&self, listener: CloseListener) {
        self.listeners.write().push(listener);
    }

    /// Accepts one candle update (partial or final) for `key`.
    ///
    /// If `candle.open_time` matches the stored last entry, it is replaced in
    /// place. If it is strictly greater, the previous last entry is treated as
    /// CLOSED regardless of its own `is_closed` flag — the open_time
    /// transition *is* the definition of closure — listeners fire for it, and
    /// `candle` is appended as the new last entry.
    #[instrument(skip(self, candle), fields(symbol = %key.symbol, interval = %key.interval))]
    pub async fn process_candle(&self, key: CandleKey, candle: Candle) {
        let closed = {
            let mut buffers = self.buffers.write();
            let window = buffers.entry(key.clone()).or_insert_with(VecDeque::new);

            let mut closed_candle = None;
            match window.back() {
                Some(last) if last.open_time == candle.open_time => {
                    *window.back_mut().unwrap() = candle;
                }
                Some(last) if candle.open_time > last.open_time => {
                    closed_candle = Some(*last);
                    window.push_back(candle);
                    if window.len() > self.max_candles {
                        window.pop_front();
                    }
                }
                Some(_) => {
                    // Stale/out-of-order update for an already-superseded bar; ignore.
                    warn!("received out-of-order candle update, ignoring");
                }
                None => {
                    window.push_back(candle);
                }
            }
            closed_candle
        };

        if let Some(closed_candle) = closed {
            debug!(open_time = closed_candle.open_time, "bar closed");
            self.persist_candle(key.clone(), closed_candle);
            self.fire_close_listeners(key, closed_candle).await;
        }
    }

    /// Fires a best-effort, fire-and-forget persist of one closed candle.
    /// Failures are logged and swallowed — a dropped candle write must never
    /// block or kill the ingest pipeline.
    fn persist_candle(&self, key: CandleKey, candle: Candle) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let symbol_id = match store
                .get_or_create_symbol(&key.symbol, EXCHANGE, QUOTE_ASSET)
                .await
            {
                Ok(id) => id,
                Err(err) => {
                    error!(%err, symbol = %key.symbol, "failed to resolve symbol id, dropping candle");
                    return;
                }
            };
            if let Err(err) = store.insert_candle(symbol_id, &key.interval, candle).await {
                error!(%err, symbol = %key.symbol, interval = %key.interval, "failed to persist candle");
            }
        });
    }

    /// Bulk-seeds memory for `key` without firing close listeners, and
    /// persists the same batch to the store. Used to warm up the rolling
    /// window from historical data before live ingress starts.
    pub async fn process_historical_candles(&self, key: CandleKey, candles: Vec<Candle>) {
        if candles.is_empty() {
            return;
        }
        {
            let mut buffers = self.buffers.write();
            let window = buffers.entry(key.clone()).or_insert_with(VecDeque::new);
            window.clear();
            let start = candles.len().saturating_sub(self.max_candles);
            window.extend(candles[start..].iter().copied());
        }

        match self
            .store
            .get_or_create_symbol(&key.symbol, EXCHANGE, QUOTE_ASSET)
            .await
        {
            Ok(symbol_id) => {
                if let Err(err) = self
                    .store
                    .bulk_insert_candles(symbol_id, &key.interval, &candles)
                    .await
                {
                    error!(%err, symbol = %key.symbol, interval = %key.interval, "failed to bulk-insert historical candles");
                }
            }
            Err(err) => {
                error!(%err, symbol = %key.symbol, "failed to resolve symbol id, skipping historical persist");
            }
        }
    }

    /// Snapshot read of up to `limit` most recent candles (oldest first).
    pub fn get_candles(&self, key: &CandleKey, limit: Option<usize>) -> Vec<Candle> {
        let buffers = self.buffers.read();
        match buffers.get(key) {
            None => Vec::new(),
            Some(window) => match limit {
                None => window.iter().copied().collect(),
                Some(n) => {
                    let start = window.len().saturating_sub(n);
                    window.iter().skip(start).copied().collect()
                }
            },
        }
    }

    /// Runs every registered listener concurrently for one bar-close event.
    /// An individual listener's failure is logged and does not cancel peers.
    async fn fire_close_listeners(&self, key: CandleKey, candle: Candle) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }

        let tasks = listeners.into_iter().map(|listener| {
            let key = key.clone();
            tokio::spawn(async move {
                if let Err(err) = listener(key, candle).await {
                    error!(%err, "bar-close listener failed");
                }
            })
        });

        for task in tasks {
            if let Err(err) = task.await {
                error!(%err, "bar-close listener task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySignalStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn aggregator(max_candles: usize) -> CandleAggregator {
        CandleAggregator::new(max_candles, Arc::new(InMemorySignalStore::new()))
    }

    fn candle(open_time: i64, close: f64, is_closed: bool) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            quote_volume: 1000.0,
            trades_count: 10,
            taker_buy_volume: 50.0,
            taker_buy_quote_volume: 500.0,
            is_closed,
        }
    }

    #[tokio::test]
    async fn replaces_in_progress_candle() {
        let agg = aggregator(500);
        let key = CandleKey::new("BTCUSDT", "1m");
        agg.process_candle(key.clone(), candle(0, 100.0, false)).await;
        agg.process_candle(key.clone(), candle(0, 101.0, false)).await;
        let candles = agg.get_candles(&key, None);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 101.0);
    }

    #[tokio::test]
    async fn open_time_advance_closes_previous_and_fires_listener() {
        let agg = aggregator(500);
        let key = CandleKey::new("BTCUSDT", "1m");
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        agg.on_candle_close(Arc::new(move |_key, c| {
            let fired = fired_clone.clone();
            Box::pin(async move {
                assert_eq!(c.open_time, 0);
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }));

        agg.process_candle(key.clone(), candle(0, 100.0, false)).await;
        agg.process_candle(key.clone(), candle(60_000, 105.0, false)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let candles = agg.get_candles(&key, None);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 100.0);
        assert_eq!(candles[1].close, 105.0);
    }

    #[tokio::test]
    async fn trims_to_max_candles() {
        let agg = aggregator(3);
        let key = CandleKey::new("BTCUSDT", "1m");
        for i in 0..5 {
            agg.process_candle(key.clone(), candle(i * 60_000, 100.0 + i as f64, true))
                .await;
        }
        let candles = agg.get_candles(&key, None);
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].open_time, 2 * 60_000);
    }

    #[tokio::test]
    async fn historical_seed_skips_listeners() {
        let agg = aggregator(500);
        let key = CandleKey::new("ETHUSDT", "15m");
        let historical: Vec<Candle> = (0..10).map(|i| candle(i * 900_000, 100.0, true)).collect();
        agg.process_historical_candles(key.clone(), historical).await;
        assert_eq!(agg.get_candles(&key, None).len(), 10);
    }

    #[tokio::test]
    async fn get_candles_respects_limit() {
        let agg = aggregator(500);
        let key = CandleKey::new("ETHUSDT", "15m");
        let historical: Vec<Candle> = (0..10).map(|i| candle(i * 900_000, 100.0, true)).collect();
        agg.process_historical_candles(key.clone(), historical).await;
        let last3 = agg.get_candles(&key, Some(3));
        assert_eq!(last3.len(), 3);
        assert_eq!(last3[2].open_time, 9 * 900_000);
    }

    #[tokio::test]
    async fn historical_seed_persists_to_store() {
        let store = Arc::new(InMemorySignalStore::new());
        let agg = CandleAggregator::new(500, store.clone());
        let key = CandleKey::new("ETHUSDT", "15m");
        let historical: Vec<Candle> = (0..10).map(|i| candle(i * 900_000, 100.0, true)).collect();
        agg.process_historical_candles(key.clone(), historical).await;

        let symbol_id = store
            .get_or_create_symbol("ETHUSDT", EXCHANGE, QUOTE_ASSET)
            .await
            .unwrap();
        let stored = store.get_candles(symbol_id, "15m", 100).await.unwrap();
        assert_eq!(stored.len(), 10);
    }

    #[tokio::test]
    async fn bar_close_persists_candle_best_effort() {
        let store = Arc::new(InMemorySignalStore::new());
        let agg = CandleAggregator::new(500, store.clone());
        let key = CandleKey::new("BTCUSDT", "1m");
        agg.process_candle(key.clone(), candle(0, 100.0, false)).await;
        agg.process_candle(key.clone(), candle(60_000, 105.0, false)).await;

        // the persist task is spawned fire-and-forget; yield so it can run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let symbol_id = store
            .get_or_create_symbol("BTCUSDT", EXCHANGE, QUOTE_ASSET)
            .await
            .unwrap();
        let stored = store.get_candles(symbol_id, "1m", 100).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].open_time, 0);
    }

    #[test]
    fn key_display() {
        let key = CandleKey::new("BTCUSDT", "1h");
        assert_eq!(key.to_string(), "BTCUSDT@1h");
    }

    /// Registers K=10 listeners that each sleep before recording a start and
    /// end timestamp, then asserts max(start) < min(end) across all of them —
    /// proof that `fire_close_listeners` runs listeners concurrently rather
    /// than serializing them one after another.
    #[tokio::test]
    async fn listeners_fan_out_concurrently() {
        const K: usize = 10;
        let agg = aggregator(500);
        let key = CandleKey::new("BTCUSDT", "1m");

        let starts: Arc<std::sync::Mutex<Vec<tokio::time::Instant>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let ends: Arc<std::sync::Mutex<Vec<tokio::time::Instant>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));

        for _ in 0..K {
            let starts = starts.clone();
            let ends = ends.clone();
            agg.on_candle_close(Arc::new(move |_key, _candle| {
                let starts = starts.clone();
                let ends = ends.clone();
                Box::pin(async move {
                    starts.lock().unwrap().push(tokio::time::Instant::now());
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    ends.lock().unwrap().push(tokio::time::Instant::now());
                    Ok(())
                })
            }));
        }

        agg.process_candle(key.clone(), candle(0, 100.0, false)).await;
        agg.process_candle(key.clone(), candle(60_000, 105.0, false)).await;

        let starts = starts.lock().unwrap();
        let ends = ends.lock().unwrap();
        assert_eq!(starts.len(), K);
        assert_eq!(ends.len(), K);

        let max_start = starts.iter().max().unwrap();
        let min_end = ends.iter().min().unwrap();
        assert!(
            max_start < min_end,
            "listeners did not overlap: max(start)={max_start:?} min(end)={min_end:?}"
        );
    }
}
