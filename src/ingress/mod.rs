// =============================================================================
// Market data ingress — Binance REST + WebSocket
// =============================================================================
//
// `BinanceIngress` bundles the historical REST client with the live
// multiplexed kline WebSocket stream. The two halves share nothing at
// runtime; they are bundled here only so callers construct one object.

pub mod rest;
pub mod ws;

use std::sync::Arc;

use crate::candle::CandleAggregator;
pub use rest::BinanceRest;

pub struct BinanceIngress {
    pub rest: BinanceRest,
    reconnect_delay_secs: u64,
    ws_max_retries: i64,
}

impl BinanceIngress {
    pub fn new(
        requests_per_minute: u32,
        max_candles_per_request: u32,
        reconnect_delay_secs: u64,
        ws_max_retries: i64,
    ) -> Self {
        Self {
            rest: BinanceRest::new(requests_per_minute, max_candles_per_request),
            reconnect_delay_secs,
            ws_max_retries,
        }
    }

    /// Runs the combined kline stream for every (symbol, interval) pair until
    /// retries are exhausted (or forever, if `ws_max_retries` is negative).
    /// Intended to be driven from its own `tokio::spawn`.
    pub async fn run_streams(
        &self,
        symbols: Vec<String>,
        intervals: Vec<String>,
        aggregator: Arc<CandleAggregator>,
    ) {
        ws::run(
            symbols,
            intervals,
            aggregator,
            self.reconnect_delay_secs,
            self.ws_max_retries,
        )
        .await;
    }
}
