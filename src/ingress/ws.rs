// =============================================================================
// Binance kline WebSocket stream — multiplexed combined-stream connection
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::candle::{Candle, CandleAggregator, CandleKey};

const WS_BASE_URL: &str = "wss://stream.binance.com:9443";

fn build_combined_url(symbols: &[String], intervals: &[String]) -> String {
    let mut streams = Vec::with_capacity(symbols.len() * intervals.len());
    for symbol in symbols {
        let lower = symbol.to_lowercase();
        for interval in intervals {
            streams.push(format!("{lower}@kline_{interval}"));
        }
    }
    format!("{WS_BASE_URL}/stream?streams={}", streams.join("/"))
}

/// Parses one combined-stream envelope: `{"stream": "...", "data": {"k": {...}}}`.
fn parse_combined_message(text: &str) -> Result<(CandleKey, Candle)> {
    let root: Value = serde_json::from_str(text).context("failed to parse kline JSON")?;
    let data = &root["data"];
    let k = &data["k"];

    let symbol = data["s"].as_str().context("missing field data.s")?.to_uppercase();
    let interval = k["i"].as_str().context("missing field k.i")?.to_string();

    let candle = Candle {
        open_time: k["t"].as_i64().context("missing field k.t")?,
        close_time: k["T"].as_i64().context("missing field k.T")?,
        open: parse_str_f64(&k["o"])?,
        high: parse_str_f64(&k["h"])?,
        low: parse_str_f64(&k["l"])?,
        close: parse_str_f64(&k["c"])?,
        volume: parse_str_f64(&k["v"])?,
        quote_volume: parse_str_f64(&k["q"])?,
        trades_count: k["n"].as_u64().context("missing field k.n")?,
        taker_buy_volume: parse_str_f64(&k["V"])?,
        taker_buy_quote_volume: parse_str_f64(&k["Q"])?,
        is_closed: k["x"].as_bool().context("missing field k.x")?,
    };

    Ok((CandleKey::new(symbol, interval), candle))
}

fn parse_str_f64(val: &Value) -> Result<f64> {
    match val {
        Value::String(s) => s.parse::<f64>().with_context(|| format!("failed to parse '{s}' as f64")),
        Value::Number(n) => n.as_f64().context("field is not a valid f64"),
        other => bail!("unexpected JSON type for numeric field: {other}"),
    }
}

async fn read_messages(
    mut read: impl futures_util::Stream<Item = std::result::Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
    aggregator: &Arc<CandleAggregator>,
) -> Result<()> {
    loop {
        match read.next().await {
            Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                match parse_combined_message(&text) {
                    Ok((key, candle)) => {
                        debug!(%key, close = candle.close, closed = candle.is_closed, "candle update");
                        aggregator.process_candle(key, candle).await;
                    }
                    Err(e) => warn!(error = %e, "failed to parse kline message"),
                }
            }
            Some(Ok(_)) => {
                // Ping/Pong/Binary/Close frames carry no candle data;
                // tungstenite replies to pings automatically.
            }
            Some(Err(e)) => {
                error!(error = %e, "kline WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!("kline WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Runs the combined kline stream with reconnect-with-backoff. Returns only
/// when `max_retries` (if non-negative) is exhausted; a negative value means
/// unbounded retries.
pub async fn run(
    symbols: Vec<String>,
    intervals: Vec<String>,
    aggregator: Arc<CandleAggregator>,
    reconnect_delay_secs: u64,
    max_retries: i64,
) {
    let url = build_combined_url(&symbols, &intervals);
    let mut retry_count: i64 = 0;
    let mut delay = reconnect_delay_secs;

    loop {
        info!(%url, "connecting to kline WebSocket");
        match connect_async(&url).await {
            Ok((ws_stream, _response)) => {
                info!("kline WebSocket connected");
                // Any successful connection resets the backoff.
                retry_count = 0;
                delay = reconnect_delay_secs;

                let (_write, read) = ws_stream.split();
                if let Err(e) = read_messages(read, &aggregator).await {
                    error!(error = %e, "kline WebSocket read error");
                }
            }
            Err(e) => {
                error!(error = %e, "failed to connect to kline WebSocket");
            }
        }

        retry_count += 1;
        if max_retries >= 0 && retry_count > max_retries {
            error!(retry_count, max_retries, "giving up on kline WebSocket reconnection");
            return;
        }

        info!(delay, "reconnecting kline WebSocket");
        tokio::time::sleep(Duration::from_secs(delay)).await;
        delay = (delay * 2).min(60);
    }
}
