// =============================================================================
// Binance REST client — historical kline fetches, no API key required
// =============================================================================

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::candle::Candle;

const MAX_RETRIES: u32 = 3;
const EXCHANGE_MAX_PER_REQUEST: u32 = 1500;

/// Token-bucket rate limiter. Callers await a token rather than failing;
/// tokens refill continuously at `requests_per_minute / 60` per second.
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
    requests_per_minute: f64,
}

struct RateLimiterState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            state: Mutex::new(RateLimiterState {
                tokens: requests_per_minute as f64,
                last_refill: Instant::now(),
            }),
            requests_per_minute: requests_per_minute as f64,
        }
    }

    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let refill_rate = self.requests_per_minute / 60.0;
        state.tokens = (state.tokens + elapsed * refill_rate).min(self.requests_per_minute);
        state.last_refill = now;

        if state.tokens < 1.0 {
            let wait_secs = (1.0 - state.tokens) / refill_rate;
            debug!(wait_secs, "rate limit reached, waiting for a token");
            tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
            state.tokens = 1.0;
            state.last_refill = Instant::now();
        }

        state.tokens -= 1.0;
    }
}

/// Public Binance market-data REST client. Historical candles only; no
/// account/order endpoints since this engine never trades.
pub struct BinanceRest {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
    max_candles_per_request: u32,
}

impl BinanceRest {
    pub fn new(requests_per_minute: u32, max_candles_per_request: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: "https://api.binance.com".to_string(),
            rate_limiter: RateLimiter::new(requests_per_minute),
            max_candles_per_request: max_candles_per_request.min(EXCHANGE_MAX_PER_REQUEST),
        }
    }

    /// Single unsigned `GET /api/v3/klines`, `limit` capped to the exchange's
    /// per-request maximum.
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        self.request_klines(symbol, interval, None, None, limit).await
    }

    /// Paginates backward from `end_ms` until `total_limit` candles are
    /// gathered or `start_ms` is reached, concatenating older pages in front.
    pub async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        total_limit: u32,
    ) -> Result<Vec<Candle>> {
        if total_limit <= self.max_candles_per_request {
            return self.request_klines(symbol, interval, start_ms, end_ms, total_limit).await;
        }

        let mut all: Vec<Candle> = Vec::new();
        let mut remaining = total_limit;
        let mut current_end = end_ms;

        loop {
            let batch_limit = remaining.min(self.max_candles_per_request);
            let batch = self
                .request_klines(symbol, interval, start_ms, current_end, batch_limit)
                .await?;
            if batch.is_empty() {
                break;
            }

            let got = batch.len() as u32;
            let oldest_open_time = batch[0].open_time;
            all = [batch, all].concat();
            remaining = remaining.saturating_sub(got);
            current_end = Some(oldest_open_time - 1);

            let start_reached = start_ms.is_some_and(|s| oldest_open_time <= s);
            if got < batch_limit || remaining == 0 || start_reached {
                break;
            }
        }

        debug!(symbol, interval, count = all.len(), "historical klines retrieved");
        Ok(all)
    }

    async fn request_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let limit = limit.min(self.max_candles_per_request);
        let mut attempt = 0u32;

        loop {
            self.rate_limiter.acquire().await;

            let mut url = format!(
                "{}/api/v3/klines?symbol={}&interval={}&limit={}",
                self.base_url, symbol, interval, limit
            );
            if let Some(s) = start_ms {
                url.push_str(&format!("&startTime={s}"));
            }
            if let Some(e) = end_ms {
                url.push_str(&format!("&endTime={e}"));
            }

            let response = match self.client.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        return Err(e).context("klines request failed after retries");
                    }
                    let backoff = 2u64.pow(attempt).min(60);
                    warn!(attempt, backoff, error = %e, "klines request failed, retrying");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(retry_after, "rate limited by Binance, honoring Retry-After");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            let status = response.status();
            if !status.is_success() {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    bail!("Binance GET /api/v3/klines returned {status}");
                }
                let backoff = 2u64.pow(attempt).min(60);
                warn!(%status, attempt, backoff, "klines request failed, retrying");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                continue;
            }

            let body: Value = response.json().await.context("failed to parse klines response")?;
            return parse_klines_response(&body);
        }
    }
}

fn parse_klines_response(body: &Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;
    let mut candles = Vec::with_capacity(raw.len());

    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;
        if arr.len() < 11 {
            warn!(fields = arr.len(), "skipping malformed kline entry");
            continue;
        }

        candles.push(Candle {
            open_time: arr[0].as_i64().unwrap_or(0),
            open: parse_str_f64(&arr[1])?,
            high: parse_str_f64(&arr[2])?,
            low: parse_str_f64(&arr[3])?,
            close: parse_str_f64(&arr[4])?,
            volume: parse_str_f64(&arr[5])?,
            close_time: arr[6].as_i64().unwrap_or(0),
            quote_volume: parse_str_f64(&arr[7])?,
            trades_count: arr[8].as_u64().unwrap_or(0),
            taker_buy_volume: parse_str_f64(&arr[9])?,
            taker_buy_quote_volume: parse_str_f64(&arr[10])?,
            is_closed: true,
        });
    }

    Ok(candles)
}

fn parse_str_f64(val: &Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>().with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        bail!("expected string or number, got: {val}")
    }
}
