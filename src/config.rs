// =============================================================================
// Environment-driven configuration
// =============================================================================
//
// `Config::load()` reads every variable named in the external-interfaces
// surface, applying the literal defaults used throughout the fuser and
// ingress client, and fails fast with a human-readable list of invalid
// entries rather than limping along with partial configuration.

use std::env;

use anyhow::bail;

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_timeframes() -> Vec<String> {
    vec!["15m".to_string(), "1h".to_string(), "4h".to_string()]
}

#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub min_confidence: f64,
    pub signal_cooldown_secs: u64,
    pub symbol_cooldown_secs: u64,
    pub conflict_window_secs: u64,
    pub anti_spam_window_secs: u64,
    pub anti_spam_min_move_pct: f64,
    pub reward_risk_floor: f64,
    pub enable_wyckoff: bool,
    pub enable_elliott: bool,
    pub ws_reconnect_delay_secs: u64,
    pub ws_max_retries: i64,
    pub binance_rate_limit_per_minute: u32,
    pub max_candles_per_request: u32,
    pub window_size: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    pub store_url: Option<String>,
    pub store_key: Option<String>,
    pub notifier_token: Option<String>,
    pub notifier_channel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl Config {
    /// Loads configuration from the process environment, applying
    /// `.env` overrides via `dotenv` if present. Fails fast with every
    /// validation error collected, not just the first.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();

        let mut errors: Vec<String> = Vec::new();

        let symbols = env_list("SYMBOLS").unwrap_or_else(default_symbols);
        let timeframes = env_list("TIMEFRAMES").unwrap_or_else(default_timeframes);

        let min_confidence = env_parse_or("MIN_CONFIDENCE", 0.65, &mut errors);
        if !(0.0..=1.0).contains(&min_confidence) {
            errors.push(format!(
                "MIN_CONFIDENCE must be within 0..1, got {min_confidence}"
            ));
        }

        let signal_cooldown_secs = env_parse_or("SIGNAL_COOLDOWN", 300, &mut errors);
        let symbol_cooldown_secs = env_parse_or("SYMBOL_COOLDOWN", 3600, &mut errors);
        let conflict_window_secs = env_parse_or("CONFLICT_WINDOW", 3600, &mut errors);
        let anti_spam_window_secs = env_parse_or("ANTI_SPAM_WINDOW", 3600, &mut errors);
        let anti_spam_min_move_pct = env_parse_or("ANTI_SPAM_MIN_MOVE_PCT", 0.015, &mut errors);
        let reward_risk_floor = env_parse_or("REWARD_RISK_FLOOR", 1.2, &mut errors);

        let enable_wyckoff = env_bool_or("ENABLE_WYCKOFF", true);
        let enable_elliott = env_bool_or("ENABLE_ELLIOTT", true);

        let ws_reconnect_delay_secs = env_parse_or("WS_RECONNECT_DELAY", 5, &mut errors);
        let ws_max_retries: i64 = env_parse_or("WS_MAX_RETRIES", -1, &mut errors);

        let binance_rate_limit_per_minute =
            env_parse_or("BINANCE_RATE_LIMIT_PER_MINUTE", 1200, &mut errors);
        let max_candles_per_request = env_parse_or("MAX_CANDLES_PER_REQUEST", 1500, &mut errors);
        if max_candles_per_request > 1500 {
            errors.push(format!(
                "MAX_CANDLES_PER_REQUEST exceeds the exchange's per-request cap of 1500, got {max_candles_per_request}"
            ));
        }

        let window_size = env_parse_or("WINDOW_SIZE", 500, &mut errors);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("text") | Err(_) => LogFormat::Text,
            Ok(other) => {
                errors.push(format!("LOG_FORMAT must be 'json' or 'text', got '{other}'"));
                LogFormat::Text
            }
        };

        if !errors.is_empty() {
            bail!("invalid configuration:\n  - {}", errors.join("\n  - "));
        }

        Ok(Self {
            symbols,
            timeframes,
            min_confidence,
            signal_cooldown_secs,
            symbol_cooldown_secs,
            conflict_window_secs,
            anti_spam_window_secs,
            anti_spam_min_move_pct,
            reward_risk_floor,
            enable_wyckoff,
            enable_elliott,
            ws_reconnect_delay_secs,
            ws_max_retries,
            binance_rate_limit_per_minute,
            max_candles_per_request,
            window_size,
            log_level,
            log_format,
            store_url: env::var("STORE_URL").ok(),
            store_key: env::var("STORE_KEY").ok(),
            notifier_token: env::var("NOTIFIER_TOKEN").ok(),
            notifier_channel: env::var("NOTIFIER_CHANNEL").ok(),
        })
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn env_parse_or<T>(key: &str, default: T, errors: &mut Vec<String>) -> T
where
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Err(_) => default,
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(e) => {
                errors.push(format!("{key}='{raw}' is invalid: {e}"));
                default
            }
        },
    }
}

fn env_bool_or(key: &str, default: bool) -> bool {
    match env::var(key) {
        Err(_) => default,
        Ok(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    }
}

/// Used by `health-check` to confirm required store/notifier credentials are
/// present without asserting connectivity (no live credentials are assumed
/// to exist in this repository).
pub fn describe_missing_backends(config: &Config) -> Vec<String> {
    let mut missing = Vec::new();
    if config.store_url.is_none() {
        missing.push("STORE_URL not set (using in-memory store only)".to_string());
    }
    if config.notifier_token.is_none() {
        missing.push("NOTIFIER_TOKEN not set (using logging notifier only)".to_string());
    }
    missing
}
