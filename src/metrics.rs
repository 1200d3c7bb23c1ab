// =============================================================================
// Metrics — in-process counters and rolling time-bucketed tallies
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::types::Direction;

struct Inner {
    // signal_counts[symbol][interval][direction]
    signal_counts: HashMap<String, HashMap<String, HashMap<Direction, u64>>>,
    total_by_direction: HashMap<Direction, u64>,
    signal_timestamps: Vec<(DateTime<Utc>, String, String, Direction)>,
    hits: u64,
    stops: u64,
    pending: u64,
    start_time: DateTime<Utc>,
}

impl Inner {
    fn new() -> Self {
        Self {
            signal_counts: HashMap::new(),
            total_by_direction: HashMap::new(),
            signal_timestamps: Vec::new(),
            hits: 0,
            stops: 0,
            pending: 0,
            start_time: Utc::now(),
        }
    }
}

/// Thread-safe counters keyed by (symbol, interval, direction) plus a
/// timestamped signal log supporting "last hour" and "today" windows.
pub struct Metrics {
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_seconds: i64,
    pub uptime_formatted: String,
    pub total_signals: u64,
    pub long_signals: u64,
    pub short_signals: u64,
    pub signals_last_hour: u64,
    pub signals_today: u64,
    pub hits: u64,
    pub stops: u64,
    pub pending: u64,
    pub win_rate: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn increment_signal(&self, symbol: &str, interval: &str, direction: Direction) {
        let mut inner = self.inner.lock();
        *inner
            .signal_counts
            .entry(symbol.to_string())
            .or_default()
            .entry(interval.to_string())
            .or_default()
            .entry(direction)
            .or_insert(0) += 1;
        *inner.total_by_direction.entry(direction).or_insert(0) += 1;
        let now = Utc::now();
        inner
            .signal_timestamps
            .push((now, symbol.to_string(), interval.to_string(), direction));
    }

    pub fn increment_hit(&self) {
        self.inner.lock().hits += 1;
    }

    pub fn increment_stop(&self) {
        self.inner.lock().stops += 1;
    }

    pub fn get_signal_count(
        &self,
        symbol: Option<&str>,
        interval: Option<&str>,
        direction: Option<Direction>,
    ) -> u64 {
        let inner = self.inner.lock();
        match (symbol, interval, direction) {
            (Some(sym), Some(iv), Some(dir)) => inner
                .signal_counts
                .get(sym)
                .and_then(|m| m.get(iv))
                .and_then(|m| m.get(&dir))
                .copied()
                .unwrap_or(0),
            (Some(sym), Some(iv), None) => inner
                .signal_counts
                .get(sym)
                .and_then(|m| m.get(iv))
                .map(|m| m.values().sum())
                .unwrap_or(0),
            (Some(sym), None, _) => inner
                .signal_counts
                .get(sym)
                .map(|by_interval| by_interval.values().map(|m| m.values().sum::<u64>()).sum())
                .unwrap_or(0),
            (None, _, Some(dir)) => inner.total_by_direction.get(&dir).copied().unwrap_or(0),
            _ => inner.total_by_direction.values().sum(),
        }
    }

    pub fn get_signals_last_hour(&self) -> u64 {
        let inner = self.inner.lock();
        let cutoff = Utc::now() - Duration::hours(1);
        inner
            .signal_timestamps
            .iter()
            .filter(|(ts, ..)| *ts >= cutoff)
            .count() as u64
    }

    pub fn get_signals_today(&self) -> u64 {
        let inner = self.inner.lock();
        let today = Utc::now().date_naive();
        inner
            .signal_timestamps
            .iter()
            .filter(|(ts, ..)| ts.date_naive() == today)
            .count() as u64
    }

    pub fn get_win_rate(&self) -> f64 {
        let inner = self.inner.lock();
        let closed = inner.hits + inner.stops;
        if closed == 0 {
            0.0
        } else {
            inner.hits as f64 / closed as f64
        }
    }

    pub fn get_summary(&self) -> MetricsSummary {
        let uptime = Utc::now() - self.inner.lock().start_time;
        MetricsSummary {
            uptime_seconds: uptime.num_seconds(),
            uptime_formatted: format_uptime(uptime),
            total_signals: self.get_signal_count(None, None, None),
            long_signals: self.get_signal_count(None, None, Some(Direction::Long)),
            short_signals: self.get_signal_count(None, None, Some(Direction::Short)),
            signals_last_hour: self.get_signals_last_hour(),
            signals_today: self.get_signals_today(),
            hits: self.inner.lock().hits,
            stops: self.inner.lock().stops,
            pending: self.inner.lock().pending,
            win_rate: self.get_win_rate(),
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = Inner::new();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn format_uptime(uptime: Duration) -> String {
    let days = uptime.num_days();
    let hours = uptime.num_hours() % 24;
    let minutes = uptime.num_minutes() % 60;
    let seconds = uptime.num_seconds() % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}
