// =============================================================================
// MACD — Moving Average Convergence Divergence
// =============================================================================
//
// macd_line  = EMA(fast) - EMA(slow)
// signal_line = EMA(signal) of macd_line, computed from the point macd_line
//               first becomes defined (index slow-1) and left-padded with
//               zeros so the returned series aligns 1:1 with `closes`.
// histogram  = macd_line - signal_line
//
// Default periods: fast=12, slow=26, signal=9.

/// Seeded EMA identical in shape to `indicators::ema::calculate_ema`, kept
/// local so MACD's internal alignment bookkeeping stays self-contained.
fn seeded_ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; values.len()];
    if values.len() < period || period == 0 {
        return out;
    }
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let multiplier = 2.0 / (period as f64 + 1.0);
    for i in period..values.len() {
        out[i] = (values[i] - out[i - 1]) * multiplier + out[i - 1];
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Computes the full aligned MACD/signal/histogram series.
///
/// Returns `None` when there are fewer than `slow + signal` closes.
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Option<Vec<MacdValue>> {
    if closes.len() < slow + signal {
        return None;
    }

    let ema_fast = seeded_ema(closes, fast);
    let ema_slow = seeded_ema(closes, slow);

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    // macd_line is only meaningful from index slow-1 onward.
    let tail = &macd_line[slow - 1..];
    let signal_tail = seeded_ema(tail, signal);

    let mut signal_line = vec![0.0; macd_line.len()];
    for (i, v) in signal_tail.iter().enumerate() {
        signal_line[slow - 1 + i] = *v;
    }

    let start_idx = slow + signal - 2;
    if start_idx >= macd_line.len() {
        return None;
    }

    let series = macd_line[start_idx..]
        .iter()
        .zip(signal_line[start_idx..].iter())
        .map(|(m, s)| MacdValue {
            macd: *m,
            signal: *s,
            histogram: m - s,
        })
        .collect();

    Some(series)
}

/// Convenience wrapper returning only the most recent MACD value with the
/// standard (12, 26, 9) periods.
pub fn current_macd(closes: &[f64]) -> Option<MacdValue> {
    calculate_macd(closes, 12, 26, 9)?.last().copied()
}
