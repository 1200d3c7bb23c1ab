// =============================================================================
// Volume surge test + volume profile / point of control
// =============================================================================

use std::collections::BTreeMap;

use crate::candle::Candle;

/// True when the most recent bar's volume exceeds `threshold` times the mean
/// volume of the preceding 19 bars. Requires at least 20 candles.
pub fn check_volume_surge(candles: &[Candle], threshold: f64) -> bool {
    if candles.len() < 20 {
        return false;
    }
    let recent_volume = candles.last().unwrap().volume;
    let window = &candles[candles.len() - 20..candles.len() - 1];
    let avg_volume = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
    recent_volume > avg_volume * threshold
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeProfile {
    pub poc_price: f64,
    pub poc_volume: f64,
    pub bin_size: f64,
}

/// Distributes each candle's volume across the price bins it spans and
/// reports the point of control (the bin with the most volume).
pub fn calculate_volume_profile(candles: &[Candle], bins: usize) -> Option<VolumeProfile> {
    if candles.is_empty() || bins == 0 {
        return None;
    }

    let price_min = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let price_max = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let price_range = price_max - price_min;
    if price_range <= 0.0 || !price_range.is_finite() {
        return None;
    }
    let bin_size = price_range / bins as f64;

    // Keyed by bin index so float bin-prices never need to be hashed.
    let mut volume_by_bin: BTreeMap<i64, f64> = BTreeMap::new();

    for c in candles {
        let candle_range = c.high - c.low;
        if candle_range == 0.0 {
            let bin_idx = ((c.close - price_min) / bin_size).floor() as i64;
            *volume_by_bin.entry(bin_idx).or_insert(0.0) += c.volume;
            continue;
        }
        for i in 0..bins as i64 {
            let bin_low = price_min + i as f64 * bin_size;
            let bin_high = bin_low + bin_size;
            if bin_low <= c.high && bin_high >= c.low {
                let overlap = c.high.min(bin_high) - c.low.max(bin_low);
                if overlap > 0.0 {
                    let contribution = (overlap / candle_range) * c.volume;
                    *volume_by_bin.entry(i).or_insert(0.0) += contribution;
                }
            }
        }
    }

    let (poc_bin, poc_volume) = volume_by_bin
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(bin, vol)| (*bin, *vol))?;

    Some(VolumeProfile {
        poc_price: price_min + poc_bin as f64 * bin_size,
        poc_volume,
        bin_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high,
            low,
            close,
            volume,
            quote_volume: volume * close,
            trades_count: 1,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
            is_closed: true,
        }
    }

    #[test]
    fn surge_requires_twenty_candles() {
        let candles = vec![candle(101.0, 99.0, 100.0, 100.0); 10];
        assert!(!check_volume_surge(&candles, 1.5));
    }

    #[test]
    fn detects_surge() {
        let mut candles = vec![candle(101.0, 99.0, 100.0, 100.0); 19];
        candles.push(candle(101.0, 99.0, 100.0, 500.0));
        assert!(check_volume_surge(&candles, 1.5));
    }

    #[test]
    fn no_surge_under_threshold() {
        let candles = vec![candle(101.0, 99.0, 100.0, 100.0); 20];
        assert!(!check_volume_surge(&candles, 1.5));
    }

    #[test]
    fn profile_finds_high_volume_bin() {
        let mut candles = vec![candle(101.0, 99.0, 100.0, 10.0); 10];
        candles.push(candle(151.0, 149.0, 150.0, 1000.0));
        let profile = calculate_volume_profile(&candles, 20).unwrap();
        assert!(profile.poc_price > 120.0, "POC should sit near the heavy-volume bar, got {}", profile.poc_price);
    }

    #[test]
    fn empty_candles_returns_none() {
        assert!(calculate_volume_profile(&[], 20).is_none());
    }
}
