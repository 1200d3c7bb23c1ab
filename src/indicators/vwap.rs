// =============================================================================
// VWAP — Volume Weighted Average Price
// =============================================================================

use crate::candle::Candle;

/// VWAP over the given candles: sum(typical_price * volume) / sum(volume),
/// where typical_price = (high + low + close) / 3.
pub fn calculate_vwap(candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }

    let mut tp_volume_sum = 0.0;
    let mut volume_sum = 0.0;
    for c in candles {
        let typical_price = (c.high + c.low + c.close) / 3.0;
        tp_volume_sum += typical_price * c.volume;
        volume_sum += c.volume;
    }

    if volume_sum == 0.0 {
        return None;
    }

    let vwap = tp_volume_sum / volume_sum;
    vwap.is_finite().then_some(vwap)
}
