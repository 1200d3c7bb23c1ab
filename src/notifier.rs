// =============================================================================
// Notifier — trait boundary + logging implementation
// =============================================================================
//
// Stands in for the Discord webhook in the original system. `notify` is the
// only method; a networked implementation (Discord, Slack, ...) is a matter
// of adding a second `impl Notifier`.

use async_trait::async_trait;
use tracing::info;

use crate::store::Signal;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, signal: &Signal);
}

/// Renders the signal as a structured `tracing::info!` event — the same
/// role the Discord webhook payload plays, minus the network call.
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, signal: &Signal) {
        info!(
            symbol = %signal.symbol,
            interval = %signal.interval,
            direction = %signal.direction,
            confidence = signal.confidence,
            entry = signal.entry_price,
            stop_loss = signal.stop_loss,
            take_profit = signal.take_profit,
            risk_reward = signal.risk_reward.risk_reward_ratio,
            "signal emitted: {}",
            signal.rationale,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::calculate_signal_risk_reward;
    use crate::types::{Direction, SignalStatus};
    use serde_json::Value as JsonValue;

    fn signal() -> Signal {
        Signal {
            id: 1,
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
            direction: Direction::Long,
            entry_price: 100.0,
            stop_loss: 98.0,
            take_profit: 103.0,
            take_profit_2: 104.5,
            take_profit_3: 106.0,
            confidence: 0.8,
            wyckoff_phase: None,
            elliott_wave_count: None,
            indicators: JsonValue::Null,
            rationale: "test".to_string(),
            atr: None,
            risk_reward: calculate_signal_risk_reward(100.0, 98.0, 103.0, Direction::Long),
            created_at: chrono::Utc::now(),
            status: SignalStatus::default(),
        }
    }

    #[tokio::test]
    async fn logging_notifier_does_not_panic() {
        let notifier = LoggingNotifier::new();
        notifier.notify(&signal()).await;
    }
}
