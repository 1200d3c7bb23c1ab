// =============================================================================
// CLI surface
// =============================================================================
//
// `clap`-derived subcommands: `serve`, `backtest`, `clean`, `reset`,
// `diagnose`, `health-check`. Argument parsing only; `main.rs` dispatches.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aurora-signals")]
#[command(about = "Real-time market-surveillance signal engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the live engine: ingress -> aggregator -> fuser -> store/notifier.
    Serve,

    /// Replay historical candles through the fuser and report simulated PnL.
    Backtest {
        /// Trading pair, e.g. BTCUSDT.
        #[arg(long)]
        symbol: String,

        /// Candle interval, e.g. 1h.
        #[arg(long, default_value = "1h")]
        interval: String,

        /// How many days of history to fetch before replaying.
        #[arg(long, default_value_t = 90)]
        days: u32,

        /// Overrides MIN_CONFIDENCE for this run only.
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Starting simulated account balance.
        #[arg(long, default_value_t = 10_000.0)]
        initial_balance: f64,

        /// Fraction of balance risked per position (0..1).
        #[arg(long, default_value_t = 0.02)]
        position_size: f64,

        /// Also open positions on single-analyzer tiers (3.5 / 4).
        #[arg(long, default_value_t = false)]
        allow_single: bool,

        /// Minimum confidence required for a single-analyzer-tier signal,
        /// only consulted when `allow_single` is set.
        #[arg(long, default_value_t = 0.75)]
        single_confidence: f64,
    },

    /// Prune stored candles and/or signals.
    Clean {
        /// Report what would be deleted without deleting it.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Prune stored candles.
        #[arg(long, default_value_t = false)]
        candles: bool,

        /// Prune stored signals.
        #[arg(long, default_value_t = false)]
        signals: bool,

        /// Prune both candles and signals.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Only prune rows older than this many days.
        #[arg(long, default_value_t = 90)]
        days: u32,

        /// Print row counts only, take no action.
        #[arg(long, default_value_t = false)]
        stats: bool,
    },

    /// Wipe all stored candles and signals.
    Reset {
        /// Report what would be deleted without deleting it.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Required to actually perform the reset.
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },

    /// Dump, per configured symbol, how many candles are buffered and what
    /// each analyzer currently thinks.
    Diagnose {
        /// Restrict to one symbol; defaults to every configured symbol.
        #[arg(long)]
        symbol: Option<String>,

        /// Restrict to one interval; defaults to every configured timeframe.
        #[arg(long)]
        interval: Option<String>,
    },

    /// Check environment, store, ingress connectivity and analyzer load
    /// without starting the engine.
    HealthCheck,
}
