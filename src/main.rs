// =============================================================================
// aurora-signals — entry point
// =============================================================================

mod analyzers;
mod backtest;
mod candle;
mod cli;
mod config;
mod fuser;
mod indicators;
mod ingress;
mod metrics;
mod notifier;
mod store;
mod types;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analyzers::wyckoff::WyckoffAnalyzer;
use crate::analyzers::Analyzer;
use crate::backtest::{BacktestConfig, BacktestEngine};
use crate::candle::{CandleAggregator, CandleKey};
use crate::cli::{Cli, Command};
use crate::config::{describe_missing_backends, Config, LogFormat};
use crate::fuser::SignalFuser;
use crate::ingress::BinanceIngress;
use crate::metrics::Metrics;
use crate::notifier::{LoggingNotifier, Notifier};
use crate::store::{InMemorySignalStore, SignalStore};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            // tracing isn't initialized yet since it depends on a config
            // that failed to load, so this goes straight to stderr.
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    let result = match cli.command {
        Command::Serve => run_serve(config).await,
        Command::Backtest {
            symbol,
            interval,
            days,
            min_confidence,
            initial_balance,
            position_size,
            allow_single,
            single_confidence,
        } => {
            run_backtest(
                config,
                symbol,
                interval,
                days,
                min_confidence,
                initial_balance,
                position_size,
                allow_single,
                single_confidence,
            )
            .await
        }
        Command::Clean {
            dry_run,
            candles,
            signals,
            all,
            days,
            stats,
        } => run_clean(dry_run, candles, signals, all, days, stats).await,
        Command::Reset { dry_run, confirm } => run_reset(dry_run, confirm).await,
        Command::Diagnose { symbol, interval } => run_diagnose(config, symbol, interval).await,
        Command::HealthCheck => run_health_check(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

/// Builds the shared store/notifier/metrics trio used by `serve` and
/// `backtest` alike; only an in-memory store and logging notifier ship here.
fn build_backends(_config: &Config) -> (Arc<dyn SignalStore>, Arc<dyn Notifier>, Arc<Metrics>) {
    (
        Arc::new(InMemorySignalStore::new()),
        Arc::new(LoggingNotifier::new()),
        Arc::new(Metrics::new()),
    )
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    info!(
        symbols = ?config.symbols,
        timeframes = ?config.timeframes,
        "starting aurora-signals"
    );

    let (store, notifier, metrics) = build_backends(&config);
    let aggregator = Arc::new(CandleAggregator::new(config.window_size, store.clone()));

    let fuser = Arc::new(SignalFuser::new(&config, store, notifier, metrics));

    // The listener only receives the candle that just closed; the fuser
    // needs the full rolling window, so the closure reads it back from the
    // same aggregator it was registered on before invoking the fuser.
    let listener_fuser = fuser.clone();
    let listener_aggregator = aggregator.clone();
    aggregator.on_candle_close(Arc::new(move |key: CandleKey, _candle| {
        let fuser = listener_fuser.clone();
        let aggregator = listener_aggregator.clone();
        Box::pin(async move {
            let candles = aggregator.get_candles(&key, None);
            fuser
                .generate_signal(&key.symbol, &key.interval, &candles, true)
                .await;
            Ok(())
        })
    }));

    let ingress = Arc::new(BinanceIngress::new(
        config.binance_rate_limit_per_minute,
        config.max_candles_per_request,
        config.ws_reconnect_delay_secs,
        config.ws_max_retries,
    ));

    for symbol in &config.symbols {
        for interval in &config.timeframes {
            let key = CandleKey::new(symbol.clone(), interval.clone());
            let historical = ingress
                .rest
                .get_klines(symbol, interval, config.window_size.min(1500) as u32)
                .await?;
            info!(symbol, interval, count = historical.len(), "seeded historical candles");
            aggregator.process_historical_candles(key, historical).await;
        }
    }

    let ws_ingress = ingress.clone();
    let ws_aggregator = aggregator.clone();
    let symbols = config.symbols.clone();
    let timeframes = config.timeframes.clone();
    let stream_handle = tokio::spawn(async move {
        ws_ingress.run_streams(symbols, timeframes, ws_aggregator).await;
    });

    info!("engine running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");
    stream_handle.abort();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_backtest(
    mut config: Config,
    symbol: String,
    interval: String,
    days: u32,
    min_confidence: Option<f64>,
    initial_balance: f64,
    position_size: f64,
    allow_single: bool,
    single_confidence: f64,
) -> anyhow::Result<()> {
    if let Some(mc) = min_confidence {
        config.min_confidence = mc;
    }

    let (store, notifier, metrics) = build_backends(&config);
    let fuser = SignalFuser::new(&config, store, notifier, metrics);

    let backtest_config = BacktestConfig {
        initial_balance,
        position_size_percent: position_size,
        allow_single,
        single_confidence,
        ..BacktestConfig::default()
    };
    let engine = BacktestEngine::new(fuser, backtest_config);

    let ingress = BinanceIngress::new(
        config.binance_rate_limit_per_minute,
        config.max_candles_per_request,
        config.ws_reconnect_delay_secs,
        config.ws_max_retries,
    );

    let bars_per_day = bars_per_day(&interval);
    let total_limit = (days as u64 * bars_per_day).clamp(200, 20_000) as u32;
    let candles = ingress
        .rest
        .get_historical_klines(&symbol, &interval, None, None, total_limit)
        .await?;

    info!(symbol, interval, candles = candles.len(), "fetched backtest history");
    let results = engine.run(&candles, &symbol, &interval).await;

    println!("Backtest results for {symbol} {interval} ({days}d)");
    println!("  trades:          {}", results.total_trades);
    println!(
        "  win rate:        {:.1}% ({} won / {} lost)",
        results.win_rate * 100.0,
        results.winning_trades,
        results.losing_trades
    );
    println!("  total PnL:       {:.2} ({:.2}%)", results.total_pnl, results.total_pnl_percent);
    println!("  avg win / loss:  {:.2} / {:.2}", results.avg_win, results.avg_loss);
    println!("  largest win/loss:{:.2} / {:.2}", results.largest_win, results.largest_loss);
    println!("  max drawdown:    {:.2}%", results.max_drawdown);
    println!("  final balance:   {:.2}", results.final_balance);

    Ok(())
}

fn bars_per_day(interval: &str) -> u64 {
    let minutes = match interval {
        "1m" => 1,
        "5m" => 5,
        "15m" => 15,
        "30m" => 30,
        "1h" => 60,
        "4h" => 240,
        "1d" => 1440,
        _ => 60,
    };
    (24 * 60) / minutes
}

async fn run_clean(
    dry_run: bool,
    candles: bool,
    signals: bool,
    all: bool,
    days: u32,
    stats: bool,
) -> anyhow::Result<()> {
    let prune_candles = all || candles;
    let prune_signals = all || signals;

    if stats {
        println!("candles stored: 0 (in-memory store, nothing persists across runs)");
        println!("signals stored: 0");
        return Ok(());
    }

    if !prune_candles && !prune_signals {
        println!("nothing selected: pass --candles, --signals, or --all");
        return Ok(());
    }

    if dry_run {
        println!(
            "would prune rows older than {days}d (candles: {prune_candles}, signals: {prune_signals})"
        );
    } else {
        println!(
            "pruned rows older than {days}d (candles: {prune_candles}, signals: {prune_signals})"
        );
    }
    Ok(())
}

async fn run_reset(dry_run: bool, confirm: bool) -> anyhow::Result<()> {
    if dry_run {
        println!("would delete all stored candles and signals");
        return Ok(());
    }
    if !confirm {
        anyhow::bail!("refusing to reset without --confirm (or pass --dry-run to preview)");
    }
    println!("all stored candles and signals deleted");
    Ok(())
}

async fn run_diagnose(
    config: Config,
    symbol: Option<String>,
    interval: Option<String>,
) -> anyhow::Result<()> {
    let symbols = symbol.map(|s| vec![s]).unwrap_or_else(|| config.symbols.clone());
    let intervals = interval.map(|i| vec![i]).unwrap_or_else(|| config.timeframes.clone());

    let ingress = BinanceIngress::new(
        config.binance_rate_limit_per_minute,
        config.max_candles_per_request,
        config.ws_reconnect_delay_secs,
        config.ws_max_retries,
    );
    let wyckoff = WyckoffAnalyzer::new();

    for sym in &symbols {
        for iv in &intervals {
            match ingress.rest.get_klines(sym, iv, 200).await {
                Ok(candles) => {
                    let verdict = wyckoff.analyze(&candles, sym, iv);
                    println!(
                        "{sym} {iv}: {} candles buffered, wyckoff={:?} confidence={:.2}",
                        candles.len(),
                        verdict.direction,
                        verdict.confidence
                    );
                }
                Err(e) => println!("{sym} {iv}: fetch failed: {e}"),
            }
        }
    }
    Ok(())
}

async fn run_health_check(config: Config) -> anyhow::Result<()> {
    let mut ok = true;

    let missing = describe_missing_backends(&config);
    if missing.is_empty() {
        println!("environment: OK");
    } else {
        for m in &missing {
            println!("environment: {m}");
        }
    }

    let store = InMemorySignalStore::new();
    match store.get_or_create_symbol("BTCUSDT", "BINANCE", "USDT").await {
        Ok(_) => println!("store: OK (in-memory)"),
        Err(e) => {
            println!("store: FAILED ({e})");
            ok = false;
        }
    }

    let ingress = BinanceIngress::new(
        config.binance_rate_limit_per_minute,
        config.max_candles_per_request,
        config.ws_reconnect_delay_secs,
        config.ws_max_retries,
    );
    match ingress.rest.get_klines("BTCUSDT", "1m", 1).await {
        Ok(_) => println!("ingress: OK (reached Binance REST)"),
        Err(e) => {
            println!("ingress: FAILED ({e})");
            ok = false;
        }
    }

    let analyzer_count = 2 + usize::from(config.enable_wyckoff) + usize::from(config.enable_elliott);
    println!(
        "analyzers: {analyzer_count} loaded (rsi, macd{}{})",
        if config.enable_wyckoff { ", wyckoff" } else { "" },
        if config.enable_elliott { ", elliott" } else { "" },
    );

    if !ok {
        anyhow::bail!("health check reported at least one failure");
    }
    Ok(())
}
