// =============================================================================
// Setup Scanner — Main Entry Point
// =============================================================================
//
// Polls recent candles for a handful of USDT perpetuals, looks for trend
// pullback setups and announces them to a chat. A second task sends an
// end-of-day outcome summary.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod app_state;
mod bybit;
mod daily_summary;
mod decision;
mod htf_analysis;
mod indicators;
mod ledger;
mod market_data;
mod notify;
mod outcome;
mod precision;
mod runtime_config;
mod scanner;
mod setup_engine;
mod state_store;
mod types;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::bybit::BybitClient;
use crate::market_data::CandleSource;
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::runtime_config::RuntimeConfig;
use crate::state_store::PersistedState;

const DEFAULT_CONFIG_PATH: &str = "scanner_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Setup Scanner — Starting Up                       ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        let defaults = RuntimeConfig::default();
        // Leave an editable template behind, never clobber an existing file.
        if !Path::new(&config_path).exists() {
            if let Err(e) = defaults.save(&config_path) {
                warn!(error = %e, "Failed to write default config");
            }
        }
        defaults
    });
    config.normalise_symbols();
    config.validate()?;

    info!(
        symbols = ?config.symbols,
        entry_interval = %config.entry_interval,
        trend_interval = ?config.trend_interval,
        scan_period_secs = config.scan_period_secs,
        "Configured scanner"
    );

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let source: Arc<dyn CandleSource> =
        Arc::new(BybitClient::new(config.fetch.attempt_timeout())?);

    let bot_token = std::env::var("BOT_TOKEN").unwrap_or_default();
    let chat_id = std::env::var("CHAT_ID").unwrap_or_default();
    let notifier: Arc<dyn Notifier> =
        match TelegramNotifier::new(
            &bot_token,
            &chat_id,
            Duration::from_secs(config.notify_timeout_secs),
        ) {
            Ok(telegram) => {
                info!("Telegram notifier configured");
                Arc::new(telegram)
            }
            Err(e) => {
                warn!(error = %e, "Telegram credentials missing, alerts go to the log only");
                Arc::new(LogNotifier)
            }
        };

    // ── 3. Shared state ──────────────────────────────────────────────────
    let persisted = PersistedState::load(&config.state_path);
    let state = Arc::new(AppState::new(config, persisted, source, notifier));

    // ── 4. Scan loop ─────────────────────────────────────────────────────
    scanner::announce_start(&state).await;

    let scan_state = state.clone();
    tokio::spawn(async move {
        scanner::run_scanner(scan_state).await;
    });

    // ── 5. Daily summary ─────────────────────────────────────────────────
    if state.config.daily_summary_enabled {
        let summary_state = state.clone();
        tokio::spawn(async move {
            daily_summary::run_daily_summary(summary_state).await;
        });
    } else {
        info!("Daily summary disabled");
    }

    info!("All tasks running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, saving state");

    if let Err(e) = state.flush() {
        error!(error = %e, "Failed to save state on shutdown");
    }

    info!(
        cycles = state.cycles_completed.load(std::sync::atomic::Ordering::Relaxed),
        alerts = state.alerts_sent.load(std::sync::atomic::Ordering::Relaxed),
        "Setup Scanner shut down complete."
    );
    Ok(())
}
