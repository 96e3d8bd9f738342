// =============================================================================
// Scan Loop — fetch, evaluate, gate, notify, record
// =============================================================================
//
// One cycle walks the configured symbols in order:
//   1. Fetch entry candles (and trend candles, if configured) with bounded
//      retries; the bar still forming is dropped
//   2. Run the setup evaluator
//   3. Ask the ledger whether the alert key is out of cooldown and under cap
//   4. Deliver the alert
//   5. Record it in the ledger and journal, then persist
//
// Any failure is confined to its symbol for this cycle. Cycles run
// back-to-back on a fixed period and never overlap.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alerts::{format_setup, format_startup};
use crate::app_state::AppState;
use crate::decision::Evaluation;
use crate::market_data::{drop_unclosed, fetch_with_retry};
use crate::setup_engine::{evaluate_setup, TrendInput};

/// Per-cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub scanned: usize,
    pub fetch_failures: usize,
    pub setups: usize,
    pub suppressed: usize,
    pub sent: usize,
    pub notify_failures: usize,
}

/// What happened to one symbol in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolResult {
    FetchFailed,
    NoSetup,
    Suppressed,
    NotifyFailed,
    Sent,
}

/// Send the one-off "monitoring started" notice.
pub async fn announce_start(state: &AppState) {
    let text = format_startup(&state.config.symbols, state.config.entry_interval);
    if let Err(e) = state.notifier.notify(&text).await {
        warn!(error = %e, "startup notice not delivered");
    }
}

/// Run the scan loop forever.
pub async fn run_scanner(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.scan_period_secs.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        period_secs = period.as_secs(),
        symbols = state.config.symbols.len(),
        "scan loop starting"
    );

    loop {
        interval.tick().await;
        let stats = run_cycle(&state).await;
        let cycle = state.record_cycle();
        info!(
            cycle,
            scanned = stats.scanned,
            setups = stats.setups,
            sent = stats.sent,
            suppressed = stats.suppressed,
            fetch_failures = stats.fetch_failures,
            "scan cycle complete"
        );
    }
}

/// Scan every configured symbol once.
pub async fn run_cycle(state: &AppState) -> CycleStats {
    let mut stats = CycleStats::default();

    for symbol in &state.config.symbols {
        stats.scanned += 1;
        match scan_symbol(state, symbol).await {
            SymbolResult::FetchFailed => stats.fetch_failures += 1,
            SymbolResult::NoSetup => {}
            SymbolResult::Suppressed => {
                stats.setups += 1;
                stats.suppressed += 1;
            }
            SymbolResult::NotifyFailed => {
                stats.setups += 1;
                stats.notify_failures += 1;
            }
            SymbolResult::Sent => {
                stats.setups += 1;
                stats.sent += 1;
                if state.config.send_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(state.config.send_delay_ms)).await;
                }
            }
        }
    }

    stats
}

async fn scan_symbol(state: &AppState, symbol: &str) -> SymbolResult {
    let config = &state.config;
    let now = Utc::now();
    let now_ms = now.timestamp_millis();

    // ── 1. Candles ───────────────────────────────────────────────────────
    let mut entry_candles = match fetch_with_retry(
        state.source.as_ref(),
        symbol,
        config.entry_interval,
        config.candle_limit,
        &config.fetch,
    )
    .await
    {
        Ok(c) => c,
        Err(e) => {
            warn!(symbol, interval = %config.entry_interval, error = %e, "skipping symbol this cycle");
            return SymbolResult::FetchFailed;
        }
    };
    drop_unclosed(&mut entry_candles, config.entry_interval, now_ms);

    let trend_candles = match config.trend_interval {
        Some(trend_interval) => match fetch_with_retry(
            state.source.as_ref(),
            symbol,
            trend_interval,
            config.candle_limit,
            &config.fetch,
        )
        .await
        {
            Ok(mut c) => {
                drop_unclosed(&mut c, trend_interval, now_ms);
                Some((trend_interval, c))
            }
            Err(e) => {
                warn!(symbol, interval = %trend_interval, error = %e, "skipping symbol this cycle");
                return SymbolResult::FetchFailed;
            }
        },
        None => None,
    };

    // ── 2. Evaluate ──────────────────────────────────────────────────────
    let trend = trend_candles
        .as_ref()
        .map(|(interval, candles)| TrendInput {
            interval: *interval,
            candles,
        });

    let setup = match evaluate_setup(
        symbol,
        config.entry_interval,
        &entry_candles,
        trend,
        &config.setup,
        now,
    ) {
        Evaluation::Setup(setup) => setup,
        Evaluation::NoSetup { gate, reason } => {
            debug!(symbol, %gate, %reason, "no setup");
            return SymbolResult::NoSetup;
        }
    };

    // ── 3. Ledger gate ───────────────────────────────────────────────────
    let key = setup.ledger_key();
    let policy = state.ledger_policy();
    let (allowed, reason) = state.read_state(|s| s.ledger.can_send(&key, now, &policy));
    if !allowed {
        debug!(
            symbol,
            key = %key,
            reason = reason.as_deref().unwrap_or(""),
            "setup suppressed by ledger"
        );
        return SymbolResult::Suppressed;
    }

    // ── 4. Notify ────────────────────────────────────────────────────────
    let text = format_setup(&setup, &config.setup);
    if let Err(e) = state.notifier.notify(&text).await {
        warn!(symbol, key = %key, error = %e, "alert delivery failed");
        return SymbolResult::NotifyFailed;
    }

    info!(
        symbol,
        direction = %setup.direction,
        entry = setup.entry,
        stop_loss = setup.stop_loss,
        take_profits = ?setup.take_profits,
        "setup alert sent"
    );

    // ── 5. Record ────────────────────────────────────────────────────────
    let journal_limit = config.journal_limit;
    let id = state.update_state(|s| {
        s.ledger.record_sent(&key, now);
        s.journal_setup(setup, journal_limit)
    });
    let total = state.record_alert();
    debug!(symbol, id = %id, alerts_total = total, "setup journaled");

    SymbolResult::Sent
}
