// =============================================================================
// Alert Formatting
// =============================================================================
//
// Plain-text messages for the notifier. Prices are printed with the same
// precision policy used to round them.
// =============================================================================

use crate::daily_summary::DailyTally;
use crate::precision::format_price;
use crate::runtime_config::SetupParams;
use crate::setup_engine::Setup;
use crate::types::{Direction, Interval};

/// Ticker without the quote currency (`BTCUSDT` -> `BTC`).
pub fn coin_name(symbol: &str) -> &str {
    symbol.strip_suffix("USDT").unwrap_or(symbol)
}

pub fn format_setup(setup: &Setup, params: &SetupParams) -> String {
    let side = match setup.direction {
        Direction::Long => "🟢 LONG",
        Direction::Short => "🔴 SHORT",
    };
    let confirm = match setup.direction {
        Direction::Long => "above",
        Direction::Short => "below",
    };

    let mut text = format!(
        "⚡️ Setup {} | {}\n{}\n\nEntry: {}\nSL: {}\n",
        setup.symbol,
        setup.interval,
        side,
        format_price(setup.entry),
        format_price(setup.stop_loss),
    );

    if setup.take_profits.len() == 1 {
        text.push_str(&format!("TP: {}\n", format_price(setup.take_profits[0])));
    } else {
        for (i, tp) in setup.take_profits.iter().enumerate() {
            text.push_str(&format!("TP{}: {}\n", i + 1, format_price(*tp)));
        }
    }

    text.push_str(&format!(
        "\nConfirmation: {} close {} EMA{}\nContext: {}\n",
        setup.interval, confirm, params.ema_fast, setup.reason
    ));
    text
}

pub fn format_startup(symbols: &[String], interval: Interval) -> String {
    let coins: Vec<&str> = symbols.iter().map(|s| coin_name(s)).collect();
    format!("✅ Monitoring started: {} setups for {}", interval, coins.join("/"))
}

pub fn format_daily_summary(tally: &DailyTally, hour: u32, minute: u32) -> String {
    let header = format!("📊 Daily summary ({hour:02}:{minute:02})");
    if tally.total == 0 {
        return format!("{header}\nNo setups today.\nMonitoring continues tomorrow.");
    }
    format!(
        "{header}\nSetups: {}\n✅ TP touched: {}\n❌ SL touched: {}\n⏳ Still open: {}\n\n\
         A level counts once price has touched it.",
        tally.total, tally.wins, tally.losses, tally.open
    )
}
