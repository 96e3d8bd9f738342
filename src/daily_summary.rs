// =============================================================================
// Daily Summary — end-of-day outcome report
// =============================================================================
//
// Runs alongside the scan loop. Once per local day (UTC + tz_offset_hours), at
// or after the configured local time, every setup journaled that day is
// replayed against fresh candles, annotated with its outcome and counted.
// The local date of the last summary is persisted so a restart does not send
// it twice.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Timelike, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alerts::format_daily_summary;
use crate::app_state::AppState;
use crate::market_data::{fetch_with_retry, Candle};
use crate::outcome::{evaluate_outcome, window_covers, OutcomeReport};
use crate::setup_engine::Setup;
use crate::types::{Interval, Outcome};

/// How often the task checks whether the summary is due.
const CHECK_PERIOD: Duration = Duration::from_secs(30);

/// Largest kline page the exchange serves.
const MAX_REPLAY_CANDLES: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyTally {
    pub total: usize,
    pub wins: usize,
    pub losses: usize,
    pub open: usize,
}

impl DailyTally {
    fn add(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Open => self.open += 1,
        }
    }
}

fn local_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// Local date for which a summary is due at `now`, if any.
pub fn summary_due(
    now: DateTime<Utc>,
    tz_offset_hours: i32,
    hour: u32,
    minute: u32,
    last_summary_date: Option<&str>,
) -> Option<NaiveDate> {
    let local = now.with_timezone(&local_offset(tz_offset_hours));
    let today = local.date_naive();

    if last_summary_date == Some(today.format("%Y-%m-%d").to_string().as_str()) {
        return None;
    }
    if (local.hour(), local.minute()) < (hour, minute) {
        return None;
    }
    Some(today)
}

/// UTC bounds `[start, end)` of local calendar day `date`.
pub fn local_day_bounds(
    date: NaiveDate,
    tz_offset_hours: i32,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let start = local_offset(tz_offset_hours)
        .from_local_datetime(&midnight)
        .single()?
        .with_timezone(&Utc);
    Some((start, start + chrono::Duration::days(1)))
}

/// Candles needed to replay from `origin_ms` up to `now`, at least `floor` and
/// at most `MAX_REPLAY_CANDLES`.
fn replay_limit(now: DateTime<Utc>, origin_ms: i64, interval: Interval, floor: usize) -> usize {
    let elapsed = (now.timestamp_millis() - origin_ms).max(0);
    let bars = (elapsed / interval.duration_ms()) as usize + 2;
    bars.max(floor).min(MAX_REPLAY_CANDLES)
}

/// Send the summary if it is due at `now`. Returns the tally when a summary
/// was produced.
pub async fn run_summary_if_due(state: &AppState, now: DateTime<Utc>) -> Option<DailyTally> {
    let config = &state.config;

    let last = state.read_state(|s| s.last_summary_date.clone());
    let today = summary_due(
        now,
        config.tz_offset_hours,
        config.daily_summary_hour,
        config.daily_summary_minute,
        last.as_deref(),
    )?;
    let (start, end) = local_day_bounds(today, config.tz_offset_hours)?;

    // Snapshot today's records; the lock is released before any network work.
    let todays: Vec<(String, Setup)> = state.read_state(|s| {
        s.journal_between(start, end)
            .into_iter()
            .map(|i| (s.journal[i].id.clone(), s.journal[i].setup.clone()))
            .collect()
    });

    info!(date = %today, setups = todays.len(), "building daily summary");

    // One fetch per (symbol, interval), deep enough for its oldest setup.
    let mut origins: HashMap<(String, Interval), i64> = HashMap::new();
    for (_, setup) in &todays {
        origins
            .entry((setup.symbol.clone(), setup.interval))
            .and_modify(|t| *t = (*t).min(setup.candle_open_time))
            .or_insert(setup.candle_open_time);
    }

    let mut windows: HashMap<(String, Interval), Option<Vec<Candle>>> = HashMap::new();
    for (key, origin) in origins {
        let (symbol, interval) = &key;
        let limit = replay_limit(now, origin, *interval, config.candle_limit);
        let fetched = match fetch_with_retry(
            state.source.as_ref(),
            symbol,
            *interval,
            limit,
            &config.fetch,
        )
        .await
        {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "summary: candles unavailable, counting as open");
                None
            }
        };
        windows.insert(key, fetched);
    }

    let mut tally = DailyTally::default();
    let mut reports: Vec<(String, OutcomeReport)> = Vec::with_capacity(todays.len());

    for (id, setup) in &todays {
        let key = (setup.symbol.clone(), setup.interval);
        match windows.get(&key).and_then(|w| w.as_deref()) {
            Some(candles) if window_covers(setup, candles) => {
                let report = evaluate_outcome(setup, candles);
                debug!(id = %id, symbol = %setup.symbol, outcome = %report.outcome, "setup outcome");
                tally.add(report.outcome);
                reports.push((id.clone(), report));
            }
            Some(_) => {
                warn!(id = %id, symbol = %setup.symbol, "summary: candles do not reach back to the setup, counting as open");
                tally.add(Outcome::Open);
            }
            None => tally.add(Outcome::Open),
        }
    }

    let date_label = today.format("%Y-%m-%d").to_string();
    state.update_state(|s| {
        for (id, report) in &reports {
            s.annotate(id, *report);
        }
        s.last_summary_date = Some(date_label.clone());
    });

    let text = format_daily_summary(&tally, config.daily_summary_hour, config.daily_summary_minute);
    if let Err(e) = state.notifier.notify(&text).await {
        warn!(error = %e, "daily summary not delivered");
    }

    info!(
        date = %date_label,
        total = tally.total,
        wins = tally.wins,
        losses = tally.losses,
        open = tally.open,
        "daily summary sent"
    );
    Some(tally)
}

/// Check for a due summary every 30 seconds, forever.
pub async fn run_daily_summary(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(CHECK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        hour = state.config.daily_summary_hour,
        minute = state.config.daily_summary_minute,
        tz_offset_hours = state.config.tz_offset_hours,
        "daily summary task starting"
    );

    loop {
        interval.tick().await;
        run_summary_if_due(&state, Utc::now()).await;
    }
}
