// =============================================================================
// Alert Ledger — cooldown and daily cap per alert key
// =============================================================================
//
// Two gates decide whether a setup may be sent:
//   1. Cooldown:  at least `cooldown_secs` since the last alert with the
//                same key.
//   2. Daily cap: fewer than `daily_cap` alerts with that key today.
//
// Daily counters are keyed on the UTC calendar date and reset automatically
// when the date rolls over. The ledger itself is plain data; callers keep it
// behind the shared state mutex and persist it after every accepted alert.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gate limits applied by the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerPolicy {
    pub cooldown_secs: i64,
    pub daily_cap: u32,
}

/// Bookkeeping for one alert key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unix seconds of the most recent accepted alert.
    pub last_sent: i64,
    /// UTC date (`%Y-%m-%d`) the counter belongs to.
    pub day: String,
    /// Alerts sent on `day`.
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<String, LedgerEntry>,
}

fn utc_day(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

impl Ledger {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Alerts sent today for `key`, honouring the UTC day rollover.
    pub fn sent_today(&self, key: &str, now: DateTime<Utc>) -> u32 {
        let today = utc_day(now);
        self.entries
            .get(key)
            .filter(|e| e.day == today)
            .map_or(0, |e| e.count)
    }

    /// Check both gates.
    ///
    /// Returns `(true, None)` if the alert may be sent, or `(false,
    /// Some(reason))` naming the gate that blocks it.
    pub fn can_send(
        &self,
        key: &str,
        now: DateTime<Utc>,
        policy: &LedgerPolicy,
    ) -> (bool, Option<String>) {
        let Some(entry) = self.entries.get(key) else {
            if policy.daily_cap == 0 {
                return (false, Some("daily cap is zero".to_string()));
            }
            return (true, None);
        };

        let elapsed = now.timestamp() - entry.last_sent;
        if elapsed < policy.cooldown_secs {
            return (
                false,
                Some(format!(
                    "cooldown: {}s since last alert (need {}s)",
                    elapsed, policy.cooldown_secs
                )),
            );
        }

        let sent = self.sent_today(key, now);
        if sent >= policy.daily_cap {
            return (
                false,
                Some(format!(
                    "daily cap reached: {} alerts today (limit {})",
                    sent, policy.daily_cap
                )),
            );
        }

        (true, None)
    }

    #[cfg(test)]
    pub fn is_allowed(&self, key: &str, now: DateTime<Utc>, policy: &LedgerPolicy) -> bool {
        self.can_send(key, now, policy).0
    }

    /// Register an accepted alert. `last_sent` never moves backwards.
    pub fn record_sent(&mut self, key: &str, now: DateTime<Utc>) {
        let today = utc_day(now);
        let ts = now.timestamp();

        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| LedgerEntry {
                last_sent: ts,
                day: today.clone(),
                count: 0,
            });

        if entry.day != today {
            debug!(key, old_day = %entry.day, new_day = %today, "ledger day rolled");
            entry.day = today;
            entry.count = 0;
        }
        entry.last_sent = entry.last_sent.max(ts);
        entry.count += 1;
    }
}
