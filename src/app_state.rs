// =============================================================================
// Central Application State — Setup Scanner
// =============================================================================
//
// Ties the configuration, the collaborators and the persisted state together
// for the scan loop and the daily summary task.
//
// Thread safety:
//   - The configuration is immutable after startup.
//   - The persisted state sits behind a single parking_lot::Mutex. Both tasks
//     read-modify-write it through `update_state`, which also writes the file
//     before releasing the lock, so no update can be lost. The lock is never
//     held across an `.await`.
//   - Atomic counters for lock-free run statistics.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::ledger::LedgerPolicy;
use crate::market_data::CandleSource;
use crate::notify::Notifier;
use crate::runtime_config::RuntimeConfig;
use crate::state_store::PersistedState;

/// Shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    pub config: RuntimeConfig,

    pub source: Arc<dyn CandleSource>,
    pub notifier: Arc<dyn Notifier>,

    state: Mutex<PersistedState>,

    // ── Run statistics ──────────────────────────────────────────────────
    pub cycles_completed: AtomicU64,
    pub alerts_sent: AtomicU64,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        persisted: PersistedState,
        source: Arc<dyn CandleSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            source,
            notifier,
            state: Mutex::new(persisted),
            cycles_completed: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
        }
    }

    pub fn ledger_policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            cooldown_secs: self.config.cooldown_secs,
            daily_cap: self.config.daily_cap,
        }
    }

    /// Run `f` against the persisted state without writing it back.
    pub fn read_state<R>(&self, f: impl FnOnce(&PersistedState) -> R) -> R {
        let state = self.state.lock();
        f(&state)
    }

    /// Mutate the persisted state and write it to disk while still holding the
    /// lock. A failed write is logged; the in-memory state stays authoritative.
    pub fn update_state<R>(&self, f: impl FnOnce(&mut PersistedState) -> R) -> R {
        let mut state = self.state.lock();
        let out = f(&mut state);
        if let Err(e) = state.save(&self.config.state_path) {
            error!(
                path = %self.config.state_path.display(),
                error = %e,
                "failed to persist state, continuing in memory"
            );
        }
        out
    }

    /// Write the current state to disk (used on shutdown).
    pub fn flush(&self) -> anyhow::Result<()> {
        self.state.lock().save(&self.config.state_path)
    }

    pub fn record_cycle(&self) -> u64 {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_alert(&self) -> u64 {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("symbols", &self.config.symbols)
            .field("state_path", &self.config.state_path)
            .field("cycles_completed", &self.cycles_completed.load(Ordering::Relaxed))
            .field("alerts_sent", &self.alerts_sent.load(Ordering::Relaxed))
            .finish()
    }
}
