// =============================================================================
// State Store — persisted ledger, setup journal and summary bookkeeping
// =============================================================================
//
// A single JSON document survives restarts. A missing file is a first run and
// a corrupt file is logged and replaced by an empty state; neither stops the
// process. Writes use the same tmp + rename pattern as the config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ledger::Ledger;
use crate::outcome::OutcomeReport;
use crate::setup_engine::Setup;
use crate::types::Outcome;

/// A sent setup plus its latest outcome annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupRecord {
    pub id: String,
    pub setup: Setup,
    #[serde(default = "default_outcome")]
    pub outcome: Outcome,
    #[serde(default)]
    pub resolved_at: Option<i64>,
}

fn default_outcome() -> Outcome {
    Outcome::Open
}

impl SetupRecord {
    pub fn new(setup: Setup) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            setup,
            outcome: Outcome::Open,
            resolved_at: None,
        }
    }

    pub fn annotate(&mut self, report: OutcomeReport) {
        self.outcome = report.outcome;
        self.resolved_at = report.resolved_at;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub ledger: Ledger,

    /// Sent setups, oldest first.
    #[serde(default)]
    pub journal: Vec<SetupRecord>,

    /// Local date (`%Y-%m-%d`) of the last daily summary sent.
    #[serde(default)]
    pub last_summary_date: Option<String>,
}

impl PersistedState {
    /// Load state from `path`, falling back to an empty state when the file
    /// is missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no state file yet, starting empty");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state file unreadable, starting empty");
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&content) {
            Ok(state) => {
                info!(
                    path = %path.display(),
                    ledger_keys = state.ledger.len(),
                    journal = state.journal.len(),
                    "state loaded"
                );
                state
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state file corrupt, starting empty");
                Self::default()
            }
        }
    }

    /// Persist to `path` atomically (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialise state")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp state to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp state to {}", path.display()))?;

        Ok(())
    }

    /// Append `setup` to the journal, keeping at most `limit` records.
    /// Returns the generated record id.
    pub fn journal_setup(&mut self, setup: Setup, limit: usize) -> String {
        let record = SetupRecord::new(setup);
        let id = record.id.clone();
        self.journal.push(record);
        if self.journal.len() > limit {
            let excess = self.journal.len() - limit;
            self.journal.drain(..excess);
        }
        id
    }

    /// Indices of journal records created in `[start, end)`.
    pub fn journal_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<usize> {
        self.journal
            .iter()
            .enumerate()
            .filter(|(_, r)| r.setup.created_at >= start && r.setup.created_at < end)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn annotate(&mut self, id: &str, report: OutcomeReport) -> bool {
        match self.journal.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.annotate(report);
                true
            }
            None => false,
        }
    }
}
