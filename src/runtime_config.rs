// =============================================================================
// Runtime Configuration — scanner settings with atomic save
// =============================================================================
//
// Every tunable parameter of the scanner lives here and is handed to the
// evaluator and the loops at construction time; nothing reads process-wide
// mutable constants.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market_data::RetryPolicy;
use crate::types::Interval;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "SOLUSDT".to_string(),
        "TONUSDT".to_string(),
    ]
}

fn default_candle_limit() -> usize {
    250
}

fn default_scan_period_secs() -> u64 {
    60
}

fn default_cooldown_secs() -> i64 {
    90 * 60
}

fn default_daily_cap() -> u32 {
    6
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_tz_offset_hours() -> i32 {
    2
}

fn default_daily_summary_hour() -> u32 {
    21
}

fn default_send_delay_ms() -> u64 {
    250
}

fn default_notify_timeout_secs() -> u64 {
    12
}

fn default_journal_limit() -> usize {
    500
}

fn default_min_candles() -> usize {
    120
}

fn default_ema_fast() -> usize {
    20
}

fn default_ema_slow() -> usize {
    50
}

fn default_rsi_period() -> usize {
    14
}

fn default_atr_period() -> usize {
    14
}

fn default_min_ema_gap_pct() -> f64 {
    0.0015
}

fn default_near_value_pct() -> Option<f64> {
    Some(0.0025)
}

fn default_long_rsi_band() -> RsiBand {
    RsiBand { min: 35.0, max: 60.0 }
}

fn default_short_rsi_band() -> RsiBand {
    RsiBand { min: 40.0, max: 65.0 }
}

fn default_min_risk_pct() -> f64 {
    0.001
}

fn default_risk_multiples() -> Vec<f64> {
    vec![1.6]
}

// =============================================================================
// Setup policy
// =============================================================================

/// Inclusive RSI window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiBand {
    pub min: f64,
    pub max: f64,
}

impl RsiBand {
    pub fn contains(&self, rsi: f64) -> bool {
        (self.min..=self.max).contains(&rsi)
    }
}

/// How RSI momentum confirms a direction on the entry timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RsiTrigger {
    /// The current RSI lies inside the direction's band.
    Band,
    /// Inside the band and turning: rising for longs, falling for shorts.
    Turn,
    /// Inside the band and crossing the level on the latest bar: up through
    /// `long_level` for longs, down through `short_level` for shorts.
    Cross { long_level: f64, short_level: f64 },
}

impl Default for RsiTrigger {
    fn default() -> Self {
        Self::Band
    }
}

/// Where the protective stop is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StopPolicy {
    /// `entry ∓ ATR * multiplier`.
    Atr { multiplier: f64 },
    /// Beyond the swing extreme of the last `lookback` candles, padded by
    /// `buffer_pct` (a fraction of that extreme).
    Swing { lookback: usize, buffer_pct: f64 },
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self::Atr { multiplier: 1.2 }
    }
}

/// Trend-timeframe confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFilter {
    /// Also require trend-timeframe RSI above 50 for longs, below 50 for
    /// shorts.
    #[serde(default = "default_true")]
    pub require_rsi_side: bool,
}

impl Default for TrendFilter {
    fn default() -> Self {
        Self {
            require_rsi_side: true,
        }
    }
}

/// Tunable parameters of the setup evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupParams {
    /// Candles required on the entry timeframe before anything is evaluated.
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,

    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,

    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// Minimum `|fast - slow| / price`; flatter markets are skipped.
    #[serde(default = "default_min_ema_gap_pct")]
    pub min_ema_gap_pct: f64,

    /// Maximum `|price - slow| / price`. `None` disables the pullback gate.
    #[serde(default = "default_near_value_pct")]
    pub near_value_pct: Option<f64>,

    #[serde(default = "default_long_rsi_band")]
    pub long_rsi_band: RsiBand,

    #[serde(default = "default_short_rsi_band")]
    pub short_rsi_band: RsiBand,

    #[serde(default)]
    pub rsi_trigger: RsiTrigger,

    /// Applied only when a trend interval is configured.
    #[serde(default)]
    pub trend_filter: TrendFilter,

    #[serde(default)]
    pub stop: StopPolicy,

    /// Risk floor as a fraction of entry. Closer stops are widened to it.
    #[serde(default = "default_min_risk_pct")]
    pub min_risk_pct: f64,

    /// Take-profit distances in multiples of risk, nearest first.
    #[serde(default = "default_risk_multiples")]
    pub risk_multiples: Vec<f64>,
}

impl Default for SetupParams {
    fn default() -> Self {
        Self {
            min_candles: default_min_candles(),
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
            rsi_period: default_rsi_period(),
            atr_period: default_atr_period(),
            min_ema_gap_pct: default_min_ema_gap_pct(),
            near_value_pct: default_near_value_pct(),
            long_rsi_band: default_long_rsi_band(),
            short_rsi_band: default_short_rsi_band(),
            rsi_trigger: RsiTrigger::default(),
            trend_filter: TrendFilter::default(),
            stop: StopPolicy::default(),
            min_risk_pct: default_min_risk_pct(),
            risk_multiples: default_risk_multiples(),
        }
    }
}

impl SetupParams {
    /// Reject parameter combinations the evaluator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.ema_fast == 0 || self.ema_slow == 0 || self.rsi_period == 0 || self.atr_period == 0 {
            bail!("indicator periods must be positive");
        }
        if self.ema_fast >= self.ema_slow {
            bail!(
                "ema_fast ({}) must be shorter than ema_slow ({})",
                self.ema_fast,
                self.ema_slow
            );
        }
        if self.risk_multiples.is_empty() || self.risk_multiples.iter().any(|m| *m <= 0.0) {
            bail!("risk_multiples must be a non-empty list of positive numbers");
        }
        if !(self.min_risk_pct > 0.0 && self.min_risk_pct < 1.0) {
            bail!("min_risk_pct {} must be in (0, 1)", self.min_risk_pct);
        }
        if !(0.0..1.0).contains(&self.min_ema_gap_pct) {
            bail!("min_ema_gap_pct {} must be in [0, 1)", self.min_ema_gap_pct);
        }
        if let Some(near) = self.near_value_pct {
            if !(near > 0.0 && near < 1.0) {
                bail!("near_value_pct {near} must be in (0, 1)");
            }
        }
        for (name, band) in [("long_rsi_band", self.long_rsi_band), ("short_rsi_band", self.short_rsi_band)] {
            if band.min > band.max {
                bail!("{name}: min {} exceeds max {}", band.min, band.max);
            }
        }
        match &self.stop {
            StopPolicy::Atr { multiplier } if *multiplier <= 0.0 => {
                bail!("ATR stop multiplier must be positive")
            }
            StopPolicy::Swing { lookback: 0, .. } => bail!("swing lookback must be positive"),
            StopPolicy::Swing { buffer_pct, .. } if *buffer_pct < 0.0 => {
                bail!("swing buffer_pct must not be negative")
            }
            _ => {}
        }
        Ok(())
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration of the scanner process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Market universe ----------------------------------------------------

    /// Exchange tickers to scan.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Timeframe setups are evaluated on.
    #[serde(default)]
    pub entry_interval: Interval,

    /// Optional slower timeframe that must agree with the setup direction.
    #[serde(default)]
    pub trend_interval: Option<Interval>,

    /// Candles requested per fetch.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,

    // --- Scheduling ---------------------------------------------------------

    #[serde(default = "default_scan_period_secs")]
    pub scan_period_secs: u64,

    /// Pause between two consecutive alerts inside one cycle.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,

    #[serde(default)]
    pub fetch: RetryPolicy,

    /// Upper bound for one chat delivery.
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,

    // --- Alert gating -------------------------------------------------------

    /// Minimum seconds between two alerts with the same key.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,

    /// Maximum alerts per key per UTC day.
    #[serde(default = "default_daily_cap")]
    pub daily_cap: u32,

    // --- Persistence & reporting --------------------------------------------

    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Setups kept in the persisted journal.
    #[serde(default = "default_journal_limit")]
    pub journal_limit: usize,

    /// Local time offset used by the daily summary (hours east of UTC).
    #[serde(default = "default_tz_offset_hours")]
    pub tz_offset_hours: i32,

    #[serde(default = "default_true")]
    pub daily_summary_enabled: bool,

    #[serde(default = "default_daily_summary_hour")]
    pub daily_summary_hour: u32,

    #[serde(default)]
    pub daily_summary_minute: u32,

    // --- Strategy -----------------------------------------------------------

    #[serde(default)]
    pub setup: SetupParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            entry_interval: Interval::default(),
            trend_interval: None,
            candle_limit: default_candle_limit(),
            scan_period_secs: default_scan_period_secs(),
            send_delay_ms: default_send_delay_ms(),
            fetch: RetryPolicy::default(),
            notify_timeout_secs: default_notify_timeout_secs(),
            cooldown_secs: default_cooldown_secs(),
            daily_cap: default_daily_cap(),
            state_path: default_state_path(),
            journal_limit: default_journal_limit(),
            tz_offset_hours: default_tz_offset_hours(),
            daily_summary_enabled: true,
            daily_summary_hour: default_daily_summary_hour(),
            daily_summary_minute: 0,
            setup: SetupParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            entry_interval = %config.entry_interval,
            "scanner config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "scanner config saved (atomic)");
        Ok(())
    }

    /// Sanity-check the whole configuration.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("no symbols configured");
        }
        if self.scan_period_secs == 0 {
            bail!("scan_period_secs must be positive");
        }
        if !(1..=10).contains(&self.fetch.max_attempts) {
            bail!("fetch.max_attempts {} must be between 1 and 10", self.fetch.max_attempts);
        }
        if self.fetch.timeout_secs == 0 || self.notify_timeout_secs == 0 {
            bail!("fetch and notify timeouts must be positive");
        }
        if self.cooldown_secs < 0 {
            bail!("cooldown_secs must not be negative");
        }
        if self.daily_summary_hour > 23 || self.daily_summary_minute > 59 {
            bail!(
                "daily summary time {:02}:{:02} is not a valid time of day",
                self.daily_summary_hour,
                self.daily_summary_minute
            );
        }
        if !(-12..=14).contains(&self.tz_offset_hours) {
            bail!("tz_offset_hours {} is out of range", self.tz_offset_hours);
        }
        if self.candle_limit < self.setup.min_candles {
            bail!(
                "candle_limit ({}) is below setup.min_candles ({})",
                self.candle_limit,
                self.setup.min_candles
            );
        }
        self.setup.validate()
    }

    /// Normalise ticker spelling (trimmed, upper case, no blanks).
    pub fn normalise_symbols(&mut self) {
        self.symbols = self
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.symbols.len(), 5);
        assert_eq!(cfg.symbols[0], "BTCUSDT");
        assert_eq!(cfg.symbols[4], "TONUSDT");
        assert_eq!(cfg.entry_interval, Interval::M15);
        assert!(cfg.trend_interval.is_none());
        assert_eq!(cfg.cooldown_secs, 5400);
        assert_eq!(cfg.setup.ema_fast, 20);
        assert_eq!(cfg.setup.ema_slow, 50);
        assert_eq!(cfg.setup.stop, StopPolicy::Atr { multiplier: 1.2 });
        assert_eq!(cfg.setup.risk_multiples, vec![1.6]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.candle_limit, 250);
        assert_eq!(cfg.fetch.max_attempts, 3);
        assert_eq!(cfg.notify_timeout_secs, 12);
        assert!(cfg.daily_summary_enabled);
        assert_eq!(cfg.setup.near_value_pct, Some(0.0025));
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "symbols": ["ETHUSDT"],
            "trend_interval": "1h",
            "setup": {
                "rsi_trigger": { "mode": "cross", "long_level": 40, "short_level": 60 },
                "stop": { "mode": "swing", "lookback": 10, "buffer_pct": 0.001 },
                "near_value_pct": null,
                "risk_multiples": [1.0, 2.0]
            }
        }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["ETHUSDT"]);
        assert_eq!(cfg.trend_interval, Some(Interval::H1));
        assert_eq!(
            cfg.setup.rsi_trigger,
            RsiTrigger::Cross { long_level: 40.0, short_level: 60.0 }
        );
        assert_eq!(
            cfg.setup.stop,
            StopPolicy::Swing { lookback: 10, buffer_pct: 0.001 }
        );
        assert_eq!(cfg.setup.near_value_pct, None);
        assert_eq!(cfg.setup.ema_slow, 50);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_emas() {
        let mut cfg = RuntimeConfig::default();
        cfg.setup.ema_fast = 50;
        cfg.setup.ema_slow = 20;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_targets_and_bad_time() {
        let mut cfg = RuntimeConfig::default();
        cfg.setup.risk_multiples.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.daily_summary_hour = 24;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_bounds_retry_and_percentages() {
        let mut cfg = RuntimeConfig::default();
        cfg.fetch.max_attempts = 0;
        assert!(cfg.validate().is_err());
        cfg.fetch.max_attempts = 50;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.setup.min_ema_gap_pct = -0.01;
        assert!(cfg.validate().is_err());
        cfg.setup.min_ema_gap_pct = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.setup.near_value_pct = Some(-0.5);
        assert!(cfg.validate().is_err());
        cfg.setup.near_value_pct = Some(3.0);
        assert!(cfg.validate().is_err());
        cfg.setup.near_value_pct = None;
        assert!(cfg.validate().is_ok());

        let mut cfg = RuntimeConfig::default();
        cfg.notify_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn normalise_symbols_trims_and_uppercases() {
        let mut cfg = RuntimeConfig {
            symbols: vec![" btcusdt".into(), "".into(), "EthUsdt ".into()],
            ..RuntimeConfig::default()
        };
        cfg.normalise_symbols();
        assert_eq!(cfg.symbols, vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner_config.json");
        let mut cfg = RuntimeConfig::default();
        cfg.daily_cap = 2;
        cfg.save(&path).unwrap();
        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.daily_cap, 2);
        assert_eq!(loaded.setup, cfg.setup);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RuntimeConfig::load(dir.path().join("nope.json")).is_err());
    }
}
