// =============================================================================
// Setup Engine — trend pullback evaluator
// =============================================================================
//
// Evaluates one symbol on the last entry candle it is given and either emits
// a fully priced Setup or a typed "no setup" verdict. Callers pass closed
// candles only (see `market_data::drop_unclosed`).
//
// Pipeline:
//   1. Require `min_candles` of entry history
//   2. Compute EMA fast/slow and RSI on the entry timeframe
//   3. Direction from the EMA stack (fast > slow => LONG, mirror => SHORT)
//   4. Optional trend-timeframe confirmation (see htf_analysis)
//   5. EMA gap must exceed `min_ema_gap_pct`, close must sit within
//      `near_value_pct` of the slow EMA
//   6. RSI inside the direction's band, confirmed by the configured trigger
//   7. Stop from ATR or swing structure; wrong-side stops are rejected and
//      near-zero risk is floored at `min_risk_pct * entry`
//   8. Targets at `entry ± risk * R` for each configured multiple
//   9. Round every price with the precision policy
//
// The engine is pure: the creation timestamp is passed in, nothing is read
// from or written to shared state.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decision::{Evaluation, Gate};
use crate::htf_analysis;
use crate::indicators::atr::calculate_atr;
use crate::indicators::ema::last_ema;
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::swing::{swing_high, swing_low};
use crate::market_data::{closes, Candle};
use crate::precision::round_price;
use crate::runtime_config::{RsiTrigger, SetupParams, StopPolicy};
use crate::types::{Direction, Interval};

// =============================================================================
// Setup
// =============================================================================

/// A priced trade idea produced by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub symbol: String,
    pub direction: Direction,
    pub interval: Interval,
    #[serde(default)]
    pub trend_interval: Option<Interval>,

    pub entry: f64,
    pub stop_loss: f64,
    /// Nearest target first.
    pub take_profits: Vec<f64>,
    /// Unrounded entry-to-stop distance after flooring.
    pub risk: f64,

    // --- Supporting indicator values ---
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub rsi_prev: f64,
    #[serde(default)]
    pub atr: Option<f64>,

    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// Open time (ms) of the candle the setup was evaluated on.
    pub candle_open_time: i64,
}

impl Setup {
    /// Dedup key: one cooldown per symbol, direction and timeframe.
    pub fn ledger_key(&self) -> String {
        format!("{}:{}:{}", self.symbol, self.direction, self.interval)
    }

    /// Target used for outcome classification.
    pub fn first_target(&self) -> Option<f64> {
        self.take_profits.first().copied()
    }
}

/// Trend-timeframe candles handed to the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct TrendInput<'a> {
    pub interval: Interval,
    pub candles: &'a [Candle],
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluate `symbol` on the latest candle of `candles`.
pub fn evaluate_setup(
    symbol: &str,
    interval: Interval,
    candles: &[Candle],
    trend: Option<TrendInput<'_>>,
    params: &SetupParams,
    now: DateTime<Utc>,
) -> Evaluation {
    // ── 1. History ───────────────────────────────────────────────────────
    if candles.len() < params.min_candles {
        return Evaluation::blocked(
            Gate::DataQuality,
            format!(
                "insufficient {interval} history: {} < {}",
                candles.len(),
                params.min_candles
            ),
        );
    }

    let Some(last) = candles.last() else {
        return Evaluation::blocked(Gate::DataQuality, "no candles");
    };
    let entry = last.close;
    if !entry.is_finite() || entry <= 0.0 {
        return Evaluation::blocked(Gate::DataQuality, format!("invalid close {entry}"));
    }

    // ── 2. Indicators ────────────────────────────────────────────────────
    let closes = closes(candles);
    let ema_fast = last_ema(&closes, params.ema_fast);
    let ema_slow = last_ema(&closes, params.ema_slow);
    let rsi_series = calculate_rsi(&closes, params.rsi_period);
    // RSI on the entry candle and the one before it.
    let n = closes.len();
    let rsi_pair = rsi_series
        .as_ref()
        .and_then(|s| Some((s.get(n.checked_sub(2)?)?, s.get(n - 1)?)));

    let (Some(ema_fast), Some(ema_slow), Some((rsi_prev, rsi))) = (ema_fast, ema_slow, rsi_pair)
    else {
        return Evaluation::blocked(Gate::DataQuality, "indicators unavailable");
    };

    // ── 3. Direction ─────────────────────────────────────────────────────
    let direction = if ema_fast > ema_slow {
        Direction::Long
    } else if ema_fast < ema_slow {
        Direction::Short
    } else {
        return Evaluation::blocked(Gate::Trend, "EMA fast equals EMA slow");
    };

    // ── 4. Trend timeframe ───────────────────────────────────────────────
    let mut trend_note = None;
    if let Some(trend) = trend {
        let Some(htf) = htf_analysis::analyze(trend.candles, params) else {
            return Evaluation::blocked(
                Gate::TrendFilter,
                format!(
                    "insufficient {} history: {} candles",
                    trend.interval,
                    trend.candles.len()
                ),
            );
        };
        if !htf.permits(direction, &params.trend_filter) {
            return Evaluation::blocked(
                Gate::TrendFilter,
                format!("{} trend {} rejects {direction}", trend.interval, htf.describe()),
            );
        }
        trend_note = Some(format!("{} trend {}", trend.interval, htf.describe()));
    }

    // ── 5. Structure ─────────────────────────────────────────────────────
    let gap_pct = (ema_fast - ema_slow).abs() / entry;
    if gap_pct < params.min_ema_gap_pct {
        return Evaluation::blocked(
            Gate::EmaGap,
            format!(
                "EMA gap {:.3}% below {:.3}%",
                gap_pct * 100.0,
                params.min_ema_gap_pct * 100.0
            ),
        );
    }

    let distance_pct = (entry - ema_slow).abs() / entry;
    if let Some(max_distance) = params.near_value_pct {
        if distance_pct > max_distance {
            return Evaluation::blocked(
                Gate::Pullback,
                format!(
                    "close {:.3}% from EMA{} (max {:.3}%)",
                    distance_pct * 100.0,
                    params.ema_slow,
                    max_distance * 100.0
                ),
            );
        }
    }

    // ── 6. Momentum ──────────────────────────────────────────────────────
    if let Err(reason) = momentum_confirms(direction, rsi_prev, rsi, params) {
        return Evaluation::blocked(Gate::Momentum, reason);
    }

    // ── 7. Stop and risk ─────────────────────────────────────────────────
    let atr = calculate_atr(candles, params.atr_period);
    let sign = direction.sign();

    let raw_stop = match &params.stop {
        StopPolicy::Atr { multiplier } => match atr {
            Some(atr) => entry - sign * atr * multiplier,
            None => return Evaluation::blocked(Gate::DataQuality, "ATR unavailable"),
        },
        StopPolicy::Swing {
            lookback,
            buffer_pct,
        } => {
            let extreme = match direction {
                Direction::Long => swing_low(candles, *lookback).map(|low| low * (1.0 - buffer_pct)),
                Direction::Short => {
                    swing_high(candles, *lookback).map(|high| high * (1.0 + buffer_pct))
                }
            };
            match extreme {
                Some(stop) => stop,
                None => {
                    return Evaluation::blocked(
                        Gate::DataQuality,
                        format!("swing lookback {lookback} exceeds history"),
                    )
                }
            }
        }
    };

    let raw_risk = (entry - raw_stop) * sign;
    if !raw_risk.is_finite() || raw_risk < 0.0 {
        return Evaluation::blocked(
            Gate::Risk,
            format!("stop {raw_stop} on the wrong side of entry {entry}"),
        );
    }
    let risk = raw_risk.max(entry * params.min_risk_pct);

    // ── 8. Targets ───────────────────────────────────────────────────────
    let stop_loss = round_price(entry - sign * risk);
    let take_profits: Vec<f64> = params
        .risk_multiples
        .iter()
        .map(|r| round_price(entry + sign * risk * r))
        .collect();
    let entry = round_price(entry);

    // ── 9. Sanity after rounding ─────────────────────────────────────────
    let ordered = match direction {
        Direction::Long => {
            stop_loss < entry && take_profits.iter().all(|tp| *tp > entry)
        }
        Direction::Short => {
            stop_loss > entry && take_profits.iter().all(|tp| *tp < entry)
        }
    };
    if take_profits.is_empty() || !ordered {
        return Evaluation::blocked(
            Gate::Risk,
            format!("levels collapse after rounding (risk {risk})"),
        );
    }

    let mut reason = format!(
        "EMA{}{}EMA{} (gap {:.2}%), close {:.2}% from EMA{}, RSI {:.1} -> {:.1}",
        params.ema_fast,
        if direction == Direction::Long { ">" } else { "<" },
        params.ema_slow,
        gap_pct * 100.0,
        distance_pct * 100.0,
        params.ema_slow,
        rsi_prev,
        rsi
    );
    if let Some(note) = trend_note {
        reason.push_str(", ");
        reason.push_str(&note);
    }

    debug!(
        symbol,
        %direction,
        entry,
        stop_loss,
        ?take_profits,
        "setup found"
    );

    Evaluation::Setup(Setup {
        symbol: symbol.to_string(),
        direction,
        interval,
        trend_interval: trend.map(|t| t.interval),
        entry,
        stop_loss,
        take_profits,
        risk,
        ema_fast,
        ema_slow,
        rsi,
        rsi_prev,
        atr,
        reason,
        created_at: now,
        candle_open_time: last.open_time,
    })
}

/// Check the RSI band and trigger for `direction`.
fn momentum_confirms(
    direction: Direction,
    rsi_prev: f64,
    rsi: f64,
    params: &SetupParams,
) -> Result<(), String> {
    let band = match direction {
        Direction::Long => params.long_rsi_band,
        Direction::Short => params.short_rsi_band,
    };
    if !band.contains(rsi) {
        return Err(format!(
            "RSI {rsi:.1} outside {direction} band [{}, {}]",
            band.min, band.max
        ));
    }

    let confirmed = match (&params.rsi_trigger, direction) {
        (RsiTrigger::Band, _) => true,
        (RsiTrigger::Turn, Direction::Long) => rsi > rsi_prev,
        (RsiTrigger::Turn, Direction::Short) => rsi < rsi_prev,
        (RsiTrigger::Cross { long_level, .. }, Direction::Long) => {
            rsi_prev < *long_level && rsi >= *long_level
        }
        (RsiTrigger::Cross { short_level, .. }, Direction::Short) => {
            rsi_prev > *short_level && rsi <= *short_level
        }
    };

    if confirmed {
        Ok(())
    } else {
        Err(format!(
            "RSI {rsi_prev:.1} -> {rsi:.1} does not confirm {direction}"
        ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{candles_from_closes, mirrored, pullback_closes, BAR_MS};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn swing_cross_params() -> SetupParams {
        SetupParams {
            rsi_trigger: RsiTrigger::Cross {
                long_level: 40.0,
                short_level: 60.0,
            },
            stop: StopPolicy::Swing {
                lookback: 10,
                buffer_pct: 0.001,
            },
            ..SetupParams::default()
        }
    }

    fn expect_setup(eval: Evaluation) -> Setup {
        match eval {
            Evaluation::Setup(setup) => setup,
            Evaluation::NoSetup { gate, reason } => {
                panic!("expected setup, got {gate}: {reason}")
            }
        }
    }

    fn expect_gate(eval: Evaluation) -> Gate {
        match eval {
            Evaluation::Setup(setup) => panic!("expected no setup, got {setup:?}"),
            Evaluation::NoSetup { gate, .. } => gate,
        }
    }

    #[test]
    fn pullback_in_uptrend_emits_long_below_swing_low() {
        let candles = candles_from_closes(&pullback_closes());
        let params = swing_cross_params();
        let setup = expect_setup(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            None,
            &params,
            now(),
        ));

        assert_eq!(setup.direction, Direction::Long);
        assert!((setup.entry - 110.0).abs() < 1e-9);
        assert!(setup.ema_fast > setup.ema_slow);
        assert!(setup.rsi_prev < 40.0 && setup.rsi >= 40.0);

        // below the 109.05 swing low, padded by 0.1%
        assert!(setup.stop_loss < 109.05);
        assert!((setup.stop_loss - 108.941).abs() < 1e-9);

        // one target at 1.6R
        assert_eq!(setup.take_profits.len(), 1);
        let expected_tp = 110.0 + setup.risk * 1.6;
        assert!((setup.take_profits[0] - expected_tp).abs() < 1e-3);
        assert!((setup.take_profits[0] - 111.694).abs() < 1e-9);

        assert_eq!(setup.candle_open_time, 179 * BAR_MS);
        assert_eq!(setup.created_at, now());
        assert_eq!(setup.ledger_key(), "BTCUSDT:LONG:15m");
    }

    #[test]
    fn mirrored_series_emits_short_above_swing_high() {
        let candles = candles_from_closes(&mirrored(&pullback_closes()));
        let setup = expect_setup(evaluate_setup(
            "ETHUSDT",
            Interval::M15,
            &candles,
            None,
            &swing_cross_params(),
            now(),
        ));

        assert_eq!(setup.direction, Direction::Short);
        assert!((setup.entry - 110.0).abs() < 1e-9);
        assert!(setup.stop_loss > 110.95);
        assert!((setup.stop_loss - 111.061).abs() < 1e-9);
        assert!((setup.take_profits[0] - 108.302).abs() < 1e-9);
    }

    #[test]
    fn default_params_use_atr_stop() {
        let candles = candles_from_closes(&pullback_closes());
        let params = SetupParams::default();
        let setup = expect_setup(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            None,
            &params,
            now(),
        ));
        let atr = setup.atr.unwrap();
        assert!((setup.stop_loss - round_price(110.0 - atr * 1.2)).abs() < 1e-9);
        assert!(setup.stop_loss < setup.entry);
        assert!(setup.take_profits[0] > setup.entry);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let candles = candles_from_closes(&pullback_closes());
        let params = swing_cross_params();
        let a = evaluate_setup("BTCUSDT", Interval::M15, &candles, None, &params, now());
        let b = evaluate_setup("BTCUSDT", Interval::M15, &candles, None, &params, now());
        assert_eq!(a, b);

        let flat = candles_from_closes(&vec![100.0; 150]);
        let a = evaluate_setup("BTCUSDT", Interval::M15, &flat, None, &params, now());
        let b = evaluate_setup("BTCUSDT", Interval::M15, &flat, None, &params, now());
        assert_eq!(a, b);
    }

    #[test]
    fn levels_are_ordered_for_two_targets() {
        let params = SetupParams {
            risk_multiples: vec![1.0, 2.0],
            ..swing_cross_params()
        };
        for closes in [pullback_closes(), mirrored(&pullback_closes())] {
            let candles = candles_from_closes(&closes);
            let setup = expect_setup(evaluate_setup(
                "SOLUSDT",
                Interval::M15,
                &candles,
                None,
                &params,
                now(),
            ));
            let [tp1, tp2] = [setup.take_profits[0], setup.take_profits[1]];
            match setup.direction {
                Direction::Long => {
                    assert!(setup.stop_loss < setup.entry);
                    assert!(setup.entry < tp1 && tp1 < tp2);
                }
                Direction::Short => {
                    assert!(setup.stop_loss > setup.entry);
                    assert!(setup.entry > tp1 && tp1 > tp2);
                }
            }
            assert_eq!(setup.first_target(), Some(tp1));
        }
    }

    #[test]
    fn insufficient_history_is_no_setup() {
        let closes = pullback_closes();
        let candles = candles_from_closes(&closes[closes.len() - 60..]);
        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            None,
            &SetupParams::default(),
            now(),
        ));
        assert_eq!(gate, Gate::DataQuality);

        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &[],
            None,
            &SetupParams::default(),
            now(),
        ));
        assert_eq!(gate, Gate::DataQuality);
    }

    #[test]
    fn flat_market_has_no_direction() {
        let candles = candles_from_closes(&vec![100.0; 150]);
        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            None,
            &SetupParams::default(),
            now(),
        ));
        assert_eq!(gate, Gate::Trend);
    }

    #[test]
    fn straight_rally_is_too_far_from_value() {
        let closes: Vec<f64> = (0..150).map(|i| 100.0 + i as f64 * 0.2).collect();
        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles_from_closes(&closes),
            None,
            &SetupParams::default(),
            now(),
        ));
        assert_eq!(gate, Gate::Pullback);
    }

    #[test]
    fn rsi_outside_band_is_rejected() {
        let params = SetupParams {
            long_rsi_band: crate::runtime_config::RsiBand { min: 50.0, max: 60.0 },
            ..swing_cross_params()
        };
        let candles = candles_from_closes(&pullback_closes());
        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            None,
            &params,
            now(),
        ));
        assert_eq!(gate, Gate::Momentum);
    }

    #[test]
    fn cross_level_not_crossed_is_rejected() {
        let params = SetupParams {
            rsi_trigger: RsiTrigger::Cross {
                long_level: 30.0,
                short_level: 70.0,
            },
            ..swing_cross_params()
        };
        let candles = candles_from_closes(&pullback_closes());
        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            None,
            &params,
            now(),
        ));
        assert_eq!(gate, Gate::Momentum);
    }

    #[test]
    fn trend_timeframe_confirms_or_vetoes() {
        let candles = candles_from_closes(&pullback_closes());
        let params = swing_cross_params();

        let rising: Vec<f64> = (0..80).map(|i| 100.0 + i as f64 * 0.1).collect();
        let rising = candles_from_closes(&rising);
        let setup = expect_setup(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            Some(TrendInput {
                interval: Interval::H1,
                candles: &rising,
            }),
            &params,
            now(),
        ));
        assert_eq!(setup.trend_interval, Some(Interval::H1));
        assert!(setup.reason.contains("1h trend"));

        let falling: Vec<f64> = (0..80).map(|i| 110.0 - i as f64 * 0.1).collect();
        let falling = candles_from_closes(&falling);
        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            Some(TrendInput {
                interval: Interval::H1,
                candles: &falling,
            }),
            &params,
            now(),
        ));
        assert_eq!(gate, Gate::TrendFilter);

        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            Some(TrendInput {
                interval: Interval::H1,
                candles: &rising[..20],
            }),
            &params,
            now(),
        ));
        assert_eq!(gate, Gate::TrendFilter);
    }

    #[test]
    fn tight_stop_is_floored_at_min_risk() {
        let params = SetupParams {
            stop: StopPolicy::Atr { multiplier: 0.01 },
            min_risk_pct: 0.005,
            ..swing_cross_params()
        };
        let candles = candles_from_closes(&pullback_closes());
        let setup = expect_setup(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            None,
            &params,
            now(),
        ));
        assert!((setup.risk - 0.55).abs() < 1e-9);
        assert!((setup.stop_loss - 109.45).abs() < 1e-9);
    }

    #[test]
    fn stop_on_wrong_side_is_rejected() {
        let params = SetupParams {
            stop: StopPolicy::Swing {
                lookback: 10,
                buffer_pct: -0.02,
            },
            ..swing_cross_params()
        };
        let candles = candles_from_closes(&pullback_closes());
        let gate = expect_gate(evaluate_setup(
            "BTCUSDT",
            Interval::M15,
            &candles,
            None,
            &params,
            now(),
        ));
        assert_eq!(gate, Gate::Risk);
    }
}
