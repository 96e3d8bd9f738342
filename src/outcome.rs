// =============================================================================
// Outcome Evaluator — did price reach the target before the stop?
// =============================================================================
//
// Candles after the originating one are walked in chronological order. The
// first candle whose range touches the first target or the stop decides the
// outcome. A candle that touches both is classified as a loss since its
// intrabar order is unknown. Nothing touched means the setup is still open.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::setup_engine::Setup;
use crate::types::{Direction, Outcome};

/// Classification of a setup plus the candle that resolved it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub outcome: Outcome,
    /// Open time (ms) of the resolving candle.
    pub resolved_at: Option<i64>,
}

impl OutcomeReport {
    fn open() -> Self {
        Self {
            outcome: Outcome::Open,
            resolved_at: None,
        }
    }
}

/// Classify `setup` against `candles` (oldest first).
///
/// Candles at or before the setup's originating candle are ignored, so the
/// same window always yields the same report.
pub fn evaluate_outcome(setup: &Setup, candles: &[Candle]) -> OutcomeReport {
    let Some(target) = setup.first_target() else {
        return OutcomeReport::open();
    };
    let stop = setup.stop_loss;

    for candle in candles
        .iter()
        .filter(|c| c.open_time > setup.candle_open_time)
    {
        let (tp_hit, sl_hit) = match setup.direction {
            Direction::Long => (candle.high >= target, candle.low <= stop),
            Direction::Short => (candle.low <= target, candle.high >= stop),
        };

        let outcome = match (tp_hit, sl_hit) {
            (_, true) => Outcome::Loss,
            (true, false) => Outcome::Win,
            (false, false) => continue,
        };

        return OutcomeReport {
            outcome,
            resolved_at: Some(candle.open_time),
        };
    }

    OutcomeReport::open()
}

/// Whether `candles` start early enough to replay `setup` without a gap: the
/// first candle must open no later than the one right after the originating
/// candle. A window that starts later could hide a stop touch.
pub fn window_covers(setup: &Setup, candles: &[Candle]) -> bool {
    candles
        .first()
        .is_some_and(|c| c.open_time <= setup.candle_open_time + setup.interval.duration_ms())
}
