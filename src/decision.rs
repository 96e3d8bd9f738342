// =============================================================================
// Decision — verdict of one setup evaluation
// =============================================================================
//
// Every evaluation of a symbol ends in exactly one of two states: a fully
// priced setup, or "no setup" together with the gate that stopped it and a
// human-readable reason. Insufficient history is just another gate here; it is
// never surfaced as an error.
// =============================================================================

use serde::Serialize;

use crate::setup_engine::Setup;

/// Evaluation stage that rejected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gate {
    /// Not enough (or unusable) history for the indicators.
    DataQuality,
    /// Fast and slow EMA do not define a direction.
    Trend,
    /// The trend timeframe disagrees with the entry direction.
    TrendFilter,
    /// The EMAs are too close together.
    EmaGap,
    /// Price is too far from the slow EMA.
    Pullback,
    /// RSI does not confirm the direction.
    Momentum,
    /// Stop placement produced no usable risk.
    Risk,
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DataQuality => "DataQuality",
            Self::Trend => "Trend",
            Self::TrendFilter => "TrendFilter",
            Self::EmaGap => "EmaGap",
            Self::Pullback => "Pullback",
            Self::Momentum => "Momentum",
            Self::Risk => "Risk",
        };
        f.write_str(s)
    }
}

/// Result of evaluating one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Evaluation {
    Setup(Setup),
    NoSetup { gate: Gate, reason: String },
}

impl Evaluation {
    pub fn blocked(gate: Gate, reason: impl Into<String>) -> Self {
        Self::NoSetup {
            gate,
            reason: reason.into(),
        }
    }

    #[cfg(test)]
    pub fn setup(&self) -> Option<&Setup> {
        match self {
            Self::Setup(setup) => Some(setup),
            Self::NoSetup { .. } => None,
        }
    }

    /// Gate that blocked the evaluation, if any.
    #[cfg(test)]
    pub fn blocking_gate(&self) -> Option<Gate> {
        match self {
            Self::Setup(_) => None,
            Self::NoSetup { gate, .. } => Some(*gate),
        }
    }
}
