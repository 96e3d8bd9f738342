// =============================================================================
// Indicator Series — trailing-aligned output of a rolling indicator
// =============================================================================
//
// A rolling indicator cannot produce a value until it has seen enough input.
// `IndicatorSeries` keeps the defined values together with the number of
// leading input positions that have no value, so the series lines up with the
// candles it was computed from without padding the gap with fake numbers.
// =============================================================================

/// Indicator values aligned to an input sequence by trailing offset.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    values: Vec<f64>,
    offset: usize,
}

impl IndicatorSeries {
    /// Build a series whose first defined value corresponds to input index
    /// `offset`.
    pub(crate) fn new(values: Vec<f64>, offset: usize) -> Self {
        Self { values, offset }
    }

    /// Length of the input the series is aligned to.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.offset + self.values.len()
    }

    /// Number of leading positions without a value.
    #[cfg(test)]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Value at input position `index`, or `None` when the indicator was not
    /// yet defined there.
    pub fn get(&self, index: usize) -> Option<f64> {
        index
            .checked_sub(self.offset)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Most recent value.
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Value one position before the most recent one.
    #[cfg(test)]
    pub fn previous(&self) -> Option<f64> {
        self.values.len().checked_sub(2).map(|i| self.values[i])
    }

    /// The defined values only.
    #[cfg(test)]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}
