//! Tagged gain and lag values
//!
//! Partial measurability is an ordinary outcome of a periodic experiment, so
//! every gain or lag entry carries either a value or the reason it could not
//! be measured.

use serde::{Deserialize, Serialize};

/// Why a gain or lag entry has no value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unmeasurable {
    /// Fewer than four forcing/response turning-point pairs
    InsufficientExtrema,
    /// Mean lag below -0.3 periods
    ImplausibleLag,
    /// Unknown values on both sides of the node within its segment
    Unbridged,
    /// Never reached when propagating phase from a channel head
    Unanchored,
    /// Zero or non-finite mean, empty window or zero forcing amplitude
    DegenerateMean,
}

impl Unmeasurable {
    pub fn label(self) -> &'static str {
        match self {
            Self::InsufficientExtrema => "insufficient_extrema",
            Self::ImplausibleLag => "implausible_lag",
            Self::Unbridged => "unbridged",
            Self::Unanchored => "unanchored",
            Self::DegenerateMean => "degenerate_mean",
        }
    }
}

/// A measured value or the reason it is missing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Measure {
    Known(f64),
    Unknown(Unmeasurable),
}

impl Measure {
    /// The value, if measured
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown(_) => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn is_unknown(self) -> bool {
        !self.is_known()
    }

    /// Apply `f` to a known value; unknown entries pass through
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Self::Known(value) => Self::Known(f(value)),
            unknown => unknown,
        }
    }

    /// Add `delta` in place to a known value
    pub fn shift(&mut self, delta: f64) {
        if let Self::Known(value) = self {
            *value += delta;
        }
    }

    /// Replace a known value with `reason`; existing reasons are kept
    pub fn invalidate(&mut self, reason: Unmeasurable) {
        if self.is_known() {
            *self = Self::Unknown(reason);
        }
    }

    pub fn unknown_reason(self) -> Option<Unmeasurable> {
        match self {
            Self::Known(_) => None,
            Self::Unknown(reason) => Some(reason),
        }
    }
}

/// Difference `a - b` when both entries are known
pub(crate) fn known_difference(a: Measure, b: Measure) -> Option<f64> {
    Some(a.value()? - b.value()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_leaves_unknown_untouched() {
        let mut known = Measure::Known(1.0);
        let mut unknown = Measure::Unknown(Unmeasurable::ImplausibleLag);
        known.shift(0.5);
        unknown.shift(0.5);
        assert_eq!(known, Measure::Known(1.5));
        assert_eq!(unknown, Measure::Unknown(Unmeasurable::ImplausibleLag));
    }

    #[test]
    fn test_invalidate_keeps_original_reason() {
        let mut entry = Measure::Unknown(Unmeasurable::InsufficientExtrema);
        entry.invalidate(Unmeasurable::Unanchored);
        assert_eq!(
            entry.unknown_reason(),
            Some(Unmeasurable::InsufficientExtrema)
        );

        let mut entry = Measure::Known(0.2);
        entry.invalidate(Unmeasurable::Unanchored);
        assert_eq!(entry.unknown_reason(), Some(Unmeasurable::Unanchored));
    }

    #[test]
    fn test_known_difference_requires_both() {
        let a = Measure::Known(3.0);
        let b = Measure::Known(1.0);
        let u = Measure::Unknown(Unmeasurable::Unbridged);
        assert_eq!(known_difference(a, b), Some(2.0));
        assert_eq!(known_difference(a, u), None);
    }
}
