//! Range bar types
//!
//! A range bar seals once `high - low` has covered a fixed point distance,
//! rather than on a fixed time interval. Sealed bars are
//! immutable; the bar still being formed never satisfies the range invariant.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarStatus {
    Forming,
    Sealed,
}

/// Provenance of a bar: built from the live feed or from a historical pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarSource {
    Live,
    Backfill,
}

/// A sealed, immutable range bar with volume and delta statistics.
///
/// Invariant: `high - low >= range_points` for every sealed bar.
/// `cumulative_delta` is the running buy-minus-sell volume since the session
/// start; it resets only at a session boundary, never per bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBar {
    /// Strictly increasing per (symbol, session), starting at 0.
    pub bar_idx: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub buy_volume: u64,
    pub sell_volume: u64,
    /// Buy volume minus sell volume for this bar alone.
    pub delta: i64,
    /// Session CVD as of this bar's close.
    pub cumulative_delta: i64,
    pub ts_start: DateTime<Utc>,
    pub ts_end: DateTime<Utc>,
    pub status: BarStatus,
    /// Range threshold this bar was built with.
    pub range_points: f64,
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub source: BarSource,
}

impl RangeBar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Rejections from [`BarSequence::push`].
///
/// Reconnects in the legacy pipeline produced duplicate and gapped bar
/// indices in storage; the sequence refuses them instead of absorbing them.
#[derive(Debug, Error, PartialEq)]
pub enum SequenceError {
    #[error("bar index {got} out of sequence, expected {expected}")]
    IndexGap { expected: u64, got: u64 },
    #[error("bar for symbol {got} pushed into {expected} sequence")]
    SymbolMismatch { expected: String, got: String },
    #[error("bar with status {0:?} pushed into sealed-bar sequence")]
    NotSealed(BarStatus),
}

/// Ordered, append-only collection of sealed bars for one (symbol, session).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarSequence {
    bars: Vec<RangeBar>,
}

impl BarSequence {
    pub fn new() -> Self {
        Self { bars: Vec::new() }
    }

    /// Append the next sealed bar. Indices must be contiguous from 0 and all
    /// bars must share a symbol.
    pub fn push(&mut self, bar: RangeBar) -> Result<(), SequenceError> {
        if bar.status != BarStatus::Sealed {
            return Err(SequenceError::NotSealed(bar.status));
        }
        let expected = self.bars.len() as u64;
        if bar.bar_idx != expected {
            return Err(SequenceError::IndexGap {
                expected,
                got: bar.bar_idx,
            });
        }
        if let Some(first) = self.bars.first() {
            if first.symbol != bar.symbol {
                return Err(SequenceError::SymbolMismatch {
                    expected: first.symbol.clone(),
                    got: bar.symbol,
                });
            }
        }
        self.bars.push(bar);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, bar_idx: u64) -> Option<&RangeBar> {
        self.bars.get(bar_idx as usize)
    }

    pub fn last(&self) -> Option<&RangeBar> {
        self.bars.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RangeBar> {
        self.bars.iter()
    }

    pub fn as_slice(&self) -> &[RangeBar] {
        &self.bars
    }

    /// Bars strictly after `signal_bar_idx`, in index order. This is the
    /// slice the outcome replayer consumes.
    pub fn after(&self, signal_bar_idx: u64) -> &[RangeBar] {
        let start = (signal_bar_idx as usize + 1).min(self.bars.len());
        &self.bars[start..]
    }
}

impl<'a> IntoIterator for &'a BarSequence {
    type Item = &'a RangeBar;
    type IntoIter = std::slice::Iter<'a, RangeBar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
