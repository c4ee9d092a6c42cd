//! Stop and target policies
//!
//! The legacy system picked trailing behavior by substring-matching setup
//! name and grade strings at replay time, and each script re-derived the
//! rules slightly differently. Policies here are enumerated variants,
//! validated once when the signal context is built; replay never sees a
//! malformed policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Signed profit in points for a move from `entry` to `price`.
    pub fn profit(&self, entry: f64, price: f64) -> f64 {
        match self {
            Direction::Long => price - entry,
            Direction::Short => entry - price,
        }
    }

    /// Price level sitting `offset` profit-points away from `entry`.
    /// Negative offsets land on the losing side.
    pub fn level(&self, entry: f64, offset: f64) -> f64 {
        match self {
            Direction::Long => entry + offset,
            Direction::Short => entry - offset,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Protective stop behavior for one leg of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopPolicy {
    /// Stop parked `distance` points on the losing side of entry, never moved.
    Fixed { distance: f64 },
    /// Once max favorable excursion reaches `activation`, the stop locks
    /// `gap` points behind the excursion and re-ratchets every bar.
    TrailingContinuous { activation: f64, gap: f64 },
    /// Same ratchet, but the excursion is quantized to discrete rungs spaced
    /// `gap` apart starting at `activation`; between rungs the stop holds.
    /// Deliberately coarser than the continuous flavor.
    TrailingRung { activation: f64, gap: f64 },
}

/// Profit target behavior for a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetPolicy {
    /// Full position exits flat at `distance` points of profit.
    Single { distance: f64 },
    /// `first_fraction` of the position exits at `first_distance`; the
    /// remainder runs under its own nested stop/target pair.
    Split {
        first_distance: f64,
        first_fraction: f64,
        runner: Box<LegPolicy>,
    },
}

/// Stop/target pair governing the residual quantity of a split target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegPolicy {
    pub stop: StopPolicy,
    pub target: TargetPolicy,
}

/// Policy misconfiguration, caught when the signal context is built rather
/// than mid-replay.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("entry price must be positive and finite, got {0}")]
    InvalidEntryPrice(f64),
    #[error("{what} must be positive and finite, got {value}")]
    NonPositiveDistance { what: &'static str, value: f64 },
    #[error("trailing gap must be positive and finite, got {0}")]
    NonPositiveGap(f64),
    #[error("trailing activation must be non-negative and finite, got {0}")]
    InvalidActivation(f64),
    #[error("split first_fraction must be strictly between 0 and 1, got {0}")]
    InvalidFraction(f64),
}

fn positive(what: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::NonPositiveDistance { what, value })
    }
}

impl StopPolicy {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            StopPolicy::Fixed { distance } => positive("stop distance", distance),
            StopPolicy::TrailingContinuous { activation, gap }
            | StopPolicy::TrailingRung { activation, gap } => {
                if !(activation >= 0.0) || !activation.is_finite() {
                    return Err(ConfigurationError::InvalidActivation(activation));
                }
                if !(gap > 0.0) || !gap.is_finite() {
                    return Err(ConfigurationError::NonPositiveGap(gap));
                }
                Ok(())
            }
        }
    }
}

impl TargetPolicy {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            TargetPolicy::Single { distance } => positive("target distance", *distance),
            TargetPolicy::Split {
                first_distance,
                first_fraction,
                runner,
            } => {
                positive("split first_distance", *first_distance)?;
                if !(*first_fraction > 0.0 && *first_fraction < 1.0) {
                    return Err(ConfigurationError::InvalidFraction(*first_fraction));
                }
                runner.stop.validate()?;
                runner.target.validate()
            }
        }
    }
}

/// Immutable description of an open trade: where it entered, which way it
/// points, and the stop/target rules its outcome is replayed under.
///
/// Construction validates the policies; fields are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContext {
    entry_price: f64,
    entry_time: DateTime<Utc>,
    direction: Direction,
    /// Index of the bar the signal fired on; replay starts strictly after it.
    signal_bar_index: u64,
    stop_policy: StopPolicy,
    target_policy: TargetPolicy,
}

impl SignalContext {
    pub fn new(
        entry_price: f64,
        entry_time: DateTime<Utc>,
        direction: Direction,
        signal_bar_index: u64,
        stop_policy: StopPolicy,
        target_policy: TargetPolicy,
    ) -> Result<Self, ConfigurationError> {
        if !(entry_price > 0.0) || !entry_price.is_finite() {
            return Err(ConfigurationError::InvalidEntryPrice(entry_price));
        }
        stop_policy.validate()?;
        target_policy.validate()?;
        Ok(Self {
            entry_price,
            entry_time,
            direction,
            signal_bar_index,
            stop_policy,
            target_policy,
        })
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn signal_bar_index(&self) -> u64 {
        self.signal_bar_index
    }

    pub fn stop_policy(&self) -> StopPolicy {
        self.stop_policy
    }

    pub fn target_policy(&self) -> &TargetPolicy {
        &self.target_policy
    }
}
