//! Tick-to-range-bar aggregation
//!
//! Single writer per (symbol, session): ticks must be applied sequentially.
//! Independent symbols or sessions share no state, so separate aggregators
//! can run fully in parallel.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::bars::{BarSource, BarStatus, RangeBar};
use crate::session::SessionClock;
use crate::ticks::{AggressorSide, Tick};

/// Rejections from [`TickAggregator::ingest`].
///
/// The aggregator fails closed: a malformed or out-of-order tick is reported
/// to the caller, never silently dropped.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("tick price must be positive and finite, got {0}")]
    InvalidPrice(f64),
    #[error("tick volume must be positive")]
    InvalidVolume,
    #[error("tick at {tick_ts} precedes last accepted tick {last_ts} beyond tolerance of {tolerance_ms}ms")]
    OutOfOrder {
        tick_ts: DateTime<Utc>,
        last_ts: DateTime<Utc>,
        tolerance_ms: i64,
    },
}

/// Aggregation parameters for one instrument.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Bar range threshold in points (ES default: 20.0 = 80 ticks)
    pub range_points: f64,
    /// Instrument symbol stamped on every sealed bar
    pub symbol: String,
    /// Session clock used for CVD and bar index resets
    pub session: SessionClock,
    /// How far a tick may precede the last accepted tick before rejection.
    /// Feed reconnects deliver slightly stale ticks; anything worse is a
    /// sequencing fault.
    pub out_of_order_tolerance: Duration,
    /// Provenance stamped on sealed bars
    pub source: BarSource,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            range_points: 20.0,
            symbol: "ES".to_string(),
            session: SessionClock::default(),
            out_of_order_tolerance: Duration::seconds(1),
            source: BarSource::Live,
        }
    }
}

/// The bar currently being built. Never satisfies the sealed-bar range
/// invariant: `high - low < range_points` until the sealing tick arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormingBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub buy_volume: u64,
    pub sell_volume: u64,
    pub ts_start: DateTime<Utc>,
    pub ts_end: DateTime<Utc>,
}

impl FormingBar {
    /// Seed a bar from a price without counting any volume. The tick that
    /// seals a bar also seeds the next one, so consecutive bars stay
    /// price-continuous; its volume belongs to the sealed bar only.
    fn seed(price: f64, ts: DateTime<Utc>) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
            buy_volume: 0,
            sell_volume: 0,
            ts_start: ts,
            ts_end: ts,
        }
    }

    fn apply(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.ts_end = tick.timestamp;
        self.volume += tick.volume;
        match tick.side {
            AggressorSide::Buy => self.buy_volume += tick.volume,
            AggressorSide::Sell => self.sell_volume += tick.volume,
        }
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn delta(&self) -> i64 {
        self.buy_volume as i64 - self.sell_volume as i64
    }
}

/// Converts an ordered tick stream into sealed range bars.
///
/// Each call to [`ingest`](Self::ingest) mutates only the forming bar; when
/// the range threshold is breached the bar seals and is returned, immutable,
/// with the next sequential index and the session CVD as of its close.
#[derive(Debug)]
pub struct TickAggregator {
    config: AggregatorConfig,
    forming: Option<FormingBar>,
    next_bar_idx: u64,
    cumulative_delta: i64,
    current_session: Option<NaiveDate>,
    /// High-water mark of accepted tick timestamps. Checked before the
    /// session roll so a stale tick cannot drag the session backwards.
    last_tick_ts: Option<DateTime<Utc>>,
}

impl TickAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        debug_assert!(config.range_points > 0.0, "range threshold must be positive");
        Self {
            config,
            forming: None,
            next_bar_idx: 0,
            cumulative_delta: 0,
            current_session: None,
            last_tick_ts: None,
        }
    }

    /// Apply one tick. Returns the sealed bar if this tick breached the
    /// range threshold.
    pub fn ingest(&mut self, tick: &Tick) -> Result<Option<RangeBar>, IngestError> {
        if !(tick.price > 0.0) || !tick.price.is_finite() {
            return Err(IngestError::InvalidPrice(tick.price));
        }
        if tick.volume == 0 {
            return Err(IngestError::InvalidVolume);
        }
        if let Some(last) = self.last_tick_ts {
            if tick.timestamp < last - self.config.out_of_order_tolerance {
                return Err(IngestError::OutOfOrder {
                    tick_ts: tick.timestamp,
                    last_ts: last,
                    tolerance_ms: self.config.out_of_order_tolerance.num_milliseconds(),
                });
            }
            self.last_tick_ts = Some(last.max(tick.timestamp));
        } else {
            self.last_tick_ts = Some(tick.timestamp);
        }

        self.roll_session_if_needed(tick.timestamp);

        let bar = self
            .forming
            .get_or_insert_with(|| FormingBar::seed(tick.price, tick.timestamp));
        bar.apply(tick);

        if bar.range() >= self.config.range_points {
            Ok(Some(self.seal(tick)))
        } else {
            Ok(None)
        }
    }

    fn roll_session_if_needed(&mut self, ts: DateTime<Utc>) {
        let session = self.config.session.session_date(ts);
        if self.current_session == Some(session) {
            return;
        }
        // Sessions only roll forward. A within-tolerance stale tick that
        // lands just before the open stays in the current session.
        if self.current_session.is_some_and(|cur| session < cur) {
            return;
        }
        if let Some(partial) = self.forming.take() {
            // A partial bar can never legally seal, so it is dropped at the
            // boundary rather than emitted with a short range.
            warn!(
                "{}: discarding forming bar ({} contracts) at session boundary",
                self.config.symbol, partial.volume
            );
        }
        if let Some(prev) = self.current_session {
            debug!(
                "{}: session roll {} -> {} (final CVD {})",
                self.config.symbol, prev, session, self.cumulative_delta
            );
        }
        self.current_session = Some(session);
        self.cumulative_delta = 0;
        self.next_bar_idx = 0;
    }

    fn seal(&mut self, sealing_tick: &Tick) -> RangeBar {
        // roll_session_if_needed ran before any tick reached the forming bar
        let bar = self.forming.take().expect("sealing without a forming bar");
        let trade_date = self
            .current_session
            .expect("sealing without an active session");

        let delta = bar.delta();
        self.cumulative_delta += delta;

        let sealed = RangeBar {
            bar_idx: self.next_bar_idx,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            buy_volume: bar.buy_volume,
            sell_volume: bar.sell_volume,
            delta,
            cumulative_delta: self.cumulative_delta,
            ts_start: bar.ts_start,
            ts_end: bar.ts_end,
            status: BarStatus::Sealed,
            range_points: self.config.range_points,
            symbol: self.config.symbol.clone(),
            trade_date,
            source: self.config.source,
        };

        debug!(
            "{} bar {} sealed @ {:.2} | delta: {} | CVD: {}",
            sealed.symbol, sealed.bar_idx, sealed.close, sealed.delta, sealed.cumulative_delta
        );

        self.next_bar_idx += 1;
        self.forming = Some(FormingBar::seed(sealing_tick.price, sealing_tick.timestamp));
        sealed
    }

    /// Snapshot of the bar currently being formed, if any.
    pub fn forming(&self) -> Option<&FormingBar> {
        self.forming.as_ref()
    }

    pub fn cumulative_delta(&self) -> i64 {
        self.cumulative_delta
    }

    pub fn session_date(&self) -> Option<NaiveDate> {
        self.current_session
    }

    pub fn next_bar_idx(&self) -> u64 {
        self.next_bar_idx
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }
}
