//! Range-bar aggregation and trade outcome replay for ES/NQ futures orderflow
//!
//! This crate is the canonical core shared by the live and backfill paths:
//! - Tick-to-range-bar aggregation with volume, buy/sell split, per-bar
//!   delta and session CVD
//! - Append-only sealed bar sequences per (symbol, session)
//! - Validated stop/target policies (fixed, trailing continuous, trailing
//!   rung, split targets)
//! - A pure outcome replayer that resolves a signal against a bar path,
//!   identically whether invoked bar-by-bar or over a full slice
//!
//! Ingestion transports, brokers, persistence and reporting live elsewhere;
//! this library performs no I/O beyond the optional CSV import helpers.

pub mod aggregator;
pub mod bars;
pub mod import;
pub mod policy;
pub mod replay;
pub mod session;
pub mod ticks;

// Re-export commonly used types
pub use aggregator::{AggregatorConfig, FormingBar, IngestError, TickAggregator};
pub use bars::{BarSequence, BarSource, BarStatus, RangeBar, SequenceError};
pub use policy::{
    ConfigurationError, Direction, LegPolicy, SignalContext, StopPolicy, TargetPolicy,
};
pub use replay::{replay, FirstEvent, Outcome, ReplayState, TradeResult};
pub use session::SessionClock;
pub use ticks::{AggressorSide, Tick};
