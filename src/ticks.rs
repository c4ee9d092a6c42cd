//! Raw tick types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the trade crossed the spread (initiated the trade).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggressorSide {
    Buy,
    Sell,
}

impl AggressorSide {
    /// Parse an aggressor label from a tick export.
    ///
    /// Platforms disagree on spelling: ATAS writes "Buy"/"Sell", Databento
    /// uses "B"/"A", some exports use bid/ask or signed flags. Unknown labels
    /// return `None` so callers can fail closed instead of guessing.
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Buy" | "buy" | "BUY" | "B" | "Ask" | "ask" | "ASK" | "A" | "1" => {
                Some(AggressorSide::Buy)
            }
            "Sell" | "sell" | "SELL" | "S" | "Bid" | "bid" | "BID" | "-1" | "0" => {
                Some(AggressorSide::Sell)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for AggressorSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggressorSide::Buy => write!(f, "Buy"),
            AggressorSide::Sell => write!(f, "Sell"),
        }
    }
}

/// Raw trade tick from market data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: u64,
    pub side: AggressorSide,
}
