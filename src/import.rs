//! Tick CSV import
//!
//! Loads raw tick exports (ATAS and similar platforms) into [`Tick`]s.
//! Exports disagree on column naming and timestamp formats, so headers are
//! matched against a set of known aliases. Unknown aggressor labels or
//! unparseable rows are errors: bad data is reported, not skipped.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use std::path::Path;
use tracing::debug;

use crate::ticks::{AggressorSide, Tick};

const DATETIME_ALIASES: &[&str] = &["datetime", "date", "time", "timestamp", "ts"];
const PRICE_ALIASES: &[&str] = &["price", "last", "tradeprice"];
const VOLUME_ALIASES: &[&str] = &["volume", "size", "qty"];
const SIDE_ALIASES: &[&str] = &["side", "aggressorside", "type", "direction"];

/// Column positions resolved from a tick export header.
#[derive(Debug, Clone, Copy)]
struct TickColumns {
    datetime: usize,
    price: usize,
    volume: usize,
    side: usize,
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
}

fn detect_columns(headers: &csv::StringRecord) -> Result<TickColumns> {
    let require = |aliases: &[&str], what: &str| {
        find_column(headers, aliases).with_context(|| {
            format!(
                "no {} column found (looked for {:?}) in header {:?}",
                what, aliases, headers
            )
        })
    };
    Ok(TickColumns {
        datetime: require(DATETIME_ALIASES, "datetime")?,
        price: require(PRICE_ALIASES, "price")?,
        volume: require(VOLUME_ALIASES, "volume")?,
        side: require(SIDE_ALIASES, "side")?,
    })
}

/// Parse an export timestamp. RFC 3339 carries its own offset; naive
/// timestamps are taken as Eastern wall-clock time, matching how the
/// platforms that produce these exports are configured.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S%.f",
        "%d.%m.%Y %H:%M:%S%.f",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return New_York
                .from_local_datetime(&naive)
                .earliest()
                .map(|et| et.with_timezone(&Utc))
                .with_context(|| format!("timestamp {} is invalid Eastern wall-clock time", raw));
        }
    }
    bail!("unrecognized timestamp format: {:?}", raw)
}

/// Load all ticks from a CSV export, in file order.
pub fn load_ticks_csv(path: &Path) -> Result<Vec<Tick>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open tick export {:?}", path))?;
    let headers = reader.headers().context("failed to read CSV header")?.clone();
    let columns = detect_columns(&headers)?;

    let mut ticks = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 2; // 1-based, after the header line
        let record = record.with_context(|| format!("failed to read CSV row {}", row))?;

        let field = |idx: usize| -> Result<&str> {
            record
                .get(idx)
                .with_context(|| format!("row {} is missing column {}", row, idx))
        };

        let timestamp = parse_timestamp(field(columns.datetime)?)
            .with_context(|| format!("bad timestamp at row {}", row))?;
        let price: f64 = field(columns.price)?
            .trim()
            .parse()
            .with_context(|| format!("bad price at row {}", row))?;
        let volume: u64 = field(columns.volume)?
            .trim()
            .parse()
            .with_context(|| format!("bad volume at row {}", row))?;
        let side_raw = field(columns.side)?;
        let Some(side) = AggressorSide::parse_label(side_raw) else {
            bail!("unrecognized aggressor label {:?} at row {}", side_raw, row);
        };

        ticks.push(Tick {
            timestamp,
            price,
            volume,
            side,
        });
    }

    debug!("loaded {} ticks from {:?}", ticks.len(), path);
    Ok(ticks)
}
