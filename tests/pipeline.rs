//! End-to-end flow: ticks -> aggregator -> bar sequence -> signal -> outcome.

use chrono::{DateTime, Duration, TimeZone, Utc};

use rangeflow::{
    replay, AggregatorConfig, AggressorSide, BarSequence, Direction, RangeBar, SignalContext,
    StopPolicy, TargetPolicy, Tick, TickAggregator,
};

fn base_ts() -> DateTime<Utc> {
    // 09:30 ET
    Utc.with_ymd_and_hms(2026, 2, 24, 14, 30, 0).unwrap()
}

fn tick(secs: i64, price: f64, volume: u64, side: AggressorSide) -> Tick {
    Tick {
        timestamp: base_ts() + Duration::seconds(secs),
        price,
        volume,
        side,
    }
}

/// Drive a tick path through a 10-point aggregator and collect sealed bars.
fn build_bars(path: &[(f64, u64, AggressorSide)]) -> BarSequence {
    let mut agg = TickAggregator::new(AggregatorConfig {
        range_points: 10.0,
        ..AggregatorConfig::default()
    });
    let mut seq = BarSequence::new();
    for (i, (price, volume, side)) in path.iter().enumerate() {
        if let Some(bar) = agg.ingest(&tick(i as i64, *price, *volume, *side)).unwrap() {
            seq.push(bar).unwrap();
        }
    }
    seq
}

#[test]
fn ticks_to_outcome_long_winner() {
    use AggressorSide::{Buy, Sell};

    // Bar 0: 6860 -> sweeps to 6850 (range 10, closes there)
    // Bar 1: seeded at 6850, runs up through 6860 to seal at 6860+
    // Bar 2: continues to 6872
    let seq = build_bars(&[
        (6860.0, 5, Buy),
        (6856.0, 3, Sell),
        (6850.0, 4, Sell), // seals bar 0
        (6855.0, 2, Buy),
        (6860.0, 6, Buy), // seals bar 1
        (6865.0, 3, Buy),
        (6872.0, 2, Buy), // seals bar 2
        (6871.0, 1, Sell),
    ]);
    assert_eq!(seq.len(), 3);

    // Bars stay price-continuous across seals
    let bars = seq.as_slice();
    assert_eq!(bars[0].close, bars[1].open);
    assert_eq!(bars[1].close, bars[2].open);

    // Long signal on bar 0 at its close
    let ctx = SignalContext::new(
        6850.0,
        bars[0].ts_end,
        Direction::Long,
        0,
        StopPolicy::Fixed { distance: 12.0 },
        TargetPolicy::Single { distance: 10.0 },
    )
    .unwrap();

    // Bar 1 runs back up to 6860: exactly the +10 target
    let outcome = replay(&ctx, seq.after(ctx.signal_bar_index()), None);
    assert_eq!(outcome.result.to_string(), "WIN");
    assert_eq!(outcome.realized_pnl, 10.0);
    assert_eq!(outcome.first_event.to_string(), "TARGET");
    assert_eq!(outcome.elapsed_bars, 1);
}

#[test]
fn range_bar_record_field_set() {
    use AggressorSide::{Buy, Sell};
    let seq = build_bars(&[(6860.0, 5, Buy), (6856.0, 3, Sell), (6850.0, 4, Sell)]);
    let bar: &RangeBar = seq.last().unwrap();

    let json = serde_json::to_value(bar).unwrap();
    for field in [
        "bar_idx",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "buy_volume",
        "sell_volume",
        "delta",
        "cumulative_delta",
        "ts_start",
        "ts_end",
        "status",
        "range_points",
        "symbol",
        "trade_date",
        "source",
    ] {
        assert!(json.get(field).is_some(), "missing field {}", field);
    }
    assert_eq!(json["status"], "sealed");
    assert_eq!(json["symbol"], "ES");

    // Round-trips intact
    let back: RangeBar = serde_json::from_value(json).unwrap();
    assert_eq!(&back, bar);
}

#[test]
fn outcome_record_field_set() {
    let ctx = SignalContext::new(
        100.0,
        base_ts(),
        Direction::Long,
        0,
        StopPolicy::Fixed { distance: 12.0 },
        TargetPolicy::Single { distance: 10.0 },
    )
    .unwrap();
    let outcome = replay(&ctx, &[], None);

    let json = serde_json::to_value(outcome).unwrap();
    for field in [
        "result",
        "realized_pnl",
        "first_event",
        "max_favorable_excursion",
        "max_adverse_excursion",
        "elapsed_bars",
    ] {
        assert!(json.get(field).is_some(), "missing field {}", field);
    }
    assert_eq!(json["result"], "EXPIRED");
    assert_eq!(json["first_event"], "NONE");
}

#[test]
fn signal_context_policies_serialize_as_tagged_variants() {
    let ctx = SignalContext::new(
        6900.0,
        base_ts(),
        Direction::Short,
        42,
        StopPolicy::TrailingContinuous {
            activation: 20.0,
            gap: 5.0,
        },
        TargetPolicy::Single { distance: 15.0 },
    )
    .unwrap();

    let json = serde_json::to_value(&ctx).unwrap();
    assert_eq!(json["stop_policy"]["kind"], "trailing_continuous");
    assert_eq!(json["target_policy"]["kind"], "single");

    let back: SignalContext = serde_json::from_value(json).unwrap();
    assert_eq!(back, ctx);
}
