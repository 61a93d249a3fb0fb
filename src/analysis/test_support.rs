use crate::types::Candle;
use chrono::{DateTime, Duration, TimeZone, Utc};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Candle `i` of a 30-minute series starting at [`base_time`]
pub fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle::new(base_time() + Duration::minutes(30 * i), open, high, low, close)
}

pub fn candle_at(ts: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle::new(ts, open, high, low, close)
}

/// Bullish-bodied candles with the given extremes; open at 25% and close at 75% of range
pub fn candles_from_highs_lows(rows: &[(f64, f64)]) -> Vec<Candle> {
    rows.iter()
        .enumerate()
        .map(|(i, &(high, low))| {
            let range = high - low;
            candle(
                i as i64,
                low + range * 0.25,
                high,
                low,
                low + range * 0.75,
            )
        })
        .collect()
}
