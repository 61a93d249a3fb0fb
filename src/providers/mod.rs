//! Candle data providers
//!
//! - `StaticProvider`: in-memory candles keyed by symbol and timeframe
//! - `CsvProvider`: `<dir>/<SYMBOL>_<TF>.csv` files
//! - `OandaProvider`: OANDA v20 REST candles

pub mod csv;
pub mod memory;
pub mod oanda;

pub use self::csv::CsvProvider;
pub use memory::StaticProvider;
pub use oanda::OandaProvider;

use crate::types::{Candle, Timeframe};
use async_trait::async_trait;

/// Source of OHLC candles.
///
/// Implementations return candles in chronological order (oldest first) and
/// report missing data as an error rather than an empty list where they can
/// tell the difference.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Up to `count` most recent candles for `symbol`
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn get_symbols(&self) -> anyhow::Result<Vec<String>>;

    /// Provider-specific symbol spelling
    fn normalize_symbol(&self, symbol: &str) -> String;

    fn name(&self) -> &str;
}

/// Uppercase and strip separators: "eur/usd" -> "EURUSD"
pub fn compact_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

/// Keep the most recent `count` candles of a chronological series
pub(crate) fn tail(mut candles: Vec<Candle>, count: usize) -> Vec<Candle> {
    if candles.len() > count {
        candles.drain(..candles.len() - count);
    }
    candles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_symbol() {
        assert_eq!(compact_symbol("eur/usd"), "EURUSD");
        assert_eq!(compact_symbol("XAU_USD"), "XAUUSD");
        assert_eq!(compact_symbol("BTC-USDT"), "BTCUSDT");
    }
}
