use super::{compact_symbol, tail, CandleProvider};
use crate::types::{Candle, Timeframe};
use async_trait::async_trait;
use std::collections::HashMap;

/// In-memory candles; unknown series come back empty
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    series: HashMap<(String, Timeframe), Vec<Candle>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candles(mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.insert(symbol, timeframe, candles);
        self
    }

    pub fn insert(&mut self, symbol: &str, timeframe: Timeframe, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp);
        self.series.insert((compact_symbol(symbol), timeframe), candles);
    }
}

#[async_trait]
impl CandleProvider for StaticProvider {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        let key = (compact_symbol(symbol), timeframe);
        let candles = self.series.get(&key).cloned().unwrap_or_default();
        Ok(tail(candles, count))
    }

    async fn get_symbols(&self) -> anyhow::Result<Vec<String>> {
        let mut symbols: Vec<String> = self.series.keys().map(|(s, _)| s.clone()).collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    fn normalize_symbol(&self, symbol: &str) -> String {
        compact_symbol(symbol)
    }

    fn name(&self) -> &str {
        "static"
    }
}
