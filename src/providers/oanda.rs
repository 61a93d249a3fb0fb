//! OANDA v20 REST candles
//!
//! Midpoint candles from `/instruments/{instrument}/candles`. Incomplete
//! (still forming) candles are dropped.

use super::{compact_symbol, CandleProvider};
use crate::types::{Candle, Timeframe};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Practice environment
pub const DEFAULT_BASE_URL: &str = "https://api-fxpractice.oanda.com/v3";

const DEFAULT_SYMBOLS: &[&str] = &[
    "EUR_USD", "GBP_USD", "AUD_USD", "USD_JPY", "USD_CAD", "NZD_USD", "EUR_GBP", "EUR_JPY",
];

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<OandaCandle>,
}

#[derive(Debug, Deserialize)]
struct OandaCandle {
    time: DateTime<Utc>,
    #[serde(default)]
    complete: bool,
    #[serde(default)]
    volume: f64,
    mid: Option<MidPrices>,
}

/// OANDA sends prices as strings
#[derive(Debug, Deserialize)]
struct MidPrices {
    o: String,
    h: String,
    l: String,
    c: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    #[serde(default)]
    instruments: Vec<Instrument>,
}

#[derive(Debug, Deserialize)]
struct Instrument {
    name: String,
}

pub struct OandaProvider {
    client: Client,
    base_url: String,
    api_key: String,
    account_id: Option<String>,
}

impl OandaProvider {
    /// Create a provider from environment variables
    ///
    /// Expects:
    /// - `OANDA_API_KEY` - personal access token
    /// - `OANDA_ACCOUNT_ID` (optional) - needed for the instrument list
    /// - `OANDA_BASE_URL` (optional) - defaults to the practice environment
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("OANDA_API_KEY").context("OANDA_API_KEY environment variable not set")?;
        let account_id = std::env::var("OANDA_ACCOUNT_ID").ok();
        let base_url =
            std::env::var("OANDA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Self::new(api_key, account_id, base_url)
    }

    pub fn new(api_key: String, account_id: Option<String>, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            account_id,
        })
    }

    pub fn granularity(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D",
        }
    }

    async fn fetch_instruments(&self) -> Result<Vec<String>> {
        let account_id = self
            .account_id
            .as_ref()
            .ok_or_else(|| anyhow!("OANDA_ACCOUNT_ID not set"))?;

        let response = self
            .client
            .get(format!("{}/accounts/{}/instruments", self.base_url, account_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to request OANDA instruments")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OANDA instruments failed with status {}: {}", status, body));
        }

        let parsed: InstrumentsResponse = response
            .json()
            .await
            .context("Failed to parse OANDA instruments")?;

        let mut names: Vec<String> = parsed
            .instruments
            .into_iter()
            .map(|i| i.name)
            .filter(|name| name.len() == 7 && name.contains('_'))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Convert a candles payload into chronological, completed candles
fn parse_candles(body: &str) -> Result<Vec<Candle>> {
    let parsed: CandlesResponse =
        serde_json::from_str(body).context("Failed to parse OANDA candles")?;

    let mut candles = Vec::with_capacity(parsed.candles.len());
    for raw in parsed.candles.into_iter().filter(|c| c.complete) {
        let mid = raw
            .mid
            .ok_or_else(|| anyhow!("Candle at {} has no midpoint prices", raw.time))?;
        let price = |s: &str| -> Result<f64> {
            s.parse::<f64>()
                .with_context(|| format!("Invalid price '{}' at {}", s, raw.time))
        };

        let mut candle = Candle::new(
            raw.time,
            price(&mid.o)?,
            price(&mid.h)?,
            price(&mid.l)?,
            price(&mid.c)?,
        );
        candle.volume = raw.volume;
        candles.push(candle);
    }

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

#[async_trait]
impl CandleProvider for OandaProvider {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let instrument = self.normalize_symbol(symbol);
        let url = format!("{}/instruments/{}/candles", self.base_url, instrument);
        debug!("GET {} granularity={} count={}", url, Self::granularity(timeframe), count);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("price", "M".to_string()),
                ("granularity", Self::granularity(timeframe).to_string()),
                ("count", count.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to request {} candles for {}", timeframe, instrument))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("OANDA candles failed with status {}: {}", status, body));
        }

        parse_candles(&body)
    }

    async fn get_symbols(&self) -> Result<Vec<String>> {
        match self.fetch_instruments().await {
            Ok(names) if !names.is_empty() => Ok(names),
            Ok(_) => Ok(DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()),
            Err(e) => {
                warn!("Falling back to default OANDA symbols: {:#}", e);
                Ok(DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect())
            }
        }
    }

    /// "EURUSD", "eur/usd" -> "EUR_USD"
    fn normalize_symbol(&self, symbol: &str) -> String {
        if symbol.contains('_') {
            return symbol.to_uppercase();
        }
        let compact = compact_symbol(symbol);
        if compact.len() == 6 {
            format!("{}_{}", &compact[..3], &compact[3..])
        } else {
            compact
        }
    }

    fn name(&self) -> &str {
        "oanda"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OandaProvider {
        OandaProvider::new("token".into(), None, DEFAULT_BASE_URL.into()).unwrap()
    }

    #[test]
    fn test_normalize_symbol() {
        let p = provider();
        assert_eq!(p.normalize_symbol("EURUSD"), "EUR_USD");
        assert_eq!(p.normalize_symbol("eur/usd"), "EUR_USD");
        assert_eq!(p.normalize_symbol("xau_usd"), "XAU_USD");
        assert_eq!(p.normalize_symbol("BTCUSDT"), "BTCUSDT");
    }

    #[test]
    fn test_granularity() {
        assert_eq!(OandaProvider::granularity(Timeframe::H4), "H4");
        assert_eq!(OandaProvider::granularity(Timeframe::M30), "M30");
        assert_eq!(OandaProvider::granularity(Timeframe::D1), "D");
    }

    #[test]
    fn test_parse_candles_drops_incomplete() {
        let body = r#"{
            "instrument": "EUR_USD",
            "granularity": "H4",
            "candles": [
                {"complete": true, "volume": 120, "time": "2024-01-01T04:00:00.000000000Z",
                 "mid": {"o": "1.10050", "h": "1.10150", "l": "1.09950", "c": "1.10100"}},
                {"complete": true, "volume": 100, "time": "2024-01-01T00:00:00.000000000Z",
                 "mid": {"o": "1.10000", "h": "1.10100", "l": "1.09900", "c": "1.10050"}},
                {"complete": false, "volume": 5, "time": "2024-01-01T08:00:00.000000000Z",
                 "mid": {"o": "1.10100", "h": "1.10120", "l": "1.10080", "c": "1.10110"}}
            ]
        }"#;

        let candles = parse_candles(body).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[0].close, 1.1005);
        assert_eq!(candles[1].volume, 120.0);
    }
}
