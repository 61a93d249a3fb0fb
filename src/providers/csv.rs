//! CSV candle files, one per symbol and timeframe.
//!
//! Layout: `<dir>/<SYMBOL>_<TF>.csv`, e.g. `data/EURUSD_4H.csv`, with a header
//! row `timestamp,open,high,low,close[,volume]`. Timestamps are RFC 3339 or
//! unix seconds (milliseconds are detected and scaled).

use super::{compact_symbol, tail, CandleProvider};
use crate::types::{Candle, Timeframe};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", compact_symbol(symbol), timeframe.label()))
    }
}

#[async_trait]
impl CandleProvider for CsvProvider {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let path = self.path_for(symbol, timeframe);
        debug!("Loading {} candles from {}", timeframe, path.display());

        let candles = tokio::task::spawn_blocking(move || load_candles(&path))
            .await
            .context("CSV loader task failed")??;

        Ok(tail(candles, count))
    }

    async fn get_symbols(&self) -> Result<Vec<String>> {
        let suffix = format!("_{}.csv", Timeframe::H4.label());
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read data directory {}", self.dir.display()))?;

        let mut symbols: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(&suffix).map(str::to_string)
            })
            .collect();
        symbols.sort();
        Ok(symbols)
    }

    fn normalize_symbol(&self, symbol: &str) -> String {
        compact_symbol(symbol)
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Read a candle file and return its rows sorted by timestamp
pub fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    let column = |name: &str, fallback: usize| {
        headers
            .iter()
            .position(|h| h == name || (name == "timestamp" && h == "time"))
            .unwrap_or(fallback)
    };
    let (ts_col, open_col, high_col, low_col, close_col) = (
        column("timestamp", 0),
        column("open", 1),
        column("high", 2),
        column("low", 3),
        column("close", 4),
    );
    let volume_col = headers.iter().position(|h| h == "volume");

    let mut candles = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad CSV record at row {}", line + 1))?;
        let field = |col: usize| {
            record
                .get(col)
                .ok_or_else(|| anyhow!("Missing column {} at row {}", col, line + 1))
        };
        let number = |col: usize| -> Result<f64> {
            let raw = field(col)?;
            raw.parse::<f64>()
                .with_context(|| format!("Invalid number '{}' at row {}", raw, line + 1))
        };

        let timestamp = parse_timestamp(field(ts_col)?)
            .ok_or_else(|| anyhow!("Invalid timestamp at row {}", line + 1))?;
        let mut candle = Candle::new(
            timestamp,
            number(open_col)?,
            number(high_col)?,
            number(low_col)?,
            number(close_col)?,
        );
        if let Some(col) = volume_col {
            candle.volume = number(col).unwrap_or(0.0);
        }
        candles.push(candle);
    }

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

/// RFC 3339, "YYYY-MM-DD HH:MM:SS" (UTC) or unix seconds/milliseconds
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }

    let mut secs = raw.parse::<f64>().ok()?;
    if secs > 1e12 {
        secs /= 1000.0;
    }
    Utc.timestamp_opt(secs.trunc() as i64, 0).single()
}
