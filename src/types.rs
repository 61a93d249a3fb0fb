use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLC candle as supplied by a data provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    /// Absolute body size
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// High minus low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.body_high()
    }

    pub fn lower_wick(&self) -> f64 {
        self.body_low() - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Body as a fraction of range, `None` for zero-range candles
    pub fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        if range > 0.0 {
            Some(self.body() / range)
        } else {
            None
        }
    }
}

/// Candle timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1M")]
    M1,
    #[serde(rename = "5M")]
    M5,
    #[serde(rename = "15M")]
    M15,
    #[serde(rename = "30M")]
    M30,
    #[serde(rename = "1H")]
    H1,
    #[serde(rename = "4H")]
    H4,
    #[serde(rename = "1D")]
    D1,
}

impl Timeframe {
    pub fn as_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1M",
            Timeframe::M5 => "5M",
            Timeframe::M15 => "15M",
            Timeframe::M30 => "30M",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
            Timeframe::D1 => "1D",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1M" | "M1" => Ok(Timeframe::M1),
            "5M" | "M5" => Ok(Timeframe::M5),
            "15M" | "M15" => Ok(Timeframe::M15),
            "30M" | "M30" => Ok(Timeframe::M30),
            "1H" | "H1" => Ok(Timeframe::H1),
            "4H" | "H4" => Ok(Timeframe::H4),
            "1D" | "D1" | "D" => Ok(Timeframe::D1),
            other => Err(anyhow::anyhow!("Unsupported timeframe: {}", other)),
        }
    }
}

/// Directional lean derived from 4H structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Long,
    Short,
    Neutral,
}

impl Bias {
    /// Whether a zone or pattern with the given direction agrees with this bias.
    /// Neutral agrees with nothing.
    pub fn matches(&self, is_bullish: bool) -> bool {
        match self {
            Bias::Long => is_bullish,
            Bias::Short => !is_bullish,
            Bias::Neutral => false,
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, Bias::Neutral)
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Long => write!(f, "LONG"),
            Bias::Short => write!(f, "SHORT"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Final trade decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Buy,
    Sell,
    NoTrade,
}

impl Decision {
    pub fn is_trade(&self) -> bool {
        !matches!(self, Decision::NoTrade)
    }

    /// BUY for a long bias, SELL for a short bias
    pub fn from_bias(bias: Bias) -> Self {
        match bias {
            Bias::Long => Decision::Buy,
            Bias::Short => Decision::Sell,
            Bias::Neutral => Decision::NoTrade,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Sell => write!(f, "SELL"),
            Decision::NoTrade => write!(f, "NO_TRADE"),
        }
    }
}
