//! Configuration for the analysis pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Instrument family; selects price-scale dependent thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    /// Major FX pairs quoted to 5 decimals
    Forex,
    /// JPY crosses quoted to 3 decimals
    ForexJpy,
    /// Gold and silver
    Metal,
    /// Crypto pairs
    Crypto,
}

impl Default for AssetClass {
    fn default() -> Self {
        Self::Forex
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forex => write!(f, "Forex"),
            Self::ForexJpy => write!(f, "Forex (JPY)"),
            Self::Metal => write!(f, "Metal"),
            Self::Crypto => write!(f, "Crypto"),
        }
    }
}

const CRYPTO_PREFIXES: &[&str] = &["BTC", "ETH", "LTC", "BCH", "XRP", "ADA", "DOT", "LINK", "UNI", "SOL"];
const METAL_PREFIXES: &[&str] = &["XAU", "XAG"];

impl AssetClass {
    /// Classify a raw symbol such as "EUR/USD", "USDJPY", "XAUUSD" or "BTC_USDT"
    pub fn from_symbol(symbol: &str) -> Self {
        let normalized: String = symbol
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();

        if CRYPTO_PREFIXES.iter().any(|p| normalized.starts_with(p)) {
            Self::Crypto
        } else if METAL_PREFIXES.iter().any(|p| normalized.starts_with(p)) {
            Self::Metal
        } else if normalized.contains("JPY") {
            Self::ForexJpy
        } else {
            Self::Forex
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        match self {
            Self::Forex => Thresholds {
                fvg_tolerance: 0.0001,
                liquidity_tolerance: 0.0005,
                retest_tolerance: 0.0001,
                price_precision: 5,
            },
            Self::ForexJpy => Thresholds {
                fvg_tolerance: 0.01,
                liquidity_tolerance: 0.05,
                retest_tolerance: 0.01,
                price_precision: 3,
            },
            Self::Metal => Thresholds {
                fvg_tolerance: 0.1,
                liquidity_tolerance: 0.5,
                retest_tolerance: 0.1,
                price_precision: 2,
            },
            Self::Crypto => Thresholds {
                fvg_tolerance: 1.0,
                liquidity_tolerance: 5.0,
                retest_tolerance: 1.0,
                price_precision: 2,
            },
        }
    }
}

/// Price-scale dependent tolerances
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum gap size for a fair value gap
    pub fvg_tolerance: f64,
    /// Price distance within which highs/lows count as equal
    pub liquidity_tolerance: f64,
    /// Distance within which a retest wick counts as touching the broken level
    pub retest_tolerance: f64,
    /// Decimals used when formatting zones and levels
    pub price_precision: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        AssetClass::Forex.thresholds()
    }
}

/// Swing and BOS/MSS parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureConfig {
    /// Fractal window radius
    pub lookback: usize,
    /// Fewer candles than this yields no structure events
    pub min_candles: usize,
    /// Candle indices below this are not scanned for breaks
    pub skip_candles: usize,
    /// Same-type BOS events closer than this are treated as one break
    pub dedup_window_secs: i64,
    /// Prior lower-lows (higher-highs) required before an MSS up (down)
    pub mss_min_prior_swings: usize,
    /// Maximum events returned, newest first
    pub max_events: usize,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            lookback: 3,
            min_candles: 20,
            skip_candles: 10,
            dedup_window_secs: 3600,
            mss_min_prior_swings: 2,
            max_events: 5,
        }
    }
}

/// Parameters shared by all detectors for one analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub asset_class: AssetClass,
    pub thresholds: Thresholds,
    pub structure: StructureConfig,

    /// Order block impulse candle must exceed this body/range ratio
    pub ob_min_body_ratio: f64,
    /// Candles after invalidation in which a breaker retest must occur
    pub breaker_lookahead: usize,
    /// Rejection block wick must be at least this share of range
    pub rb_min_wick_ratio: f64,

    /// Window of candles whose extremes form range pools
    pub range_pool_window: usize,
    /// Candles after a pierce in which a rejection close must occur
    pub sweep_rejection_window: usize,
    /// Sweep-to-POI distance allowed, in multiples of liquidity tolerance
    pub sweep_distance_multiplier: f64,
    /// Sweep must be at most this many 30M candles old
    pub poi_proximity_candles: usize,

    /// Candles preceding a break that define the broken level
    pub break_lookback: usize,
    /// Candles after a break in which a retest is accepted
    pub break_retest_window: usize,
    /// Rejection candle dominant wick ratio
    pub rejection_wick_ratio: f64,
    /// Rejection candle maximum body ratio
    pub rejection_max_body_ratio: f64,

    /// Reward multiple used for the second target
    pub risk_r: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            asset_class: AssetClass::Forex,
            thresholds: AssetClass::Forex.thresholds(),
            structure: StructureConfig::default(),
            ob_min_body_ratio: 0.6,
            breaker_lookahead: 20,
            rb_min_wick_ratio: 0.5,
            range_pool_window: 20,
            sweep_rejection_window: 5,
            sweep_distance_multiplier: 10.0,
            poi_proximity_candles: 10,
            break_lookback: 10,
            break_retest_window: 8,
            rejection_wick_ratio: 0.6,
            rejection_max_body_ratio: 0.4,
            risk_r: 2.0,
        }
    }
}

impl AnalysisConfig {
    /// Same parameters with the thresholds of the symbol's asset class
    pub fn for_symbol(&self, symbol: &str) -> Self {
        let asset_class = AssetClass::from_symbol(symbol);
        Self {
            asset_class,
            thresholds: asset_class.thresholds(),
            ..self.clone()
        }
    }
}

/// Orchestration parameters for the signal engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub h4_count: usize,
    pub m30_count: usize,
    pub m5_count: usize,
    /// Deadline for the three-timeframe fetch fan-in
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            h4_count: 200,
            m30_count: 500,
            m5_count: 500,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn with_risk_r(mut self, risk_r: f64) -> Self {
        self.analysis.risk_r = risk_r;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}
