//! Fractal swing detection and trend classification

use crate::types::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local extremum over a symmetric window of `2 * lookback + 1` candles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub is_high: bool,
    pub candle_index: usize,
}

/// Trend regime derived from consecutive swing comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Uptrend => write!(f, "uptrend"),
            Trend::Downtrend => write!(f, "downtrend"),
            Trend::Sideways => write!(f, "sideways"),
        }
    }
}

/// Snapshot of swing structure, recomputed from scratch on every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStructure {
    pub trend: Trend,
    pub last_swing_high: Option<SwingPoint>,
    pub last_swing_low: Option<SwingPoint>,
    pub higher_highs: Vec<SwingPoint>,
    pub higher_lows: Vec<SwingPoint>,
    pub lower_highs: Vec<SwingPoint>,
    pub lower_lows: Vec<SwingPoint>,
    /// Every detected swing, ordered by candle index
    pub swings: Vec<SwingPoint>,
}

impl MarketStructure {
    pub fn empty() -> Self {
        Self {
            trend: Trend::Sideways,
            last_swing_high: None,
            last_swing_low: None,
            higher_highs: Vec::new(),
            higher_lows: Vec::new(),
            lower_highs: Vec::new(),
            lower_lows: Vec::new(),
            swings: Vec::new(),
        }
    }

    pub fn swing_highs(&self) -> impl Iterator<Item = &SwingPoint> {
        self.swings.iter().filter(|s| s.is_high)
    }

    pub fn swing_lows(&self) -> impl Iterator<Item = &SwingPoint> {
        self.swings.iter().filter(|s| !s.is_high)
    }
}

/// Fractal swing detector
#[derive(Debug, Clone)]
pub struct SwingDetector {
    lookback: usize,
}

impl Default for SwingDetector {
    fn default() -> Self {
        Self::new(3)
    }
}

impl SwingDetector {
    pub fn new(lookback: usize) -> Self {
        Self { lookback }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Detect swing highs and lows. Equal extremes inside the window
    /// disqualify the candidate. Output is ordered by candle index, a high
    /// before a low on the same candle.
    pub fn detect_swings(&self, candles: &[Candle]) -> Vec<SwingPoint> {
        let lb = self.lookback;
        if candles.len() < lb * 2 + 1 {
            return Vec::new();
        }

        let mut swings = Vec::new();

        for i in lb..candles.len() - lb {
            let current = &candles[i];
            let window = (i - lb)..=(i + lb);

            let is_swing_high = window
                .clone()
                .filter(|&j| j != i)
                .all(|j| candles[j].high < current.high);

            if is_swing_high {
                swings.push(SwingPoint {
                    timestamp: current.timestamp,
                    price: current.high,
                    is_high: true,
                    candle_index: i,
                });
            }

            let is_swing_low = window
                .filter(|&j| j != i)
                .all(|j| candles[j].low > current.low);

            if is_swing_low {
                swings.push(SwingPoint {
                    timestamp: current.timestamp,
                    price: current.low,
                    is_high: false,
                    candle_index: i,
                });
            }
        }

        swings
    }

    /// Classify swing sequence into higher/lower highs and lows and a trend
    pub fn analyze_structure(&self, candles: &[Candle]) -> MarketStructure {
        let swings = self.detect_swings(candles);
        structure_from_swings(swings)
    }
}

/// Build a [`MarketStructure`] from swings ordered by candle index
pub fn structure_from_swings(swings: Vec<SwingPoint>) -> MarketStructure {
    if swings.is_empty() {
        return MarketStructure::empty();
    }

    let highs: Vec<SwingPoint> = swings.iter().filter(|s| s.is_high).copied().collect();
    let lows: Vec<SwingPoint> = swings.iter().filter(|s| !s.is_high).copied().collect();

    let mut higher_highs = Vec::new();
    let mut lower_highs = Vec::new();
    for pair in highs.windows(2) {
        if pair[1].price > pair[0].price {
            higher_highs.push(pair[1]);
        } else {
            lower_highs.push(pair[1]);
        }
    }

    let mut higher_lows = Vec::new();
    let mut lower_lows = Vec::new();
    for pair in lows.windows(2) {
        if pair[1].price > pair[0].price {
            higher_lows.push(pair[1]);
        } else {
            lower_lows.push(pair[1]);
        }
    }

    let up = !higher_highs.is_empty() && !higher_lows.is_empty();
    let down = !lower_highs.is_empty() && !lower_lows.is_empty();

    // Uptrend wins when both regimes are present
    let trend = if up {
        Trend::Uptrend
    } else if down {
        Trend::Downtrend
    } else {
        Trend::Sideways
    };

    MarketStructure {
        trend,
        last_swing_high: highs.last().copied(),
        last_swing_low: lows.last().copied(),
        higher_highs,
        higher_lows,
        lower_highs,
        lower_lows,
        swings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{candle, candles_from_highs_lows};

    #[test]
    fn test_single_swing_high_and_low() {
        let candles = candles_from_highs_lows(&[
            (1.10, 1.09),
            (1.11, 1.10),
            (1.12, 1.11),
            (1.15, 1.12),
            (1.12, 1.11),
            (1.11, 1.08),
            (1.10, 1.05),
            (1.11, 1.07),
            (1.12, 1.08),
            (1.13, 1.09),
        ]);

        let swings = SwingDetector::new(3).detect_swings(&candles);

        let highs: Vec<_> = swings.iter().filter(|s| s.is_high).collect();
        let lows: Vec<_> = swings.iter().filter(|s| !s.is_high).collect();
        assert_eq!(highs.len(), 1);
        assert_eq!(highs[0].candle_index, 3);
        assert_eq!(highs[0].price, 1.15);
        assert_eq!(lows.len(), 1);
        assert_eq!(lows[0].candle_index, 6);
        assert_eq!(lows[0].price, 1.05);
    }

    #[test]
    fn test_equal_highs_produce_no_swing() {
        let candles = candles_from_highs_lows(&[
            (1.10, 1.09),
            (1.11, 1.10),
            (1.15, 1.11),
            (1.15, 1.12),
            (1.12, 1.11),
            (1.11, 1.10),
            (1.10, 1.09),
        ]);

        let swings = SwingDetector::new(2).detect_swings(&candles);
        assert!(swings.iter().all(|s| !s.is_high));
    }

    #[test]
    fn test_too_few_candles() {
        let candles = candles_from_highs_lows(&[(1.1, 1.0), (1.2, 1.1), (1.1, 1.0)]);
        assert!(SwingDetector::new(3).detect_swings(&candles).is_empty());
        assert_eq!(SwingDetector::new(3).analyze_structure(&candles), MarketStructure::empty());
    }

    #[test]
    fn test_uptrend_classification() {
        // Two rising waves: swing highs 1.20 -> 1.30, swing lows 1.00 -> 1.10
        let mut rows = Vec::new();
        for (peak, trough) in [(1.20, 1.00), (1.30, 1.10)] {
            rows.push((trough + 0.05, trough + 0.01));
            rows.push((trough + 0.04, trough));
            rows.push((trough + 0.06, trough + 0.02));
            rows.push((peak - 0.02, peak - 0.06));
            rows.push((peak, peak - 0.04));
            rows.push((peak - 0.03, peak - 0.07));
        }
        rows.push((1.20, 1.12));
        rows.push((1.19, 1.13));

        let candles = candles_from_highs_lows(&rows);
        let structure = SwingDetector::new(1).analyze_structure(&candles);

        assert_eq!(structure.trend, Trend::Uptrend);
        assert!(!structure.higher_highs.is_empty());
        assert!(!structure.higher_lows.is_empty());
        assert_eq!(structure.last_swing_high.map(|s| s.price), Some(1.30));
    }

    fn swing(candle_index: usize, price: f64, is_high: bool) -> SwingPoint {
        SwingPoint {
            timestamp: crate::analysis::test_support::base_time()
                + chrono::Duration::minutes(30 * candle_index as i64),
            price,
            is_high,
            candle_index,
        }
    }

    #[test]
    fn test_mixed_regimes_resolve_to_uptrend() {
        // Highs 1.20 -> 1.30 -> 1.25, lows 1.00 -> 1.10 -> 1.05
        let structure = structure_from_swings(vec![
            swing(2, 1.00, false),
            swing(5, 1.20, true),
            swing(8, 1.10, false),
            swing(11, 1.30, true),
            swing(14, 1.05, false),
            swing(17, 1.25, true),
        ]);

        assert_eq!(structure.higher_highs.len(), 1);
        assert_eq!(structure.higher_lows.len(), 1);
        assert_eq!(structure.lower_highs.len(), 1);
        assert_eq!(structure.lower_lows.len(), 1);
        assert_eq!(structure.trend, Trend::Uptrend);
    }

    #[test]
    fn test_lower_highs_and_lows_only_is_downtrend() {
        let structure = structure_from_swings(vec![
            swing(2, 1.30, true),
            swing(5, 1.10, false),
            swing(8, 1.25, true),
            swing(11, 1.05, false),
        ]);
        assert_eq!(structure.trend, Trend::Downtrend);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 1.1 + ((i as f64) * 0.7).sin() * 0.01;
                candle(i, base, base + 0.002, base - 0.002, base + 0.001)
            })
            .collect();
        let detector = SwingDetector::default();
        assert_eq!(detector.detect_swings(&candles), detector.detect_swings(&candles));
        assert_eq!(
            detector.analyze_structure(&candles),
            detector.analyze_structure(&candles)
        );
    }
}
