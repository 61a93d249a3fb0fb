//! Liquidity pools and sweep-and-rejection detection

use crate::config::AnalysisConfig;
use crate::types::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_SWEEPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolType {
    EqualHighs,
    EqualLows,
    RangeHigh,
    RangeLow,
}

impl PoolType {
    /// Resting buy stops above highs
    pub fn is_high_side(&self) -> bool {
        matches!(self, PoolType::EqualHighs | PoolType::RangeHigh)
    }
}

impl std::fmt::Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolType::EqualHighs => write!(f, "EQUAL_HIGHS"),
            PoolType::EqualLows => write!(f, "EQUAL_LOWS"),
            PoolType::RangeHigh => write!(f, "RANGE_HIGH"),
            PoolType::RangeLow => write!(f, "RANGE_LOW"),
        }
    }
}

/// Candle that touched a pool level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Touch {
    pub timestamp: DateTime<Utc>,
    pub candle_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub price_level: f64,
    /// Ordered by candle index
    pub touches: Vec<Touch>,
    pub pool_type: PoolType,
    pub strength: f64,
}

impl LiquidityPool {
    pub fn last_touch_index(&self) -> Option<usize> {
        self.touches.iter().map(|t| t.candle_index).max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquiditySweep {
    /// Timestamp of the rejection candle
    pub timestamp: DateTime<Utc>,
    /// Extreme of the piercing candle
    pub sweep_price: f64,
    pub pool_price: f64,
    pub pool_type: PoolType,
    pub is_swept_up: bool,
    pub is_swept_down: bool,
    /// Close of the rejection candle
    pub rejection_price: f64,
    /// Index of the rejection candle
    pub candle_index: usize,
    pub pierce_index: usize,
    pub last_touch_index: usize,
    /// Distance to the POI midpoint, set by [`LiquidityDetector::check_sweep_into_poi`]
    pub proximity_to_poi: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LiquidityDetector {
    tolerance: f64,
    range_window: usize,
    rejection_window: usize,
    distance_multiplier: f64,
}

impl Default for LiquidityDetector {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl LiquidityDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            tolerance: config.thresholds.liquidity_tolerance,
            range_window: config.range_pool_window,
            rejection_window: config.sweep_rejection_window,
            distance_multiplier: config.sweep_distance_multiplier,
        }
    }

    /// Equal highs/lows with two or more touches, plus the range extremes of the
    /// most recent `range_window` candles.
    pub fn find_liquidity_pools(&self, candles: &[Candle]) -> Vec<LiquidityPool> {
        let mut pools = Vec::new();

        for (level, touches) in self.group_levels(candles, |c| c.high) {
            if touches.len() >= 2 {
                pools.push(LiquidityPool {
                    price_level: level,
                    strength: touches.len() as f64,
                    touches,
                    pool_type: PoolType::EqualHighs,
                });
            }
        }

        for (level, touches) in self.group_levels(candles, |c| c.low) {
            if touches.len() >= 2 {
                pools.push(LiquidityPool {
                    price_level: level,
                    strength: touches.len() as f64,
                    touches,
                    pool_type: PoolType::EqualLows,
                });
            }
        }

        if candles.len() >= self.range_window && self.range_window > 0 {
            let start = candles.len() - self.range_window;
            let recent = &candles[start..];

            let range_high = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            pools.push(LiquidityPool {
                price_level: range_high,
                touches: self.touches_near(recent, start, range_high, |c| c.high),
                pool_type: PoolType::RangeHigh,
                strength: 1.0,
            });

            let range_low = recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            pools.push(LiquidityPool {
                price_level: range_low,
                touches: self.touches_near(recent, start, range_low, |c| c.low),
                pool_type: PoolType::RangeLow,
                strength: 1.0,
            });
        }

        pools
    }

    /// Greedy single-pass grouping keyed by the first price of each group
    fn group_levels(
        &self,
        candles: &[Candle],
        price: impl Fn(&Candle) -> f64,
    ) -> Vec<(f64, Vec<Touch>)> {
        let mut groups: Vec<(f64, Vec<Touch>)> = Vec::new();

        for (i, candle) in candles.iter().enumerate() {
            let value = price(candle);
            let touch = Touch {
                timestamp: candle.timestamp,
                candle_index: i,
            };

            match groups
                .iter_mut()
                .find(|(level, _)| (value - *level).abs() <= self.tolerance)
            {
                Some((_, touches)) => touches.push(touch),
                None => groups.push((value, vec![touch])),
            }
        }

        groups
    }

    fn touches_near(
        &self,
        window: &[Candle],
        offset: usize,
        level: f64,
        price: impl Fn(&Candle) -> f64,
    ) -> Vec<Touch> {
        window
            .iter()
            .enumerate()
            .filter(|(_, c)| (price(c) - level).abs() <= self.tolerance)
            .map(|(i, c)| Touch {
                timestamp: c.timestamp,
                candle_index: offset + i,
            })
            .collect()
    }

    /// First pierce-and-rejection after each pool's last touch, newest first
    pub fn detect_sweeps(&self, candles: &[Candle], pools: &[LiquidityPool]) -> Vec<LiquiditySweep> {
        let mut sweeps: Vec<LiquiditySweep> = pools
            .iter()
            .filter_map(|pool| self.sweep_of(candles, pool))
            .collect();

        sweeps.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(b.candle_index.cmp(&a.candle_index))
        });
        sweeps.truncate(MAX_SWEEPS);
        sweeps
    }

    fn sweep_of(&self, candles: &[Candle], pool: &LiquidityPool) -> Option<LiquiditySweep> {
        let last_touch = pool.last_touch_index()?;
        let level = pool.price_level;
        let high_side = pool.pool_type.is_high_side();

        for i in (last_touch + 1)..candles.len() {
            let pierce = &candles[i];
            let pierced = if high_side {
                pierce.high > level
            } else {
                pierce.low < level
            };
            if !pierced {
                continue;
            }

            let end = (i + self.rejection_window + 1).min(candles.len());
            let rejection = (i + 1..end).find(|&j| {
                if high_side {
                    candles[j].close < level
                } else {
                    candles[j].close > level
                }
            });

            if let Some(j) = rejection {
                let rejection_candle = &candles[j];
                return Some(LiquiditySweep {
                    timestamp: rejection_candle.timestamp,
                    sweep_price: if high_side { pierce.high } else { pierce.low },
                    pool_price: level,
                    pool_type: pool.pool_type,
                    is_swept_up: !high_side,
                    is_swept_down: high_side,
                    rejection_price: rejection_candle.close,
                    candle_index: j,
                    pierce_index: i,
                    last_touch_index: last_touch,
                    proximity_to_poi: None,
                });
            }
        }

        None
    }

    /// First sweep whose pool lies near `poi_price` and whose rejection is at
    /// most `max_candles_away` candles old.
    pub fn check_sweep_into_poi(
        &self,
        candles: &[Candle],
        sweeps: &[LiquiditySweep],
        poi_price: f64,
        max_candles_away: usize,
    ) -> Option<LiquiditySweep> {
        let max_distance = self.tolerance * self.distance_multiplier;

        sweeps.iter().find_map(|sweep| {
            let distance = (sweep.pool_price - poi_price).abs();
            if distance > max_distance || sweep.candle_index >= candles.len() {
                return None;
            }

            let candles_ago = candles.len() - 1 - sweep.candle_index;
            if candles_ago > max_candles_away {
                return None;
            }

            Some(LiquiditySweep {
                proximity_to_poi: Some(distance),
                ..*sweep
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{candle, candles_from_highs_lows};

    fn sweep_sequence() -> Vec<Candle> {
        vec![
            candle(0, 1.1050, 1.1060, 1.1040, 1.1045),
            candle(1, 1.1040, 1.1045, 1.1000, 1.1005),
            candle(2, 1.1035, 1.1070, 1.1030, 1.1060),
            candle(3, 1.1030, 1.1035, 1.1001, 1.1010),
            candle(4, 1.1025, 1.1080, 1.1020, 1.1070),
            candle(5, 1.1020, 1.1028, 1.0990, 1.0995),
            candle(6, 1.0995, 1.1018, 1.0992, 1.1012),
        ]
    }

    #[test]
    fn test_equal_highs_grouped_within_tolerance() {
        let candles = candles_from_highs_lows(&[
            (1.1050, 1.1000),
            (1.1040, 1.0990),
            (1.10503, 1.0980),
            (1.1030, 1.0970),
        ]);
        let pools = LiquidityDetector::default().find_liquidity_pools(&candles);

        assert_eq!(pools.len(), 1);
        let pool = &pools[0];
        assert_eq!(pool.pool_type, PoolType::EqualHighs);
        assert_eq!(pool.price_level, 1.1050);
        assert_eq!(pool.strength, 2.0);
        assert_eq!(pool.last_touch_index(), Some(2));
    }

    #[test]
    fn test_range_pools_over_recent_window() {
        let rows: Vec<(f64, f64)> = (0..25)
            .map(|i| {
                let h = 1.1000 + (i % 7) as f64 * 0.0010;
                (h, h - 0.0005)
            })
            .collect();
        let candles = candles_from_highs_lows(&rows);
        let pools = LiquidityDetector::default().find_liquidity_pools(&candles);

        let range_high = pools
            .iter()
            .find(|p| p.pool_type == PoolType::RangeHigh)
            .unwrap();
        let expected = candles[5..].iter().map(|c| c.high).fold(f64::MIN, f64::max);
        assert_eq!(range_high.price_level, expected);
        assert_eq!(range_high.strength, 1.0);
        assert!(range_high.touches.iter().all(|t| t.candle_index >= 5));
        assert!(pools.iter().any(|p| p.pool_type == PoolType::RangeLow));
    }

    #[test]
    fn test_sweep_of_equal_lows() {
        let candles = sweep_sequence();
        let detector = LiquidityDetector::default();
        let pools = detector.find_liquidity_pools(&candles);
        let sweeps = detector.detect_sweeps(&candles, &pools);

        assert_eq!(sweeps.len(), 1);
        let sweep = &sweeps[0];
        assert_eq!(sweep.pool_type, PoolType::EqualLows);
        assert_eq!(sweep.pool_price, 1.1000);
        assert_eq!(sweep.sweep_price, 1.0990);
        assert_eq!(sweep.rejection_price, 1.1012);
        assert_eq!(sweep.last_touch_index, 3);
        assert_eq!(sweep.pierce_index, 5);
        assert_eq!(sweep.candle_index, 6);
        assert!(sweep.is_swept_up && !sweep.is_swept_down);
        assert_eq!(sweep.proximity_to_poi, None);
    }

    #[test]
    fn test_pierce_without_rejection_is_not_a_sweep() {
        let mut candles = sweep_sequence();
        candles[6] = candle(6, 1.0995, 1.0998, 1.0975, 1.0980);
        let detector = LiquidityDetector::default();
        let pools = detector.find_liquidity_pools(&candles);

        assert!(detector
            .detect_sweeps(&candles, &pools)
            .iter()
            .all(|s| s.pool_price != 1.1000));
    }

    #[test]
    fn test_sweep_into_poi_distance_and_recency() {
        let candles = sweep_sequence();
        let detector = LiquidityDetector::default();
        let pools = detector.find_liquidity_pools(&candles);
        let sweeps = detector.detect_sweeps(&candles, &pools);

        let hit = detector
            .check_sweep_into_poi(&candles, &sweeps, 1.1010, 10)
            .unwrap();
        assert!((hit.proximity_to_poi.unwrap() - 0.0010).abs() < 1e-9);

        assert!(detector.check_sweep_into_poi(&candles, &sweeps, 1.2000, 10).is_none());

        let mut longer = candles.clone();
        longer.extend((7..20).map(|i| candle(i, 1.1010, 1.1015, 1.1005, 1.1012)));
        assert!(detector.check_sweep_into_poi(&longer, &sweeps, 1.1010, 10).is_none());
    }
}
