//! Point of Interest detection on the mid timeframe
//!
//! Order blocks, fair value gaps, breakers and rejection blocks are each found
//! by an independent forward scan and merged into [`Poi`] values.

use crate::config::AnalysisConfig;
use crate::types::{Bias, Candle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_POIS: usize = 20;

/// Last opposing candle before an impulsive three-candle move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub timestamp: DateTime<Utc>,
    /// Body high of the order block candle
    pub high: f64,
    /// Body low of the order block candle
    pub low: f64,
    pub open: f64,
    pub close: f64,
    /// Direction of the impulse that followed
    pub is_bullish: bool,
    pub candle_index: usize,
    /// Body/range ratio of the impulse candle
    pub strength: f64,
}

impl OrderBlock {
    /// Index of the impulse candle that confirmed the block
    pub fn impulse_index(&self) -> usize {
        self.candle_index + 2
    }
}

/// Three-candle imbalance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub timestamp: DateTime<Utc>,
    pub top: f64,
    pub bottom: f64,
    pub mid: f64,
    pub is_bullish: bool,
    /// Index of the middle candle
    pub candle_index: usize,
    /// Not tracked by detection, always 0
    pub fill_percentage: f64,
}

/// Order block that was invalidated and then retested from the other side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breaker {
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub original_ob_high: f64,
    pub original_ob_low: f64,
    /// Index of the retest candle
    pub candle_index: usize,
    pub is_bullish: bool,
}

/// POI kind with its type-specific details
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PoiKind {
    #[serde(rename = "OB")]
    OrderBlock { open: f64, close: f64 },
    #[serde(rename = "FVG")]
    FairValueGap { mid: f64, fill_percentage: f64 },
    #[serde(rename = "BREAKER")]
    Breaker {
        original_ob_high: f64,
        original_ob_low: f64,
    },
    #[serde(rename = "RB")]
    RejectionBlock { wick_ratio: f64 },
}

impl PoiKind {
    pub fn label(&self) -> &'static str {
        match self {
            PoiKind::OrderBlock { .. } => "OB",
            PoiKind::FairValueGap { .. } => "FVG",
            PoiKind::Breaker { .. } => "BREAKER",
            PoiKind::RejectionBlock { .. } => "RB",
        }
    }

    /// OB and FVG are the preferred entry zones
    pub fn is_primary(&self) -> bool {
        matches!(self, PoiKind::OrderBlock { .. } | PoiKind::FairValueGap { .. })
    }
}

impl std::fmt::Display for PoiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Unified POI zone `[zone_low, zone_high]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub kind: PoiKind,
    pub zone_high: f64,
    pub zone_low: f64,
    pub timestamp: DateTime<Utc>,
    pub candle_index: usize,
    pub strength: f64,
    pub is_bullish: bool,
}

impl Poi {
    pub fn mid(&self) -> f64 {
        (self.zone_high + self.zone_low) / 2.0
    }

    /// "low-high" with the given number of decimals
    pub fn zone_string(&self, precision: usize) -> String {
        format!(
            "{:.*}-{:.*}",
            precision, self.zone_low, precision, self.zone_high
        )
    }
}

impl From<OrderBlock> for Poi {
    fn from(ob: OrderBlock) -> Self {
        Self {
            kind: PoiKind::OrderBlock {
                open: ob.open,
                close: ob.close,
            },
            zone_high: ob.high,
            zone_low: ob.low,
            timestamp: ob.timestamp,
            candle_index: ob.candle_index,
            strength: ob.strength,
            is_bullish: ob.is_bullish,
        }
    }
}

impl From<FairValueGap> for Poi {
    fn from(fvg: FairValueGap) -> Self {
        Self {
            kind: PoiKind::FairValueGap {
                mid: fvg.mid,
                fill_percentage: fvg.fill_percentage,
            },
            zone_high: fvg.top,
            zone_low: fvg.bottom,
            timestamp: fvg.timestamp,
            candle_index: fvg.candle_index,
            strength: 1.0,
            is_bullish: fvg.is_bullish,
        }
    }
}

impl From<Breaker> for Poi {
    fn from(breaker: Breaker) -> Self {
        Self {
            kind: PoiKind::Breaker {
                original_ob_high: breaker.original_ob_high,
                original_ob_low: breaker.original_ob_low,
            },
            zone_high: breaker.high,
            zone_low: breaker.low,
            timestamp: breaker.timestamp,
            candle_index: breaker.candle_index,
            strength: 1.0,
            is_bullish: breaker.is_bullish,
        }
    }
}

/// POI detector parameterized by [`AnalysisConfig`]
#[derive(Debug, Clone)]
pub struct PoiDetector {
    fvg_tolerance: f64,
    ob_min_body_ratio: f64,
    breaker_lookahead: usize,
    rb_min_wick_ratio: f64,
}

impl Default for PoiDetector {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl PoiDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            fvg_tolerance: config.thresholds.fvg_tolerance,
            ob_min_body_ratio: config.ob_min_body_ratio,
            breaker_lookahead: config.breaker_lookahead,
            rb_min_wick_ratio: config.rb_min_wick_ratio,
        }
    }

    pub fn detect_order_blocks(&self, candles: &[Candle]) -> Vec<OrderBlock> {
        let mut blocks = Vec::new();

        for i in 2..candles.len() {
            let (base, prev, current) = (&candles[i - 2], &candles[i - 1], &candles[i]);

            let bullish = current.close > prev.close
                && prev.close > base.close
                && current.high > prev.high
                && prev.high > base.high;
            let bearish = current.close < prev.close
                && prev.close < base.close
                && current.low < prev.low
                && prev.low < base.low;

            if !bullish && !bearish {
                continue;
            }

            let Some(body_ratio) = current.body_ratio() else {
                continue;
            };
            if body_ratio <= self.ob_min_body_ratio {
                continue;
            }

            blocks.push(OrderBlock {
                timestamp: base.timestamp,
                high: base.body_high(),
                low: base.body_low(),
                open: base.open,
                close: base.close,
                is_bullish: bullish,
                candle_index: i - 2,
                strength: body_ratio,
            });
        }

        blocks
    }

    pub fn detect_fvg(&self, candles: &[Candle]) -> Vec<FairValueGap> {
        let mut gaps = Vec::new();

        for i in 2..candles.len() {
            let (first, middle, third) = (&candles[i - 2], &candles[i - 1], &candles[i]);

            let (top, bottom, is_bullish) = if first.high < third.low {
                (third.low, first.high, true)
            } else if first.low > third.high {
                (first.low, third.high, false)
            } else {
                continue;
            };

            if top - bottom <= self.fvg_tolerance {
                continue;
            }

            gaps.push(FairValueGap {
                timestamp: middle.timestamp,
                top,
                bottom,
                mid: (top + bottom) / 2.0,
                is_bullish,
                candle_index: i - 1,
                fill_percentage: 0.0,
            });
        }

        gaps
    }

    /// One breaker per order block: the first retest after its first invalidation
    pub fn detect_breakers(&self, candles: &[Candle], order_blocks: &[OrderBlock]) -> Vec<Breaker> {
        let mut breakers = Vec::new();

        for ob in order_blocks {
            let start = ob.impulse_index() + 1;
            if start >= candles.len() {
                continue;
            }

            let invalidated = candles[start..].iter().position(|c| {
                if ob.is_bullish {
                    c.low < ob.low
                } else {
                    c.high > ob.high
                }
            });
            let Some(offset) = invalidated else { continue };
            let i = start + offset;

            let end = (i + self.breaker_lookahead).min(candles.len());
            let retest = (i + 1..end).find(|&j| {
                let c = &candles[j];
                if ob.is_bullish {
                    c.high > ob.high && c.is_bearish()
                } else {
                    c.low < ob.low && c.is_bullish()
                }
            });

            if let Some(j) = retest {
                breakers.push(Breaker {
                    timestamp: candles[j].timestamp,
                    high: ob.high,
                    low: ob.low,
                    original_ob_high: ob.high,
                    original_ob_low: ob.low,
                    candle_index: j,
                    is_bullish: !ob.is_bullish,
                });
            }
        }

        breakers
    }

    /// Wick-dominant candles whose rejection is held by the next candle
    pub fn detect_rejection_blocks(&self, candles: &[Candle]) -> Vec<Poi> {
        let mut blocks = Vec::new();
        if candles.len() < 3 {
            return blocks;
        }

        for i in 1..candles.len() - 1 {
            let (current, next) = (&candles[i], &candles[i + 1]);
            let range = current.range();
            if range <= 0.0 {
                continue;
            }

            let (wick_ratio, is_bullish) = if current.high > current.open
                && current.is_bearish()
                && next.low < current.low
            {
                (current.upper_wick() / range, false)
            } else if current.low < current.open && current.is_bullish() && next.high > current.high
            {
                (current.lower_wick() / range, true)
            } else {
                continue;
            };

            if wick_ratio >= self.rb_min_wick_ratio {
                blocks.push(Poi {
                    kind: PoiKind::RejectionBlock { wick_ratio },
                    zone_high: current.high,
                    zone_low: current.low,
                    timestamp: current.timestamp,
                    candle_index: i,
                    strength: wick_ratio,
                    is_bullish,
                });
            }
        }

        blocks
    }

    /// All POIs newest first, at most 20
    pub fn get_all_pois(&self, candles: &[Candle]) -> Vec<Poi> {
        let order_blocks = self.detect_order_blocks(candles);
        let breakers = self.detect_breakers(candles, &order_blocks);

        let mut pois: Vec<Poi> = order_blocks.into_iter().map(Poi::from).collect();
        pois.extend(self.detect_fvg(candles).into_iter().map(Poi::from));
        pois.extend(breakers.into_iter().map(Poi::from));
        pois.extend(self.detect_rejection_blocks(candles));

        // Stable sort keeps detector order for equal timestamps
        pois.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        pois.truncate(MAX_POIS);
        pois
    }
}

/// Strongest bias-aligned OB/FVG, else the most recent POI of any kind.
/// `pois` must be newest first; ties on strength keep the more recent zone.
pub fn select_best_poi(pois: &[Poi], bias: Bias) -> Option<Poi> {
    let aligned = pois
        .iter()
        .filter(|p| p.kind.is_primary() && bias.matches(p.is_bullish))
        .fold(None::<&Poi>, |best, p| match best {
            Some(b) if b.strength >= p.strength => Some(b),
            _ => Some(p),
        });

    aligned.or_else(|| pois.first()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{base_time, candle};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn order_block_sequence() -> Vec<Candle> {
        vec![
            candle(0, 1.1010, 1.1012, 1.0998, 1.1000),
            candle(1, 1.1003, 1.1015, 1.1002, 1.1010),
            candle(2, 1.1010, 1.1042, 1.1008, 1.1040),
            candle(3, 1.1040, 1.1041, 1.0990, 1.0992),
            candle(4, 1.1005, 1.1015, 1.0995, 1.0998),
        ]
    }

    #[test]
    fn test_bullish_fvg_scenario() {
        let candles = vec![
            candle(0, 1.10, 1.101, 1.099, 1.1005),
            candle(1, 1.1005, 1.102, 1.100, 1.1015),
            candle(2, 1.1015, 1.1035, 1.102, 1.1025),
        ];

        let gaps = PoiDetector::default().detect_fvg(&candles);
        assert_eq!(gaps.len(), 1);
        let gap = &gaps[0];
        assert!(gap.is_bullish);
        assert!(approx(gap.bottom, 1.1010));
        assert!(approx(gap.top, 1.1020));
        assert!(approx(gap.mid, 1.1015));
        assert_eq!(gap.candle_index, 1);
        assert_eq!(gap.timestamp, candles[1].timestamp);
    }

    #[test]
    fn test_fvg_below_tolerance_ignored() {
        let candles = vec![
            candle(0, 1.10000, 1.10100, 1.09900, 1.10050),
            candle(1, 1.10050, 1.10200, 1.10000, 1.10150),
            candle(2, 1.10150, 1.10300, 1.10105, 1.10250),
        ];
        assert!(PoiDetector::default().detect_fvg(&candles).is_empty());
    }

    #[test]
    fn test_order_block_is_candle_before_impulse() {
        let candles = order_block_sequence();
        let blocks = PoiDetector::default().detect_order_blocks(&candles);

        assert_eq!(blocks.len(), 1);
        let ob = &blocks[0];
        assert!(ob.is_bullish);
        assert_eq!(ob.candle_index, 0);
        assert!(approx(ob.low, 1.1000));
        assert!(approx(ob.high, 1.1010));
        assert!(ob.strength > 0.6);
    }

    #[test]
    fn test_breaker_after_invalidation_and_retest() {
        let candles = order_block_sequence();
        let detector = PoiDetector::default();
        let blocks = detector.detect_order_blocks(&candles);
        let breakers = detector.detect_breakers(&candles, &blocks);

        assert_eq!(breakers.len(), 1);
        let breaker = &breakers[0];
        assert_eq!(breaker.candle_index, 4);
        assert!(!breaker.is_bullish);
        assert!(approx(breaker.original_ob_low, 1.1000));
        assert!(approx(breaker.original_ob_high, 1.1010));
    }

    #[test]
    fn test_rejection_block_requires_follow_through() {
        // Long upper wick, bearish body, next candle trades below
        let held = vec![
            candle(0, 1.1000, 1.1005, 1.0995, 1.1000),
            candle(1, 1.1010, 1.1040, 1.1000, 1.1005),
            candle(2, 1.1005, 1.1006, 1.0990, 1.0992),
        ];
        let blocks = PoiDetector::default().detect_rejection_blocks(&held);
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].is_bullish);
        assert_eq!(blocks[0].kind.label(), "RB");
        assert!(approx(blocks[0].strength, 0.75));

        let mut failed = held.clone();
        failed[2] = candle(2, 1.1005, 1.1010, 1.1001, 1.1008);
        assert!(PoiDetector::default().detect_rejection_blocks(&failed).is_empty());
    }

    #[test]
    fn test_all_pois_newest_first() {
        let candles = order_block_sequence();
        let pois = PoiDetector::default().get_all_pois(&candles);

        assert!(!pois.is_empty());
        assert!(pois.len() <= MAX_POIS);
        assert!(pois.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(pois.iter().all(|p| p.zone_low <= p.zone_high));
    }

    fn poi(kind: PoiKind, index: usize, strength: f64, is_bullish: bool) -> Poi {
        Poi {
            kind,
            zone_high: 1.1010,
            zone_low: 1.1000,
            timestamp: base_time() + chrono::Duration::minutes(30 * index as i64),
            candle_index: index,
            strength,
            is_bullish,
        }
    }

    #[test]
    fn test_best_poi_prefers_strongest_aligned_primary() {
        let ob = PoiKind::OrderBlock { open: 1.1, close: 1.1 };
        let fvg = PoiKind::FairValueGap { mid: 1.1, fill_percentage: 0.0 };
        let rb = PoiKind::RejectionBlock { wick_ratio: 0.9 };

        // Newest first
        let pois = vec![
            poi(rb, 9, 0.9, true),
            poi(ob, 8, 0.7, false),
            poi(fvg, 7, 1.0, true),
            poi(ob, 6, 0.8, true),
        ];

        let best = select_best_poi(&pois, Bias::Long).unwrap();
        assert_eq!(best.candle_index, 7);

        let best = select_best_poi(&pois, Bias::Short).unwrap();
        assert_eq!(best.candle_index, 8);
    }

    #[test]
    fn test_best_poi_falls_back_to_most_recent() {
        let rb = PoiKind::RejectionBlock { wick_ratio: 0.6 };
        let pois = vec![poi(rb, 5, 0.6, false), poi(rb, 3, 0.9, true)];

        assert_eq!(select_best_poi(&pois, Bias::Long).unwrap().candle_index, 5);
        assert_eq!(select_best_poi(&pois, Bias::Neutral).unwrap().candle_index, 5);
        assert_eq!(select_best_poi(&[], Bias::Long), None);
    }

    #[test]
    fn test_zone_string_precision() {
        let p = poi(PoiKind::RejectionBlock { wick_ratio: 0.6 }, 0, 0.6, true);
        assert_eq!(p.zone_string(5), "1.10000-1.10100");
        assert!((p.mid() - 1.1005).abs() < 1e-12);
    }

    #[test]
    fn test_poi_kind_serializes_with_tag() {
        let json = serde_json::to_value(PoiKind::Breaker {
            original_ob_high: 1.2,
            original_ob_low: 1.1,
        })
        .unwrap();
        assert_eq!(json["type"], "BREAKER");
    }
}
