//! Detector and gate properties
//!
//! These hold for any candle sequence, not just the hand-built scenarios in
//! the unit tests.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use smc_signals::analysis::{
    ConfirmationDetector, LiquidityDetector, Poi, PoiDetector, PoiKind, StructureAnalyzer,
    StructureEventType, SwingDetector, Trend,
};
use smc_signals::{deterministic_decision, AnalysisConfig, Bias, Candle, Decision, StructureConfig};

const PIP: f64 = 0.0001;

/// (close delta, upper wick, lower wick) in pips
type Step = (i32, u8, u8);

/// Random walk on a pip grid so equal highs and lows show up regularly
fn build_candles(steps: &[Step]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
    let mut close_pips: i64 = 11_000;

    steps
        .iter()
        .enumerate()
        .map(|(i, &(delta, upper, lower))| {
            let open_pips = close_pips;
            close_pips = (close_pips + delta as i64).max(100);
            let high_pips = open_pips.max(close_pips) + upper as i64;
            let low_pips = open_pips.min(close_pips) - lower as i64;

            Candle::new(
                start + Duration::minutes(30 * i as i64),
                open_pips as f64 * PIP,
                high_pips as f64 * PIP,
                low_pips as f64 * PIP,
                close_pips as f64 * PIP,
            )
        })
        .collect()
}

fn candles_strategy() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-25i32..=25, 0u8..8, 0u8..8), 8..120)
        .prop_map(|steps| build_candles(&steps))
}

fn active_structure_config() -> StructureConfig {
    StructureConfig {
        lookback: 2,
        min_candles: 8,
        skip_candles: 0,
        ..StructureConfig::default()
    }
}

fn test_poi(is_bullish: bool) -> Poi {
    Poi {
        kind: PoiKind::FairValueGap {
            mid: 1.1015,
            fill_percentage: 0.0,
        },
        zone_high: 1.1020,
        zone_low: 1.1010,
        timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap(),
        candle_index: 5,
        strength: 0.7,
        is_bullish,
    }
}

proptest! {
    #[test]
    fn swing_detection_is_deterministic(candles in candles_strategy(), lookback in 1usize..5) {
        let detector = SwingDetector::new(lookback);
        let first = detector.detect_swings(&candles);
        let second = detector.detect_swings(&candles);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn swing_extremes_are_strict(candles in candles_strategy(), lookback in 1usize..5) {
        for swing in SwingDetector::new(lookback).detect_swings(&candles) {
            let i = swing.candle_index;
            for j in (i - lookback)..=(i + lookback) {
                if j == i {
                    continue;
                }
                if swing.is_high {
                    prop_assert!(candles[j].high < swing.price);
                } else {
                    prop_assert!(candles[j].low > swing.price);
                }
            }
        }
    }

    #[test]
    fn bos_up_never_in_downtrend(candles in candles_strategy()) {
        let analyzer = StructureAnalyzer::new(active_structure_config());
        let structure = analyzer.analyze_structure(&candles);
        let events = analyzer.detect_with_structure(&candles, &structure);

        if structure.trend == Trend::Downtrend {
            prop_assert!(events.iter().all(|e| e.event_type != StructureEventType::BosUp));
        }
        if structure.trend == Trend::Uptrend {
            prop_assert!(events.iter().all(|e| e.event_type != StructureEventType::BosDown));
        }
    }

    #[test]
    fn mss_requires_prior_counter_swings(candles in candles_strategy()) {
        let analyzer = StructureAnalyzer::new(active_structure_config());
        let structure = analyzer.analyze_structure(&candles);

        for event in analyzer.detect_with_structure(&candles, &structure) {
            match event.event_type {
                StructureEventType::MssUp => prop_assert!(structure.lower_lows.len() >= 2),
                StructureEventType::MssDown => prop_assert!(structure.higher_highs.len() >= 2),
                _ => {}
            }
        }
    }

    #[test]
    fn structure_events_are_capped_and_newest_first(candles in candles_strategy()) {
        let config = active_structure_config();
        let events = StructureAnalyzer::new(config.clone()).detect_bos_mss(&candles);

        prop_assert!(events.len() <= config.max_events);
        prop_assert!(events.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn fair_value_gaps_exceed_tolerance(candles in candles_strategy()) {
        let config = AnalysisConfig::default();
        let tolerance = config.thresholds.fvg_tolerance;

        for gap in PoiDetector::new(&config).detect_fvg(&candles) {
            prop_assert!(gap.bottom < gap.top);
            prop_assert!(gap.top - gap.bottom > tolerance);
            prop_assert!(gap.bottom < gap.mid && gap.mid < gap.top);
        }
    }

    #[test]
    fn sweeps_follow_pierce_and_last_touch(candles in candles_strategy()) {
        let detector = LiquidityDetector::new(&AnalysisConfig::default());
        let pools = detector.find_liquidity_pools(&candles);

        for sweep in detector.detect_sweeps(&candles, &pools) {
            prop_assert!(sweep.candle_index > sweep.pierce_index);
            prop_assert!(sweep.pierce_index > sweep.last_touch_index);
            prop_assert!(sweep.candle_index < candles.len());
        }
    }

    #[test]
    fn detectors_are_idempotent(candles in candles_strategy()) {
        let config = AnalysisConfig::default();
        let snapshot = candles.clone();

        let analyzer = StructureAnalyzer::new(active_structure_config());
        prop_assert_eq!(analyzer.detect_bos_mss(&candles), analyzer.detect_bos_mss(&candles));

        let pois = PoiDetector::new(&config);
        prop_assert_eq!(pois.get_all_pois(&candles), pois.get_all_pois(&candles));

        let liquidity = LiquidityDetector::new(&config);
        let pools = liquidity.find_liquidity_pools(&candles);
        prop_assert_eq!(&pools, &liquidity.find_liquidity_pools(&candles));
        prop_assert_eq!(
            liquidity.detect_sweeps(&candles, &pools),
            liquidity.detect_sweeps(&candles, &pools)
        );

        let confirmations = ConfirmationDetector::new(&config);
        prop_assert_eq!(
            confirmations.get_confirmations(&candles, Bias::Neutral),
            confirmations.get_confirmations(&candles, Bias::Neutral)
        );

        prop_assert_eq!(candles, snapshot);
    }

    #[test]
    fn poi_list_is_bounded_and_newest_first(candles in candles_strategy()) {
        let pois = PoiDetector::default().get_all_pois(&candles);
        prop_assert!(pois.len() <= 20);
        prop_assert!(pois.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }
}

#[test]
fn gate_trades_only_when_every_condition_holds() {
    for bias_clear in [false, true] {
        for poi_matches in [false, true] {
            for sweep in [false, true] {
                for confirmation in [false, true] {
                    for bias in [Bias::Long, Bias::Short] {
                        let bias = if bias_clear { bias } else { Bias::Neutral };
                        let bullish_poi = match bias {
                            Bias::Short => !poi_matches,
                            _ => poi_matches,
                        };
                        let poi = test_poi(bullish_poi);

                        let outcome = deterministic_decision(bias, Some(&poi), sweep, confirmation);
                        let all_hold = bias_clear && poi_matches && sweep && confirmation;

                        if all_hold {
                            assert_eq!(outcome.decision, Decision::from_bias(bias));
                            assert!(outcome.failures.is_empty());
                        } else {
                            assert_eq!(outcome.decision, Decision::NoTrade);
                            assert!(!outcome.failures.is_empty());
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn gate_without_poi_never_trades() {
    for bias in [Bias::Long, Bias::Short, Bias::Neutral] {
        let outcome = deterministic_decision(bias, None, true, true);
        assert_eq!(outcome.decision, Decision::NoTrade);
    }
}
