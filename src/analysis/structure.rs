//! Break of Structure / Market Structure Shift detection and bias

use super::swings::{MarketStructure, SwingDetector, SwingPoint, Trend};
use crate::config::StructureConfig;
use crate::types::{Bias, Candle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Directional structural event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StructureEventType {
    BosUp,
    BosDown,
    MssUp,
    MssDown,
    None,
}

impl StructureEventType {
    pub fn bias(&self) -> Bias {
        match self {
            Self::BosUp | Self::MssUp => Bias::Long,
            Self::BosDown | Self::MssDown => Bias::Short,
            Self::None => Bias::Neutral,
        }
    }

    pub fn is_reversal(&self) -> bool {
        matches!(self, Self::MssUp | Self::MssDown)
    }
}

impl std::fmt::Display for StructureEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BosUp => write!(f, "BOS_UP"),
            Self::BosDown => write!(f, "BOS_DOWN"),
            Self::MssUp => write!(f, "MSS_UP"),
            Self::MssDown => write!(f, "MSS_DOWN"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// A close beyond a swing level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureEvent {
    pub event_type: StructureEventType,
    pub timestamp: DateTime<Utc>,
    /// Close of the breaking candle
    pub price: f64,
    /// Swing level that was broken
    pub swing_level: f64,
    pub candle_index: usize,
    pub confidence: f64,
}

const BOS_CONFIDENCE: f64 = 1.0;
const MSS_CONFIDENCE: f64 = 0.8;

/// Detects BOS/MSS events on the higher timeframe and derives bias
#[derive(Debug, Clone)]
pub struct StructureAnalyzer {
    swing_detector: SwingDetector,
    config: StructureConfig,
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new(StructureConfig::default())
    }
}

impl StructureAnalyzer {
    pub fn new(config: StructureConfig) -> Self {
        Self {
            swing_detector: SwingDetector::new(config.lookback),
            config,
        }
    }

    pub fn analyze_structure(&self, candles: &[Candle]) -> MarketStructure {
        self.swing_detector.analyze_structure(candles)
    }

    /// Detect BOS/MSS events, newest first, capped at `max_events`
    pub fn detect_bos_mss(&self, candles: &[Candle]) -> Vec<StructureEvent> {
        if candles.len() < self.config.min_candles {
            return Vec::new();
        }

        let structure = self.analyze_structure(candles);
        self.detect_with_structure(candles, &structure)
    }

    /// Same as [`detect_bos_mss`](Self::detect_bos_mss) but reuses an already computed structure
    pub fn detect_with_structure(
        &self,
        candles: &[Candle],
        structure: &MarketStructure,
    ) -> Vec<StructureEvent> {
        if candles.len() < self.config.min_candles || structure.swings.is_empty() {
            return Vec::new();
        }

        let mut events: Vec<StructureEvent> = Vec::new();

        for (i, candle) in candles.iter().enumerate().skip(self.config.skip_candles) {
            for event_type in self.classify(i, candle, structure) {
                let level = match event_type {
                    StructureEventType::BosUp | StructureEventType::MssDown => {
                        structure.last_swing_high
                    }
                    _ => structure.last_swing_low,
                };
                let Some(level) = level else { continue };

                if !event_type.is_reversal()
                    && self.is_duplicate(&events, event_type, candle.timestamp)
                {
                    continue;
                }

                events.push(StructureEvent {
                    event_type,
                    timestamp: candle.timestamp,
                    price: candle.close,
                    swing_level: level.price,
                    candle_index: i,
                    confidence: if event_type.is_reversal() {
                        MSS_CONFIDENCE
                    } else {
                        BOS_CONFIDENCE
                    },
                });
            }
        }

        events.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(b.candle_index.cmp(&a.candle_index))
        });
        events.truncate(self.config.max_events);
        events
    }

    /// Event types triggered by a single candle given the structure snapshot
    fn classify(
        &self,
        i: usize,
        candle: &Candle,
        structure: &MarketStructure,
    ) -> Vec<StructureEventType> {
        let mut found = Vec::new();
        let closes_above = |swing: &Option<SwingPoint>| {
            swing.map_or(false, |s| candle.close > s.price && i > s.candle_index)
        };
        let closes_below = |swing: &Option<SwingPoint>| {
            swing.map_or(false, |s| candle.close < s.price && i > s.candle_index)
        };

        match structure.trend {
            Trend::Uptrend => {
                if closes_above(&structure.last_swing_high) {
                    found.push(StructureEventType::BosUp);
                }
                if closes_below(&structure.last_swing_high)
                    && structure.higher_highs.len() >= self.config.mss_min_prior_swings
                {
                    found.push(StructureEventType::MssDown);
                }
            }
            Trend::Downtrend => {
                if closes_below(&structure.last_swing_low) {
                    found.push(StructureEventType::BosDown);
                }
                if closes_above(&structure.last_swing_low)
                    && structure.lower_lows.len() >= self.config.mss_min_prior_swings
                {
                    found.push(StructureEventType::MssUp);
                }
            }
            Trend::Sideways => {
                if closes_above(&structure.last_swing_high) {
                    found.push(StructureEventType::BosUp);
                }
                if closes_below(&structure.last_swing_low) {
                    found.push(StructureEventType::BosDown);
                }
            }
        }

        found
    }

    fn is_duplicate(
        &self,
        events: &[StructureEvent],
        event_type: StructureEventType,
        timestamp: DateTime<Utc>,
    ) -> bool {
        events.iter().any(|e| {
            e.event_type == event_type
                && (e.timestamp - timestamp).num_seconds().abs() < self.config.dedup_window_secs
        })
    }

    /// Bias from the most recent event
    pub fn get_bias(&self, candles: &[Candle]) -> (Bias, Option<StructureEvent>) {
        bias_from_events(&self.detect_bos_mss(candles))
    }
}

/// Bias implied by the newest event of a newest-first list
pub fn bias_from_events(events: &[StructureEvent]) -> (Bias, Option<StructureEvent>) {
    match events.first() {
        Some(event) if event.event_type != StructureEventType::None => {
            (event.event_type.bias(), Some(*event))
        }
        _ => (Bias::Neutral, None),
    }
}
