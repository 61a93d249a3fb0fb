//! Lower-timeframe entry confirmation patterns

use crate::config::AnalysisConfig;
use crate::types::{Bias, Candle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_CONFIRMATIONS: usize = 10;
const BREAK_ENTRY_CONFIDENCE: f64 = 0.8;
const MIN_BODY: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WickSide {
    Upper,
    Lower,
}

/// Pattern kind with its type-specific details
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    MorningStar,
    EveningStar,
    BreakEntry {
        break_level: f64,
        break_price: f64,
        retest_price: f64,
    },
    Rejection {
        wick: WickSide,
        wick_ratio: f64,
        body_ratio: f64,
    },
}

impl PatternKind {
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::MorningStar => "MORNING_STAR",
            PatternKind::EveningStar => "EVENING_STAR",
            PatternKind::BreakEntry { .. } => "BREAK_ENTRY",
            PatternKind::Rejection { .. } => "REJECTION",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationPattern {
    pub kind: PatternKind,
    pub timestamp: DateTime<Utc>,
    /// Close of the confirming candle
    pub price: f64,
    pub candle_index: usize,
    pub is_bullish: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct ConfirmationDetector {
    break_lookback: usize,
    retest_window: usize,
    retest_tolerance: f64,
    wick_ratio: f64,
    max_body_ratio: f64,
}

impl Default for ConfirmationDetector {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl ConfirmationDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            break_lookback: config.break_lookback,
            retest_window: config.break_retest_window,
            retest_tolerance: config.thresholds.retest_tolerance,
            wick_ratio: config.rejection_wick_ratio,
            max_body_ratio: config.rejection_max_body_ratio,
        }
    }

    pub fn detect_morning_star(&self, candles: &[Candle]) -> Vec<ConfirmationPattern> {
        self.detect_star(candles, true)
    }

    pub fn detect_evening_star(&self, candles: &[Candle]) -> Vec<ConfirmationPattern> {
        self.detect_star(candles, false)
    }

    /// Three-candle star: decisive candle, small inside candle, decisive reversal
    fn detect_star(&self, candles: &[Candle], bullish: bool) -> Vec<ConfirmationPattern> {
        let mut patterns = Vec::new();

        for i in 2..candles.len() {
            let (first, middle, last) = (&candles[i - 2], &candles[i - 1], &candles[i]);
            let first_mid = (first.open + first.close) / 2.0;

            let inside = middle.high < first.body_high() && middle.low > first.body_low();
            let shape = if bullish {
                first.is_bearish() && last.is_bullish() && last.close > first_mid
            } else {
                first.is_bullish() && last.is_bearish() && last.close < first_mid
            };
            if !(inside && shape) {
                continue;
            }

            let body1 = first.body().max(MIN_BODY);
            let confidence = ((last.body() / body1) * (1.0 - middle.body() / body1)).clamp(0.0, 1.0);

            patterns.push(ConfirmationPattern {
                kind: if bullish {
                    PatternKind::MorningStar
                } else {
                    PatternKind::EveningStar
                },
                timestamp: last.timestamp,
                price: last.close,
                candle_index: i,
                is_bullish: bullish,
                confidence,
            });
        }

        patterns
    }

    /// Close beyond the recent extreme followed by a retest of that level
    pub fn detect_break_entry(&self, candles: &[Candle]) -> Vec<ConfirmationPattern> {
        let mut patterns = Vec::new();
        let lookback = self.break_lookback;
        if lookback == 0 {
            return patterns;
        }

        for i in lookback..candles.len() {
            let current = &candles[i];
            let recent = &candles[i - lookback..i];
            let recent_high = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let recent_low = recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);

            let (level, bullish) = if current.close > recent_high {
                (recent_high, true)
            } else if current.close < recent_low {
                (recent_low, false)
            } else {
                continue;
            };

            let end = (i + self.retest_window + 1).min(candles.len());
            let retest = candles[i + 1..end].iter().enumerate().find(|(_, c)| {
                if bullish {
                    (c.low - level).abs() < self.retest_tolerance && c.is_bullish()
                } else {
                    (c.high - level).abs() < self.retest_tolerance && c.is_bearish()
                }
            });

            if let Some((offset, retest_candle)) = retest {
                patterns.push(ConfirmationPattern {
                    kind: PatternKind::BreakEntry {
                        break_level: level,
                        break_price: current.close,
                        retest_price: retest_candle.close,
                    },
                    timestamp: retest_candle.timestamp,
                    price: retest_candle.close,
                    candle_index: i + 1 + offset,
                    is_bullish: bullish,
                    confidence: BREAK_ENTRY_CONFIDENCE,
                });
            }
        }

        patterns
    }

    /// Single candles with a dominant wick and a small body
    pub fn detect_rejection_candle(&self, candles: &[Candle]) -> Vec<ConfirmationPattern> {
        let mut patterns = Vec::new();

        for (i, candle) in candles.iter().enumerate() {
            let range = candle.range();
            if range <= 0.0 {
                continue;
            }

            let upper_ratio = candle.upper_wick() / range;
            let lower_ratio = candle.lower_wick() / range;
            let body_ratio = candle.body() / range;
            if body_ratio >= self.max_body_ratio {
                continue;
            }

            let (wick, wick_ratio, is_bullish) = if upper_ratio > self.wick_ratio {
                (WickSide::Upper, upper_ratio, false)
            } else if lower_ratio > self.wick_ratio {
                (WickSide::Lower, lower_ratio, true)
            } else {
                continue;
            };

            patterns.push(ConfirmationPattern {
                kind: PatternKind::Rejection {
                    wick,
                    wick_ratio,
                    body_ratio,
                },
                timestamp: candle.timestamp,
                price: candle.close,
                candle_index: i,
                is_bullish,
                confidence: wick_ratio,
            });
        }

        patterns
    }

    /// All patterns agreeing with `bias` (unfiltered when neutral), newest
    /// first then most confident, at most 10.
    pub fn get_confirmations(&self, candles: &[Candle], bias: Bias) -> Vec<ConfirmationPattern> {
        let mut patterns = self.detect_morning_star(candles);
        patterns.extend(self.detect_evening_star(candles));
        patterns.extend(self.detect_break_entry(candles));
        patterns.extend(self.detect_rejection_candle(candles));

        if bias.is_directional() {
            patterns.retain(|p| bias.matches(p.is_bullish));
        }

        patterns.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(b.confidence.total_cmp(&a.confidence))
        });
        patterns.truncate(MAX_CONFIRMATIONS);
        patterns
    }
}
