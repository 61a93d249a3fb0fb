//! Signal result, trade plan and history record

use crate::analysis::confirmation::ConfirmationPattern;
use crate::analysis::liquidity::LiquiditySweep;
use crate::analysis::poi::Poi;
use crate::analysis::structure::{StructureEvent, StructureEventType};
use crate::analysis::swings::Trend;
use crate::config::AssetClass;
use crate::types::{Bias, Decision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Bias as reported on a result; `Error` marks a failed analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultBias {
    Long,
    Short,
    Neutral,
    Error,
}

impl From<Bias> for ResultBias {
    fn from(bias: Bias) -> Self {
        match bias {
            Bias::Long => ResultBias::Long,
            Bias::Short => ResultBias::Short,
            Bias::Neutral => ResultBias::Neutral,
        }
    }
}

impl fmt::Display for ResultBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultBias::Long => write!(f, "LONG"),
            ResultBias::Short => write!(f, "SHORT"),
            ResultBias::Neutral => write!(f, "NEUTRAL"),
            ResultBias::Error => write!(f, "ERROR"),
        }
    }
}

/// Hard-gate condition that was not met
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailure {
    NoClearBias,
    NoPoi,
    PoiOpposesBias,
    NoLiquiditySweep,
    NoConfirmation,
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::NoClearBias => write!(f, "No clear 4H bias"),
            GateFailure::NoPoi => write!(f, "No valid POI detected"),
            GateFailure::PoiOpposesBias => write!(f, "POI direction opposes bias"),
            GateFailure::NoLiquiditySweep => write!(f, "No liquidity sweep detected"),
            GateFailure::NoConfirmation => write!(f, "No confirmation pattern"),
        }
    }
}

/// Entry, invalidation and targets derived from the selected POI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub entry_low: f64,
    pub entry_high: f64,
    /// "low-high" at the asset's price precision
    pub entry_zone: String,
    pub invalidation_level: f64,
    /// Nearest 4H swing beyond the entry in the trade direction
    pub target1: Option<f64>,
    /// Entry midpoint plus `risk_r` times the risk
    pub target2: f64,
    pub risk_r: f64,
    pub price_precision: usize,
}

impl TradePlan {
    pub fn entry_mid(&self) -> f64 {
        (self.entry_low + self.entry_high) / 2.0
    }

    pub fn risk(&self) -> f64 {
        (self.entry_mid() - self.invalidation_level).abs()
    }

    pub fn format_level(&self, price: f64) -> String {
        format!("{:.*}", self.price_precision, price)
    }
}

/// Outcome of one analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub id: Uuid,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    /// 0-100, from the verification stage
    pub confidence: u8,
    /// 0-100 deterministic setup checklist score
    pub score: u8,
    pub bias: ResultBias,
    pub asset_class: AssetClass,

    pub trend_4h: Option<Trend>,
    pub structure_event: Option<StructureEvent>,
    pub swing_high_4h: Option<f64>,
    pub swing_low_4h: Option<f64>,

    pub poi: Option<Poi>,
    pub sweep: Option<LiquiditySweep>,
    pub confirmation: Option<ConfirmationPattern>,

    pub reasons: BTreeMap<String, String>,
    pub missing_conditions: Vec<String>,
    pub risk_notes: String,

    pub trade_plan: Option<TradePlan>,
    pub error: Option<String>,
}

impl SignalResult {
    /// NO_TRADE result for an analysis that could not run
    pub fn error(symbol: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            decision: Decision::NoTrade,
            confidence: 0,
            score: 0,
            bias: ResultBias::Error,
            asset_class: AssetClass::from_symbol(symbol),
            trend_4h: None,
            structure_event: None,
            swing_high_4h: None,
            swing_low_4h: None,
            poi: None,
            sweep: None,
            confirmation: None,
            reasons: BTreeMap::from([("error".to_string(), message.clone())]),
            missing_conditions: vec!["analysis_error".to_string()],
            risk_notes: format!("Analysis failed: {}", message),
            trade_plan: None,
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.bias == ResultBias::Error
    }

    fn precision(&self) -> usize {
        self.asset_class.thresholds().price_precision
    }

    fn price(&self, value: f64) -> String {
        format!("{:.*}", self.precision(), value)
    }

    /// Flat record for append-only history storage
    pub fn to_record(&self) -> HistoryRecord {
        let plan = self.trade_plan.as_ref();
        HistoryRecord {
            id: self.id,
            symbol: self.symbol.clone(),
            timestamp: self.timestamp,
            decision: self.decision,
            confidence: self.confidence,
            score: self.score,
            bias: self.bias,
            trend_4h: self.trend_4h.map(|t| t.to_string()),
            structure_event: self.structure_event.map(|e| e.event_type.to_string()),
            poi_type: self.poi.map(|p| p.kind.label().to_string()),
            poi_zone: self.poi.map(|p| p.zone_string(self.precision())),
            liquidity_sweep: self.sweep.is_some(),
            sweep_pool: self.sweep.map(|s| s.pool_type.to_string()),
            confirmation_pattern: self.confirmation.map(|c| c.kind.label().to_string()),
            entry_zone: plan.map(|p| p.entry_zone.clone()),
            invalidation_level: plan.map(|p| p.format_level(p.invalidation_level)),
            target1: plan.and_then(|p| p.target1.map(|t| p.format_level(t))),
            target2: plan.map(|p| p.format_level(p.target2)),
            missing_conditions: self.missing_conditions.clone(),
            error: self.error.clone(),
        }
    }
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} ({})", self.symbol, self.decision, self.asset_class)?;
        writeln!(
            f,
            "  Confidence: {}%  Score: {}/100  Bias: {}",
            self.confidence, self.score, self.bias
        )?;

        if let Some(error) = &self.error {
            writeln!(f, "  Error: {}", error)?;
            return Ok(());
        }

        let trend = self
            .trend_4h
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        let event = self
            .structure_event
            .map_or(StructureEventType::None, |e| e.event_type);
        writeln!(f, "  4H: {} trend, last event {}", trend, event)?;
        if let (Some(high), Some(low)) = (self.swing_high_4h, self.swing_low_4h) {
            writeln!(f, "      swing high {}  swing low {}", self.price(high), self.price(low))?;
        }

        match &self.poi {
            Some(poi) => writeln!(
                f,
                "  30M POI: {} {} {} (strength {:.2})",
                if poi.is_bullish { "bullish" } else { "bearish" },
                poi.kind,
                poi.zone_string(self.precision()),
                poi.strength
            )?,
            None => writeln!(f, "  30M POI: none")?,
        }

        match &self.sweep {
            Some(sweep) => writeln!(
                f,
                "  Sweep: {} at {} (wick {})",
                sweep.pool_type,
                self.price(sweep.pool_price),
                self.price(sweep.sweep_price)
            )?,
            None => writeln!(f, "  Sweep: none")?,
        }

        match &self.confirmation {
            Some(c) => writeln!(
                f,
                "  5M: {} at {} ({:.0}%)",
                c.kind,
                self.price(c.price),
                c.confidence * 100.0
            )?,
            None => writeln!(f, "  5M: no confirmation")?,
        }

        if let Some(plan) = &self.trade_plan {
            writeln!(f, "  Entry: {}", plan.entry_zone)?;
            writeln!(f, "  Invalidation: {}", plan.format_level(plan.invalidation_level))?;
            if let Some(t1) = plan.target1 {
                writeln!(f, "  Target 1: {}", plan.format_level(t1))?;
            }
            writeln!(f, "  Target 2: {} ({}R)", plan.format_level(plan.target2), plan.risk_r)?;
        }

        if !self.missing_conditions.is_empty() {
            writeln!(f, "  Missing: {}", self.missing_conditions.join(", "))?;
        }
        if !self.risk_notes.is_empty() {
            writeln!(f, "  Notes: {}", self.risk_notes)?;
        }
        Ok(())
    }
}

/// Flat JSON row of the signal history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub confidence: u8,
    pub score: u8,
    pub bias: ResultBias,
    pub trend_4h: Option<String>,
    pub structure_event: Option<String>,
    pub poi_type: Option<String>,
    pub poi_zone: Option<String>,
    pub liquidity_sweep: bool,
    pub sweep_pool: Option<String>,
    pub confirmation_pattern: Option<String>,
    pub entry_zone: Option<String>,
    pub invalidation_level: Option<String>,
    pub target1: Option<String>,
    pub target2: Option<String>,
    #[serde(default)]
    pub missing_conditions: Vec<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_result_shape() {
        let result = SignalResult::error("EURUSD", "No candle data for EURUSD 4H");

        assert_eq!(result.decision, Decision::NoTrade);
        assert_eq!(result.confidence, 0);
        assert_eq!(result.bias, ResultBias::Error);
        assert_eq!(result.missing_conditions, vec!["analysis_error"]);
        assert_eq!(result.reasons["error"], "No candle data for EURUSD 4H");
        assert!(result.risk_notes.starts_with("Analysis failed: "));
        assert!(result.trade_plan.is_none());
        assert!(result.to_string().contains("Error:"));
    }

    #[test]
    fn test_error_record_is_flat_json() {
        let record = SignalResult::error("USDJPY", "timeout").to_record();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["bias"], "ERROR");
        assert_eq!(json["decision"], "NO_TRADE");
        assert_eq!(json["liquidity_sweep"], false);
        assert!(json.as_object().unwrap().values().all(|v| !v.is_object()));
    }

    #[test]
    fn test_trade_plan_levels() {
        let plan = TradePlan {
            entry_low: 1.1000,
            entry_high: 1.1010,
            entry_zone: "1.10000-1.10100".into(),
            invalidation_level: 1.1000,
            target1: None,
            target2: 1.1015,
            risk_r: 2.0,
            price_precision: 5,
        };
        assert!((plan.risk() - 0.0005).abs() < 1e-12);
        assert_eq!(plan.format_level(plan.target2), "1.10150");
    }
}
