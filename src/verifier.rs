//! Optional second-opinion stage on top of the deterministic decision
//!
//! A [`SignalVerifier`] sees a flat [`AnalysisSummary`] and may adjust
//! confidence, reasons and risk notes. Its answer is always reconciled with
//! the hard rules: it can veto a trade but never create one the rules reject,
//! and it can never flip direction.

use crate::analysis::liquidity::PoolType;
use crate::analysis::structure::StructureEventType;
use crate::analysis::swings::Trend;
use crate::types::{Bias, Decision};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const REASON_KEYS: [&str; 4] = ["direction", "poi", "liquidity", "confirmation"];

/// Flat view of one analysis, handed to the verifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub symbol: String,
    pub trend_4h: Trend,
    pub bias_4h: Bias,
    /// `NONE` when no structure event was found
    pub last_event_4h: StructureEventType,
    pub swing_high_4h: Option<f64>,
    pub swing_low_4h: Option<f64>,
    pub poi_type: Option<String>,
    pub poi_zone: Option<String>,
    pub poi_strength: Option<f64>,
    pub poi_is_bullish: Option<bool>,
    pub liquidity_sweep: bool,
    pub swept_pool_type: Option<PoolType>,
    pub sweep_price: Option<f64>,
    pub pattern_5m: Option<String>,
    pub pattern_confidence_5m: Option<f64>,
    pub entry_price_5m: Option<f64>,
}

impl AnalysisSummary {
    /// Hard conditions the summary fails, in gate order
    pub fn hard_rule_failures(&self) -> Vec<String> {
        let mut failures = Vec::new();

        if !self.bias_4h.is_directional() {
            failures.push("No clear 4H bias".to_string());
        }
        match self.poi_is_bullish {
            None => failures.push("No valid POI detected".to_string()),
            Some(bullish) if self.bias_4h.is_directional() && !self.bias_4h.matches(bullish) => {
                failures.push("POI direction opposes bias".to_string())
            }
            Some(_) => {}
        }
        if !self.liquidity_sweep {
            failures.push("No liquidity sweep detected".to_string());
        }
        if self.pattern_5m.is_none() {
            failures.push("No confirmation pattern".to_string());
        }

        failures
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub decision: Decision,
    /// 0-100
    pub confidence: u8,
    pub reasons: BTreeMap<String, String>,
    pub missing_conditions: Vec<String>,
    pub risk_notes: String,
}

impl Verification {
    fn with_reason(decision: Decision, confidence: u8, reason: &str, risk_notes: String) -> Self {
        Self {
            decision,
            confidence,
            reasons: REASON_KEYS
                .iter()
                .map(|k| (k.to_string(), reason.to_string()))
                .collect(),
            missing_conditions: Vec::new(),
            risk_notes,
        }
    }

    /// Deterministic decision passed through when no verifier is configured
    pub fn disabled(decision: Decision) -> Self {
        let confidence = if decision.is_trade() { 70 } else { 50 };
        Self::with_reason(
            decision,
            confidence,
            "Verifier disabled",
            "Verification disabled - using deterministic analysis only".to_string(),
        )
    }

    /// Deterministic decision passed through when the verifier errored
    pub fn failed(decision: Decision, error: &anyhow::Error) -> Self {
        let confidence = if decision.is_trade() { 60 } else { 40 };
        Self::with_reason(
            decision,
            confidence,
            "Verification failed",
            format!("Verification error: {:#}", error),
        )
    }
}

/// External reviewer of a deterministic signal
#[async_trait]
pub trait SignalVerifier: Send + Sync {
    async fn verify(
        &self,
        summary: &AnalysisSummary,
        deterministic: Decision,
    ) -> anyhow::Result<Verification>;

    fn name(&self) -> &str;
}

/// Force NO_TRADE when any hard condition fails
pub fn enforce_hard_rules(verification: Verification, summary: &AnalysisSummary) -> Verification {
    let failures = summary.hard_rule_failures();
    if failures.is_empty() {
        return verification;
    }

    Verification {
        decision: Decision::NoTrade,
        confidence: verification.confidence.saturating_sub(30).max(20),
        risk_notes: format!("Hard rule failures: {}", failures.join(", ")),
        missing_conditions: failures,
        reasons: verification.reasons,
    }
}

/// Apply direction and hard-rule constraints to a verifier answer
pub fn reconcile(
    mut verification: Verification,
    deterministic: Decision,
    summary: &AnalysisSummary,
) -> Verification {
    verification.confidence = verification.confidence.min(100);

    if verification.decision.is_trade() && verification.decision != deterministic {
        verification.missing_conditions.push(format!(
            "Verifier decision {} disagrees with deterministic {}",
            verification.decision, deterministic
        ));
        verification.decision = Decision::NoTrade;
    }

    enforce_hard_rules(verification, summary)
}
