//! Signal Engine - three-timeframe orchestration
//!
//! 4H structure sets the bias, 30M supplies the POI and the liquidity sweep,
//! 5M supplies the entry confirmation. The analysis itself is synchronous and
//! pure; only the candle fetch and the optional verifier are async.

use crate::analysis::{
    bias_from_events, select_best_poi, ConfirmationDetector, ConfirmationPattern,
    LiquidityDetector, LiquiditySweep, MarketStructure, Poi, PoiDetector, StructureAnalyzer,
    StructureEvent, StructureEventType,
};
use crate::config::{AnalysisConfig, EngineConfig};
use crate::error::{AnalysisError, Result};
use crate::providers::CandleProvider;
use crate::signal::{GateFailure, ResultBias, SignalResult, TradePlan};
use crate::types::{Bias, Candle, Decision, Timeframe};
use crate::verifier::{reconcile, AnalysisSummary, SignalVerifier, Verification};
use chrono::Utc;
use futures::future::{join_all, try_join3};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything the detectors found for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Setup {
    pub bias: Bias,
    pub structure_event: Option<StructureEvent>,
    pub structure: MarketStructure,
    pub poi: Option<Poi>,
    pub sweep: Option<LiquiditySweep>,
    pub confirmation: Option<ConfirmationPattern>,
}

/// Run every detector over chronological candle series
pub fn analyze_setup(
    config: &AnalysisConfig,
    candles_4h: &[Candle],
    candles_30m: &[Candle],
    candles_5m: &[Candle],
) -> Setup {
    let analyzer = StructureAnalyzer::new(config.structure.clone());
    let structure = analyzer.analyze_structure(candles_4h);
    let events = analyzer.detect_with_structure(candles_4h, &structure);
    let (bias, structure_event) = bias_from_events(&events);

    let pois = PoiDetector::new(config).get_all_pois(candles_30m);
    let poi = select_best_poi(&pois, bias);

    let liquidity = LiquidityDetector::new(config);
    let pools = liquidity.find_liquidity_pools(candles_30m);
    let sweeps = liquidity.detect_sweeps(candles_30m, &pools);
    let sweep = poi.and_then(|p| {
        liquidity.check_sweep_into_poi(candles_30m, &sweeps, p.mid(), config.poi_proximity_candles)
    });

    let confirmation = ConfirmationDetector::new(config)
        .get_confirmations(candles_5m, bias)
        .first()
        .copied();

    debug!(
        "bias={} event={:?} pois={} pools={} sweeps={} confirmation={}",
        bias,
        structure_event.map(|e| e.event_type),
        pois.len(),
        pools.len(),
        sweeps.len(),
        confirmation.is_some()
    );

    Setup {
        bias,
        structure_event,
        structure,
        poi,
        sweep,
        confirmation,
    }
}

/// Decision of the hard gate with every unmet condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub decision: Decision,
    pub failures: Vec<GateFailure>,
}

/// BUY/SELL only when the bias is clear, a POI agrees with it, a sweep
/// exists and a confirmation exists.
pub fn deterministic_decision(
    bias: Bias,
    poi: Option<&Poi>,
    has_sweep: bool,
    has_confirmation: bool,
) -> GateOutcome {
    let mut failures = Vec::new();

    if !bias.is_directional() {
        failures.push(GateFailure::NoClearBias);
    }
    match poi {
        None => failures.push(GateFailure::NoPoi),
        Some(p) if bias.is_directional() && !bias.matches(p.is_bullish) => {
            failures.push(GateFailure::PoiOpposesBias)
        }
        Some(_) => {}
    }
    if !has_sweep {
        failures.push(GateFailure::NoLiquiditySweep);
    }
    if !has_confirmation {
        failures.push(GateFailure::NoConfirmation);
    }

    let decision = if failures.is_empty() {
        Decision::from_bias(bias)
    } else {
        Decision::NoTrade
    };

    GateOutcome { decision, failures }
}

impl Setup {
    pub fn gate(&self) -> GateOutcome {
        deterministic_decision(
            self.bias,
            self.poi.as_ref(),
            self.sweep.is_some(),
            self.confirmation.is_some(),
        )
    }

    /// Checklist score 0-100, independent of any verifier
    pub fn score(&self) -> u8 {
        if let Some(poi) = &self.poi {
            if self.bias.is_directional() && !self.bias.matches(poi.is_bullish) {
                return 0;
            }
        }

        let mut score = 0.0;
        if self.bias.is_directional() {
            score += 25.0;
        }
        if let Some(poi) = &self.poi {
            score += 15.0;
            if poi.kind.is_primary() && self.bias.matches(poi.is_bullish) {
                score += 10.0;
            }
        }
        if self.sweep.is_some() {
            score += 25.0;
        }
        if let Some(c) = &self.confirmation {
            score += 15.0 + 10.0 * c.confidence.clamp(0.0, 1.0);
        }
        if self.sweep.is_none() || self.confirmation.is_none() {
            score = f64::min(score, 40.0);
        }

        score.clamp(0.0, 100.0).round() as u8
    }

    pub fn summary(&self, symbol: &str, config: &AnalysisConfig) -> AnalysisSummary {
        AnalysisSummary {
            symbol: symbol.to_string(),
            trend_4h: self.structure.trend,
            bias_4h: self.bias,
            last_event_4h: self
                .structure_event
                .map_or(StructureEventType::None, |e| e.event_type),
            swing_high_4h: self.structure.last_swing_high.map(|s| s.price),
            swing_low_4h: self.structure.last_swing_low.map(|s| s.price),
            poi_type: self.poi.map(|p| p.kind.label().to_string()),
            poi_zone: self
                .poi
                .map(|p| p.zone_string(config.thresholds.price_precision)),
            poi_strength: self.poi.map(|p| p.strength),
            poi_is_bullish: self.poi.map(|p| p.is_bullish),
            liquidity_sweep: self.sweep.is_some(),
            swept_pool_type: self.sweep.map(|s| s.pool_type),
            sweep_price: self.sweep.map(|s| s.pool_price),
            pattern_5m: self.confirmation.map(|c| c.kind.label().to_string()),
            pattern_confidence_5m: self.confirmation.map(|c| c.confidence),
            entry_price_5m: self.confirmation.map(|c| c.price),
        }
    }
}

/// Entry zone, invalidation and targets for a BUY or SELL on `poi`
pub fn build_trade_plan(
    decision: Decision,
    poi: &Poi,
    structure: &MarketStructure,
    config: &AnalysisConfig,
) -> Result<TradePlan> {
    let (low, high) = (poi.zone_low, poi.zone_high);
    if !low.is_finite() || !high.is_finite() {
        return Err(AnalysisError::ambiguous(format!(
            "non-numeric POI zone {}-{}",
            low, high
        )));
    }
    if low > high {
        return Err(AnalysisError::ambiguous(format!(
            "inverted POI zone {}-{}",
            low, high
        )));
    }
    if !config.risk_r.is_finite() || config.risk_r <= 0.0 {
        return Err(AnalysisError::ambiguous(format!(
            "invalid risk multiple {}",
            config.risk_r
        )));
    }

    let mid = (low + high) / 2.0;
    let (invalidation, direction) = match decision {
        Decision::Buy => (low, 1.0),
        Decision::Sell => (high, -1.0),
        Decision::NoTrade => {
            return Err(AnalysisError::ambiguous("no trade plan for NO_TRADE"));
        }
    };

    let risk = (mid - invalidation).abs();
    if risk <= 0.0 {
        return Err(AnalysisError::ambiguous(format!(
            "zero risk: POI zone {} has no width",
            poi.zone_string(config.thresholds.price_precision)
        )));
    }

    let target1 = match decision {
        Decision::Buy => structure
            .swing_highs()
            .map(|s| s.price)
            .filter(|&p| p > mid)
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.min(p)))),
        _ => structure
            .swing_lows()
            .map(|s| s.price)
            .filter(|&p| p < mid)
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p)))),
    };

    Ok(TradePlan {
        entry_low: low,
        entry_high: high,
        entry_zone: poi.zone_string(config.thresholds.price_precision),
        invalidation_level: invalidation,
        target1,
        target2: mid + direction * risk * config.risk_r,
        risk_r: config.risk_r,
        price_precision: config.thresholds.price_precision,
    })
}

/// Combine setup, gate and verification into the final result
pub fn finalize(
    symbol: &str,
    config: &AnalysisConfig,
    setup: Setup,
    verification: Verification,
) -> SignalResult {
    let Verification {
        mut decision,
        confidence,
        reasons,
        mut missing_conditions,
        risk_notes,
    } = verification;

    let mut trade_plan = None;
    if decision.is_trade() {
        match setup
            .poi
            .as_ref()
            .ok_or_else(|| AnalysisError::ambiguous("trade decision without a POI"))
            .and_then(|poi| build_trade_plan(decision, poi, &setup.structure, config))
        {
            Ok(plan) => trade_plan = Some(plan),
            Err(e) => {
                warn!("{}: downgrading {} to NO_TRADE: {}", symbol, decision, e);
                missing_conditions.push(e.to_string());
                decision = Decision::NoTrade;
            }
        }
    }

    let score = setup.score();
    SignalResult {
        id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        timestamp: Utc::now(),
        decision,
        confidence,
        score,
        bias: ResultBias::from(setup.bias),
        asset_class: config.asset_class,
        trend_4h: Some(setup.structure.trend),
        structure_event: setup.structure_event,
        swing_high_4h: setup.structure.last_swing_high.map(|s| s.price),
        swing_low_4h: setup.structure.last_swing_low.map(|s| s.price),
        poi: setup.poi,
        sweep: setup.sweep,
        confirmation: setup.confirmation,
        reasons,
        missing_conditions,
        risk_notes,
        trade_plan,
        error: None,
    }
}

/// Fetches candles and runs the analysis for one symbol at a time
pub struct SignalEngine {
    provider: Arc<dyn CandleProvider>,
    verifier: Option<Arc<dyn SignalVerifier>>,
    config: EngineConfig,
}

impl SignalEngine {
    pub fn new(provider: Arc<dyn CandleProvider>, config: EngineConfig) -> Self {
        Self {
            provider,
            verifier: None,
            config,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignalVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn CandleProvider> {
        &self.provider
    }

    /// Full analysis; failures become an ERROR-bias NO_TRADE result
    pub async fn analyze_symbol(&self, symbol: &str) -> SignalResult {
        match self.try_analyze(symbol).await {
            Ok(result) => result,
            Err(e) => {
                error!("Analysis failed for {}: {}", symbol, e);
                SignalResult::error(symbol, e.to_string())
            }
        }
    }

    /// Independent analyses of several symbols, in input order
    pub async fn scan(&self, symbols: &[String]) -> Vec<SignalResult> {
        join_all(symbols.iter().map(|s| self.analyze_symbol(s))).await
    }

    pub async fn try_analyze(&self, symbol: &str) -> Result<SignalResult> {
        let config = self.config.analysis.for_symbol(symbol);
        let (h4, m30, m5) = self.fetch_timeframes(symbol).await?;

        info!(
            "Analyzing {} ({}) - 4H: {}, 30M: {}, 5M: {}",
            symbol,
            config.asset_class,
            h4.len(),
            m30.len(),
            m5.len()
        );

        let setup = analyze_setup(&config, &h4, &m30, &m5);
        let gate = setup.gate();
        let summary = setup.summary(symbol, &config);

        let verification = match &self.verifier {
            None => Verification::disabled(gate.decision),
            Some(verifier) => match verifier.verify(&summary, gate.decision).await {
                Ok(v) => reconcile(v, gate.decision, &summary),
                Err(e) => {
                    warn!("Verifier {} failed for {}: {:#}", verifier.name(), symbol, e);
                    Verification::failed(gate.decision, &e)
                }
            },
        };

        let mut result = finalize(symbol, &config, setup, verification);
        for failure in gate.failures {
            let text = failure.to_string();
            if !result.missing_conditions.contains(&text) {
                result.missing_conditions.push(text);
            }
        }

        info!(
            "{}: {} confidence={} score={}",
            symbol, result.decision, result.confidence, result.score
        );
        Ok(result)
    }

    /// Fetch 4H, 30M and 5M candles concurrently under the configured deadline
    pub async fn fetch_timeframes(
        &self,
        symbol: &str,
    ) -> Result<(Vec<Candle>, Vec<Candle>, Vec<Candle>)> {
        let provider_symbol = self.provider.normalize_symbol(symbol);
        let fetch = try_join3(
            self.provider
                .get_candles(&provider_symbol, Timeframe::H4, self.config.h4_count),
            self.provider
                .get_candles(&provider_symbol, Timeframe::M30, self.config.m30_count),
            self.provider
                .get_candles(&provider_symbol, Timeframe::M5, self.config.m5_count),
        );

        let (h4, m30, m5) = tokio::time::timeout(self.config.fetch_timeout, fetch)
            .await
            .map_err(|_| AnalysisError::FetchTimeout {
                symbol: symbol.to_string(),
                secs: self.config.fetch_timeout.as_secs(),
            })??;

        Ok((
            chronological(symbol, Timeframe::H4, h4)?,
            chronological(symbol, Timeframe::M30, m30)?,
            chronological(symbol, Timeframe::M5, m5)?,
        ))
    }
}

fn chronological(symbol: &str, timeframe: Timeframe, mut candles: Vec<Candle>) -> Result<Vec<Candle>> {
    if candles.is_empty() {
        return Err(AnalysisError::DataUnavailable {
            symbol: symbol.to_string(),
            timeframe,
        });
    }
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}
