//! Market-structure analysis
//!
//! This module contains the detectors of the signal pipeline:
//! - Swing point detection and trend classification
//! - BOS/MSS structure events and 4H bias
//! - POI zones (order blocks, fair value gaps, breakers, rejection blocks)
//! - Liquidity pools and sweeps
//! - 5M confirmation patterns
//!
//! Every detector takes a chronological candle slice (index 0 oldest) and
//! returns fresh values; short inputs yield empty results.

pub mod swings;
pub mod structure;
pub mod poi;
pub mod liquidity;
pub mod confirmation;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use swings::{MarketStructure, SwingDetector, SwingPoint, Trend};
pub use structure::{bias_from_events, StructureAnalyzer, StructureEvent, StructureEventType};
pub use poi::{select_best_poi, Breaker, FairValueGap, OrderBlock, Poi, PoiDetector, PoiKind};
pub use liquidity::{LiquidityDetector, LiquidityPool, LiquiditySweep, PoolType, Touch};
pub use confirmation::{ConfirmationDetector, ConfirmationPattern, PatternKind, WickSide};
