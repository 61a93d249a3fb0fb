// Library crate - exports market data types, the analysis pipeline and the signal engine

pub mod types;
pub mod error;
pub mod config;
pub mod analysis;
pub mod providers;
pub mod verifier;
pub mod signal;
pub mod engine;
pub mod history;

// Re-export commonly used types
pub use types::*;
pub use error::{AnalysisError, Result};
pub use config::{AnalysisConfig, AssetClass, EngineConfig, StructureConfig, Thresholds};
pub use engine::{analyze_setup, deterministic_decision, SignalEngine, Setup};
pub use signal::{GateFailure, HistoryRecord, ResultBias, SignalResult, TradePlan};
pub use providers::{CandleProvider, CsvProvider, OandaProvider, StaticProvider};
pub use verifier::{AnalysisSummary, SignalVerifier, Verification};
pub use history::JsonlHistory;
