pub mod batch;
pub mod data;
pub mod engine;
pub mod metrics;

// Re-export commonly used types
pub use batch::{BatchReport, BatchRunner};
pub use data::{
    InMemoryStore, IndexStore, OptionChainPair, OptionQuote, OptionQuoteRow, OptionSeries,
    OptionSide, OptionStore, ParquetStore, RateCurvePoint, RateStore, RootSymbol,
};
pub use engine::{
    CalcStep, EngineError, ExpirationCalendar, ExpirationSelector, RateConfig, RateInterpolator,
    SelectorConfig, StrikeLadder, VixCalculator, VixComponents,
};
pub use metrics::OptionMetrics;
