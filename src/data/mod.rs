//! Data model and read-only storage collaborators.

pub mod loader;
pub mod store;
pub mod types;

pub use loader::ParquetStore;
pub use store::{IndexStore, InMemoryStore, OptionStore, RateStore, StoreError};
pub use types::{
    OptionChainPair, OptionQuote, OptionQuoteRow, OptionSeries, OptionSide, RateCurvePoint,
    RootSymbol, CMT_TENOR_LABELS, CMT_TENOR_MONTHS,
};
