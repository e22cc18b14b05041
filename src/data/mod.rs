//! Quote feed ingestion and the quote data model.

pub mod loader;
pub mod types;

pub use loader::{
    check_schema, dataframe_to_records, LoaderError, QuoteFeedLoader, QuoteRecord,
    COLUMN_ALIASES, MATURITY_COLUMNS, REQUIRED_COLUMNS,
};
pub use types::{
    decimal_to_f64, partition_by_date, ContractKey, DerivedFields, IvSource, OptionQuote,
    OptionType, RateSource, RawQuote,
};
