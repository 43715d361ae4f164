pub mod utils;
pub mod types;
pub mod price_infra;
pub mod error;
pub mod config;
pub mod observability;
pub mod interfaces;

// Hard cap on the aggregator's output scale
pub const MAX_AGGREGATOR_DECIMALS: u8 = 18;
