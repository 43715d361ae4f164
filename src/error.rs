use std::time::Duration;
use thiserror::Error;
use crate::types::ids::{OperatorId, PriceId, SourceKey};

#[derive(Error, Debug)]
pub enum Error {
    // Terminal aggregation errors
    #[error("Aggregator paused")]
    Paused,

    #[error("No live sources: {configured} configured, none answered")]
    NoLiveSources { configured: usize },

    #[error("All sources stale and stale fallback disabled")]
    AllSourcesStale,

    #[error("Invalid price identifier: expected {expected}, got {actual}")]
    InvalidPriceId {
        expected: PriceId,
        actual: PriceId,
    },

    // Registry Errors
    #[error("Duplicate source: {0}")]
    DuplicateSource(SourceKey),

    #[error("Source not found: {0}")]
    SourceNotFound(SourceKey),

    #[error("Decimals overflow: {decimals} exceeds max {max}")]
    DecimalOverflow { decimals: u8, max: u8 },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String,
    },

    #[error("Unauthorized operator: {0}")]
    Unauthorized(OperatorId),

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Arithmetic Errors
    #[error("Overflow in {operation}")]
    Overflow { operation: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single provider was dropped from an aggregation round. These never
/// surface from `aggregate()`; they only exclude the source they belong to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("negative price {0}")]
    NegativePrice(i128),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rescaling from {from} to {to} decimals overflowed")]
    ScaleOverflow { from: u8, to: u8 },

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl FeedError {
    /// Short label used as a metrics dimension
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Timeout(_) => "timeout",
            FeedError::NegativePrice(_) => "negative_price",
            FeedError::Malformed(_) => "malformed",
            FeedError::ScaleOverflow { .. } => "scale_overflow",
            FeedError::Unavailable(_) => "unavailable",
        }
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
