//! Error types for the library layer.

use thiserror::Error;
use trialregistry_site::FetchError;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors surfaced by harvest operations. Per-page fetch failures never
/// reach this type; the walker folds them into its miss counters.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Fetcher error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    /// User-provided input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
