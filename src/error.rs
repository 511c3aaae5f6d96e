//! Error types for the vault agent

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed decision: {0}")]
    MalformedDecision(String),

    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    #[error("No swap route found: {0}")]
    NoRouteFound(String),

    #[error("Transaction build failed: {0}")]
    PtbBuildFailed(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Decision source error: {0}")]
    DecisionSource(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Route aggregator error: {0}")]
    Router(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
