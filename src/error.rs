use thiserror::Error;

use crate::budget::BudgetExceededDetails;
use crate::ledger::LedgerError;

/// Error kinds surfaced by the gateway core. The HTTP layer maps each kind
/// to a status code and a wire `type` string.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("missing upstream credentials for {provider}")]
    Unauthorized { provider: &'static str },
    #[error("budget exceeded for project {project_id}")]
    BudgetExceeded {
        project_id: String,
        details: BudgetExceededDetails,
    },
    #[error("budget not found for project {0}")]
    BudgetNotFound(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl GatewayError {
    /// Wire-level error type string, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Unauthorized { .. } => "unauthorized",
            GatewayError::BudgetExceeded { .. } => "budget_exceeded",
            GatewayError::BudgetNotFound(_) => "not_found",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::Ledger(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
