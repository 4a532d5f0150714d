use crate::providers::ProviderError;

/// Failures surfaced by engine operations.
///
/// Business rejections (`InvalidInput`, `InsufficientBalance`, `OutOfStock`,
/// ...) are raised before anything is written. `Storage` is the only
/// variant that means the store itself misbehaved.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient balance: have {balance} points, need {required} (short by {shortfall})")]
    InsufficientBalance {
        balance: i64,
        required: i64,
        shortfall: i64,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("product {0} is out of stock")]
    OutOfStock(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("gift code {0} has already been submitted")]
    DuplicateClaim(String),

    #[error("cannot {action} while claim is {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable name for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NotFound(_) => "not_found",
            Self::OutOfStock(_) => "out_of_stock",
            Self::Provider(_) => "provider_error",
            Self::DuplicateClaim(_) => "duplicate_claim",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Storage(_) => "storage_error",
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub(crate) fn transition(from: impl ToString, action: &'static str) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            action,
        }
    }
}
