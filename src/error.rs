//! Error taxonomy shared by the offer store and the trade engine

/// Coarse classification surfaced to the caller boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    InvalidTransition,
    SelfTrade,
    Conflict,
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("{entity} '{id}' was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid transition: cannot {action} while {state}")]
    InvalidTransition { action: String, state: String },
    #[error("Offers '{0}' and '{1}' belong to the same user")]
    SelfTrade(String, String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Record '{0}' changed concurrently, refresh and retry")]
    StaleVersion(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Failed to generate identifier: {0}")]
    Identifier(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type MarketResult<T> = Result<T, MarketError>;

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::Validation(_) => ErrorKind::Validation,
            MarketError::NotFound { .. } => ErrorKind::NotFound,
            MarketError::Forbidden(_) => ErrorKind::Forbidden,
            MarketError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            MarketError::SelfTrade(..) => ErrorKind::SelfTrade,
            MarketError::Conflict(_) | MarketError::StaleVersion(_) => ErrorKind::Conflict,
            MarketError::Storage(_)
            | MarketError::Encode(_)
            | MarketError::Decode(_)
            | MarketError::Identifier(_)
            | MarketError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Only stale-version failures are worth retrying automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketError::StaleVersion(_))
    }

    pub(crate) fn offer_not_found(id: impl Into<String>) -> Self {
        MarketError::NotFound {
            entity: "Offer",
            id: id.into(),
        }
    }

    pub(crate) fn trade_not_found(id: impl Into<String>) -> Self {
        MarketError::NotFound {
            entity: "Trade",
            id: id.into(),
        }
    }

    pub(crate) fn invalid_transition(action: impl Into<String>, state: impl Into<String>) -> Self {
        MarketError::InvalidTransition {
            action: action.into(),
            state: state.into(),
        }
    }
}
