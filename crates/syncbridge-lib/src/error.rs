// Engine Errors
// Top-level error for the public engine API

use thiserror::Error;

use crate::repositories::StoreError;
use crate::services::connectors::ConnectorError;
use crate::services::crypto::CryptoError;
use crate::services::delivery::DeliveryError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Store(e) => e.code(),
            EngineError::Crypto(e) => e.code(),
            EngineError::Connector(e) => e.code(),
            EngineError::Delivery(e) => e.code(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidInput(message.into())
    }
}

impl From<EngineError> for String {
    fn from(err: EngineError) -> Self {
        err.to_string()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_pass_through() {
        let err: EngineError = ConnectorError::Network("down".to_string()).into();
        assert_eq!(err.code(), "SYNC_NETWORK_ERROR");
        assert_eq!(err.to_string(), ConnectorError::Network("down".to_string()).to_string());

        let err: EngineError = CryptoError::MissingKey.into();
        assert_eq!(err.code(), "VAULT_MISSING_KEY");

        let err = EngineError::NotFound {
            kind: "integration",
            id: "x".to_string(),
        };
        assert_eq!(String::from(err), "integration not found: x");
    }
}
