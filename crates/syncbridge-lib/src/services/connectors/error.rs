// Connector Errors
// Failure classes shared by every connector and the sync executor

use thiserror::Error;

use crate::services::crypto::CryptoError;
use crate::services::delivery::DeliveryError;

#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Missing or invalid integration config; fatal to the attempt
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure, timeout or non-success status
    #[error("Network error: {0}")]
    Network(String),

    /// Remote rejected the credentials (401/403)
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Delivery error: {0}")]
    Delivery(String),
}

impl ConnectorError {
    pub fn code(&self) -> &'static str {
        match self {
            ConnectorError::Configuration(_) => "SYNC_CONFIGURATION_ERROR",
            ConnectorError::Network(_) => "SYNC_NETWORK_ERROR",
            ConnectorError::Authentication(_) => "SYNC_AUTH_ERROR",
            ConnectorError::Parse(_) => "SYNC_PARSE_ERROR",
            ConnectorError::Delivery(_) => "SYNC_DELIVERY_ERROR",
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ConnectorError::Configuration(message.into())
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConnectorError::Network(format!("Request timed out: {}", err))
        } else if err.is_decode() {
            ConnectorError::Parse(err.to_string())
        } else if err.is_builder() {
            ConnectorError::Configuration(format!("Invalid request: {}", err))
        } else {
            ConnectorError::Network(err.to_string())
        }
    }
}

impl From<CryptoError> for ConnectorError {
    fn from(err: CryptoError) -> Self {
        ConnectorError::Configuration(format!("Unreadable credentials: {}", err))
    }
}

impl From<DeliveryError> for ConnectorError {
    fn from(err: DeliveryError) -> Self {
        ConnectorError::Delivery(err.to_string())
    }
}

impl From<ConnectorError> for String {
    fn from(err: ConnectorError) -> Self {
        err.to_string()
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
