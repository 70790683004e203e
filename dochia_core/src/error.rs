use thiserror::Error;

/// Errors raised by a `ServiceCaller` when no HTTP response could be obtained.
///
/// These are kept apart from HTTP error responses: a 4XX or 5XX is a normal
/// `HttpResponse`, while a `TransportError` means the service never answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Invalid request url [{0}]")]
    InvalidUrl(String),
    #[error("Transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts and connection failures are counted as I/O errors in the run summary.
    pub fn is_io(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Connection(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid regex [{pattern}]: {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("Invalid HTTP method [{0}]")]
    InvalidHttpMethod(String),
    #[error("Invalid response code family [{0}]")]
    InvalidResponseCode(String),
}

/// Errors surfaced by the engine.
///
/// Only `InvalidContract` and `Config` abort a run. The other variants are
/// raised inside a single test case and recovered at the executor boundary.
#[derive(Error, Debug)]
pub enum DochiaError {
    #[error("Provided contract is invalid: {0}")]
    InvalidContract(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Service call failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Contract inconsistency: {0}")]
    ContractInconsistency(String),
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl DochiaError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DochiaError::InvalidContract(_) | DochiaError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_convert_and_are_not_fatal() {
        let err: DochiaError = TransportError::Timeout(500).into();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("500 ms"));
        assert!(TransportError::Connection("refused".into()).is_io());
        assert!(!TransportError::InvalidUrl("x".into()).is_io());
    }

    #[test]
    fn contract_and_config_errors_are_fatal() {
        assert!(DochiaError::InvalidContract("no paths".into()).is_fatal());
        let config: DochiaError = ConfigError::InvalidHttpMethod("FETCH".into()).into();
        assert!(config.is_fatal());
    }
}
