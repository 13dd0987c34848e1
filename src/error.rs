//! Error types and handling for elcom-tariffs
//!
//! This module defines the error taxonomy shared by the query client,
//! discovery, mapping and refresh layers. Callers distinguish retryable
//! transport failures from protocol and schema problems through the
//! classification helpers.

use thiserror::Error;

/// Result type alias for tariff operations
pub type Result<T> = std::result::Result<T, TariffError>;

/// Main error type for elcom-tariffs
#[derive(Debug, Error)]
pub enum TariffError {
    /// Search term was empty or unusable
    #[error("Invalid search term: {message}")]
    InvalidSearchTerm { message: String },

    /// Network, connection or HTTP status failures
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Request exceeded its deadline
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Endpoint answered with something that is not SPARQL JSON results
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// Required predicates could not be resolved from sampled data
    #[error("Schema discovery error: {message}")]
    SchemaDiscovery { message: String },

    /// Valid schema but nothing recorded for the requested scope
    #[error("No data for {municipality_uri} in {year}")]
    NoData { municipality_uri: String, year: i32 },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Work abandoned because of shutdown or reconfiguration
    #[error("Cancelled: {message}")]
    Cancelled { message: String },
}

impl TariffError {
    /// Create a new invalid search term error
    pub fn invalid_search_term<S: Into<String>>(message: S) -> Self {
        TariffError::InvalidSearchTerm {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        TariffError::Transport {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        TariffError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new malformed response error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        TariffError::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a new schema discovery error
    pub fn schema_discovery<S: Into<String>>(message: S) -> Self {
        TariffError::SchemaDiscovery {
            message: message.into(),
        }
    }

    /// Create a new no-data error
    pub fn no_data<S: Into<String>>(municipality_uri: S, year: i32) -> Self {
        TariffError::NoData {
            municipality_uri: municipality_uri.into(),
            year,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        TariffError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        TariffError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        TariffError::Io {
            message: message.into(),
        }
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        TariffError::Cancelled {
            message: message.into(),
        }
    }

    /// Transport-level failure (including timeouts); the only retryable class
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TariffError::Transport { .. } | TariffError::Timeout { .. }
        )
    }

    /// Empty result set for an otherwise valid scope
    pub fn is_no_data(&self) -> bool {
        matches!(self, TariffError::NoData { .. })
    }

    /// Short stable label used in status output
    pub fn kind(&self) -> &'static str {
        match self {
            TariffError::InvalidSearchTerm { .. } => "invalid_search_term",
            TariffError::Transport { .. } => "transport",
            TariffError::Timeout { .. } => "timeout",
            TariffError::MalformedResponse { .. } => "malformed_response",
            TariffError::SchemaDiscovery { .. } => "schema_discovery",
            TariffError::NoData { .. } => "no_data",
            TariffError::Config { .. } => "config",
            TariffError::Validation { .. } => "validation",
            TariffError::Serialization { .. } => "serialization",
            TariffError::Io { .. } => "io",
            TariffError::Cancelled { .. } => "cancelled",
        }
    }
}

impl From<std::io::Error> for TariffError {
    fn from(err: std::io::Error) -> Self {
        TariffError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for TariffError {
    fn from(err: serde_yaml::Error) -> Self {
        TariffError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TariffError {
    fn from(err: serde_json::Error) -> Self {
        TariffError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for TariffError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TariffError::timeout(err.to_string())
        } else {
            TariffError::transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TariffError::transport("connection refused");
        assert!(matches!(err, TariffError::Transport { .. }));

        let err = TariffError::malformed("missing head");
        assert!(matches!(err, TariffError::MalformedResponse { .. }));

        let err = TariffError::validation("year", "out of range");
        assert!(matches!(err, TariffError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = TariffError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = TariffError::no_data("https://ld.admin.ch/municipality/261", 2024);
        assert_eq!(
            format!("{}", err),
            "No data for https://ld.admin.ch/municipality/261 in 2024"
        );
    }

    #[test]
    fn test_classification() {
        assert!(TariffError::transport("x").is_transport());
        assert!(TariffError::timeout("x").is_transport());
        assert!(!TariffError::malformed("x").is_transport());
        assert!(!TariffError::schema_discovery("x").is_transport());
        assert!(TariffError::no_data("u", 2024).is_no_data());
        assert_eq!(TariffError::timeout("x").kind(), "timeout");
    }
}
