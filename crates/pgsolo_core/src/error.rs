//! Error types for the pgsolo client.
//!
//! Every failing lifecycle operation surfaces exactly one of these variants to the
//! caller; all of them except [`SoloError::NotConnected`] are also published on the
//! `error` notification channel.

use thiserror::Error;

/// Main error type for pgsolo.
#[derive(Debug, Error)]
pub enum SoloError {
    /// Opening the underlying connection failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Closing the underlying connection failed.
    #[error("Disconnection error: {message}")]
    Disconnection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A statement was submitted while no connection is open.
    #[error("client is not connected")]
    NotConnected,

    /// Statement execution failed, with PostgreSQL-specific details when available.
    #[error("{message}")]
    Query {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// PostgreSQL error code (e.g., "42P01").
        code: Option<String>,
    },

    /// An obfuscated secret could not be decoded.
    #[error("Obfuscation error: {message}")]
    Obfuscation {
        /// Human-readable error message.
        message: String,
    },

    /// Configuration could not be parsed or loaded.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

/// Convenience alias used across the crate.
pub type SoloResult<T> = Result<T, SoloError>;

impl SoloError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new disconnection error.
    pub fn disconnection(message: impl Into<String>) -> Self {
        Self::Disconnection { message: message.into(), source: None }
    }

    /// Create a new disconnection error with source.
    pub fn disconnection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Disconnection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a query error carrying only a message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query { message: message.into(), detail: None, hint: None, position: None, code: None }
    }

    /// Create a new query error with full PostgreSQL details.
    pub fn query_with_details(
        message: impl Into<String>,
        detail: Option<String>,
        hint: Option<String>,
        position: Option<usize>,
        code: Option<String>,
    ) -> Self {
        Self::Query { message: message.into(), detail, hint, position, code }
    }

    /// Create a new obfuscation error.
    pub fn obfuscation(message: impl Into<String>) -> Self {
        Self::Obfuscation { message: message.into() }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Reclassification ==========

    /// Reclassify a failure raised while opening a connection.
    ///
    /// Connection errors pass through; anything else is wrapped as the source of a
    /// new [`SoloError::Connection`].
    pub fn into_connection(self) -> Self {
        match self {
            Self::Connection { .. } => self,
            other => Self::Connection { message: other.to_string(), source: Some(Box::new(other)) },
        }
    }

    /// Reclassify a failure raised while closing a connection.
    pub fn into_disconnection(self) -> Self {
        match self {
            Self::Disconnection { .. } => self,
            other => {
                Self::Disconnection { message: other.to_string(), source: Some(Box::new(other)) }
            }
        }
    }

    /// Reclassify a failure raised while executing a statement.
    ///
    /// Server-side details are kept when the driver already produced a query error.
    pub fn into_query(self) -> Self {
        match self {
            Self::Query { .. } => self,
            Self::NotConnected => self,
            other => Self::query(other.to_string()),
        }
    }

    // ========== Methods ==========

    /// Check if this error means no connection was open.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Disconnection { .. } => "Disconnection",
            Self::NotConnected => "NotConnected",
            Self::Query { .. } => "Query",
            Self::Obfuscation { .. } => "Obfuscation",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::Disconnection { .. } => Some("The connection may still be open"),
            Self::NotConnected => Some("Call connect() before executing statements"),
            Self::Query { hint, .. } => hint.as_deref(),
            Self::Obfuscation { .. } => Some("Re-encode the secret with `pgsolo obfuscate`"),
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get position in query (if applicable).
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Query { position, .. } => *position,
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Query { detail, code, position, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(pos) = position {
                    parts.push(format!("Position: {pos}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail, when the server supplied any.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to SoloError.
impl From<tokio_postgres::Error> for SoloError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let code_str = db_err.code().code();

            // Connection exceptions (08xxx) and authentication failures (28xxx)
            if code_str.starts_with("08") || code_str.starts_with("28") {
                return SoloError::Connection { message, source: Some(Box::new(err)) };
            }

            let detail = db_err.detail().map(String::from);
            let hint = db_err.hint().map(String::from);
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let code = Some(code_str.to_string());
            return SoloError::Query { message, detail, hint, position, code };
        }

        if err.is_closed() {
            return SoloError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        SoloError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from serde_json::Error to SoloError.
impl From<serde_json::Error> for SoloError {
    fn from(err: serde_json::Error) -> Self {
        SoloError::Config { message: format!("JSON error: {err}") }
    }
}

/// Convert from std::io::Error to SoloError.
impl From<std::io::Error> for SoloError {
    fn from(err: std::io::Error) -> Self {
        SoloError::Config { message: err.to_string() }
    }
}
