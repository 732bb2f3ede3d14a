use thiserror::Error;

/// Core error types for inviteflow model operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid invitation id: {0}")]
    InvalidId(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid template {template_id}: {message}")]
    InvalidTemplate { template_id: String, message: String },

    #[error("Invalid source filter: {message}")]
    InvalidFilter { message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time range error: {0}")]
    TimeError(#[from] time::error::ComponentRange),
}

impl CoreError {
    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Create a new InvalidTimestamp error
    pub fn invalid_timestamp(message: impl Into<String>) -> Self {
        Self::InvalidTimestamp(message.into())
    }

    /// Create a new InvalidTemplate error
    pub fn invalid_template(template_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template_id: template_id.into(),
            message: message.into(),
        }
    }

    /// Create a new InvalidFilter error
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidId(_)
            | Self::InvalidTimestamp(_)
            | Self::InvalidTemplate { .. }
            | Self::InvalidFilter { .. } => ErrorCategory::Validation,
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::TimeError(_) => ErrorCategory::System,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Serialization,
    System,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_template_error() {
        let err = CoreError::invalid_template("X/-/Review", "missing review_readers");
        assert_eq!(
            err.to_string(),
            "Invalid template X/-/Review: missing review_readers"
        );
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_invalid_filter_error() {
        let err = CoreError::invalid_filter("reply_to must not be empty");
        assert!(err.to_string().contains("reply_to must not be empty"));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let core_err: CoreError = json_err.into();

        assert!(matches!(core_err, CoreError::JsonError(_)));
        assert_eq!(core_err.category(), ErrorCategory::Serialization);
    }

    #[test]
    fn test_time_error_conversion() {
        let range_err = ::time::OffsetDateTime::from_unix_timestamp(i64::MAX).unwrap_err();
        let core_err: CoreError = range_err.into();
        assert_eq!(core_err.category(), ErrorCategory::System);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
        assert_eq!(ErrorCategory::System.to_string(), "system");
    }
}
