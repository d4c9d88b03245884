use thiserror::Error;

/// Main error type for the WindTunnel system
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// True for the terminal cancellation signal, which callers treat as a
    /// normal outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchError::Cancelled)
    }
}

/// Result type alias for WindTunnel operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::SearchError::Config(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::SearchError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SearchError::Config("max_iterations must be positive".to_string());
        assert!(error.to_string().contains("Configuration error"));
        assert!(error.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_cancelled_classification() {
        assert!(SearchError::Cancelled.is_cancelled());
        assert!(!SearchError::Internal("boom".to_string()).is_cancelled());
    }

    #[test]
    fn test_serde_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: SearchError = parse_err.into();
        match error {
            SearchError::Serialization(_) => (),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_macros() {
        let _config_err = config_error!("Missing required field: {}", "training_period");
        let _internal_err = internal_error!("Worker panicked");
    }
}
