//! Error types for native callbacks

/// Result type for native callback helpers
pub type NativeResult<T> = Result<T, NativeError>;

/// Errors a native callback can report back to the calling program
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NativeError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Argument missing or out of range
    #[error("Argument error: {0}")]
    ArgumentError(String),

    /// Callback-defined failure
    #[error("{0}")]
    Failed(String),
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError::Failed(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError::Failed(s.to_string())
    }
}
