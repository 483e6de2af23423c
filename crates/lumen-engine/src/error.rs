//! Engine error types
//!
//! Everything here is recoverable and reported through return values; no
//! error crosses the public boundary as a panic.

use crate::isolate::PhaseError;

/// Errors from isolate lifecycle operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IsolateError {
    /// The requested operation is not legal in the isolate's current phase
    #[error(transparent)]
    InvalidPhase(#[from] PhaseError),

    /// `run` named an entrypoint the loaded program does not define
    #[error("Entrypoint not found: {0}")]
    EntrypointNotFound(String),

    /// `shutdown` (or a registration) arrived after shutdown began
    #[error("Isolate {0} is already shut down")]
    AlreadyShutdown(String),

    /// The isolate's interpreter state has been torn down
    #[error("Isolate {0} has no live interpreter state")]
    NotAlive(String),

    /// The calling thread does not hold the isolate's scope
    #[error("Isolate {0} is not entered on the calling thread")]
    NotInScope(String),

    /// The VM that owned the isolate no longer exists
    #[error("The owning VM has been destroyed")]
    VmUnavailable,
}

/// Errors raised by program code running inside an isolate
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProgramError {
    /// A program function called by name does not exist
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// No native callback is registered under the name
    #[error("Native function not found: {0}")]
    NativeNotFound(String),

    /// A native callback reported failure
    #[error("Native function {name} failed: {message}")]
    NativeFailed {
        /// Callback name
        name: String,
        /// Callback's error message
        message: String,
    },

    /// Unhandled error raised by program code
    #[error("Unhandled exception: {0}")]
    Thrown(String),

    /// A lifecycle operation requested by program code failed
    #[error(transparent)]
    Isolate(Box<IsolateError>),
}

impl ProgramError {
    /// Raise an unhandled error from program code
    pub fn thrown(message: impl Into<String>) -> Self {
        ProgramError::Thrown(message.into())
    }
}

impl From<IsolateError> for ProgramError {
    fn from(err: IsolateError) -> Self {
        ProgramError::Isolate(Box::new(err))
    }
}

impl From<PhaseError> for ProgramError {
    fn from(err: PhaseError) -> Self {
        IsolateError::from(err).into()
    }
}
