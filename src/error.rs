//! Error types shared by translation, rendering and execution.
//!
//! Translation failures are reported eagerly: the builder call that received the
//! offending lambda returns the error, nothing is deferred to execution.

use std::fmt;

use crate::executor::SessionError;

/// Errors produced while building, translating or running a query
#[derive(Debug)]
pub enum FlowError {
    /// A required argument was missing, empty or of the wrong kind
    InvalidArgument(String),
    /// The query is in a state where the requested operation cannot be honoured
    InvalidOperation(String),
    /// The expression shape has no translation
    NotSupported(String),
    /// A lambda did not have the expected parameter count or types
    ArgumentShape(String),
    /// Construction of result objects from rows failed
    Mapping(String),
    /// The session failed to execute the compiled query
    Session(SessionError),
}

impl FlowError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        FlowError::InvalidArgument(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        FlowError::InvalidOperation(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        FlowError::NotSupported(msg.into())
    }

    pub fn argument_shape(msg: impl Into<String>) -> Self {
        FlowError::ArgumentShape(msg.into())
    }

    pub fn mapping(msg: impl Into<String>) -> Self {
        FlowError::Mapping(msg.into())
    }

    /// True for errors raised because an expression shape cannot be translated
    pub fn is_not_supported(&self) -> bool {
        matches!(self, FlowError::NotSupported(_))
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::InvalidArgument(s) => write!(f, "Invalid argument: {s}"),
            FlowError::InvalidOperation(s) => write!(f, "Invalid operation: {s}"),
            FlowError::NotSupported(s) => write!(f, "Not supported: {s}"),
            FlowError::ArgumentShape(s) => write!(f, "Argument shape mismatch: {s}"),
            FlowError::Mapping(s) => write!(f, "Mapping error: {s}"),
            FlowError::Session(e) => write!(f, "Session error: {e}"),
        }
    }
}

impl std::error::Error for FlowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlowError::Session(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SessionError> for FlowError {
    fn from(err: SessionError) -> Self {
        FlowError::Session(err)
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Mapping(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_error_display() {
        assert!(FlowError::invalid_argument("x").to_string().contains("Invalid argument"));
        assert!(FlowError::invalid_operation("x").to_string().contains("Invalid operation"));
        assert!(FlowError::not_supported("x").to_string().contains("Not supported"));
        assert!(FlowError::argument_shape("x").to_string().contains("Argument shape"));
    }

    #[test]
    fn test_session_error_is_source() {
        use std::error::Error;
        let err: FlowError = SessionError::QueryError("boom".to_string()).into();
        assert!(err.source().is_some());
        assert!(!err.is_not_supported());
    }
}
