use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid turn record: {0}")]
    InvalidTurnRecord(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure of a single capability invocation.
///
/// `Validation`, `NotFound` and `UnknownCapability` are recoverable: they are
/// reported back to the model as the tool result. `Storage` aborts the run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("unknown capability `{0}`")]
    UnknownCapability(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFoundError",
            Self::UnknownCapability(_) => "UnknownCapabilityError",
            Self::Storage(_) => "StorageError",
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl From<DomainError> for ToolError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidTurnRecord(message) => Self::Storage(message),
            DomainError::InvariantViolation(message) => Self::Validation(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested conversation does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// The rejection reason, exposed for bad requests only.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::BadRequest { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{DomainError, InterfaceError, ToolError};

    #[test]
    fn tool_error_kinds_are_stable() {
        assert_eq!(ToolError::Validation("x".to_owned()).kind(), "ValidationError");
        assert_eq!(ToolError::NotFound("x".to_owned()).kind(), "NotFoundError");
        assert_eq!(
            ToolError::UnknownCapability("fetchSalary".to_owned()).kind(),
            "UnknownCapabilityError"
        );
        assert_eq!(ToolError::Storage("x".to_owned()).kind(), "StorageError");
    }

    #[test]
    fn only_storage_failures_abort_a_run() {
        assert!(ToolError::Validation("missing date".to_owned()).is_recoverable());
        assert!(ToolError::NotFound("no leave".to_owned()).is_recoverable());
        assert!(ToolError::UnknownCapability("nope".to_owned()).is_recoverable());
        assert!(!ToolError::Storage("disk full".to_owned()).is_recoverable());
    }

    #[test]
    fn invariant_violation_becomes_validation_error() {
        let error = ToolError::from(DomainError::InvariantViolation("bad leave type".to_owned()));
        assert!(matches!(error, ToolError::Validation(_)));
    }

    #[test]
    fn interface_errors_map_to_http_status_and_safe_message() {
        let error = InterfaceError::BadRequest {
            message: "message is required".to_owned(),
            correlation_id: "req-1".to_owned(),
        };
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.correlation_id(), "req-1");
        assert_eq!(error.detail(), Some("message is required"));
        assert_eq!(
            error.user_message(),
            "The request could not be processed. Check inputs and try again."
        );

        let unavailable = InterfaceError::ServiceUnavailable {
            message: "database lock timeout".to_owned(),
            correlation_id: "req-2".to_owned(),
        };
        assert_eq!(unavailable.status_code(), 503);
    }
}
