//! Error types for fedql.
//!
//! All errors in fedql are strongly typed using thiserror.
//! This enables pattern matching on specific resolution failures
//! and provides clear error messages.

use thiserror::Error;

use crate::schema::QualifiedName;

fn join_names(names: &[QualifiedName]) -> String {
    names
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validation errors raised while building schemas, configs and names.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid qualified name '{name}': {reason}")]
    InvalidQualifiedName {
        name: String,
        reason: String,
    },

    #[error("Type '{name}' is defined more than once")]
    DuplicateType {
        name: String,
    },

    #[error("Operation '{name}' is defined more than once")]
    DuplicateOperation {
        name: String,
    },

    #[error("Type '{name}' is referenced by '{referenced_by}' but not defined")]
    UndefinedType {
        name: String,
        referenced_by: String,
    },

    #[error("Operation '{operation}' has no parameter named '{parameter}'")]
    UnknownParameter {
        operation: String,
        parameter: String,
    },

    #[error("Invalid engine configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("Value does not match type '{type_name}': {reason}")]
    TypeMismatch {
        type_name: String,
        reason: String,
    },
}

/// Transport errors reported by operation invokers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    #[error("Server error (code {code}): {message}")]
    ServerError {
        code: u32,
        message: String,
    },

    #[error("Failed to deserialize response: {message}")]
    DeserializationFailed {
        message: String,
    },
}

impl TransportError {
    /// Returns true if retrying the same call could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } => true,
            Self::ServerError { code, .. } => *code >= 500,
            Self::DeserializationFailed { .. } => false,
        }
    }
}

/// Errors produced while resolving, invoking and gating facts.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Operation '{operation}' could not resolve parameters: {}", join_names(.unmet))]
    UnresolvedParameters {
        operation: String,
        unmet: Vec<QualifiedName>,
        path: Vec<String>,
    },

    #[error("No invoker found for operation '{operation}' on service '{service}'")]
    NoInvokerFound {
        service: String,
        operation: String,
    },

    #[error("Constraint violated on '{subject}': {reason}")]
    ConstraintViolation {
        subject: String,
        reason: String,
    },

    #[error("Invocation of '{operation}' failed after {elapsed_ms}ms: {source}")]
    InvocationFailed {
        operation: String,
        elapsed_ms: u64,
        #[source]
        source: TransportError,
    },

    #[error("Unknown type: {name}")]
    UnknownType {
        name: String,
    },

    #[error("Unknown operation: {name}")]
    UnknownOperation {
        name: String,
    },

    #[error("No fact or operation path produces '{target}'")]
    TargetNotFound {
        target: QualifiedName,
        attempts: Vec<String>,
    },

    #[error("Multiple policies produced instructions for '{type_name}': {}", .policies.join(", "))]
    ConflictingPolicies {
        type_name: QualifiedName,
        policies: Vec<String>,
    },

    #[error("Query {query_id} was cancelled")]
    Cancelled {
        query_id: String,
    },
}

impl ResolutionError {
    /// Returns true if a broader search may continue with another candidate.
    ///
    /// Routing errors, policy conflicts and cancellation always abort the search.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedParameters { .. }
                | Self::ConstraintViolation { .. }
                | Self::InvocationFailed { .. }
                | Self::TargetNotFound { .. }
        )
    }
}

/// Top-level error type for fedql.
#[derive(Debug, Error)]
pub enum FedError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl FedError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a resolution error.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }

    /// Returns true if this error reports a cancelled query.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Resolution(ResolutionError::Cancelled { .. }))
    }

    /// Returns true if a broader search may try another candidate after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Resolution(e) => e.is_recoverable(),
            Self::Transport(_) => true,
            Self::Validation(_) | Self::Internal { .. } => false,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Resolution(ResolutionError::InvocationFailed { source, .. }) => source.is_retryable(),
            // Routing misconfiguration will not change on retry.
            Self::Resolution(_) => false,
            Self::Transport(e) => e.is_retryable(),
        }
    }
}

/// Result type alias for fedql operations.
pub type FedResult<T> = Result<T, FedError>;
