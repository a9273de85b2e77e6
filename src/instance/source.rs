//! Provenance of typed instances.
//!
//! Every value flowing through a query records where it came from, so
//! callers can tell supplied facts from remote responses, policy rewrites
//! and failures.

use serde::{Deserialize, Serialize};

use crate::events::CallId;

/// Where a typed instance came from.
///
/// # Examples
///
/// ```
/// use fedql::DataSource;
///
/// let failed = DataSource::failed("customer lookup timed out");
/// assert!(failed.is_failure());
/// assert!(!DataSource::Provided.is_failure());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// Supplied by the caller as an input fact.
    Provided,

    /// Returned by a remote operation.
    OperationResult {
        operation: String,
        call_id: CallId,

        /// The parameter this result was converted from, if declared.
        #[serde(skip_serializing_if = "Option::is_none")]
        derived_from: Option<String>,
    },

    /// Assembled by the engine from other facts.
    Derived {
        description: String,
    },

    /// Replaced by a policy `mutate` instruction.
    PolicyMutation {
        policy: String,
    },

    /// Withheld by a policy `filter` instruction.
    PolicyFiltered {
        policy: String,
    },

    /// Resolution of this value failed.
    Failed {
        message: String,
    },

    #[default]
    Undefined,
}

impl DataSource {
    /// Creates a failure source.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates a derived source.
    #[must_use]
    pub fn derived(description: impl Into<String>) -> Self {
        Self::Derived {
            description: description.into(),
        }
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub const fn is_operation_result(&self) -> bool {
        matches!(self, Self::OperationResult { .. })
    }

    /// True if a policy has already acted on the value.
    pub const fn is_policy_outcome(&self) -> bool {
        matches!(self, Self::PolicyMutation { .. } | Self::PolicyFiltered { .. })
    }

    /// Returns a short name for this source kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Provided => "provided",
            Self::OperationResult { .. } => "operation_result",
            Self::Derived { .. } => "derived",
            Self::PolicyMutation { .. } => "policy_mutation",
            Self::PolicyFiltered { .. } => "policy_filtered",
            Self::Failed { .. } => "failed",
            Self::Undefined => "undefined",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OperationResult { operation, .. } => write!(f, "operation:{operation}"),
            Self::Derived { description } => write!(f, "derived:{description}"),
            Self::PolicyMutation { policy } => write!(f, "mutated-by:{policy}"),
            Self::PolicyFiltered { policy } => write!(f, "filtered-by:{policy}"),
            Self::Failed { message } => write!(f, "failed:{message}"),
            Self::Provided | Self::Undefined => write!(f, "{}", self.kind_name()),
        }
    }
}
