//! Declarative constraints on parameters, fields and operation results.
//!
//! Evaluation here is pure. Repairing a violation (finding an operation
//! that converts the value) is the resolver's job.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::instance::TypedInstance;
use crate::schema::Argument;
use crate::value::Value;

/// A constraint attached to a parameter, a field or an operation's return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// `attribute` must equal a literal.
    ConstantValue { attribute: String, value: Value },
    /// `attribute` must equal the value passed for `parameter`.
    ValueFromParameter { attribute: String, parameter: String },
    /// The return value is a converted form of `parameter`.
    ReturnDerivedFromParameter { parameter: String },
}

/// Outcome of evaluating a single constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintEvaluation {
    Satisfied,
    Violated(ConstraintViolation),
}

impl ConstraintEvaluation {
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Describes how a value failed a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintViolation {
    pub constraint: Constraint,
    pub attribute: String,
    /// The value required; `None` when it could not be determined.
    pub expected: Option<Value>,
    /// The value found; `None` when the attribute is absent.
    pub actual: Option<Value>,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected = self
            .expected
            .as_ref()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
        let actual = self
            .actual
            .as_ref()
            .map_or_else(|| "<absent>".to_string(), ToString::to_string);
        write!(f, "expected {} = {expected}, found {actual}", self.attribute)
    }
}

impl Constraint {
    /// The attribute path this constraint inspects, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::ConstantValue { attribute, .. } | Self::ValueFromParameter { attribute, .. } => {
                Some(attribute)
            }
            Self::ReturnDerivedFromParameter { .. } => None,
        }
    }

    /// Evaluates the constraint against `candidate`.
    ///
    /// `arguments` supplies the values of sibling parameters (for parameter
    /// constraints) or the call arguments (for return constraints).
    #[must_use]
    pub fn evaluate(&self, candidate: &TypedInstance, arguments: &[Argument]) -> ConstraintEvaluation {
        let (attribute, expected) = match self {
            Self::ReturnDerivedFromParameter { .. } => return ConstraintEvaluation::Satisfied,
            Self::ConstantValue { attribute, value } => (attribute, Some(value.clone())),
            Self::ValueFromParameter { attribute, parameter } => {
                let expected = Argument::find(arguments, parameter)
                    .and_then(|a| a.value.scalar_value())
                    .cloned();
                (attribute, expected)
            }
        };

        let actual = candidate.path(attribute).and_then(TypedInstance::scalar_value).cloned();
        let satisfied = match (&expected, &actual) {
            (Some(e), Some(a)) => e.loosely_equals(a),
            (Some(Value::Null), None) => true,
            _ => false,
        };
        if satisfied {
            ConstraintEvaluation::Satisfied
        } else {
            ConstraintEvaluation::Violated(ConstraintViolation {
                constraint: self.clone(),
                attribute: attribute.clone(),
                expected,
                actual,
            })
        }
    }
}
