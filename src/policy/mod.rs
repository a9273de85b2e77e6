//! Per-type data access policies.
//!
//! A [`Policy`] is attached to one type and holds rule sets scoped by
//! operation type (internal/external) and policy scope (read/write). The
//! [`PolicyEvaluator`] picks the best rule set for the current
//! [`ExecutionScope`] and runs its statements in order.

mod condition;
mod evaluator;

pub use condition::{ComparisonOperator, Condition, Operand};
pub use evaluator::{PolicyEvaluationRecord, PolicyEvaluator};

use serde::{Deserialize, Serialize};

use crate::schema::QualifiedName;
use crate::value::Value;

/// Outcome of evaluating a policy against a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Instruction {
    #[default]
    Permit,
    /// Withhold the value; it is replaced by a typed null.
    Filter,
    /// Replace the value.
    Mutate(Value),
}

/// Whether a query runs on behalf of an internal or external caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOperationScope {
    Read,
    Write,
}

/// The scope a query executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionScope {
    pub operation_type: OperationType,
    pub policy_scope: PolicyOperationScope,
}

impl ExecutionScope {
    #[must_use]
    pub const fn new(operation_type: OperationType, policy_scope: PolicyOperationScope) -> Self {
        Self {
            operation_type,
            policy_scope,
        }
    }
}

impl Default for ExecutionScope {
    fn default() -> Self {
        Self::new(OperationType::External, PolicyOperationScope::Read)
    }
}

/// Either one specific value or any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSelector<T> {
    Exactly(T),
    Wildcard,
}

impl<T: PartialEq> ScopeSelector<T> {
    /// 1 for an exact or wildcard match, 0 otherwise.
    fn score(&self, actual: &T) -> u8 {
        match self {
            Self::Wildcard => 1,
            Self::Exactly(expected) => u8::from(expected == actual),
        }
    }

    fn is_exact_match(&self, actual: &T) -> bool {
        matches!(self, Self::Exactly(expected) if expected == actual)
    }
}

/// The scope a rule set applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetScope {
    pub operation_type: ScopeSelector<OperationType>,
    pub policy_scope: ScopeSelector<PolicyOperationScope>,
}

impl RuleSetScope {
    #[must_use]
    pub const fn new(
        operation_type: ScopeSelector<OperationType>,
        policy_scope: ScopeSelector<PolicyOperationScope>,
    ) -> Self {
        Self {
            operation_type,
            policy_scope,
        }
    }

    /// Matches a specific operation type and policy scope.
    #[must_use]
    pub const fn exactly(operation_type: OperationType, policy_scope: PolicyOperationScope) -> Self {
        Self::new(
            ScopeSelector::Exactly(operation_type),
            ScopeSelector::Exactly(policy_scope),
        )
    }

    /// Matches every scope.
    #[must_use]
    pub const fn wildcard() -> Self {
        Self::new(ScopeSelector::Wildcard, ScopeSelector::Wildcard)
    }

    /// Sum of the operation-type and policy-scope match scores.
    #[must_use]
    pub fn score(&self, scope: ExecutionScope) -> u8 {
        self.operation_type.score(&scope.operation_type) + self.policy_scope.score(&scope.policy_scope)
    }

    /// Number of terms matched exactly rather than by wildcard.
    #[must_use]
    pub fn exact_terms(&self, scope: ExecutionScope) -> u8 {
        u8::from(self.operation_type.is_exact_match(&scope.operation_type))
            + u8::from(self.policy_scope.is_exact_match(&scope.policy_scope))
    }
}

/// A condition paired with the instruction it yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub condition: Condition,
    pub instruction: Instruction,
}

impl PolicyStatement {
    #[must_use]
    pub const fn new(condition: Condition, instruction: Instruction) -> Self {
        Self {
            condition,
            instruction,
        }
    }

    /// An unconditional statement (`else -> ...`).
    #[must_use]
    pub const fn otherwise(instruction: Instruction) -> Self {
        Self::new(Condition::Always, instruction)
    }
}

/// Ordered statements for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub scope: RuleSetScope,
    pub statements: Vec<PolicyStatement>,
}

impl RuleSet {
    #[must_use]
    pub const fn new(scope: RuleSetScope) -> Self {
        Self {
            scope,
            statements: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }
}

/// A named policy governing values of `target_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: QualifiedName,
    pub target_type: QualifiedName,
    pub rule_sets: Vec<RuleSet>,
}

impl Policy {
    #[must_use]
    pub const fn new(name: QualifiedName, target_type: QualifiedName) -> Self {
        Self {
            name,
            target_type,
            rule_sets: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.rule_sets.push(rule_set);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_counts_exact_and_wildcard_terms() {
        let external_read = ExecutionScope::default();
        let exact = RuleSetScope::exactly(OperationType::External, PolicyOperationScope::Read);
        let wildcard = RuleSetScope::wildcard();
        let internal_only = RuleSetScope::new(
            ScopeSelector::Exactly(OperationType::Internal),
            ScopeSelector::Exactly(PolicyOperationScope::Write),
        );

        assert_eq!(exact.score(external_read), 2);
        assert_eq!(exact.exact_terms(external_read), 2);
        assert_eq!(wildcard.score(external_read), 2);
        assert_eq!(wildcard.exact_terms(external_read), 0);
        assert_eq!(internal_only.score(external_read), 0);
    }

    #[test]
    fn partially_matching_scope_scores_one() {
        let scope = RuleSetScope::new(
            ScopeSelector::Exactly(OperationType::Internal),
            ScopeSelector::Wildcard,
        );
        assert_eq!(scope.score(ExecutionScope::default()), 1);
        assert_eq!(
            scope.score(ExecutionScope::new(OperationType::Internal, PolicyOperationScope::Write)),
            2
        );
    }

    #[test]
    fn instruction_serialization() {
        let json = serde_json::to_value(Instruction::Mutate(Value::from("***"))).unwrap();
        assert_eq!(json["type"], "mutate");
        let back: Instruction = serde_json::from_value(serde_json::json!({"type": "permit"})).unwrap();
        assert_eq!(back, Instruction::Permit);
    }
}
