//! Policy evaluation and application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::QueryContext;
use crate::error::{FedResult, ResolutionError};
use crate::instance::{DataSource, InstanceValue, TypedInstance};
use crate::policy::{ExecutionScope, Instruction, Policy, RuleSet};
use crate::schema::QualifiedName;

/// Audit entry for one policy evaluated against one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluationRecord {
    pub type_name: QualifiedName,
    /// `None` when the type carries no policy and the default applied.
    pub policy: Option<QualifiedName>,
    /// Index of the selected rule set, if any matched the scope.
    pub rule_set: Option<usize>,
    /// Index of the statement that fired, if any.
    pub statement: Option<usize>,
    pub instruction: Instruction,
    pub scope: ExecutionScope,
    pub evaluated_at: DateTime<Utc>,
}

/// Evaluates the policies attached to a value's type.
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    default_instruction: Instruction,
}

impl PolicyEvaluator {
    #[must_use]
    pub const fn new(default_instruction: Instruction) -> Self {
        Self { default_instruction }
    }

    pub const fn default_instruction(&self) -> &Instruction {
        &self.default_instruction
    }

    /// Picks the rule set that best fits `scope`.
    ///
    /// Highest score wins; ties go to the rule set with more exact
    /// (non-wildcard) terms, then to the one declared first. Rule sets
    /// scoring zero never apply.
    #[must_use]
    pub fn select_rule_set<'a>(&self, policy: &'a Policy, scope: ExecutionScope) -> Option<(usize, &'a RuleSet)> {
        let mut best: Option<(usize, &RuleSet, (u8, u8))> = None;
        for (index, rule_set) in policy.rule_sets.iter().enumerate() {
            let score = rule_set.scope.score(scope);
            if score == 0 {
                continue;
            }
            let rank = (score, rule_set.scope.exact_terms(scope));
            if best.as_ref().map_or(true, |(_, _, best_rank)| rank > *best_rank) {
                best = Some((index, rule_set, rank));
            }
        }
        best.map(|(index, rule_set, _)| (index, rule_set))
    }

    /// Returns the instruction the policies of `instance`'s type yield in `scope`.
    ///
    /// Collections are evaluated at their member type.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingPolicies` when more than one policy yields a
    /// non-default instruction.
    pub fn evaluate(&self, instance: &TypedInstance, ctx: &QueryContext, scope: ExecutionScope) -> FedResult<Instruction> {
        Ok(self.decide(instance, ctx, scope)?.0)
    }

    fn decide(
        &self,
        instance: &TypedInstance,
        ctx: &QueryContext,
        scope: ExecutionScope,
    ) -> FedResult<(Instruction, Option<QualifiedName>)> {
        let nominal = instance.type_name.nominal();
        let policies = ctx.schema().policies_for(nominal);
        if policies.is_empty() {
            ctx.record_policy_evaluation(PolicyEvaluationRecord {
                type_name: nominal.clone(),
                policy: None,
                rule_set: None,
                statement: None,
                instruction: self.default_instruction.clone(),
                scope,
                evaluated_at: Utc::now(),
            })?;
            return Ok((self.default_instruction.clone(), None));
        }

        let mut decided: Vec<(QualifiedName, Instruction)> = Vec::new();
        for policy in policies {
            let (instruction, rule_set, statement) = self.evaluate_policy(policy, instance, ctx, scope);
            ctx.record_policy_evaluation(PolicyEvaluationRecord {
                type_name: nominal.clone(),
                policy: Some(policy.name.clone()),
                rule_set,
                statement,
                instruction: instruction.clone(),
                scope,
                evaluated_at: Utc::now(),
            })?;
            if instruction != self.default_instruction {
                decided.push((policy.name.clone(), instruction));
            }
        }

        match decided.len() {
            0 => Ok((self.default_instruction.clone(), None)),
            1 => {
                let (policy, instruction) = decided.remove(0);
                Ok((instruction, Some(policy)))
            }
            _ => Err(ResolutionError::ConflictingPolicies {
                type_name: nominal.clone(),
                policies: decided.iter().map(|(p, _)| p.to_string()).collect(),
            }
            .into()),
        }
    }

    fn evaluate_policy(
        &self,
        policy: &Policy,
        instance: &TypedInstance,
        ctx: &QueryContext,
        scope: ExecutionScope,
    ) -> (Instruction, Option<usize>, Option<usize>) {
        let Some((rule_set_index, rule_set)) = self.select_rule_set(policy, scope) else {
            return (self.default_instruction.clone(), None, None);
        };
        rule_set
            .statements
            .iter()
            .position(|s| s.condition.matches(instance, ctx))
            .map_or(
                (self.default_instruction.clone(), Some(rule_set_index), None),
                |i| (rule_set.statements[i].instruction.clone(), Some(rule_set_index), Some(i)),
            )
    }

    /// Applies the governing instruction to `instance` in the context's scope.
    ///
    /// Filtered values become typed nulls; mutated values are replaced.
    /// Collections are gated member by member and filtered members removed.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingPolicies` as for [`Self::evaluate`].
    pub fn apply(&self, instance: TypedInstance, ctx: &QueryContext) -> FedResult<TypedInstance> {
        if instance.is_null() || instance.source.is_policy_outcome() {
            return Ok(instance);
        }

        let TypedInstance {
            type_name,
            value,
            source,
        } = instance;
        let instance = match value {
            InstanceValue::Collection(members) => {
                let mut kept = Vec::with_capacity(members.len());
                for member in members {
                    let applied = self.apply(member, ctx)?;
                    if !matches!(applied.source, DataSource::PolicyFiltered { .. }) {
                        kept.push(applied);
                    }
                }
                return Ok(TypedInstance {
                    type_name,
                    value: InstanceValue::Collection(kept),
                    source,
                });
            }
            other => TypedInstance {
                type_name,
                value: other,
                source,
            },
        };

        match self.decide(&instance, ctx, ctx.execution_scope())? {
            (Instruction::Permit, _) => Ok(instance),
            (Instruction::Filter, policy) => {
                let policy = policy.map_or_else(|| "default".to_string(), |p| p.to_string());
                debug!(type_name = %instance.type_name, %policy, "value filtered by policy");
                Ok(TypedInstance::null_with_source(
                    instance.type_name,
                    format!("filtered by policy {policy}"),
                    DataSource::PolicyFiltered { policy },
                ))
            }
            (Instruction::Mutate(value), policy) => {
                let policy = policy.map_or_else(|| "default".to_string(), |p| p.to_string());
                debug!(type_name = %instance.type_name, %policy, "value mutated by policy");
                Ok(TypedInstance::scalar(
                    instance.type_name,
                    value,
                    DataSource::PolicyMutation { policy },
                ))
            }
        }
    }
}
