//! Constraint enforcement and repair.
//!
//! A value that violates a constraint can sometimes be converted: an
//! operation that returns the value's type, derives its result from a
//! parameter of that type, and binds the violated attribute to another
//! parameter is a conversion. `convertRates(source: Money, targetCurrency:
//! Currency): Money(from source, this.currency == targetCurrency)` turns an
//! AUD amount into a GBP one.

use tracing::debug;

use crate::constraint::{Constraint, ConstraintEvaluation, ConstraintViolation};
use crate::context::QueryContext;
use crate::error::{FedError, FedResult, ResolutionError};
use crate::instance::{DataSource, InstanceValue, TypedInstance};
use crate::resolver::{Invocation, Resolver, SearchState};
use crate::schema::{Argument, Operation, Parameter, QualifiedName, SchemaProvider};

impl Resolver {
    /// Returns `value`, converted if needed, so that it satisfies every constraint.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` when a violation cannot be repaired.
    pub(crate) fn satisfy(
        &self,
        value: TypedInstance,
        constraints: &[Constraint],
        arguments: &[Argument],
        subject: &str,
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<TypedInstance> {
        let mut current = value;
        for constraint in constraints {
            let ConstraintEvaluation::Violated(violation) = constraint.evaluate(&current, arguments) else {
                continue;
            };
            debug!(%subject, %violation, "constraint violated, looking for a conversion");
            let repaired = self
                .repair(&current, &violation, ctx, state)?
                .ok_or_else(|| violation_error(subject, &violation))?;
            if let ConstraintEvaluation::Violated(still) = constraint.evaluate(&repaired, arguments) {
                return Err(violation_error(subject, &still));
            }
            current = repaired;
        }
        Ok(current)
    }

    /// Applies the field constraints declared by an object's type.
    pub(crate) fn satisfy_fields(
        &self,
        value: TypedInstance,
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<TypedInstance> {
        let Some(def) = ctx.schema().type_def(&value.type_name) else {
            return Ok(value);
        };
        let constrained: Vec<_> = def
            .fields()
            .iter()
            .filter(|f| !f.constraints.is_empty())
            .cloned()
            .collect();
        if constrained.is_empty() {
            return Ok(value);
        }

        let TypedInstance {
            type_name,
            value: shape,
            source,
        } = value;
        let mut fields = match shape {
            InstanceValue::Object(fields) => fields,
            other => {
                return Ok(TypedInstance {
                    type_name,
                    value: other,
                    source,
                })
            }
        };
        for field in constrained {
            let Some(current) = fields.remove(&field.name) else {
                continue;
            };
            let checked = if current.is_null() {
                current
            } else {
                let subject = format!("{type_name}.{}", field.name);
                self.satisfy(current, &field.constraints, &[], &subject, ctx, state)?
            };
            fields.insert(field.name.clone(), checked);
        }
        Ok(TypedInstance {
            type_name,
            value: InstanceValue::Object(fields),
            source,
        })
    }

    fn repair(
        &self,
        value: &TypedInstance,
        violation: &ConstraintViolation,
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<Option<TypedInstance>> {
        let Some(expected) = &violation.expected else {
            return Ok(None);
        };
        let schema = ctx.schema();
        for (service, operation) in schema.operations() {
            if operation.returns_stream || !schema.is_assignable(&operation.return_type, &value.type_name) {
                continue;
            }
            let Some((source, target)) = conversion_parameters(operation, &violation.attribute, &value.type_name, schema)
            else {
                continue;
            };
            let preferred = [
                retype(value, &source.type_name),
                TypedInstance::scalar(
                    target.type_name.clone(),
                    expected.clone(),
                    DataSource::derived(format!("required {} of {}", violation.attribute, value.type_name)),
                ),
            ];
            debug!(
                operation = %operation.qualified_name(),
                attribute = %violation.attribute,
                %expected,
                "converting value to satisfy constraint"
            );
            match self.invoke(service, operation, &preferred, &ctx.subquery_child(), state) {
                Ok(Invocation::Single(converted)) if !converted.is_null() => return Ok(Some(converted)),
                Ok(_) => {}
                Err(FedError::Resolution(e)) if e.is_recoverable() => {
                    debug!(operation = %operation.qualified_name(), error = %e, "conversion failed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// The (source, target) parameters of a conversion operation for `attribute`.
fn conversion_parameters<'a>(
    operation: &'a Operation,
    attribute: &str,
    value_type: &QualifiedName,
    schema: &dyn SchemaProvider,
) -> Option<(&'a Parameter, &'a Parameter)> {
    let derived_from = operation.return_constraints.iter().find_map(|c| match c {
        Constraint::ReturnDerivedFromParameter { parameter } => Some(parameter),
        _ => None,
    })?;
    let bound_to = operation.return_constraints.iter().find_map(|c| match c {
        Constraint::ValueFromParameter {
            attribute: bound,
            parameter,
        } if bound == attribute => Some(parameter),
        _ => None,
    })?;
    let source = operation.parameter(derived_from)?;
    if !schema.is_assignable(value_type, &source.type_name) {
        return None;
    }
    Some((source, operation.parameter(bound_to)?))
}

/// Presents `value` as `type_name` so it matches a parameter exactly.
fn retype(value: &TypedInstance, type_name: &QualifiedName) -> TypedInstance {
    if value.type_name == *type_name {
        return value.clone();
    }
    TypedInstance {
        type_name: type_name.clone(),
        ..value.clone()
    }
}

fn violation_error(subject: &str, violation: &ConstraintViolation) -> FedError {
    ResolutionError::ConstraintViolation {
        subject: subject.to_string(),
        reason: violation.to_string(),
    }
    .into()
}
