//! Building object instances field by field.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::context::QueryContext;
use crate::error::{FedError, FedResult, ResolutionError};
use crate::facts::{match_facts, Discovery};
use crate::instance::{DataSource, InstanceValue, TypedInstance};
use crate::resolver::{Resolver, SearchState};
use crate::schema::{Field, FieldAccessor, QualifiedName, SchemaProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildMode {
    /// Every field must resolve; used for parameter types.
    Strict,
    /// Unresolved fields become typed nulls; used for projection.
    Lenient,
}

impl Resolver {
    /// Builds an instance of `target` from what the context knows.
    ///
    /// A fact of the target type is returned as is. Object types are
    /// otherwise assembled field by field; fields that cannot be found are
    /// typed nulls, so the caller can see which parts failed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` for undeclared targets, and the unrecoverable
    /// errors of [`Resolver::find`].
    pub fn build(&self, target: &QualifiedName, ctx: &QueryContext, state: &SearchState) -> FedResult<TypedInstance> {
        ctx.ensure_active()?;
        if let Some(found) = ctx.find_fact(target, Discovery::DistinctAtAnyDepth)?.found() {
            return Ok(found);
        }
        self.build_object(target, BuildMode::Lenient, ctx, state)
    }

    /// Builds a parameter type; every field must resolve and satisfy its constraints.
    pub(crate) fn build_parameter_object(
        &self,
        target: &QualifiedName,
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<TypedInstance> {
        self.build_object(target, BuildMode::Strict, ctx, state)
    }

    fn build_object(
        &self,
        target: &QualifiedName,
        mode: BuildMode,
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<TypedInstance> {
        ctx.ensure_active()?;
        let schema = ctx.schema();
        let def = schema
            .type_def(target.nominal())
            .ok_or_else(|| ResolutionError::UnknownType {
                name: target.to_string(),
            })?;

        if target.is_collection() || !def.is_object() {
            return match self.find(target, ctx, state)? {
                Some(found) => Ok(found),
                None if mode == BuildMode::Strict => Err(ResolutionError::TargetNotFound {
                    target: target.clone(),
                    attempts: self.candidate_operations(target, schema),
                }
                .into()),
                None => Ok(TypedInstance::null(
                    target.clone(),
                    format!("no fact or operation produces {target}"),
                )),
            };
        }

        let mut fields = BTreeMap::new();
        let mut unmet = Vec::new();
        for field in def.fields() {
            let resolved = self.resolve_field(field, mode, ctx, state)?;
            let checked = match resolved {
                Some(value) if !field.constraints.is_empty() && !value.is_null() => {
                    let subject = format!("{target}.{}", field.name);
                    match self.satisfy(value, &field.constraints, &[], &subject, ctx, state) {
                        Ok(value) => Some(value),
                        Err(e) if mode == BuildMode::Strict => return Err(e),
                        Err(FedError::Resolution(e)) if e.is_recoverable() => {
                            warn!(%subject, error = %e, "field dropped after constraint violation");
                            Some(TypedInstance::null_with_source(
                                field.type_name.clone(),
                                e.to_string(),
                                DataSource::failed(e.to_string()),
                            ))
                        }
                        Err(e) => return Err(e),
                    }
                }
                other => other,
            };
            match checked {
                Some(value) => {
                    fields.insert(field.name.clone(), value);
                }
                None if mode == BuildMode::Strict => unmet.push(field.type_name.clone()),
                None => {
                    debug!(%target, field = %field.name, "field unresolved");
                    fields.insert(
                        field.name.clone(),
                        TypedInstance::null(field.type_name.clone(), format!("no value found for {}", field.name)),
                    );
                }
            }
        }

        if !unmet.is_empty() {
            return Err(ResolutionError::UnresolvedParameters {
                operation: format!("construct {target}"),
                unmet,
                path: state.describe(),
            }
            .into());
        }
        Ok(TypedInstance::object(
            target.clone(),
            fields,
            DataSource::derived(format!("built {target}")),
        ))
    }

    /// Field value from, in order: its scope accessor, scoped facts,
    /// context facts, a nested build (lenient only), or a search.
    fn resolve_field(
        &self,
        field: &Field,
        mode: BuildMode,
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<Option<TypedInstance>> {
        let schema = ctx.schema();

        if let Some(FieldAccessor::ScopePath { scope, path }) = &field.accessor {
            let found = ctx
                .resolve_scope(scope)?
                .and_then(|root| root.path_segments(path).cloned())
                .filter(|v| !v.is_null())
                .map(|v| retype_for_field(v, field, schema));
            return Ok(Some(found.unwrap_or_else(|| {
                TypedInstance::null(
                    field.type_name.clone(),
                    format!("{scope}.{} is not available", path.join(".")),
                )
            })));
        }

        if !ctx.scoped_facts().is_empty() {
            let scoped: Vec<TypedInstance> = ctx.scoped_facts().iter().map(|s| s.fact.clone()).collect();
            if let Some(found) = match_facts(&scoped, &field.type_name, Discovery::DistinctAtAnyDepth, schema).found() {
                return Ok(Some(found));
            }
        }

        if let Some(found) = ctx.find_fact(&field.type_name, Discovery::DistinctAtAnyDepth)?.found() {
            return Ok(Some(found));
        }

        if mode == BuildMode::Lenient
            && !state.is_visited(&field.type_name)
            && state.depth() < self.config.max_search_depth
            && schema
                .type_def(&field.type_name)
                .is_some_and(|def| def.is_object() && !def.parameter_type)
        {
            let nested = self.build_object(&field.type_name, mode, ctx, &state.descend(&field.type_name))?;
            if has_any_value(&nested) {
                return Ok(Some(nested));
            }
        }

        self.find(&field.type_name, ctx, state)
    }
}

fn has_any_value(instance: &TypedInstance) -> bool {
    match &instance.value {
        InstanceValue::Object(fields) => fields.values().any(|f| !f.is_null()),
        InstanceValue::Null { .. } => false,
        InstanceValue::Scalar(_) | InstanceValue::Collection(_) => true,
    }
}

/// Scalars read through an accessor take the field's declared type.
fn retype_for_field(value: TypedInstance, field: &Field, schema: &dyn SchemaProvider) -> TypedInstance {
    if schema.is_assignable(&value.type_name, &field.type_name) {
        return value;
    }
    match value.value {
        InstanceValue::Scalar(v) => TypedInstance::scalar(
            field.type_name.clone(),
            v,
            DataSource::derived(format!("read from {}", value.type_name)),
        ),
        _ => value,
    }
}
