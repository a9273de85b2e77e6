//! Graph search: finding a value of a target type.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::context::QueryContext;
use crate::error::{FedError, FedResult};
use crate::facts::Discovery;
use crate::instance::TypedInstance;
use crate::resolver::{Invocation, Resolver};
use crate::schema::{Operation, QualifiedName, SchemaProvider, Service};

/// Bound on how deep a return type is scanned for a nested target.
const MAX_CONTAINMENT_DEPTH: usize = 8;

/// One step on the current search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub target: QualifiedName,
    /// The operation being tried to produce `target`, once one is chosen.
    pub operation: Option<String>,
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(op) => write!(f, "{} via {op}", self.target),
            None => write!(f, "{}", self.target),
        }
    }
}

/// Explicit state of one search branch.
///
/// Each nested search works on its own copy, so sibling branches never see
/// each other's targets as visited.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    visited: HashSet<QualifiedName>,
    path: Vec<PathStep>,
}

impl SearchState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn is_visited(&self, target: &QualifiedName) -> bool {
        self.visited.contains(target)
    }

    pub fn path(&self) -> &[PathStep] {
        &self.path
    }

    /// The path as human-readable steps, outermost first.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.path.iter().map(ToString::to_string).collect()
    }

    pub(crate) fn descend(&self, target: &QualifiedName) -> Self {
        let mut next = self.clone();
        next.visited.insert(target.clone());
        next.path.push(PathStep {
            target: target.clone(),
            operation: None,
        });
        next
    }

    fn via(&self, operation: &Operation) -> Self {
        let mut next = self.clone();
        if let Some(step) = next.path.last_mut() {
            step.operation = Some(operation.qualified_name());
        }
        next
    }
}

/// Outcome of resolving a batch of targets.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub resolved: Vec<(QualifiedName, TypedInstance)>,
    pub unmet: Vec<QualifiedName>,
}

impl SearchOutcome {
    pub fn get(&self, target: &QualifiedName) -> Option<&TypedInstance> {
        self.resolved.iter().find(|(t, _)| t == target).map(|(_, v)| v)
    }

    pub fn is_complete(&self) -> bool {
        self.unmet.is_empty()
    }
}

impl Resolver {
    /// Finds a value of `target`.
    ///
    /// Known facts are checked first. Otherwise operations returning the
    /// target are tried, then operations returning a type that contains it,
    /// then (for parameter types) field-by-field construction. Returns
    /// `Ok(None)` when nothing produces the target; recoverable failures of
    /// individual candidates are logged and skipped.
    ///
    /// # Errors
    ///
    /// Cancellation, routing errors and policy conflicts abort the search.
    pub fn find(
        &self,
        target: &QualifiedName,
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<Option<TypedInstance>> {
        ctx.ensure_active()?;
        ctx.statistics().record_search_step();
        let schema = ctx.schema();

        if let Some(found) = ctx.find_fact(target, Discovery::DistinctAtAnyDepth)?.found() {
            return Ok(Some(found));
        }

        if state.is_visited(target) {
            debug!(%target, path = ?state.describe(), "target already on search path");
            return Ok(None);
        }
        if state.depth() >= self.config.max_search_depth {
            debug!(%target, depth = state.depth(), "search depth exhausted");
            return Ok(None);
        }

        let state = state.descend(target);
        for (service, operation) in candidates(target, schema) {
            debug!(%target, operation = %operation.qualified_name(), "trying candidate operation");
            match self.invoke(service, operation, &[], ctx, &state.via(operation)) {
                Ok(Invocation::Single(result)) => {
                    if let Some(found) = extract(&result, target, schema) {
                        return Ok(Some(found));
                    }
                    debug!(%target, operation = %operation.qualified_name(), "result does not contain target");
                }
                Ok(Invocation::Stream(_)) => {}
                Err(FedError::Resolution(e)) if e.is_recoverable() => {
                    debug!(%target, operation = %operation.qualified_name(), error = %e, "candidate failed");
                }
                Err(e) => return Err(e),
            }
        }

        if schema
            .type_def(target)
            .is_some_and(|def| def.parameter_type && def.is_object())
        {
            match self.build_parameter_object(target, ctx, &state) {
                Ok(built) => return Ok(Some(built)),
                Err(FedError::Resolution(e)) if e.is_recoverable() => {
                    debug!(%target, error = %e, "parameter type could not be built");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Resolves each target in turn, sharing facts discovered along the way.
    ///
    /// # Errors
    ///
    /// Propagates the unrecoverable errors of [`Self::find`].
    pub fn find_all(
        &self,
        targets: &[QualifiedName],
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<SearchOutcome> {
        let mut outcome = SearchOutcome::default();
        for target in targets {
            if outcome.get(target).is_some() || outcome.unmet.contains(target) {
                continue;
            }
            match self.find(target, ctx, state)? {
                Some(found) => outcome.resolved.push((target.clone(), found)),
                None => outcome.unmet.push(target.clone()),
            }
        }
        Ok(outcome)
    }

    /// Qualified names of the operations a search for `target` would try.
    pub fn candidate_operations(&self, target: &QualifiedName, schema: &dyn SchemaProvider) -> Vec<String> {
        candidates(target, schema)
            .into_iter()
            .map(|(_, op)| op.qualified_name())
            .collect()
    }
}

/// Operations returning `target`, followed by operations whose result contains it.
fn candidates<'s>(target: &QualifiedName, schema: &'s dyn SchemaProvider) -> Vec<(&'s Service, &'s Operation)> {
    let mut direct = Vec::new();
    let mut containing = Vec::new();
    for (service, operation) in schema.operations() {
        if operation.returns_stream {
            continue;
        }
        if schema.is_assignable(&operation.return_type, target) {
            direct.push((service, operation));
        } else if contains_type(schema, &operation.return_type, target) {
            containing.push((service, operation));
        }
    }
    direct.extend(containing);
    direct
}

fn contains_type(schema: &dyn SchemaProvider, container: &QualifiedName, target: &QualifiedName) -> bool {
    let mut seen: HashSet<&QualifiedName> = HashSet::new();
    let mut pending: Vec<(&QualifiedName, usize)> = vec![(container.nominal(), 0)];
    while let Some((current, depth)) = pending.pop() {
        if depth >= MAX_CONTAINMENT_DEPTH || !seen.insert(current) {
            continue;
        }
        let Some(def) = schema.type_def(current) else {
            continue;
        };
        for field in def.fields() {
            if schema.is_assignable(&field.type_name, target) {
                return true;
            }
            pending.push((field.type_name.nominal(), depth + 1));
        }
    }
    false
}

fn extract(result: &TypedInstance, target: &QualifiedName, schema: &dyn SchemaProvider) -> Option<TypedInstance> {
    if result.is_null() {
        return None;
    }
    if schema.is_assignable(&result.type_name, target) {
        return Some(result.clone());
    }
    result.deepest_unique(target, schema).cloned()
}
