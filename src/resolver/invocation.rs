//! Invoking a single operation: arguments, the call itself, and results.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::constraint::{Constraint, ConstraintEvaluation};
use crate::context::QueryContext;
use crate::error::{FedError, FedResult, ResolutionError, TransportError};
use crate::events::{CallId, ExchangeMetadata, QueryEvent, RemoteCall};
use crate::facts::{Discovery, FactMatch};
use crate::instance::{DataSource, TypedInstance};
use crate::invoker::{CacheKey, OperationInvoker, Payload};
use crate::resolver::{Invocation, Resolver, ResultStream, SearchState};
use crate::schema::{Argument, Operation, QualifiedName, Service};

/// The preferred fact of exactly `type_name`; equal values count once.
fn preferred_fact(preferred: &[TypedInstance], type_name: &QualifiedName) -> FactMatch {
    let mut distinct: Vec<&TypedInstance> = Vec::new();
    for fact in preferred.iter().filter(|f| &f.type_name == type_name && !f.is_null()) {
        if !distinct.iter().any(|seen| seen.same_value(fact)) {
            distinct.push(fact);
        }
    }
    match distinct.as_slice() {
        [] => FactMatch::Missing,
        [only] => FactMatch::Found((*only).clone()),
        many => FactMatch::Ambiguous(many.len()),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl Resolver {
    /// Invokes `operation`, resolving its parameters first.
    ///
    /// Each parameter is taken from `preferred` (exact type), then from the
    /// context's facts, then from a nested search. Results are gated by
    /// policy and added to the context's facts.
    ///
    /// # Errors
    ///
    /// - `NoInvokerFound` if no invoker supports the operation
    /// - `UnresolvedParameters` if a required parameter cannot be found or
    ///   repaired to satisfy its constraints
    /// - `InvocationFailed` if the transport call fails
    /// - `ConstraintViolation` if the result breaks a return constraint
    pub fn invoke(
        &self,
        service: &Service,
        operation: &Operation,
        preferred: &[TypedInstance],
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<Invocation> {
        ctx.ensure_active()?;
        let invoker = self.invokers.select(service, operation)?;
        let arguments = self.gather_arguments(operation, preferred, ctx, state)?;
        let arguments = self.enforce_parameter_constraints(operation, arguments, ctx, state)?;

        if operation.returns_stream {
            return self.invoke_stream(invoker, service, operation, &arguments, ctx);
        }

        let key = CacheKey::for_call(operation, &arguments)?;
        if let Some(cached) = ctx.operation_cache().get(&key)? {
            ctx.statistics().record_cache_hit();
            debug!(operation = %operation.qualified_name(), ?key, "operation result served from cache");
            ctx.add_fact(cached.clone())?;
            return Ok(Invocation::Single(cached));
        }

        let call_id = CallId::new();
        let started_at = Utc::now();
        let timer = Instant::now();
        let output = invoker
            .invoke(service, operation, &arguments, ctx.query_id())
            .and_then(|output| {
                let exchange = output.exchange;
                let values = match output.payload {
                    Payload::Values(values) => values,
                    Payload::Stream(items) => items.collect::<Result<Vec<_>, TransportError>>()?,
                };
                Ok((values, exchange))
            });
        let (values, exchange) = match output {
            Ok(output) => output,
            Err(source) => return Err(failed_call(operation, timer, source, ctx)),
        };
        let duration_ms = elapsed_ms(timer);
        ctx.statistics().record_remote_call();
        report_call(
            service,
            operation,
            call_id,
            started_at,
            duration_ms,
            Some(values.len()),
            exchange,
            ctx,
        );
        info!(
            operation = %operation.qualified_name(),
            query_id = %ctx.query_id(),
            results = values.len(),
            duration_ms,
            "operation invoked"
        );

        let result = shape_result(operation, values, result_source(operation, call_id));
        verify_return_constraints(operation, &result, &arguments)?;
        let result = self.policy.apply(result, ctx)?;
        ctx.add_fact(result.clone())?;
        ctx.operation_cache().insert(key, result.clone())?;
        Ok(Invocation::Single(result))
    }

    /// Invokes the operation named `Service@@operation` with `preferred` facts.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOperation` for names the schema does not declare, and
    /// otherwise the errors of [`Self::invoke`].
    pub fn invoke_named(
        &self,
        qualified_name: &str,
        preferred: &[TypedInstance],
        ctx: &QueryContext,
    ) -> FedResult<Invocation> {
        let (service, operation) =
            ctx.schema()
                .operation(qualified_name)
                .ok_or_else(|| ResolutionError::UnknownOperation {
                    name: qualified_name.to_string(),
                })?;
        self.invoke(service, operation, preferred, ctx, &SearchState::new())
    }

    fn gather_arguments(
        &self,
        operation: &Operation,
        preferred: &[TypedInstance],
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<Vec<Argument>> {
        let mut values: Vec<Option<TypedInstance>> = Vec::with_capacity(operation.parameters.len());
        for parameter in &operation.parameters {
            let value = match preferred_fact(preferred, &parameter.type_name) {
                FactMatch::Missing => ctx.find_fact(&parameter.type_name, Discovery::DistinctAtAnyDepth)?.found(),
                FactMatch::Ambiguous(count) => {
                    debug!(
                        operation = %operation.qualified_name(),
                        parameter = %parameter.label(),
                        count,
                        "preferred facts are ambiguous"
                    );
                    None
                }
                matched => matched.found(),
            };
            values.push(value);
        }

        let missing: Vec<_> = operation
            .parameters
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(p, _)| p.type_name.clone())
            .collect();
        if !missing.is_empty() {
            debug!(operation = %operation.qualified_name(), ?missing, "resolving parameters by search");
            let outcome = self.find_all(&missing, &ctx.subquery_child(), state)?;
            let mut unmet = Vec::new();
            for (parameter, value) in operation.parameters.iter().zip(values.iter_mut()) {
                if value.is_some() {
                    continue;
                }
                if let Some(found) = outcome.get(&parameter.type_name) {
                    *value = Some(found.clone());
                } else if parameter.nullable {
                    *value = Some(TypedInstance::null(
                        parameter.type_name.clone(),
                        format!("no value found for nullable parameter {}", parameter.label()),
                    ));
                } else {
                    unmet.push(parameter.type_name.clone());
                }
            }
            if !unmet.is_empty() {
                return Err(ResolutionError::UnresolvedParameters {
                    operation: operation.qualified_name(),
                    unmet,
                    path: state.describe(),
                }
                .into());
            }
        }

        Ok(operation
            .parameters
            .iter()
            .zip(values)
            .filter_map(|(parameter, value)| value.map(|v| Argument::new(parameter.clone(), v)))
            .collect())
    }

    fn enforce_parameter_constraints(
        &self,
        operation: &Operation,
        mut arguments: Vec<Argument>,
        ctx: &QueryContext,
        state: &SearchState,
    ) -> FedResult<Vec<Argument>> {
        for index in 0..arguments.len() {
            let argument = &arguments[index];
            if argument.value.is_null() {
                continue;
            }
            let subject = format!("{} parameter {}", operation.qualified_name(), argument.parameter.label());
            let repaired = self
                .satisfy(
                    argument.value.clone(),
                    &argument.parameter.constraints,
                    &arguments,
                    &subject,
                    ctx,
                    state,
                )
                .and_then(|value| self.satisfy_fields(value, ctx, state));
            match repaired {
                Ok(value) => arguments[index].value = value,
                Err(FedError::Resolution(ResolutionError::ConstraintViolation { subject, reason })) => {
                    let mut path = state.describe();
                    path.push(format!("{subject}: {reason}"));
                    return Err(ResolutionError::UnresolvedParameters {
                        operation: operation.qualified_name(),
                        unmet: vec![arguments[index].parameter.type_name.clone()],
                        path,
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(arguments)
    }

    fn invoke_stream(
        &self,
        invoker: &Arc<dyn OperationInvoker>,
        service: &Service,
        operation: &Operation,
        arguments: &[Argument],
        ctx: &QueryContext,
    ) -> FedResult<Invocation> {
        let call_id = CallId::new();
        let started_at = Utc::now();
        let timer = Instant::now();
        let output = match invoker.invoke(service, operation, arguments, ctx.query_id()) {
            Ok(output) => output,
            Err(source) => return Err(failed_call(operation, timer, source, ctx)),
        };
        ctx.statistics().record_remote_call();
        let items: Box<dyn Iterator<Item = Result<TypedInstance, TransportError>> + Send> = match output.payload {
            Payload::Values(values) => {
                ctx.dispatch(QueryEvent::EstimatedRecordCount {
                    query_id: ctx.query_id(),
                    count: values.len(),
                });
                Box::new(values.into_iter().map(Ok))
            }
            Payload::Stream(items) => items,
        };
        report_call(
            service,
            operation,
            call_id,
            started_at,
            elapsed_ms(timer),
            None,
            output.exchange,
            ctx,
        );
        debug!(operation = %operation.qualified_name(), "streaming operation opened");

        let ctx = ctx.clone();
        let policy = self.policy.clone();
        let qualified = operation.qualified_name();
        let provenance = result_source(operation, call_id);
        let stream = items.map(move |item| {
            ctx.ensure_active()?;
            let item = item.map_err(|source| ResolutionError::InvocationFailed {
                operation: qualified.clone(),
                elapsed_ms: elapsed_ms(timer),
                source,
            })?;
            let item = policy.apply(item.with_source(provenance.clone()), &ctx)?;
            ctx.add_fact(item.clone())?;
            Ok(item)
        });
        Ok(Invocation::Stream(ResultStream::from_results(stream)))
    }
}

fn failed_call(operation: &Operation, timer: Instant, source: TransportError, ctx: &QueryContext) -> FedError {
    ctx.statistics().record_failed_remote_call();
    let elapsed_ms = elapsed_ms(timer);
    warn!(
        operation = %operation.qualified_name(),
        query_id = %ctx.query_id(),
        elapsed_ms,
        retryable = source.is_retryable(),
        error = %source,
        "operation invocation failed"
    );
    ResolutionError::InvocationFailed {
        operation: operation.qualified_name(),
        elapsed_ms,
        source,
    }
    .into()
}

#[allow(clippy::too_many_arguments)]
fn report_call(
    service: &Service,
    operation: &Operation,
    call_id: CallId,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    result_count: Option<usize>,
    exchange: ExchangeMetadata,
    ctx: &QueryContext,
) {
    ctx.dispatch(QueryEvent::OperationInvoked(RemoteCall {
        call_id,
        query_id: ctx.query_id(),
        service: service.name.clone(),
        operation: operation.name.clone(),
        started_at,
        duration_ms,
        result_count,
        exchange,
    }));
}

fn result_source(operation: &Operation, call_id: CallId) -> DataSource {
    let derived_from = operation.return_constraints.iter().find_map(|c| match c {
        Constraint::ReturnDerivedFromParameter { parameter } => Some(parameter.clone()),
        _ => None,
    });
    DataSource::OperationResult {
        operation: operation.qualified_name(),
        call_id,
        derived_from,
    }
}

/// Fits raw invoker output to the operation's declared return type.
fn shape_result(operation: &Operation, mut values: Vec<TypedInstance>, source: DataSource) -> TypedInstance {
    if let Some(member) = operation.return_type.member_type() {
        if values.len() == 1 && values[0].is_collection() {
            return values.remove(0).with_source(source);
        }
        let members = values.into_iter().map(|v| v.with_source(source.clone())).collect();
        return TypedInstance::collection(member.clone(), members, source);
    }

    match values.len() {
        0 => TypedInstance::null_with_source(
            operation.return_type.clone(),
            format!("{} returned no value", operation.qualified_name()),
            DataSource::failed(format!("{} returned no value", operation.qualified_name())),
        ),
        1 => values.remove(0).with_source(source),
        count => {
            error!(
                operation = %operation.qualified_name(),
                count,
                "single-valued operation returned several values, keeping the first"
            );
            values.remove(0).with_source(source)
        }
    }
}

fn verify_return_constraints(operation: &Operation, result: &TypedInstance, arguments: &[Argument]) -> FedResult<()> {
    if result.is_null() || result.is_collection() {
        return Ok(());
    }
    for constraint in &operation.return_constraints {
        if let ConstraintEvaluation::Violated(violation) = constraint.evaluate(result, arguments) {
            return Err(ResolutionError::ConstraintViolation {
                subject: format!("result of {}", operation.qualified_name()),
                reason: violation.to_string(),
            }
            .into());
        }
    }
    Ok(())
}
