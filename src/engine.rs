//! The query facade.
//!
//! An [`Engine`] owns the schema, the invokers, the event dispatcher and the
//! configuration, and hands out per-query [`QueryContext`]s. Queries are
//! synchronous up to the point where results stream out; projection runs on
//! worker threads.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::context::QueryContext;
use crate::error::{FedResult, ResolutionError};
use crate::events::{ChannelDispatcher, EventDispatcher, QueryEventStream};
use crate::facts::FactBag;
use crate::instance::{DataSource, TypedInstance};
use crate::invoker::{InvokerPool, OperationCache, OperationInvoker};
use crate::projection::{ProjectionEngine, ProjectionSpec, ProjectionStream};
use crate::resolver::{Invocation, Resolver, ResultStream, SearchState};
use crate::schema::{QualifiedName, SchemaProvider};

/// Builder for [`Engine`].
pub struct EngineBuilder {
    schema: Arc<dyn SchemaProvider>,
    invokers: Vec<Arc<dyn OperationInvoker>>,
    dispatcher: Option<Arc<dyn EventDispatcher>>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Registers an invoker. Invokers are consulted in registration order.
    #[must_use]
    pub fn invoker(mut self, invoker: Arc<dyn OperationInvoker>) -> Self {
        self.invokers.push(invoker);
        self
    }

    /// Sends query events to `dispatcher` instead of the engine's own buffer.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration fails validation.
    pub fn build(self) -> FedResult<Engine> {
        self.config.validate()?;
        let (dispatcher, events) = match self.dispatcher {
            Some(dispatcher) => (dispatcher, None),
            None => {
                let owned = Arc::new(ChannelDispatcher::new(self.config.event_queue_capacity));
                let dispatcher: Arc<dyn EventDispatcher> = owned.clone();
                (dispatcher, Some(owned))
            }
        };
        let resolver = Arc::new(Resolver::new(InvokerPool::new(self.invokers), self.config.clone()));
        debug!(invokers = resolver.invokers().len(), "engine built");
        Ok(Engine {
            schema: self.schema,
            projection: ProjectionEngine::new(Arc::clone(&resolver)),
            resolver,
            dispatcher,
            events,
            config: self.config,
        })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("invokers", &self.invokers.len())
            .field("custom_dispatcher", &self.dispatcher.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Federated query engine.
///
/// # Thread safety
/// The engine is `Send + Sync`; contexts it creates may be used from any thread.
pub struct Engine {
    schema: Arc<dyn SchemaProvider>,
    resolver: Arc<Resolver>,
    projection: ProjectionEngine,
    dispatcher: Arc<dyn EventDispatcher>,
    events: Option<Arc<ChannelDispatcher>>,
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn builder(schema: Arc<dyn SchemaProvider>) -> EngineBuilder {
        EngineBuilder {
            schema,
            invokers: Vec::new(),
            dispatcher: None,
            config: EngineConfig::default(),
        }
    }

    /// Creates the root context of a query seeded with `facts`.
    ///
    /// # Errors
    ///
    /// Only fails if a fact bag lock is poisoned.
    pub fn query_context(&self, facts: Vec<TypedInstance>) -> FedResult<QueryContext> {
        let ctx = QueryContext::new(Arc::clone(&self.schema))
            .with_dispatcher(Arc::clone(&self.dispatcher))
            .with_operation_cache(OperationCache::new(self.config.cache_operation_results))
            .with_facts(FactBag::from_facts(facts)?);
        debug!(query_id = %ctx.query_id(), facts = ctx.facts().len(), "query context created");
        Ok(ctx)
    }

    /// Finds instances of `target`.
    ///
    /// Facts already known are used first. For collection targets every
    /// known member is emitted, and streaming operations returning the
    /// target are read lazily. Otherwise the resolver searches for a path
    /// of operation calls. Values that did not come straight from an
    /// operation are gated by policy before they are emitted.
    ///
    /// The stream yields `TargetNotFound` when nothing produces the target.
    #[must_use]
    pub fn find(&self, ctx: &QueryContext, target: &QualifiedName) -> ResultStream {
        match self.find_inner(ctx, target) {
            Ok(stream) => stream,
            Err(e) => ResultStream::failed(e),
        }
    }

    fn find_inner(&self, ctx: &QueryContext, target: &QualifiedName) -> FedResult<ResultStream> {
        ctx.ensure_active()?;
        info!(query_id = %ctx.query_id(), %target, "find started");
        let schema = ctx.schema();

        if let Some(member) = target.member_type() {
            let known: Vec<TypedInstance> = ctx
                .facts()
                .snapshot()?
                .into_iter()
                .filter(|fact| schema.is_assignable(&fact.type_name, member))
                .collect();
            if !known.is_empty() {
                debug!(%target, count = known.len(), "collection members found in facts");
                return Ok(self.gated(known, true, ctx));
            }
        }

        for (service, operation) in schema.operations() {
            let streams_target = operation.returns_stream
                && (schema.is_assignable(&operation.return_type, target)
                    || target
                        .member_type()
                        .is_some_and(|member| schema.is_assignable(&operation.return_type, member)));
            if !streams_target {
                continue;
            }
            debug!(%target, operation = %operation.qualified_name(), "reading streaming operation");
            return Ok(self
                .resolver
                .invoke(service, operation, &[], ctx, &SearchState::new())?
                .into_stream());
        }

        match self.resolver.find(target, ctx, &SearchState::new())? {
            Some(found) => {
                match found.members() {
                    Some(members) if target.is_collection() => Ok(self.gated(members.to_vec(), true, ctx)),
                    _ => Ok(self.gated(vec![found], false, ctx)),
                }
            }
            None => Err(ResolutionError::TargetNotFound {
                target: target.clone(),
                attempts: self.resolver.candidate_operations(target, schema),
            }
            .into()),
        }
    }

    /// Applies policy to values that have not been gated yet.
    ///
    /// Members of a collection target that a policy filters are dropped
    /// rather than emitted as typed nulls.
    fn gated(&self, instances: Vec<TypedInstance>, members: bool, ctx: &QueryContext) -> ResultStream {
        let policy = self.resolver.policy();
        let gated = instances
            .into_iter()
            .map(|instance| {
                if instance.source.is_operation_result() || instance.source.is_policy_outcome() {
                    Ok(instance)
                } else {
                    policy.apply(instance, ctx)
                }
            })
            .filter(|result| !(members && matches!(result, Ok(i) if matches!(i.source, DataSource::PolicyFiltered { .. }))))
            .collect::<Vec<_>>();
        ResultStream::from_results(gated)
    }

    /// Finds `target` and projects every result onto `spec.target`.
    ///
    /// Each projected item sees the facts the query started with.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if projection threads cannot be started. Resolution
    /// errors arrive through the returned stream.
    pub fn find_as(&self, ctx: &QueryContext, target: &QualifiedName, spec: ProjectionSpec) -> FedResult<ProjectionStream> {
        let global_facts = ctx.facts().snapshot()?;
        let results = self.find(ctx, target);
        self.projection.project(results, spec, ctx, global_facts)
    }

    /// Invokes an operation by its `Service@@operation` name.
    ///
    /// `preferred` facts are used for parameters before anything else.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOperation`, `NoInvokerFound`, `UnresolvedParameters`
    /// or `InvocationFailed` as the call fails.
    pub fn invoke(&self, ctx: &QueryContext, operation: &str, preferred: &[TypedInstance]) -> FedResult<ResultStream> {
        self.resolver
            .invoke_named(operation, preferred, ctx)
            .map(Invocation::into_stream)
    }

    pub fn schema(&self) -> &dyn SchemaProvider {
        self.schema.as_ref()
    }

    pub const fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Events of every query, when the engine created its own dispatcher.
    #[must_use]
    pub fn event_stream(&self) -> Option<QueryEventStream> {
        self.events.as_ref().map(|events| events.stream())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
