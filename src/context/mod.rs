//! Query context: everything a single query's resolution can see.
//!
//! A context is cheap to clone; clones share facts, cancellation,
//! statistics and the operation cache. Projection children get their
//! own facts and statistics but keep the parent's cancellation. The facts
//! a projection child inherits from the query sit in a second layer that is
//! only searched when the child's own facts hold no match.

mod cancel;
mod stats;

pub use cancel::CancellationToken;
pub use stats::{QueryStatistics, StatisticsSnapshot};

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FedError, FedResult, ResolutionError};
use crate::events::{EventDispatcher, NoopDispatcher, QueryEvent};
use crate::facts::{Discovery, FactBag, FactMatch, ScopedFact};
use crate::instance::TypedInstance;
use crate::invoker::OperationCache;
use crate::policy::{ExecutionScope, PolicyEvaluationRecord};
use crate::schema::{QualifiedName, SchemaProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(uuid::Uuid);

impl QueryId {
    /// Creates a new random query ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
pub struct QueryContext {
    query_id: QueryId,
    schema: Arc<dyn SchemaProvider>,
    facts: FactBag,
    inherited_facts: FactBag,
    caller_facts: FactBag,
    scoped_facts: Vec<ScopedFact>,
    scope_aliases: Vec<(String, QualifiedName)>,
    execution_scope: ExecutionScope,
    cancellation: CancellationToken,
    statistics: Arc<QueryStatistics>,
    dispatcher: Arc<dyn EventDispatcher>,
    operation_cache: OperationCache,
    policy_audit: Arc<Mutex<Vec<PolicyEvaluationRecord>>>,
}

impl QueryContext {
    /// Creates an empty context over `schema`.
    #[must_use]
    pub fn new(schema: Arc<dyn SchemaProvider>) -> Self {
        Self {
            query_id: QueryId::new(),
            schema,
            facts: FactBag::new(),
            inherited_facts: FactBag::new(),
            caller_facts: FactBag::new(),
            scoped_facts: Vec::new(),
            scope_aliases: Vec::new(),
            execution_scope: ExecutionScope::default(),
            cancellation: CancellationToken::new(),
            statistics: Arc::new(QueryStatistics::default()),
            dispatcher: Arc::new(NoopDispatcher),
            operation_cache: OperationCache::new(true),
            policy_audit: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_facts(mut self, facts: FactBag) -> Self {
        self.facts = facts;
        self
    }

    /// Facts describing the caller, visible only to policy conditions.
    #[must_use]
    pub fn with_caller_facts(mut self, caller_facts: FactBag) -> Self {
        self.caller_facts = caller_facts;
        self
    }

    #[must_use]
    pub fn with_execution_scope(mut self, scope: ExecutionScope) -> Self {
        self.execution_scope = scope;
        self
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    #[must_use]
    pub fn with_operation_cache(mut self, cache: OperationCache) -> Self {
        self.operation_cache = cache;
        self
    }

    pub const fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn schema(&self) -> &dyn SchemaProvider {
        self.schema.as_ref()
    }

    pub const fn facts(&self) -> &FactBag {
        &self.facts
    }

    /// Looks up `target` in this context's own facts, falling back to the
    /// inherited facts when the own facts hold no match at all.
    ///
    /// An ambiguous match among the own facts stays ambiguous.
    ///
    /// # Errors
    ///
    /// Only fails if a fact bag lock is poisoned.
    pub fn find_fact(&self, target: &QualifiedName, strategy: Discovery) -> FedResult<FactMatch> {
        let own = self.facts.find(target, strategy, self.schema())?;
        if own != FactMatch::Missing {
            return Ok(own);
        }
        self.inherited_facts.find(target, strategy, self.schema())
    }

    pub const fn caller_facts(&self) -> &FactBag {
        &self.caller_facts
    }

    pub fn scoped_facts(&self) -> &[ScopedFact] {
        &self.scoped_facts
    }

    pub const fn execution_scope(&self) -> ExecutionScope {
        self.execution_scope
    }

    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn statistics(&self) -> &QueryStatistics {
        &self.statistics
    }

    pub const fn operation_cache(&self) -> &OperationCache {
        &self.operation_cache
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns `Cancelled` once the query has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::Cancelled` if the token has fired.
    pub fn ensure_active(&self) -> FedResult<()> {
        if self.is_cancelled() {
            return Err(ResolutionError::Cancelled {
                query_id: self.query_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Cancels the query and every context sharing its token.
    pub fn cancel(&self) {
        if self.cancellation.cancel() {
            debug!(query_id = %self.query_id, "query cancelled");
            self.dispatch(QueryEvent::QueryCancelled {
                query_id: self.query_id,
            });
        }
    }

    pub fn dispatch(&self, event: QueryEvent) {
        self.dispatcher.dispatch(event);
    }

    /// Adds a fact to this context's bag.
    ///
    /// # Errors
    ///
    /// Only fails if the fact bag's lock is poisoned.
    pub fn add_fact(&self, fact: TypedInstance) -> FedResult<()> {
        if self.facts.add(fact)? {
            self.statistics.record_fact_added();
        }
        Ok(())
    }

    /// A context for a nested search. Shares everything with its parent.
    #[must_use]
    pub fn subquery_child(&self) -> Self {
        self.clone()
    }

    /// A context for projecting one item.
    ///
    /// Its own bag starts empty; `global_facts` are inherited and consulted
    /// only after the item and whatever was derived from it. Statistics are
    /// counted separately; cancellation and policy audit are shared.
    ///
    /// # Errors
    ///
    /// Only fails if a fact bag lock is poisoned.
    pub fn projection_child(&self, global_facts: &[TypedInstance]) -> FedResult<Self> {
        Ok(Self {
            facts: FactBag::new(),
            inherited_facts: FactBag::from_facts(global_facts.iter().cloned())?,
            scoped_facts: Vec::new(),
            scope_aliases: Vec::new(),
            statistics: Arc::new(QueryStatistics::default()),
            ..self.clone()
        })
    }

    /// Binds `fact` to a projection scope name.
    pub fn bind_scope(&mut self, scoped: ScopedFact) {
        self.scoped_facts.retain(|s| s.scope != scoped.scope);
        self.scoped_facts.push(scoped);
    }

    /// Makes `scope` refer to the root fact of `type_name`.
    pub fn alias_scope(&mut self, scope: impl Into<String>, type_name: QualifiedName) {
        let scope = scope.into();
        self.scope_aliases.retain(|(s, _)| *s != scope);
        self.scope_aliases.push((scope, type_name));
    }

    /// The fact bound to `scope`, either directly or through an alias.
    ///
    /// # Errors
    ///
    /// Only fails if the fact bag's lock is poisoned.
    pub fn resolve_scope(&self, scope: &str) -> FedResult<Option<TypedInstance>> {
        if let Some(scoped) = self.scoped_facts.iter().find(|s| s.scope == scope) {
            return Ok(Some(scoped.fact.clone()));
        }
        let Some((_, type_name)) = self.scope_aliases.iter().find(|(s, _)| s == scope) else {
            return Ok(None);
        };
        // Own facts before inherited ones, most recent first.
        let schema = self.schema();
        for bag in [&self.facts, &self.inherited_facts] {
            if let Some(fact) = bag
                .snapshot()?
                .into_iter()
                .rev()
                .find(|fact| schema.is_assignable(&fact.type_name, type_name))
            {
                return Ok(Some(fact));
            }
        }
        Ok(None)
    }

    pub(crate) fn record_policy_evaluation(&self, record: PolicyEvaluationRecord) -> FedResult<()> {
        self.statistics.record_policy_evaluation();
        self.policy_audit
            .lock()
            .map_err(|_| FedError::internal("poisoned lock: policy audit"))?
            .push(record);
        Ok(())
    }

    /// Every policy evaluation recorded so far, across all child contexts.
    ///
    /// # Errors
    ///
    /// Only fails if the audit lock is poisoned.
    pub fn policy_evaluations(&self) -> FedResult<Vec<PolicyEvaluationRecord>> {
        Ok(self
            .policy_audit
            .lock()
            .map_err(|_| FedError::internal("poisoned lock: policy audit"))?
            .clone())
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("query_id", &self.query_id)
            .field("facts", &self.facts.len())
            .field("inherited_facts", &self.inherited_facts.len())
            .field("caller_facts", &self.caller_facts.len())
            .field("scoped_facts", &self.scoped_facts.len())
            .field("execution_scope", &self.execution_scope)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
