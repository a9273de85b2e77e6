//! Projection of result streams onto a target type.
//!
//! Every upstream item is projected in its own child context by a bounded
//! pool of worker threads. Results are emitted in completion order, not
//! input order; each carries its input index and its own statistics.
//!
//! ```text
//! results ──► feeder ──(read-ahead)──► workers ──(in-flight)──► ProjectionStream
//! ```

mod pool;
mod stream;

pub use stream::ProjectionStream;

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::{QueryContext, StatisticsSnapshot};
use crate::error::{FedError, FedResult};
use crate::facts::ScopedFact;
use crate::instance::{DataSource, TypedInstance};
use crate::resolver::{Resolver, SearchState};
use crate::schema::QualifiedName;

use pool::WorkerPool;

/// A name under which each projected item is visible to scope accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionScope {
    pub name: String,
    pub type_name: QualifiedName,
}

/// What to project results onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    /// Target type. A collection target projects each item onto its member type.
    pub target: QualifiedName,
    #[serde(default)]
    pub scope: Option<ProjectionScope>,
    /// Project the whole input into a single collection instead of item by item.
    #[serde(default)]
    pub collection_projection: bool,
}

impl ProjectionSpec {
    #[must_use]
    pub const fn new(target: QualifiedName) -> Self {
        Self {
            target,
            scope: None,
            collection_projection: false,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, name: impl Into<String>, type_name: QualifiedName) -> Self {
        self.scope = Some(ProjectionScope {
            name: name.into(),
            type_name,
        });
        self
    }

    #[must_use]
    pub const fn as_collection(mut self) -> Self {
        self.collection_projection = true;
        self
    }

    /// The type each source item is built into.
    #[must_use]
    pub fn member_target(&self) -> &QualifiedName {
        self.target.member_type().unwrap_or(&self.target)
    }
}

/// One projected result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedItem {
    /// Position of the source item in the (deduplicated) input.
    pub index: usize,
    pub instance: TypedInstance,
    /// Work done to build this item alone.
    pub statistics: StatisticsSnapshot,
}

struct Work {
    index: usize,
    item: TypedInstance,
}

/// Drives projection workers for one resolver.
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    resolver: Arc<Resolver>,
}

impl ProjectionEngine {
    #[must_use]
    pub const fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    /// Projects `results` onto `spec.target`.
    ///
    /// Each item is built in a child context seeded with `global_facts`,
    /// so items never see each other's facts. Items that fail to build are
    /// emitted as typed nulls; an upstream error ends the stream with that
    /// error. Cancelling `ctx` stops reading, stops workers at their next
    /// check and ends the returned stream.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the feeder or worker threads cannot be started.
    pub fn project<I>(
        &self,
        results: I,
        spec: ProjectionSpec,
        ctx: &QueryContext,
        global_facts: Vec<TypedInstance>,
    ) -> FedResult<ProjectionStream>
    where
        I: IntoIterator<Item = FedResult<TypedInstance>>,
        I::IntoIter: Send + 'static,
    {
        let config = self.resolver.config();
        let (out_tx, out_rx) = bounded(config.projection_in_flight.max(1));
        let stream = ProjectionStream::new(out_rx, ctx.cancellation().clone());
        let global_facts = Arc::new(global_facts);
        let spec = Arc::new(spec);

        if spec.collection_projection {
            self.spawn_collection(results.into_iter(), spec, ctx.clone(), global_facts, out_tx)?;
            return Ok(stream);
        }

        let (work_tx, work_rx) = bounded::<Work>(config.projection_read_ahead.max(1));
        let job = {
            let resolver = Arc::clone(&self.resolver);
            let ctx = ctx.clone();
            let out_tx = out_tx.clone();
            let spec = Arc::clone(&spec);
            let global_facts = Arc::clone(&global_facts);
            move |work: Work| {
                match project_item(&resolver, &spec, &ctx, &global_facts, work.index, work.item) {
                    Ok(item) => send_output(&out_tx, &ctx, Ok(item)),
                    // Cancelled items are dropped.
                    Err(e) if e.is_cancelled() => false,
                    Err(e) => send_output(&out_tx, &ctx, Err(e)),
                }
            }
        };
        let pool = WorkerPool::start("projection", config.projection_workers, &work_rx, ctx.cancellation(), job)?;
        drop(work_rx);
        debug!(
            workers = pool.len(),
            type_name = %spec.target,
            query_id = %ctx.query_id(),
            "projection started"
        );

        let feeder_ctx = ctx.clone();
        let results = results.into_iter();
        thread::Builder::new()
            .name("fedql-projection-feeder".to_string())
            .spawn(move || feed(results, &feeder_ctx, &work_tx, &out_tx))
            .map_err(|e| FedError::internal(format!("failed to spawn projection feeder: {e}")))?;
        Ok(stream)
    }

    fn spawn_collection<R>(
        &self,
        results: R,
        spec: Arc<ProjectionSpec>,
        ctx: QueryContext,
        global_facts: Arc<Vec<TypedInstance>>,
        out_tx: Sender<FedResult<ProjectedItem>>,
    ) -> FedResult<()>
    where
        R: Iterator<Item = FedResult<TypedInstance>> + Send + 'static,
    {
        let resolver = Arc::clone(&self.resolver);
        thread::Builder::new()
            .name("fedql-projection-collection".to_string())
            .spawn(move || {
                match project_collection(&resolver, &spec, &ctx, &global_facts, results) {
                    Err(e) if e.is_cancelled() => {}
                    outcome => {
                        send_output(&out_tx, &ctx, outcome);
                    }
                }
            })
            .map_err(|e| FedError::internal(format!("failed to spawn collection projection: {e}")))?;
        Ok(())
    }
}

/// Reads upstream results into the work queue, dropping adjacent duplicates.
fn feed<R>(results: R, ctx: &QueryContext, work_tx: &Sender<Work>, out_tx: &Sender<FedResult<ProjectedItem>>)
where
    R: Iterator<Item = FedResult<TypedInstance>>,
{
    let mut previous: Option<TypedInstance> = None;
    let mut index = 0;
    for result in results {
        if ctx.is_cancelled() {
            break;
        }
        let item = match result {
            Ok(item) => item,
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(error = %e, "upstream results failed, ending projection");
                    send_output(out_tx, ctx, Err(e));
                }
                break;
            }
        };
        if previous.as_ref().is_some_and(|p| p.same_value(&item)) {
            debug!(index, "skipping duplicate upstream item");
            continue;
        }
        previous = Some(item.clone());
        let work = Work { index, item };
        index += 1;
        select! {
            send(work_tx, work) -> sent => if sent.is_err() { break },
            recv(ctx.cancellation().signal()) -> _ => break,
        }
    }
    debug!(items = index, "projection input exhausted");
}

fn send_output(out_tx: &Sender<FedResult<ProjectedItem>>, ctx: &QueryContext, msg: FedResult<ProjectedItem>) -> bool {
    select! {
        send(out_tx, msg) -> sent => sent.is_ok(),
        recv(ctx.cancellation().signal()) -> _ => false,
    }
}

/// Builds one item. Only cancellation and lock failures are returned as errors.
fn project_item(
    resolver: &Resolver,
    spec: &ProjectionSpec,
    ctx: &QueryContext,
    global_facts: &[TypedInstance],
    index: usize,
    item: TypedInstance,
) -> FedResult<ProjectedItem> {
    ctx.ensure_active()?;
    let mut child = ctx.projection_child(global_facts)?;
    bind_item(&mut child, spec, item)?;

    let target = spec.member_target();
    let built = resolver
        .build(target, &child, &SearchState::new())
        .and_then(|instance| resolver.policy().apply(instance, &child));
    let instance = match built {
        Ok(instance) => instance,
        Err(e) if e.is_cancelled() || matches!(e, FedError::Internal { .. }) => return Err(e),
        Err(e) => {
            warn!(index, type_name = %target, error = %e, "projection of item failed");
            let message = e.to_string();
            TypedInstance::null_with_source(target.clone(), message.clone(), DataSource::failed(message))
        }
    };
    Ok(ProjectedItem {
        index,
        instance,
        statistics: child.statistics().snapshot(),
    })
}

/// Makes the source item visible to the child context.
fn bind_item(child: &mut QueryContext, spec: &ProjectionSpec, item: TypedInstance) -> FedResult<()> {
    let Some(scope) = &spec.scope else {
        return child.add_fact(item);
    };
    if child.schema().is_assignable(&item.type_name, &scope.type_name) {
        child.add_fact(item)?;
        child.alias_scope(scope.name.clone(), scope.type_name.clone());
        return Ok(());
    }
    let scoped = item
        .deepest_unique(&scope.type_name, child.schema())
        .cloned()
        .unwrap_or_else(|| {
            let reason = format!("no unique {} in {}", scope.type_name, item.type_name);
            TypedInstance::null_with_source(scope.type_name.clone(), reason.clone(), DataSource::failed(reason))
        });
    child.bind_scope(ScopedFact::new(scope.name.clone(), scoped));
    child.add_fact(item)
}

/// Projects the whole input into one collection, in input order.
fn project_collection<R>(
    resolver: &Resolver,
    spec: &ProjectionSpec,
    ctx: &QueryContext,
    global_facts: &[TypedInstance],
    results: R,
) -> FedResult<ProjectedItem>
where
    R: Iterator<Item = FedResult<TypedInstance>>,
{
    let mut members = Vec::new();
    let mut statistics = StatisticsSnapshot::default();
    for (index, result) in results.enumerate() {
        ctx.ensure_active()?;
        let projected = project_item(resolver, spec, ctx, global_facts, index, result?)?;
        statistics.merge(&projected.statistics);
        members.push(projected.instance);
    }
    ctx.ensure_active()?;
    let instance = TypedInstance::collection(
        spec.member_target().clone(),
        members,
        DataSource::derived(format!("projection to {}", spec.target)),
    );
    Ok(ProjectedItem {
        index: 0,
        instance,
        statistics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::EngineConfig;
    use crate::invoker::{InvokerPool, OperationInvoker, StubInvoker};
    use crate::schema::{Field, PrimitiveKind, SchemaBuilder, Type};
    use crate::value::Value;

    fn name(raw: &str) -> QualifiedName {
        QualifiedName::parse(raw).unwrap()
    }

    fn setup(config: EngineConfig) -> (ProjectionEngine, QueryContext, Arc<StubInvoker>) {
        let schema = SchemaBuilder::new()
            .add_type(Type::scalar(name("demo.OrderId"), PrimitiveKind::String))
            .add_type(Type::scalar(name("demo.Trader"), PrimitiveKind::String))
            .add_type(Type::object(
                name("demo.Order"),
                vec![
                    Field::new("id", name("demo.OrderId")),
                    Field::new("trader", name("demo.Trader")),
                ],
            ))
            .add_type(Type::object(
                name("demo.Report"),
                vec![
                    Field::new("orderId", name("demo.OrderId")),
                    Field::new("trader", name("demo.Trader")),
                ],
            ))
            .build()
            .unwrap();
        let stub = Arc::new(StubInvoker::new());
        let invoker: Arc<dyn OperationInvoker> = stub.clone();
        let resolver = Arc::new(Resolver::new(InvokerPool::new(vec![invoker]), config));
        (ProjectionEngine::new(resolver), QueryContext::new(Arc::new(schema)), stub)
    }

    fn order(id: &str, trader: &str) -> TypedInstance {
        TypedInstance::object(
            name("demo.Order"),
            [
                (
                    "id".to_string(),
                    TypedInstance::scalar(name("demo.OrderId"), id, DataSource::Provided),
                ),
                (
                    "trader".to_string(),
                    TypedInstance::scalar(name("demo.Trader"), trader, DataSource::Provided),
                ),
            ],
            DataSource::Provided,
        )
    }

    fn ok_all(items: Vec<TypedInstance>) -> Vec<FedResult<TypedInstance>> {
        items.into_iter().map(Ok).collect()
    }

    fn order_id(item: &ProjectedItem) -> String {
        item.instance
            .path("orderId")
            .and_then(TypedInstance::scalar_value)
            .and_then(Value::as_string)
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn every_item_is_projected_once() {
        let (engine, ctx, _) = setup(EngineConfig::default());
        let input = (0..20).map(|i| order(&format!("o{i}"), "t")).collect();
        let mut items = engine
            .project(ok_all(input), ProjectionSpec::new(name("demo.Report")), &ctx, Vec::new())
            .unwrap()
            .collect_items()
            .unwrap();
        assert_eq!(items.len(), 20);
        items.sort_by_key(|i| i.index);
        for (idx, item) in items.iter().enumerate() {
            assert_eq!(item.index, idx);
            assert_eq!(order_id(item), format!("o{idx}"));
            assert_eq!(item.statistics.facts_added, 1);
        }
    }

    #[test]
    fn adjacent_duplicates_are_dropped() {
        let (engine, ctx, _) = setup(EngineConfig::default());
        let input = vec![order("a", "t"), order("a", "t"), order("b", "t"), order("a", "t")];
        let items = engine
            .project(ok_all(input), ProjectionSpec::new(name("demo.Report")), &ctx, Vec::new())
            .unwrap()
            .collect_items()
            .unwrap();
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn upstream_error_ends_stream() {
        let (engine, ctx, _) = setup(EngineConfig {
            projection_workers: 1,
            ..EngineConfig::default()
        });
        let input = vec![Ok(order("a", "t")), Err(FedError::internal("upstream broke"))];
        let results: Vec<_> = engine
            .project(input, ProjectionSpec::new(name("demo.Report")), &ctx, Vec::new())
            .unwrap()
            .collect();
        assert!(results.last().unwrap().is_err());
        assert!(results.len() <= 2);
    }

    #[test]
    fn unbuildable_field_is_typed_null() {
        let (engine, ctx, _) = setup(EngineConfig::default());
        let ids = vec![TypedInstance::scalar(name("demo.OrderId"), "o1", DataSource::Provided)];
        let items = engine
            .project(ok_all(ids), ProjectionSpec::new(name("demo.Report")), &ctx, Vec::new())
            .unwrap()
            .collect_items()
            .unwrap();
        let report = &items[0].instance;
        assert_eq!(order_id(&items[0]), "o1");
        assert!(report.field("trader").unwrap().is_null());
    }

    #[test]
    fn unknown_target_gives_failed_null() {
        let (engine, ctx, _) = setup(EngineConfig::default());
        let items = engine
            .project(
                ok_all(vec![order("a", "t")]),
                ProjectionSpec::new(name("demo.Missing")),
                &ctx,
                Vec::new(),
            )
            .unwrap()
            .collect_items()
            .unwrap();
        assert!(items[0].instance.is_null());
        assert!(items[0].instance.source.is_failure());
    }

    #[test]
    fn scope_extracted_from_wrapper() {
        let (_, ctx, _) = setup(EngineConfig::default());
        let mut child = ctx.projection_child(&[]).unwrap();
        let spec = ProjectionSpec::new(name("demo.Report")).with_scope("trader", name("demo.Trader"));
        bind_item(&mut child, &spec, order("o1", "alice")).unwrap();
        let bound = child.resolve_scope("trader").unwrap().unwrap();
        assert_eq!(bound.scalar_value(), Some(&Value::from("alice")));
    }

    #[test]
    fn scope_without_match_is_failed_null() {
        let (_, ctx, _) = setup(EngineConfig::default());
        let mut child = ctx.projection_child(&[]).unwrap();
        let spec = ProjectionSpec::new(name("demo.Report")).with_scope("order", name("demo.Order"));
        let id = TypedInstance::scalar(name("demo.OrderId"), "o1", DataSource::Provided);
        bind_item(&mut child, &spec, id).unwrap();
        let bound = child.resolve_scope("order").unwrap().unwrap();
        assert!(bound.is_null());
        assert!(bound.source.is_failure());
    }

    #[test]
    fn collection_projection_keeps_input_order() {
        let (engine, ctx, _) = setup(EngineConfig::default());
        let input = vec![order("a", "t"), order("b", "t"), order("c", "t")];
        let items = engine
            .project(
                ok_all(input),
                ProjectionSpec::new(name("demo.Report[]")).as_collection(),
                &ctx,
                Vec::new(),
            )
            .unwrap()
            .collect_items()
            .unwrap();
        assert_eq!(items.len(), 1);
        let members = items[0].instance.members().unwrap();
        let ids: Vec<_> = members
            .iter()
            .map(|m| m.path("orderId").unwrap().scalar_value().unwrap().clone())
            .collect();
        assert_eq!(ids, vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(items[0].statistics.facts_added, 3);
    }

    #[test]
    fn cancelled_before_start_yields_nothing() {
        let (engine, ctx, _) = setup(EngineConfig::default());
        ctx.cancel();
        let items = engine
            .project(
                ok_all(vec![order("a", "t")]),
                ProjectionSpec::new(name("demo.Report")),
                &ctx,
                Vec::new(),
            )
            .unwrap()
            .collect_items()
            .unwrap();
        assert!(items.is_empty());
    }
}
