//! Query lifecycle events.
//!
//! The resolver reports remote calls, record-count estimates and
//! cancellation through an [`EventDispatcher`]. Dispatch never blocks
//! query execution.

mod dispatcher;
mod remote_call;

pub use dispatcher::{ChannelDispatcher, QueryEventStream};
pub use remote_call::{CallId, ExchangeMetadata, RemoteCall};

use serde::{Deserialize, Serialize};

use crate::context::QueryId;

/// An observable event raised while a query runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueryEvent {
    OperationInvoked(RemoteCall),
    EstimatedRecordCount { query_id: QueryId, count: usize },
    QueryCancelled { query_id: QueryId },
}

impl QueryEvent {
    pub fn query_id(&self) -> QueryId {
        match self {
            Self::OperationInvoked(call) => call.query_id,
            Self::EstimatedRecordCount { query_id, .. } | Self::QueryCancelled { query_id } => *query_id,
        }
    }
}

/// Receives query events.
///
/// Implementations must return quickly; the resolver calls `dispatch`
/// inline on its worker threads.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: QueryEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

impl EventDispatcher for NoopDispatcher {
    fn dispatch(&self, _event: QueryEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_dispatcher_object_safe(_: &dyn EventDispatcher) {}

    #[test]
    fn event_query_id() {
        let id = QueryId::new();
        assert_eq!(QueryEvent::QueryCancelled { query_id: id }.query_id(), id);
        assert_eq!(
            QueryEvent::EstimatedRecordCount { query_id: id, count: 3 }.query_id(),
            id
        );
    }

    #[test]
    fn noop_accepts_events() {
        NoopDispatcher.dispatch(QueryEvent::QueryCancelled {
            query_id: QueryId::new(),
        });
    }
}
