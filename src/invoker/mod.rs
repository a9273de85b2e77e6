//! Operation invokers: the transport seam.
//!
//! The resolver decides *what* to call and with which arguments; an
//! [`OperationInvoker`] performs the call over whatever protocol backs the
//! service and returns typed instances.

mod cache;
mod stub;

pub use cache::{CacheKey, OperationCache};
pub use stub::{StubHandler, StubInvoker};

use std::fmt;
use std::sync::Arc;

use crate::context::QueryId;
use crate::error::{ResolutionError, TransportError};
use crate::events::ExchangeMetadata;
use crate::instance::TypedInstance;
use crate::schema::{Argument, Operation, Service};

/// Values produced by an invocation.
pub enum Payload {
    /// A complete response.
    Values(Vec<TypedInstance>),
    /// A lazily read response; pulled as the consumer iterates.
    Stream(Box<dyn Iterator<Item = Result<TypedInstance, TransportError>> + Send>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Values(values) => f.debug_tuple("Values").field(&values.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct InvokerOutput {
    pub payload: Payload,
    pub exchange: ExchangeMetadata,
}

impl InvokerOutput {
    #[must_use]
    pub fn values(values: Vec<TypedInstance>) -> Self {
        Self {
            payload: Payload::Values(values),
            exchange: ExchangeMetadata::None,
        }
    }

    #[must_use]
    pub fn with_exchange(mut self, exchange: ExchangeMetadata) -> Self {
        self.exchange = exchange;
        self
    }
}

/// Performs remote calls for the operations it supports.
///
/// # Thread safety
/// Invokers are shared by every projection worker and must be `Send + Sync`.
pub trait OperationInvoker: Send + Sync {
    /// True if this invoker can call `operation` on `service`.
    fn can_support(&self, service: &Service, operation: &Operation) -> bool;

    /// Calls `operation` with fully resolved arguments.
    fn invoke(
        &self,
        service: &Service,
        operation: &Operation,
        arguments: &[Argument],
        query_id: QueryId,
    ) -> Result<InvokerOutput, TransportError>;
}

/// Ordered set of invokers; the first that supports an operation wins.
#[derive(Clone, Default)]
pub struct InvokerPool {
    invokers: Vec<Arc<dyn OperationInvoker>>,
}

impl InvokerPool {
    #[must_use]
    pub fn new(invokers: Vec<Arc<dyn OperationInvoker>>) -> Self {
        Self { invokers }
    }

    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }

    /// Picks the invoker for `operation`.
    ///
    /// # Errors
    ///
    /// Returns `NoInvokerFound` if no registered invoker supports it.
    pub fn select(
        &self,
        service: &Service,
        operation: &Operation,
    ) -> Result<&Arc<dyn OperationInvoker>, ResolutionError> {
        self.invokers
            .iter()
            .find(|i| i.can_support(service, operation))
            .ok_or_else(|| ResolutionError::NoInvokerFound {
                service: service.name.to_string(),
                operation: operation.name.clone(),
            })
    }
}

impl fmt::Debug for InvokerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokerPool")
            .field("invokers", &self.invokers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::QualifiedName;

    fn _assert_invoker_object_safe(_: &dyn OperationInvoker) {}

    struct Refusing;

    impl OperationInvoker for Refusing {
        fn can_support(&self, _: &Service, _: &Operation) -> bool {
            false
        }

        fn invoke(&self, _: &Service, _: &Operation, _: &[Argument], _: QueryId) -> Result<InvokerOutput, TransportError> {
            Err(TransportError::ConnectionFailed {
                message: "never called".to_string(),
            })
        }
    }

    fn service() -> Service {
        let name = QualifiedName::new("demo", "Rates");
        Service::new(name.clone()).with_operation(Operation::new(
            name,
            "convert",
            QualifiedName::new("demo", "Money"),
        ))
    }

    #[test]
    fn first_supporting_invoker_wins() {
        let stub = Arc::new(StubInvoker::new());
        stub.add_response("convert", vec![]);
        let invokers: Vec<Arc<dyn OperationInvoker>> =
            vec![Arc::new(Refusing), stub.clone(), Arc::new(StubInvoker::new())];
        let pool = InvokerPool::new(invokers);

        let service = service();
        let op = service.operation("convert").unwrap();
        let selected = pool.select(&service, op).unwrap();
        let expected: Arc<dyn OperationInvoker> = stub;
        assert!(Arc::ptr_eq(selected, &expected));
    }

    #[test]
    fn no_supporting_invoker_is_routing_error() {
        let pool = InvokerPool::new(vec![Arc::new(Refusing)]);
        let service = service();
        let op = service.operation("convert").unwrap();
        match pool.select(&service, op) {
            Err(ResolutionError::NoInvokerFound { service, operation }) => {
                assert_eq!(service, "demo.Rates");
                assert_eq!(operation, "convert");
            }
            _ => panic!("expected NoInvokerFound"),
        }
    }
}
