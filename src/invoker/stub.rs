//! Stub invoker for tests and demos.
//!
//! Responses are registered per operation name. Every call is recorded so
//! tests can assert which operations ran and with which arguments.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::context::QueryId;
use crate::error::TransportError;
use crate::events::ExchangeMetadata;
use crate::instance::TypedInstance;
use crate::invoker::{InvokerOutput, OperationInvoker, Payload};
use crate::schema::{Argument, Operation, Service};

/// Computes a stub response from the call arguments.
pub type StubHandler =
    Arc<dyn Fn(&Operation, &[Argument]) -> Result<Vec<TypedInstance>, TransportError> + Send + Sync>;

#[derive(Clone)]
enum StubResponse {
    Values(Vec<TypedInstance>),
    Handler(StubHandler),
    Stream(Vec<TypedInstance>),
}

/// An in-process [`OperationInvoker`] returning canned responses.
#[derive(Default)]
pub struct StubInvoker {
    responses: RwLock<HashMap<String, StubResponse>>,
    invocations: Mutex<Vec<(String, Vec<Argument>)>>,
    latency: Option<Duration>,
}

impl StubInvoker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call (and every streamed item) by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn register(&self, operation: &str, response: StubResponse) {
        if let Ok(mut guard) = self.responses.write() {
            guard.insert(operation.to_string(), response);
        }
    }

    /// Returns `values` whenever `operation` is called.
    pub fn add_response(&self, operation: &str, values: Vec<TypedInstance>) {
        self.register(operation, StubResponse::Values(values));
    }

    /// Computes the response for `operation` from its arguments.
    pub fn add_handler<F>(&self, operation: &str, handler: F)
    where
        F: Fn(&Operation, &[Argument]) -> Result<Vec<TypedInstance>, TransportError> + Send + Sync + 'static,
    {
        self.register(operation, StubResponse::Handler(Arc::new(handler)));
    }

    /// Streams `values` one at a time when `operation` is called.
    pub fn add_stream_response(&self, operation: &str, values: Vec<TypedInstance>) {
        self.register(operation, StubResponse::Stream(values));
    }

    /// Arguments of every recorded call to `operation`, oldest first.
    pub fn invocations(&self, operation: &str) -> Vec<Vec<Argument>> {
        self.invocations
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(name, _)| name == operation)
                    .map(|(_, args)| args.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn invocation_count(&self, operation: &str) -> usize {
        self.invocations(operation).len()
    }

    /// Names of every operation called, in call order.
    pub fn call_log(&self) -> Vec<String> {
        self.invocations
            .lock()
            .map(|calls| calls.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }
}

impl OperationInvoker for StubInvoker {
    fn can_support(&self, _service: &Service, operation: &Operation) -> bool {
        self.responses
            .read()
            .is_ok_and(|r| r.contains_key(&operation.name))
    }

    fn invoke(
        &self,
        _service: &Service,
        operation: &Operation,
        arguments: &[Argument],
        query_id: QueryId,
    ) -> Result<InvokerOutput, TransportError> {
        debug!(operation = %operation.name, %query_id, args = arguments.len(), "stub invocation");
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push((operation.name.clone(), arguments.to_vec()));
        }

        let response = self
            .responses
            .read()
            .map_err(|_| TransportError::ConnectionFailed {
                message: "stub response table poisoned".to_string(),
            })?
            .get(&operation.name)
            .cloned()
            .ok_or_else(|| TransportError::ServerError {
                code: 404,
                message: format!("no stub response for {}", operation.name),
            })?;

        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }

        let payload = match response {
            StubResponse::Values(values) => Payload::Values(values),
            StubResponse::Handler(handler) => Payload::Values(handler(operation, arguments)?),
            StubResponse::Stream(values) => {
                let latency = self.latency;
                Payload::Stream(Box::new(values.into_iter().map(move |v| {
                    if let Some(latency) = latency {
                        thread::sleep(latency);
                    }
                    Ok(v)
                })))
            }
        };

        Ok(InvokerOutput {
            payload,
            exchange: ExchangeMetadata::Message {
                topic: format!("stub/{}", operation.name),
            },
        })
    }
}

impl fmt::Debug for StubInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self.responses.read().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("StubInvoker")
            .field("registered", &registered)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}
