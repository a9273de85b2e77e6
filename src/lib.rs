//! # fedql - Federated data resolution
//!
//! fedql answers "give me a value of type T" across a set of remote
//! services. Given a target type and the facts a caller already has, it
//! reads the facts directly or discovers a chain of operation calls whose
//! inputs can themselves be resolved, gates every value through per-type
//! access policies, and projects results concurrently into the shape the
//! caller asked for.
//!
//! ## Core Concepts
//!
//! - **Schema**: types, services and policies, read through [`SchemaProvider`]
//! - **TypedInstance**: a value tagged with its semantic type and its [`DataSource`]
//! - **Resolver**: graph search over facts and operations, with constraint repair
//! - **Policy**: per-type rule sets yielding permit, filter or mutate
//! - **Projection**: worker threads that build each result into a target type
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fedql::{Engine, QualifiedName, StubInvoker, TypedInstance};
//!
//! let engine = Engine::builder(schema)
//!     .invoker(Arc::new(StubInvoker::new()))
//!     .build()?;
//! let ctx = engine.query_context(vec![invoice])?;
//! let cost: QualifiedName = "vyne.creditInc.CreditRiskCost".parse()?;
//! for result in engine.find(&ctx, &cost) {
//!     println!("{}", result?);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod constraint;
pub mod error;
pub mod facts;
pub mod instance;
mod pattern;
pub mod schema;
pub mod value;

// Query runtime
pub mod config;
pub mod context;
pub mod engine;
pub mod events;
pub mod invoker;
pub mod policy;
pub mod projection;
pub mod resolver;

// Re-export primary types at crate root for convenience
pub use config::EngineConfig;
pub use constraint::{Constraint, ConstraintEvaluation, ConstraintViolation};
pub use context::{CancellationToken, QueryContext, QueryId, StatisticsSnapshot};
pub use engine::{Engine, EngineBuilder};
pub use error::{FedError, FedResult, ResolutionError, TransportError, ValidationError};
pub use events::{CallId, ChannelDispatcher, EventDispatcher, QueryEvent, RemoteCall};
pub use facts::{Discovery, FactBag, ScopedFact};
pub use instance::{DataSource, InstanceValue, TypedInstance};
pub use invoker::{InvokerOutput, OperationInvoker, Payload, StubInvoker};
pub use policy::{ExecutionScope, Instruction, Policy, PolicyEvaluator};
pub use projection::{ProjectedItem, ProjectionSpec, ProjectionStream};
pub use resolver::{Resolver, ResultStream};
pub use schema::{InMemorySchema, QualifiedName, SchemaBuilder, SchemaProvider};
pub use value::Value;
