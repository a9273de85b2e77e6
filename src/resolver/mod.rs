//! Operation invocation resolver.
//!
//! The resolver answers "how do I get a value of type T?" by reading known
//! facts, or by invoking operations whose parameters it resolves the same
//! way. The work is split across:
//!
//! - `search`: the graph search driver (`find`, `find_all`)
//! - `invocation`: parameter gathering, invocation and result handling
//! - `constraints`: constraint checks and repair through conversion operations
//! - `builder`: field-by-field construction of object types

mod builder;
mod constraints;
#[cfg(test)]
mod fixtures;
mod invocation;
mod search;
mod stream;

pub use search::{PathStep, SearchOutcome, SearchState};
pub use stream::ResultStream;

use std::fmt;

use crate::config::EngineConfig;
use crate::instance::TypedInstance;
use crate::invoker::InvokerPool;
use crate::policy::PolicyEvaluator;

/// Result of invoking one operation.
pub enum Invocation {
    /// A complete, policy-gated result.
    Single(TypedInstance),
    /// Results of a streaming operation, gated as they arrive.
    Stream(ResultStream),
}

impl Invocation {
    /// Views the invocation as a stream.
    #[must_use]
    pub fn into_stream(self) -> ResultStream {
        match self {
            Self::Single(instance) => ResultStream::single(instance),
            Self::Stream(stream) => stream,
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(instance) => f.debug_tuple("Single").field(instance).finish(),
            Self::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

/// Resolves target types from facts and operations.
///
/// # Thread safety
/// A resolver holds no per-query state and is shared by every projection
/// worker behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Resolver {
    invokers: InvokerPool,
    policy: PolicyEvaluator,
    config: EngineConfig,
}

impl Resolver {
    #[must_use]
    pub fn new(invokers: InvokerPool, config: EngineConfig) -> Self {
        Self {
            invokers,
            policy: PolicyEvaluator::new(config.default_instruction.clone()),
            config,
        }
    }

    pub const fn invokers(&self) -> &InvokerPool {
        &self.invokers
    }

    pub const fn policy(&self) -> &PolicyEvaluator {
        &self.policy
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}
