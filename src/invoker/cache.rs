//! Per-query cache of operation results.
//!
//! Identical calls (same operation, same argument values) made while
//! answering one query are served from the cache instead of the network.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{FedError, FedResult};
use crate::instance::TypedInstance;
use crate::schema::{Argument, Operation};

fn lock_err() -> FedError {
    FedError::internal("poisoned lock: operation cache")
}

/// Stable digest of an operation call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Digests the operation name and the canonical JSON of each argument.
    ///
    /// Provenance is excluded, so equal values from different sources share a key.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the arguments cannot be serialized.
    pub fn for_call(operation: &Operation, arguments: &[Argument]) -> FedResult<Self> {
        let canonical = serde_json::json!({
            "operation": operation.qualified_name(),
            "arguments": arguments
                .iter()
                .map(|a| serde_json::json!({
                    "type": a.parameter.type_name.to_string(),
                    "value": a.value.to_json(),
                }))
                .collect::<Vec<_>>(),
        });
        let bytes = serde_json::to_vec(&canonical)
            .map_err(|e| FedError::internal(format!("cache key serialization failed: {e}")))?;
        Ok(Self(*blake3::hash(&bytes).as_bytes()))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0[..6].iter().map(|b| format!("{b:02x}")).collect();
        write!(f, "CacheKey({short})")
    }
}

/// Shared result cache. Clones share entries.
#[derive(Debug, Clone)]
pub struct OperationCache {
    enabled: bool,
    entries: Arc<RwLock<HashMap<CacheKey, TypedInstance>>>,
}

impl OperationCache {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// # Errors
    ///
    /// Only fails if the cache lock is poisoned.
    pub fn get(&self, key: &CacheKey) -> FedResult<Option<TypedInstance>> {
        if !self.enabled {
            return Ok(None);
        }
        Ok(self.entries.read().map_err(|_| lock_err())?.get(key).cloned())
    }

    /// # Errors
    ///
    /// Only fails if the cache lock is poisoned.
    pub fn insert(&self, key: CacheKey, result: TypedInstance) -> FedResult<()> {
        if self.enabled {
            self.entries.write().map_err(|_| lock_err())?.insert(key, result);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OperationCache {
    fn default() -> Self {
        Self::new(true)
    }
}
