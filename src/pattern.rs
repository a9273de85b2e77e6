//! Shared compiled-regex cache.
//!
//! Used for qualified-name validation and the policy `matches` operator.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::error::{FedError, FedResult, ValidationError};

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// Returns a compiled regex for `pattern`, compiling it at most once.
pub(crate) fn cached_regex(pattern: &str) -> FedResult<Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache
            .read()
            .map_err(|_| FedError::internal("regex cache lock poisoned"))?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(pattern).map_err(|e| {
        FedError::Validation(ValidationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    })?;

    let mut guard = cache
        .write()
        .map_err(|_| FedError::internal("regex cache lock poisoned"))?;

    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }

    // Another thread may have inserted it while we compiled.
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}
