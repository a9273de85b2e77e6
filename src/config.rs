//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::policy::Instruction;

/// Tunables for resolution, projection and policy defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of projection worker threads.
    pub projection_workers: usize,
    /// Maximum projected items buffered before workers block.
    pub projection_in_flight: usize,
    /// Maximum upstream items read ahead of the workers.
    pub projection_read_ahead: usize,
    /// Maximum nesting of graph searches before a branch is abandoned.
    pub max_search_depth: usize,
    /// Reuse results of identical operation calls within a query.
    pub cache_operation_results: bool,
    /// Instruction applied when no policy produces one.
    pub default_instruction: Instruction,
    /// Capacity of the event buffer created by [`crate::Engine`] when none is supplied.
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            projection_workers: 16,
            projection_in_flight: 16,
            projection_read_ahead: 4,
            max_search_depth: 12,
            cache_operation_results: true,
            default_instruction: Instruction::Permit,
            event_queue_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the document is malformed or fails validation.
    pub fn from_json_str(raw: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    ///
    /// This must be called before constructing an `Engine`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.projection_workers == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "projection_workers must be > 0".to_string(),
            });
        }
        if self.projection_in_flight == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "projection_in_flight must be > 0".to_string(),
            });
        }
        if self.projection_read_ahead == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "projection_read_ahead must be > 0".to_string(),
            });
        }
        if self.max_search_depth == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_search_depth must be > 0".to_string(),
            });
        }
        if self.event_queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "event_queue_capacity must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_limits() {
        let mut c = EngineConfig::default();
        c.projection_workers = 0;
        assert!(c.validate().is_err());

        let mut c = EngineConfig::default();
        c.projection_read_ahead = 0;
        assert!(c.validate().is_err());

        let mut c = EngineConfig::default();
        c.max_search_depth = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn json_overrides_merge_with_defaults() {
        let c = EngineConfig::from_json_str(r#"{"projection_workers": 4, "default_instruction": {"type": "filter"}}"#)
            .unwrap();
        assert_eq!(c.projection_workers, 4);
        assert_eq!(c.projection_in_flight, 16);
        assert_eq!(c.default_instruction, Instruction::Filter);
    }

    #[test]
    fn json_rejects_invalid_values() {
        assert!(EngineConfig::from_json_str(r#"{"max_search_depth": 0}"#).is_err());
        assert!(EngineConfig::from_json_str("not json").is_err());
    }
}
