//! Per-query statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters updated while a query (or one projected item) runs.
#[derive(Debug, Default)]
pub struct QueryStatistics {
    remote_calls: AtomicU64,
    failed_remote_calls: AtomicU64,
    cache_hits: AtomicU64,
    facts_added: AtomicU64,
    search_steps: AtomicU64,
    policy_evaluations: AtomicU64,
}

impl QueryStatistics {
    pub fn record_remote_call(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_remote_call(&self) {
        self.failed_remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fact_added(&self) {
        self.facts_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search_step(&self) {
        self.search_steps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_policy_evaluation(&self) {
        self.policy_evaluations.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            failed_remote_calls: self.failed_remote_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            facts_added: self.facts_added.load(Ordering::Relaxed),
            search_steps: self.search_steps.load(Ordering::Relaxed),
            policy_evaluations: self.policy_evaluations.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`QueryStatistics`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub remote_calls: u64,
    pub failed_remote_calls: u64,
    pub cache_hits: u64,
    pub facts_added: u64,
    pub search_steps: u64,
    pub policy_evaluations: u64,
}

impl StatisticsSnapshot {
    /// Adds another snapshot's counters into this one.
    pub fn merge(&mut self, other: &Self) {
        self.remote_calls += other.remote_calls;
        self.failed_remote_calls += other.failed_remote_calls;
        self.cache_hits += other.cache_hits;
        self.facts_added += other.facts_added;
        self.search_steps += other.search_steps;
        self.policy_evaluations += other.policy_evaluations;
    }
}
