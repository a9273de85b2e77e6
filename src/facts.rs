//! The fact bag: typed instances known to a query.
//!
//! A bag is shared by reference (cloning it shares the same facts) and
//! is safe to read and extend from several worker threads.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{FedError, FedResult};
use crate::instance::TypedInstance;
use crate::schema::{QualifiedName, SchemaProvider};

fn lock_err(context: &'static str) -> FedError {
    FedError::internal(format!("poisoned lock: {context}"))
}

/// How deep a lookup searches and how it treats multiple matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discovery {
    /// Only top-level facts; several matches are ambiguous.
    TopLevel,
    /// Any depth; more than one match is ambiguous.
    UniqueAtAnyDepth,
    /// Any depth; matches with equal values count once.
    DistinctAtAnyDepth,
    /// Any depth; every match is returned.
    AllAtAnyDepth,
}

/// Outcome of a fact lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum FactMatch {
    Found(TypedInstance),
    /// Every match, for [`Discovery::AllAtAnyDepth`].
    All(Vec<TypedInstance>),
    /// Several candidates and no way to pick one.
    Ambiguous(usize),
    Missing,
}

impl FactMatch {
    /// The single matched value, if exactly one was found.
    pub fn found(self) -> Option<TypedInstance> {
        match self {
            Self::Found(v) => Some(v),
            Self::All(mut all) if all.len() == 1 => all.pop(),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct FactState {
    facts: Vec<TypedInstance>,
    by_type: HashMap<QualifiedName, Vec<usize>>,
}

/// Thread-safe collection of top-level facts.
#[derive(Debug, Clone, Default)]
pub struct FactBag {
    state: Arc<RwLock<FactState>>,
}

impl FactBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag holding `facts`.
    ///
    /// # Errors
    ///
    /// Only fails if the bag's lock is poisoned.
    pub fn from_facts(facts: impl IntoIterator<Item = TypedInstance>) -> FedResult<Self> {
        let bag = Self::new();
        bag.extend(facts)?;
        Ok(bag)
    }

    /// Adds a top-level fact. Typed nulls are ignored.
    ///
    /// # Errors
    ///
    /// Only fails if the bag's lock is poisoned.
    pub fn add(&self, fact: TypedInstance) -> FedResult<bool> {
        if fact.is_null() {
            return Ok(false);
        }
        let mut state = self.state.write().map_err(|_| lock_err("facts"))?;
        let index = state.facts.len();
        state.by_type.entry(fact.type_name.clone()).or_default().push(index);
        state.facts.push(fact);
        Ok(true)
    }

    /// Adds several facts.
    ///
    /// # Errors
    ///
    /// Only fails if the bag's lock is poisoned.
    pub fn extend(&self, facts: impl IntoIterator<Item = TypedInstance>) -> FedResult<()> {
        for fact in facts {
            self.add(fact)?;
        }
        Ok(())
    }

    /// Copies the current top-level facts in insertion order.
    ///
    /// # Errors
    ///
    /// Only fails if the bag's lock is poisoned.
    pub fn snapshot(&self) -> FedResult<Vec<TypedInstance>> {
        let state = self.state.read().map_err(|_| lock_err("facts"))?;
        Ok(state.facts.clone())
    }

    /// Top-level facts whose type is exactly `type_name`.
    ///
    /// # Errors
    ///
    /// Only fails if the bag's lock is poisoned.
    pub fn of_exact_type(&self, type_name: &QualifiedName) -> FedResult<Vec<TypedInstance>> {
        let state = self.state.read().map_err(|_| lock_err("facts"))?;
        Ok(state
            .by_type
            .get(type_name)
            .map(|indexes| indexes.iter().map(|&i| state.facts[i].clone()).collect())
            .unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.facts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up facts assignable to `target` using `strategy`.
    ///
    /// # Errors
    ///
    /// Only fails if the bag's lock is poisoned.
    pub fn find(
        &self,
        target: &QualifiedName,
        strategy: Discovery,
        schema: &dyn SchemaProvider,
    ) -> FedResult<FactMatch> {
        let state = self.state.read().map_err(|_| lock_err("facts"))?;
        Ok(match_facts(&state.facts, target, strategy, schema))
    }
}

/// Applies a discovery strategy to an arbitrary list of facts.
pub(crate) fn match_facts(
    facts: &[TypedInstance],
    target: &QualifiedName,
    strategy: Discovery,
    schema: &dyn SchemaProvider,
) -> FactMatch {
    let candidates: Vec<&TypedInstance> = match strategy {
        Discovery::TopLevel => facts
            .iter()
            .filter(|f| !f.is_null() && schema.is_assignable(&f.type_name, target))
            .collect(),
        Discovery::UniqueAtAnyDepth | Discovery::DistinctAtAnyDepth | Discovery::AllAtAnyDepth => facts
            .iter()
            .flat_map(|f| f.matching(target, schema).into_iter().map(|(_, m)| m))
            .collect(),
    };

    if strategy == Discovery::AllAtAnyDepth {
        return if candidates.is_empty() {
            FactMatch::Missing
        } else {
            FactMatch::All(candidates.into_iter().cloned().collect())
        };
    }

    let candidates = if strategy == Discovery::DistinctAtAnyDepth {
        let mut distinct: Vec<&TypedInstance> = Vec::with_capacity(candidates.len());
        for c in candidates {
            if !distinct.iter().any(|d| d.same_value(c)) {
                distinct.push(c);
            }
        }
        distinct
    } else {
        candidates
    };

    match candidates.as_slice() {
        [] => FactMatch::Missing,
        [only] => FactMatch::Found((*only).clone()),
        many => FactMatch::Ambiguous(many.len()),
    }
}

/// A fact bound to a named projection scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedFact {
    pub scope: String,
    pub fact: TypedInstance,
}

impl ScopedFact {
    #[must_use]
    pub fn new(scope: impl Into<String>, fact: TypedInstance) -> Self {
        Self {
            scope: scope.into(),
            fact,
        }
    }
}
