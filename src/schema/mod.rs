//! Schema model and the provider trait the resolver reads it through.
//!
//! The engine never owns a schema format. It sees types, services and
//! policies only through [`SchemaProvider`], so any backend (compiled
//! schema files, a registry client, a test fixture) can drive resolution.

mod memory;
mod name;
mod service;
mod types;

pub use memory::{InMemorySchema, SchemaBuilder};
pub use name::QualifiedName;
pub use service::{Argument, Operation, Parameter, Service};
pub use types::{Field, FieldAccessor, PrimitiveKind, Type, TypeKind};

use std::collections::HashSet;

use crate::policy::Policy;

const MAX_INHERITANCE_HOPS: usize = 64;

/// Read-only view of a schema.
///
/// # Thread safety
/// Providers are shared by every worker of a query and must be `Send + Sync`.
pub trait SchemaProvider: Send + Sync {
    /// Returns the declared type, or `None` for unknown and collection names.
    fn type_def(&self, name: &QualifiedName) -> Option<&Type>;

    /// All services, in declaration order.
    fn services(&self) -> Vec<&Service>;

    /// Finds an operation by its `Service@@operation` name.
    fn operation(&self, qualified_name: &str) -> Option<(&Service, &Operation)> {
        let (service, operation) = qualified_name.split_once("@@")?;
        self.services()
            .into_iter()
            .filter(|s| s.name.to_string() == service)
            .find_map(|s| s.operation(operation).map(|op| (s, op)))
    }

    /// Every operation paired with its service, in declaration order.
    fn operations(&self) -> Vec<(&Service, &Operation)> {
        self.services()
            .into_iter()
            .flat_map(|s| s.operations.iter().map(move |op| (s, op)))
            .collect()
    }

    /// Policies declared against exactly `type_name`, in declaration order.
    fn policies_for(&self, type_name: &QualifiedName) -> Vec<&Policy>;

    /// True if a value of type `from` can be used where `to` is expected.
    ///
    /// A type is assignable to itself and to every type it inherits from.
    /// Collections are assignable when their members are.
    fn is_assignable(&self, from: &QualifiedName, to: &QualifiedName) -> bool {
        if from == to {
            return true;
        }
        match (from.member_type(), to.member_type()) {
            (Some(a), Some(b)) => return self.is_assignable(a, b),
            (None, None) => {}
            _ => return false,
        }

        let mut seen: HashSet<&QualifiedName> = HashSet::new();
        let mut pending: Vec<&QualifiedName> = vec![from];
        while let Some(current) = pending.pop() {
            if seen.len() >= MAX_INHERITANCE_HOPS || !seen.insert(current) {
                continue;
            }
            let Some(def) = self.type_def(current) else {
                continue;
            };
            for parent in &def.inherits {
                if parent == to {
                    return true;
                }
                pending.push(parent);
            }
        }
        false
    }
}
