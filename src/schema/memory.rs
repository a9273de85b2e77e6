//! In-memory schema.
//!
//! Built once through [`SchemaBuilder`], which validates every reference,
//! then shared read-only between queries.

use std::collections::{HashMap, HashSet};

use crate::constraint::Constraint;
use crate::error::ValidationError;
use crate::policy::Policy;
use crate::schema::{Operation, QualifiedName, SchemaProvider, Service, Type};

/// A validated, immutable schema held in memory.
#[derive(Debug, Default)]
pub struct InMemorySchema {
    types: HashMap<QualifiedName, Type>,
    services: Vec<Service>,
    policies: HashMap<QualifiedName, Vec<Policy>>,
}

impl InMemorySchema {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

impl SchemaProvider for InMemorySchema {
    fn type_def(&self, name: &QualifiedName) -> Option<&Type> {
        self.types.get(name)
    }

    fn services(&self) -> Vec<&Service> {
        self.services.iter().collect()
    }

    fn policies_for(&self, type_name: &QualifiedName) -> Vec<&Policy> {
        self.policies
            .get(type_name)
            .map(|p| p.iter().collect())
            .unwrap_or_default()
    }
}

/// Collects types, services and policies and validates them as a whole.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: Vec<Type>,
    services: Vec<Service>,
    policies: Vec<Policy>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_type(mut self, ty: Type) -> Self {
        self.types.push(ty);
        self
    }

    #[must_use]
    pub fn add_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    #[must_use]
    pub fn add_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Validates and freezes the schema.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for duplicate types or operations,
    /// references to undeclared types, and constraints naming parameters
    /// the operation does not declare.
    pub fn build(self) -> Result<InMemorySchema, ValidationError> {
        let mut types: HashMap<QualifiedName, Type> = HashMap::with_capacity(self.types.len());
        for ty in self.types {
            if types.contains_key(&ty.name) {
                return Err(ValidationError::DuplicateType {
                    name: ty.name.to_string(),
                });
            }
            types.insert(ty.name.clone(), ty);
        }

        for ty in types.values() {
            let owner = ty.name.to_string();
            for parent in &ty.inherits {
                require_type(&types, parent, &owner)?;
            }
            for field in ty.fields() {
                require_type(&types, &field.type_name, &format!("{owner}.{}", field.name))?;
            }
        }

        let mut seen_operations: HashSet<String> = HashSet::new();
        for service in &self.services {
            for op in &service.operations {
                let qualified = op.qualified_name();
                if !seen_operations.insert(qualified.clone()) {
                    return Err(ValidationError::DuplicateOperation { name: qualified });
                }
                validate_operation(&types, op)?;
            }
        }

        let mut policies: HashMap<QualifiedName, Vec<Policy>> = HashMap::new();
        for policy in self.policies {
            require_type(&types, &policy.target_type, &policy.name.to_string())?;
            policies
                .entry(policy.target_type.clone())
                .or_default()
                .push(policy);
        }

        Ok(InMemorySchema {
            types,
            services: self.services,
            policies,
        })
    }
}

fn require_type(
    types: &HashMap<QualifiedName, Type>,
    name: &QualifiedName,
    referenced_by: &str,
) -> Result<(), ValidationError> {
    let nominal = name.nominal();
    if types.contains_key(nominal) {
        Ok(())
    } else {
        Err(ValidationError::UndefinedType {
            name: nominal.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }
}

fn validate_operation(
    types: &HashMap<QualifiedName, Type>,
    op: &Operation,
) -> Result<(), ValidationError> {
    let qualified = op.qualified_name();
    require_type(types, &op.return_type, &qualified)?;
    for param in &op.parameters {
        require_type(types, &param.type_name, &qualified)?;
    }

    let parameter_constraints = op.parameters.iter().flat_map(|p| p.constraints.iter());
    for constraint in op.return_constraints.iter().chain(parameter_constraints) {
        let referenced = match constraint {
            Constraint::ValueFromParameter { parameter, .. }
            | Constraint::ReturnDerivedFromParameter { parameter } => parameter,
            Constraint::ConstantValue { .. } => continue,
        };
        if op.parameter(referenced).is_none() {
            return Err(ValidationError::UnknownParameter {
                operation: qualified,
                parameter: referenced.clone(),
            });
        }
    }
    Ok(())
}
