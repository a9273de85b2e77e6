//! Services, their operations and resolved call arguments.

use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::instance::TypedInstance;
use crate::schema::QualifiedName;

/// An operation parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub type_name: QualifiedName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    /// Unresolvable nullable parameters are sent as a typed null.
    #[serde(default)]
    pub nullable: bool,
}

impl Parameter {
    #[must_use]
    pub fn new(type_name: QualifiedName) -> Self {
        Self {
            name: None,
            type_name,
            constraints: Vec::new(),
            nullable: false,
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>, type_name: QualifiedName) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(type_name)
        }
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Name used in diagnostics: the declared name or the type name.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.type_name.to_string())
    }
}

/// A callable operation exposed by a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub service: QualifiedName,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub return_type: QualifiedName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub return_constraints: Vec<Constraint>,
    /// The operation yields an unbounded sequence of `return_type` values.
    #[serde(default)]
    pub returns_stream: bool,
}

impl Operation {
    #[must_use]
    pub fn new(service: QualifiedName, name: impl Into<String>, return_type: QualifiedName) -> Self {
        Self {
            service,
            name: name.into(),
            parameters: Vec::new(),
            return_type,
            return_constraints: Vec::new(),
            returns_stream: false,
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn with_return_constraint(mut self, constraint: Constraint) -> Self {
        self.return_constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.returns_stream = true;
        self
    }

    /// `Service@@operation`, unique across a schema.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}@@{}", self.service, self.name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: QualifiedName,
    pub operations: Vec<Operation>,
}

impl Service {
    #[must_use]
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            operations: Vec::new(),
        }
    }

    /// Adds an operation, binding it to this service.
    #[must_use]
    pub fn with_operation(mut self, mut operation: Operation) -> Self {
        operation.service = self.name.clone();
        self.operations.push(operation);
        self
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.name == name)
    }
}

/// A parameter paired with the value resolved for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub parameter: Parameter,
    pub value: TypedInstance,
}

impl Argument {
    #[must_use]
    pub fn new(parameter: Parameter, value: TypedInstance) -> Self {
        Self { parameter, value }
    }

    /// Looks up the argument bound to the parameter called `name`.
    pub fn find<'a>(arguments: &'a [Argument], name: &str) -> Option<&'a Argument> {
        arguments
            .iter()
            .find(|a| a.parameter.name.as_deref() == Some(name))
    }
}
