//! Type definitions: scalars, objects and their fields.

use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::schema::QualifiedName;

/// Primitive representation of a scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Boolean,
    Int,
    Decimal,
    String,
    Date,
    /// Accepts whatever shape the payload carries.
    Any,
}

/// How a field value is located when building an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldAccessor {
    /// Read `path` from the fact bound to the named projection scope.
    ScopePath { scope: String, path: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub type_name: QualifiedName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessor: Option<FieldAccessor>,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: QualifiedName) -> Self {
        Self {
            name: name.into(),
            type_name,
            constraints: Vec::new(),
            accessor: None,
        }
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Reads the field from `path` within the fact bound to `scope`.
    #[must_use]
    pub fn from_scope(mut self, scope: impl Into<String>, path: &[&str]) -> Self {
        self.accessor = Some(FieldAccessor::ScopePath {
            scope: scope.into(),
            path: path.iter().map(|p| (*p).to_string()).collect(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Scalar { primitive: PrimitiveKind },
    Object { fields: Vec<Field> },
}

/// A named type in the schema.
///
/// Collection types are never declared; they are implied by
/// [`QualifiedName::collection_of`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Type {
    pub name: QualifiedName,
    pub kind: TypeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherits: Vec<QualifiedName>,
    /// Parameter types may be constructed field by field to satisfy an operation.
    #[serde(default)]
    pub parameter_type: bool,
}

impl Type {
    #[must_use]
    pub fn scalar(name: QualifiedName, primitive: PrimitiveKind) -> Self {
        Self {
            name,
            kind: TypeKind::Scalar { primitive },
            inherits: Vec::new(),
            parameter_type: false,
        }
    }

    #[must_use]
    pub fn object(name: QualifiedName, fields: Vec<Field>) -> Self {
        Self {
            name,
            kind: TypeKind::Object { fields },
            inherits: Vec::new(),
            parameter_type: false,
        }
    }

    #[must_use]
    pub fn inheriting(mut self, parent: QualifiedName) -> Self {
        self.inherits.push(parent);
        self
    }

    #[must_use]
    pub fn as_parameter_type(mut self) -> Self {
        self.parameter_type = true;
        self
    }

    pub const fn is_scalar(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar { .. })
    }

    pub const fn is_object(&self) -> bool {
        matches!(self.kind, TypeKind::Object { .. })
    }

    pub const fn primitive(&self) -> Option<PrimitiveKind> {
        match self.kind {
            TypeKind::Scalar { primitive } => Some(primitive),
            TypeKind::Object { .. } => None,
        }
    }

    /// Declared fields; empty for scalars.
    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            TypeKind::Object { fields } => fields,
            TypeKind::Scalar { .. } => &[],
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().iter().find(|f| f.name == name)
    }
}
