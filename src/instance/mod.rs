//! Typed instances: values tagged with their semantic type and provenance.

mod json;
mod source;

pub use source::DataSource;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{QualifiedName, SchemaProvider};
use crate::value::Value;

/// The shape of a typed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum InstanceValue {
    Scalar(Value),
    Object(BTreeMap<String, TypedInstance>),
    Collection(Vec<TypedInstance>),
    /// A typed null records why no value is present.
    Null { reason: String },
}

/// A value tagged with its semantic type and its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedInstance {
    pub type_name: QualifiedName,
    pub value: InstanceValue,
    pub source: DataSource,
}

impl TypedInstance {
    #[must_use]
    pub fn scalar(type_name: QualifiedName, value: impl Into<Value>, source: DataSource) -> Self {
        let value = value.into();
        if value.is_null() {
            return Self::null_with_source(type_name, "null value", source);
        }
        Self {
            type_name,
            value: InstanceValue::Scalar(value),
            source,
        }
    }

    #[must_use]
    pub fn object(
        type_name: QualifiedName,
        fields: impl IntoIterator<Item = (String, TypedInstance)>,
        source: DataSource,
    ) -> Self {
        Self {
            type_name,
            value: InstanceValue::Object(fields.into_iter().collect()),
            source,
        }
    }

    /// Creates a collection of `member_type` values.
    #[must_use]
    pub fn collection(member_type: QualifiedName, members: Vec<TypedInstance>, source: DataSource) -> Self {
        Self {
            type_name: QualifiedName::collection_of(member_type),
            value: InstanceValue::Collection(members),
            source,
        }
    }

    #[must_use]
    pub fn null(type_name: QualifiedName, reason: impl Into<String>) -> Self {
        Self::null_with_source(type_name, reason, DataSource::Undefined)
    }

    #[must_use]
    pub fn null_with_source(type_name: QualifiedName, reason: impl Into<String>, source: DataSource) -> Self {
        Self {
            type_name,
            value: InstanceValue::Null {
                reason: reason.into(),
            },
            source,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    pub const fn is_null(&self) -> bool {
        matches!(self.value, InstanceValue::Null { .. })
    }

    pub const fn is_collection(&self) -> bool {
        matches!(self.value, InstanceValue::Collection(_))
    }

    pub fn null_reason(&self) -> Option<&str> {
        match &self.value {
            InstanceValue::Null { reason } => Some(reason),
            _ => None,
        }
    }

    pub const fn scalar_value(&self) -> Option<&Value> {
        match &self.value {
            InstanceValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&TypedInstance> {
        match &self.value {
            InstanceValue::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn members(&self) -> Option<&[TypedInstance]> {
        match &self.value {
            InstanceValue::Collection(members) => Some(members),
            _ => None,
        }
    }

    /// Navigates a dotted attribute path such as `amount.currency`.
    pub fn path(&self, path: &str) -> Option<&TypedInstance> {
        path.split('.')
            .filter(|s| !s.is_empty())
            .try_fold(self, |current, segment| current.field(segment))
    }

    /// Navigates pre-split path segments.
    pub fn path_segments(&self, segments: &[String]) -> Option<&TypedInstance> {
        segments
            .iter()
            .try_fold(self, |current, segment| current.field(segment))
    }

    /// Compares type and content, ignoring provenance.
    #[must_use]
    pub fn same_value(&self, other: &Self) -> bool {
        if self.type_name != other.type_name {
            return false;
        }
        match (&self.value, &other.value) {
            (InstanceValue::Scalar(a), InstanceValue::Scalar(b)) => a.loosely_equals(b),
            (InstanceValue::Null { .. }, InstanceValue::Null { .. }) => true,
            (InstanceValue::Object(a), InstanceValue::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|o| v.same_value(o)))
            }
            (InstanceValue::Collection(a), InstanceValue::Collection(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_value(y))
            }
            _ => false,
        }
    }

    /// Every non-null instance in this tree assignable to `target`, with its depth.
    ///
    /// The root is depth 0; traversal is depth-first in field order.
    pub fn matching<'a>(
        &'a self,
        target: &QualifiedName,
        schema: &dyn SchemaProvider,
    ) -> Vec<(usize, &'a TypedInstance)> {
        let mut out = Vec::new();
        collect_matching(self, target, schema, 0, &mut out);
        out
    }

    /// The deepest match for `target` that is unambiguous at its depth.
    pub fn deepest_unique<'a>(
        &'a self,
        target: &QualifiedName,
        schema: &dyn SchemaProvider,
    ) -> Option<&'a TypedInstance> {
        let matches = self.matching(target, schema);
        let deepest = matches.iter().map(|(depth, _)| *depth).max()?;
        (0..=deepest).rev().find_map(|depth| {
            let mut at_depth = matches.iter().filter(|(d, _)| *d == depth).map(|(_, i)| *i);
            let first = at_depth.next()?;
            if at_depth.all(|other| other.same_value(first)) {
                Some(first)
            } else {
                None
            }
        })
    }
}

fn collect_matching<'a>(
    instance: &'a TypedInstance,
    target: &QualifiedName,
    schema: &dyn SchemaProvider,
    depth: usize,
    out: &mut Vec<(usize, &'a TypedInstance)>,
) {
    if instance.is_null() {
        return;
    }
    if schema.is_assignable(&instance.type_name, target) {
        out.push((depth, instance));
    }
    match &instance.value {
        InstanceValue::Object(fields) => {
            for child in fields.values() {
                collect_matching(child, target, schema, depth + 1, out);
            }
        }
        InstanceValue::Collection(members) => {
            for child in members {
                collect_matching(child, target, schema, depth + 1, out);
            }
        }
        InstanceValue::Scalar(_) | InstanceValue::Null { .. } => {}
    }
}

impl fmt::Display for TypedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            InstanceValue::Scalar(v) => write!(f, "{}({v})", self.type_name.short_name()),
            InstanceValue::Object(fields) => {
                write!(f, "{}{{{} fields}}", self.type_name.short_name(), fields.len())
            }
            InstanceValue::Collection(members) => write!(f, "{}[{}]", self.type_name, members.len()),
            InstanceValue::Null { reason } => write!(f, "{}(null: {reason})", self.type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, PrimitiveKind, SchemaBuilder, Type};

    fn name(raw: &str) -> QualifiedName {
        QualifiedName::parse(raw).unwrap()
    }

    fn schema() -> crate::schema::InMemorySchema {
        SchemaBuilder::new()
            .add_type(Type::scalar(name("demo.Currency"), PrimitiveKind::String))
            .add_type(Type::scalar(name("demo.MoneyAmount"), PrimitiveKind::Decimal))
            .add_type(Type::object(
                name("demo.Money"),
                vec![
                    Field::new("currency", name("demo.Currency")),
                    Field::new("value", name("demo.MoneyAmount")),
                ],
            ))
            .add_type(Type::object(
                name("demo.Transfer"),
                vec![
                    Field::new("debit", name("demo.Money")),
                    Field::new("credit", name("demo.Money")),
                ],
            ))
            .build()
            .unwrap()
    }

    fn money(currency: &str, value: f64) -> TypedInstance {
        TypedInstance::object(
            name("demo.Money"),
            [
                (
                    "currency".to_string(),
                    TypedInstance::scalar(name("demo.Currency"), currency, DataSource::Provided),
                ),
                (
                    "value".to_string(),
                    TypedInstance::scalar(name("demo.MoneyAmount"), value, DataSource::Provided),
                ),
            ],
            DataSource::Provided,
        )
    }

    #[test]
    fn path_navigation() {
        let m = money("AUD", 20.55);
        assert_eq!(m.path("currency").unwrap().scalar_value(), Some(&Value::from("AUD")));
        assert!(m.path("currency.code").is_none());
        assert!(m.path("missing").is_none());
        assert_eq!(m.path("").unwrap().type_name, name("demo.Money"));
    }

    #[test]
    fn scalar_null_becomes_typed_null() {
        let v = TypedInstance::scalar(name("demo.Currency"), Value::Null, DataSource::Provided);
        assert!(v.is_null());
        assert_eq!(v.type_name, name("demo.Currency"));
    }

    #[test]
    fn same_value_ignores_source() {
        let a = money("GBP", 10.0);
        let b = money("GBP", 10.0).with_source(DataSource::derived("test"));
        assert!(a.same_value(&b));
        assert!(!a.same_value(&money("GBP", 11.0)));
    }

    #[test]
    fn deepest_unique_prefers_unambiguous_depth() {
        let schema = schema();
        let transfer = TypedInstance::object(
            name("demo.Transfer"),
            [
                ("debit".to_string(), money("AUD", 1.0)),
                ("credit".to_string(), money("GBP", 2.0)),
            ],
            DataSource::Provided,
        );
        // Two different Money values at depth 1: ambiguous.
        assert!(transfer.deepest_unique(&name("demo.Money"), &schema).is_none());
        assert_eq!(transfer.matching(&name("demo.Currency"), &schema).len(), 2);

        let single = money("GBP", 2.0);
        let found = single.deepest_unique(&name("demo.Currency"), &schema).unwrap();
        assert_eq!(found.scalar_value(), Some(&Value::from("GBP")));
    }

    #[test]
    fn nulls_are_never_matched() {
        let schema = schema();
        let null = TypedInstance::null(name("demo.Money"), "filtered");
        assert!(null.matching(&name("demo.Money"), &schema).is_empty());
        assert_eq!(null.null_reason(), Some("filtered"));
    }

    #[test]
    fn collection_type_name() {
        let c = TypedInstance::collection(name("demo.Money"), vec![money("GBP", 1.0)], DataSource::Provided);
        assert!(c.type_name.is_collection());
        assert_eq!(c.members().unwrap().len(), 1);
        assert_eq!(format!("{c}"), "demo.Money[][1]");
    }
}
