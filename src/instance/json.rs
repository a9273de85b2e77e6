//! Conversion between JSON payloads and typed instances.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::instance::{DataSource, InstanceValue, TypedInstance};
use crate::schema::{PrimitiveKind, QualifiedName, SchemaProvider, TypeKind};
use crate::value::Value;

impl TypedInstance {
    /// Parses a JSON payload as an instance of `type_name`.
    ///
    /// Object fields are typed from the schema; fields absent from the
    /// payload become typed nulls. Unknown payload keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `UndefinedType` for types the schema does not declare and
    /// `TypeMismatch` when the payload shape does not fit the type.
    pub fn from_json(
        schema: &dyn SchemaProvider,
        type_name: &QualifiedName,
        json: &serde_json::Value,
        source: DataSource,
    ) -> Result<Self, ValidationError> {
        if json.is_null() {
            return Ok(Self::null_with_source(type_name.clone(), "null in payload", source));
        }

        if let Some(member) = type_name.member_type() {
            let serde_json::Value::Array(items) = json else {
                return Err(mismatch(type_name, "expected an array"));
            };
            let members = items
                .iter()
                .map(|item| Self::from_json(schema, member, item, source.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::collection(member.clone(), members, source));
        }

        let def = schema.type_def(type_name).ok_or_else(|| ValidationError::UndefinedType {
            name: type_name.to_string(),
            referenced_by: "payload".to_string(),
        })?;

        match &def.kind {
            TypeKind::Scalar { primitive } => {
                let value = parse_scalar(*primitive, json).ok_or_else(|| {
                    mismatch(type_name, &format!("cannot read {json} as {primitive:?}"))
                })?;
                Ok(Self::scalar(type_name.clone(), value, source))
            }
            TypeKind::Object { fields } => {
                let serde_json::Value::Object(map) = json else {
                    return Err(mismatch(type_name, "expected an object"));
                };
                let mut built = Vec::with_capacity(fields.len());
                for field in fields {
                    let value = match map.get(&field.name) {
                        Some(raw) => Self::from_json(schema, &field.type_name, raw, source.clone())?,
                        None => Self::null_with_source(
                            field.type_name.clone(),
                            format!("field '{}' absent from payload", field.name),
                            source.clone(),
                        ),
                    };
                    built.push((field.name.clone(), value));
                }
                Ok(Self::object(type_name.clone(), built, source))
            }
        }
    }

    /// Renders the instance as plain JSON, dropping types and provenance.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match &self.value {
            InstanceValue::Scalar(v) => v.to_json(),
            InstanceValue::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            InstanceValue::Collection(members) => {
                serde_json::Value::Array(members.iter().map(Self::to_json).collect())
            }
            InstanceValue::Null { .. } => serde_json::Value::Null,
        }
    }
}

fn mismatch(type_name: &QualifiedName, reason: &str) -> ValidationError {
    ValidationError::TypeMismatch {
        type_name: type_name.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_scalar(primitive: PrimitiveKind, json: &serde_json::Value) -> Option<Value> {
    use serde_json::Value as Json;

    match (primitive, json) {
        (PrimitiveKind::Boolean, Json::Bool(b)) => Some(Value::Bool(*b)),
        (PrimitiveKind::Boolean, Json::String(s)) => s.parse().ok().map(Value::Bool),
        (PrimitiveKind::Int, Json::Number(n)) => n.as_i64().map(Value::Int),
        (PrimitiveKind::Int, Json::String(s)) => s.trim().parse().ok().map(Value::Int),
        (PrimitiveKind::Decimal, Json::Number(n)) => n.as_f64().map(Value::Float),
        (PrimitiveKind::Decimal, Json::String(s)) => s.trim().parse().ok().map(Value::Float),
        (PrimitiveKind::String, Json::String(s)) => Some(Value::String(s.clone())),
        (PrimitiveKind::String, Json::Number(n)) => Some(Value::String(n.to_string())),
        (PrimitiveKind::Date, Json::String(s)) => {
            NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d")
                .ok()
                .map(Value::Date)
        }
        (PrimitiveKind::Any, Json::Bool(b)) => Some(Value::Bool(*b)),
        (PrimitiveKind::Any, Json::Number(n)) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        (PrimitiveKind::Any, Json::String(s)) => Some(Value::String(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, InMemorySchema, SchemaBuilder, Type};
    use serde_json::json;

    fn name(raw: &str) -> QualifiedName {
        QualifiedName::parse(raw).unwrap()
    }

    fn schema() -> InMemorySchema {
        SchemaBuilder::new()
            .add_type(Type::scalar(name("demo.Currency"), PrimitiveKind::String))
            .add_type(Type::scalar(name("demo.MoneyAmount"), PrimitiveKind::Decimal))
            .add_type(Type::scalar(name("demo.SettlementDate"), PrimitiveKind::Date))
            .add_type(Type::object(
                name("demo.Money"),
                vec![
                    Field::new("currency", name("demo.Currency")),
                    Field::new("value", name("demo.MoneyAmount")),
                ],
            ))
            .add_type(Type::object(
                name("demo.Invoice"),
                vec![
                    Field::new("settlementDate", name("demo.SettlementDate")),
                    Field::new("amount", name("demo.Money")),
                ],
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn parses_nested_object_with_string_decimals() {
        let schema = schema();
        let payload = json!({
            "settlementDate": "2018-05-01",
            "amount": { "currency": "AUD", "value": "20.55" }
        });
        let invoice =
            TypedInstance::from_json(&schema, &name("demo.Invoice"), &payload, DataSource::Provided).unwrap();

        let amount = invoice.path("amount.value").unwrap();
        assert_eq!(amount.type_name, name("demo.MoneyAmount"));
        assert_eq!(amount.scalar_value(), Some(&Value::Float(20.55)));
        assert_eq!(
            invoice.path("settlementDate").unwrap().scalar_value(),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2018, 5, 1).unwrap()))
        );
    }

    #[test]
    fn absent_field_is_typed_null() {
        let schema = schema();
        let money = TypedInstance::from_json(
            &schema,
            &name("demo.Money"),
            &json!({ "currency": "GBP" }),
            DataSource::Provided,
        )
        .unwrap();
        let value = money.field("value").unwrap();
        assert!(value.is_null());
        assert_eq!(value.type_name, name("demo.MoneyAmount"));
    }

    #[test]
    fn arrays_become_collections() {
        let schema = schema();
        let many = TypedInstance::from_json(
            &schema,
            &name("demo.Currency[]"),
            &json!(["GBP", "AUD"]),
            DataSource::Provided,
        )
        .unwrap();
        assert_eq!(many.members().unwrap().len(), 2);
        assert_eq!(many.to_json(), json!(["GBP", "AUD"]));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let schema = schema();
        let err = TypedInstance::from_json(&schema, &name("demo.Money"), &json!("GBP"), DataSource::Provided)
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));

        let err = TypedInstance::from_json(&schema, &name("demo.Unknown"), &json!(1), DataSource::Provided)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UndefinedType { .. }));
    }

    #[test]
    fn to_json_drops_provenance() {
        let schema = schema();
        let payload = json!({ "currency": "GBP", "value": 10.0 });
        let money =
            TypedInstance::from_json(&schema, &name("demo.Money"), &payload, DataSource::Provided).unwrap();
        assert_eq!(money.to_json(), payload);
    }
}
