//! Scalar values carried by typed instances.
//!
//! Every leaf of a [`TypedInstance`](crate::TypedInstance) holds a [`Value`].
//! Objects and collections are modelled one level up, in the instance tree.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A scalar value.
///
/// # Examples
///
/// ```
/// use fedql::Value;
///
/// let amount = Value::Float(20.55);
/// let currency = Value::String("AUD".to_string());
///
/// assert!(amount.is_numeric());
/// assert_eq!(currency.as_string(), Some("AUD"));
/// assert!(Value::Int(10).loosely_equals(&Value::Float(10.0)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    #[default]
    Null,
}

impl Value {
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Compares two values, treating integers and floats as the same number.
    ///
    /// Policy conditions and constraints compare values that arrive from
    /// different services, so `10` and `10.0` must be considered equal.
    #[must_use]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(a), Some(b)) => (a - b).abs() < 1e-9,
                    _ => false,
                }
            }
            _ => self == other,
        }
    }

    /// Renders the value the way a remote service would receive it.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(v) => serde_json::Value::String(v.clone()),
            Self::Date(v) => serde_json::Value::String(v.format("%Y-%m-%d").to_string()),
            Self::Null => serde_json::Value::Null,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Null => "null",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_reads_as_float() {
        let val = Value::Int(42);
        assert!(val.is_numeric());
        assert_eq!(val.as_int(), Some(42));
        assert_eq!(val.as_float(), Some(42.0));
        assert_eq!(val.type_name(), "int");
    }

    #[test]
    fn loose_equality_spans_numeric_kinds() {
        assert!(Value::Int(10).loosely_equals(&Value::Float(10.0)));
        assert!(Value::Float(20.55).loosely_equals(&Value::Float(20.55)));
        assert!(!Value::Int(10).loosely_equals(&Value::String("10".into())));
        assert!(Value::Null.loosely_equals(&Value::Null));
        assert!(!Value::String("GBP".into()).loosely_equals(&Value::String("AUD".into())));
    }

    #[test]
    fn date_renders_iso() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let val = Value::Date(date);
        assert_eq!(format!("{val}"), "2024-03-01");
        assert_eq!(val.to_json(), serde_json::json!("2024-03-01"));
        assert_eq!(val.as_date(), Some(date));
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::Int(42)), "42");
        assert_eq!(format!("{}", Value::String("hi".into())), "\"hi\"");
        assert_eq!(format!("{}", Value::Null), "null");
    }

    #[test]
    fn to_json_scalars() {
        assert_eq!(Value::Float(10.0).to_json(), serde_json::json!(10.0));
        assert_eq!(Value::String("GBP".into()).to_json(), serde_json::json!("GBP"));
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn serialization_round_trip() {
        let val = Value::String("test".into());
        let json = serde_json::to_string(&val).unwrap();
        let deserialized: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(val, deserialized);
    }

    #[test]
    fn type_mismatch_accessors() {
        let val = Value::Bool(true);
        assert!(val.as_int().is_none());
        assert!(val.as_float().is_none());
        assert!(val.as_string().is_none());
        assert!(val.as_date().is_none());
    }
}
