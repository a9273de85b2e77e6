//! Policy statement conditions.
//!
//! Conditions compare facts about the caller with facts about the value
//! being evaluated (`caller.DeskId = this.ClientDeskId`). A condition never
//! fails: unresolvable operands evaluate as null.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::QueryContext;
use crate::facts::{Discovery, FactMatch};
use crate::instance::{InstanceValue, TypedInstance};
use crate::pattern::cached_regex;
use crate::schema::QualifiedName;
use crate::value::Value;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    /// A value of `type_name` among the caller facts.
    Caller { type_name: QualifiedName },
    /// A value of `type_name` within the instance under evaluation.
    Subject { type_name: QualifiedName },
    Literal { value: Value },
    LiteralList { values: Vec<Value> },
    Null,
}

impl Operand {
    #[must_use]
    pub const fn caller(type_name: QualifiedName) -> Self {
        Self::Caller { type_name }
    }

    #[must_use]
    pub const fn subject(type_name: QualifiedName) -> Self {
        Self::Subject { type_name }
    }

    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal { value: value.into() }
    }

    #[must_use]
    pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::LiteralList {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    In,
    NotIn,
    /// Left side matches the regular expression on the right.
    Matches,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Always,
    Compare {
        lhs: Operand,
        operator: ComparisonOperator,
        rhs: Operand,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Resolved {
    One(Value),
    Many(Vec<Value>),
}

impl Resolved {
    fn as_slice(&self) -> &[Value] {
        match self {
            Self::One(v) => std::slice::from_ref(v),
            Self::Many(values) => values,
        }
    }
}

impl Condition {
    #[must_use]
    pub const fn compare(lhs: Operand, operator: ComparisonOperator, rhs: Operand) -> Self {
        Self::Compare { lhs, operator, rhs }
    }

    /// Evaluates the condition for `subject` in `ctx`.
    #[must_use]
    pub fn matches(&self, subject: &TypedInstance, ctx: &QueryContext) -> bool {
        let Self::Compare { lhs, operator, rhs } = self else {
            return true;
        };
        let left = resolve(lhs, subject, ctx);
        let right = resolve(rhs, subject, ctx);
        match operator {
            ComparisonOperator::Equal => equal(&left, &right),
            ComparisonOperator::NotEqual => !equal(&left, &right),
            ComparisonOperator::In => contained(&left, &right),
            ComparisonOperator::NotIn => !contained(&left, &right),
            ComparisonOperator::Matches => regex_match(&left, &right),
        }
    }
}

fn values_of(instance: &TypedInstance) -> Resolved {
    match &instance.value {
        InstanceValue::Scalar(v) => Resolved::One(v.clone()),
        InstanceValue::Collection(members) => {
            Resolved::Many(members.iter().filter_map(|m| m.scalar_value().cloned()).collect())
        }
        InstanceValue::Object(_) | InstanceValue::Null { .. } => Resolved::One(Value::Null),
    }
}

fn resolve(operand: &Operand, subject: &TypedInstance, ctx: &QueryContext) -> Resolved {
    let schema = ctx.schema();
    match operand {
        Operand::Literal { value } => Resolved::One(value.clone()),
        Operand::LiteralList { values } => Resolved::Many(values.clone()),
        Operand::Null => Resolved::One(Value::Null),
        Operand::Subject { type_name } => subject
            .deepest_unique(type_name, schema)
            .map_or(Resolved::One(Value::Null), values_of),
        Operand::Caller { type_name } => {
            match ctx.caller_facts().find(type_name, Discovery::AllAtAnyDepth, schema) {
                Ok(FactMatch::All(found)) => {
                    let mut values: Vec<Value> = Vec::new();
                    for fact in &found {
                        match values_of(fact) {
                            Resolved::One(v) => values.push(v),
                            Resolved::Many(vs) => values.extend(vs),
                        }
                    }
                    values.retain(|v| !v.is_null());
                    if values.len() == 1 {
                        Resolved::One(values.remove(0))
                    } else if values.is_empty() {
                        Resolved::One(Value::Null)
                    } else {
                        Resolved::Many(values)
                    }
                }
                Ok(_) => Resolved::One(Value::Null),
                Err(e) => {
                    warn!(error = %e, "caller facts unavailable for policy condition");
                    Resolved::One(Value::Null)
                }
            }
        }
    }
}

fn equal(left: &Resolved, right: &Resolved) -> bool {
    match (left, right) {
        (Resolved::One(a), Resolved::One(b)) => a.loosely_equals(b),
        (Resolved::Many(a), Resolved::Many(b)) => {
            a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.loosely_equals(y)))
        }
        _ => false,
    }
}

fn contained(left: &Resolved, right: &Resolved) -> bool {
    let haystack = right.as_slice();
    left.as_slice()
        .iter()
        .filter(|v| !v.is_null())
        .any(|needle| haystack.iter().any(|h| h.loosely_equals(needle)))
}

fn regex_match(left: &Resolved, right: &Resolved) -> bool {
    let (Resolved::One(Value::String(text)), Resolved::One(Value::String(pattern))) = (left, right) else {
        return false;
    };
    match cached_regex(pattern) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            warn!(%pattern, error = %e, "policy pattern does not compile, treating as no match");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::facts::FactBag;
    use crate::instance::DataSource;
    use crate::schema::{Field, PrimitiveKind, SchemaBuilder, Type};

    fn name(raw: &str) -> QualifiedName {
        QualifiedName::parse(raw).unwrap()
    }

    fn ctx(caller: Vec<TypedInstance>) -> QueryContext {
        let schema = SchemaBuilder::new()
            .add_type(Type::scalar(name("demo.DeskId"), PrimitiveKind::String))
            .add_type(Type::scalar(name("demo.Group"), PrimitiveKind::String))
            .add_type(Type::object(
                name("demo.Trade"),
                vec![Field::new("deskId", name("demo.DeskId"))],
            ))
            .build()
            .unwrap();
        QueryContext::new(Arc::new(schema)).with_caller_facts(FactBag::from_facts(caller).unwrap())
    }

    fn desk(id: &str) -> TypedInstance {
        TypedInstance::scalar(name("demo.DeskId"), id, DataSource::Provided)
    }

    fn group(g: &str) -> TypedInstance {
        TypedInstance::scalar(name("demo.Group"), g, DataSource::Provided)
    }

    fn trade(desk_id: &str) -> TypedInstance {
        TypedInstance::object(name("demo.Trade"), [("deskId".to_string(), desk(desk_id))], DataSource::Provided)
    }

    fn caller_desk_is_subject_desk() -> Condition {
        Condition::compare(
            Operand::caller(name("demo.DeskId")),
            ComparisonOperator::Equal,
            Operand::subject(name("demo.DeskId")),
        )
    }

    #[test]
    fn caller_equals_subject() {
        let ctx = ctx(vec![desk("desk-1")]);
        assert!(caller_desk_is_subject_desk().matches(&trade("desk-1"), &ctx));
        assert!(!caller_desk_is_subject_desk().matches(&trade("desk-2"), &ctx));
    }

    #[test]
    fn missing_caller_fact_is_null() {
        let ctx = ctx(vec![]);
        assert!(!caller_desk_is_subject_desk().matches(&trade("desk-1"), &ctx));
        let is_null = Condition::compare(
            Operand::caller(name("demo.DeskId")),
            ComparisonOperator::Equal,
            Operand::Null,
        );
        assert!(is_null.matches(&trade("desk-1"), &ctx));
    }

    #[test]
    fn any_caller_group_in_list() {
        let ctx = ctx(vec![group("TRADER"), group("ADMIN")]);
        let admin = Condition::compare(
            Operand::caller(name("demo.Group")),
            ComparisonOperator::In,
            Operand::list(["ADMIN", "COMPLIANCE"]),
        );
        assert!(admin.matches(&trade("desk-1"), &ctx));

        let not_ops = Condition::compare(
            Operand::caller(name("demo.Group")),
            ComparisonOperator::NotIn,
            Operand::list(["OPS"]),
        );
        assert!(not_ops.matches(&trade("desk-1"), &ctx));
    }

    #[test]
    fn matches_operator_and_bad_pattern() {
        let ctx = ctx(vec![desk("desk-12")]);
        let matches = Condition::compare(
            Operand::caller(name("demo.DeskId")),
            ComparisonOperator::Matches,
            Operand::literal(r"^desk-\d+$"),
        );
        assert!(matches.matches(&trade("x"), &ctx));

        let broken = Condition::compare(
            Operand::caller(name("demo.DeskId")),
            ComparisonOperator::Matches,
            Operand::literal("(unclosed"),
        );
        assert!(!broken.matches(&trade("x"), &ctx));
    }

    #[test]
    fn always_matches() {
        assert!(Condition::Always.matches(&trade("x"), &ctx(vec![])));
    }
}
