//! Qualified type names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FedError, ValidationError};
use crate::pattern::cached_regex;

const ARRAY_NAMESPACE: &str = "lang.taxi";
const ARRAY_NAME: &str = "Array";
const SEGMENT_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// A fully qualified type name, optionally parameterised.
///
/// Collections are represented as `lang.taxi.Array<Member>` and may be
/// written with the `Member[]` shorthand.
///
/// # Examples
///
/// ```
/// use fedql::QualifiedName;
///
/// let money: QualifiedName = "vyne.creditInc.Money".parse().unwrap();
/// assert_eq!(money.namespace(), "vyne.creditInc");
/// assert_eq!(money.short_name(), "Money");
///
/// let many: QualifiedName = "vyne.creditInc.Money[]".parse().unwrap();
/// assert!(many.is_collection());
/// assert_eq!(many.member_type(), Some(&money));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    namespace: String,
    name: String,
    parameters: Vec<QualifiedName>,
}

impl QualifiedName {
    /// Creates a name without validating its segments.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    /// Creates the collection type whose members are `member`.
    #[must_use]
    pub fn collection_of(member: Self) -> Self {
        Self {
            namespace: ARRAY_NAMESPACE.to_string(),
            name: ARRAY_NAME.to_string(),
            parameters: vec![member],
        }
    }

    /// Parses and validates a dotted name such as `isic.uk.SIC2008`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQualifiedName` if a segment is empty or not an identifier.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if let Some(member) = trimmed.strip_suffix("[]") {
            return Ok(Self::collection_of(Self::parse(member)?));
        }
        if let Some(open) = trimmed.find('<') {
            let Some(inner) = trimmed[open + 1..].strip_suffix('>') else {
                return Err(invalid(raw, "unbalanced type parameters"));
            };
            let mut base = Self::parse(&trimmed[..open])?;
            base.parameters = split_parameters(inner)
                .into_iter()
                .map(Self::parse)
                .collect::<Result<_, _>>()?;
            return Ok(base);
        }

        let segment = cached_regex(SEGMENT_PATTERN).map_err(|e| match e {
            FedError::Validation(v) => v,
            other => invalid(raw, &other.to_string()),
        })?;
        let mut segments: Vec<&str> = trimmed.split('.').collect();
        let name = segments.pop().unwrap_or_default();
        for part in segments.iter().chain(std::iter::once(&name)) {
            if !segment.is_match(part) {
                return Err(invalid(raw, &format!("'{part}' is not a valid identifier")));
            }
        }
        Ok(Self::new(segments.join("."), name))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn short_name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[QualifiedName] {
        &self.parameters
    }

    /// Returns true if this names a collection type.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.namespace == ARRAY_NAMESPACE && self.name == ARRAY_NAME && self.parameters.len() == 1
    }

    /// Returns the member type of a collection name.
    #[must_use]
    pub fn member_type(&self) -> Option<&QualifiedName> {
        if self.is_collection() {
            self.parameters.first()
        } else {
            None
        }
    }

    /// The type policies and lookups are keyed on: the member type for collections.
    #[must_use]
    pub fn nominal(&self) -> &QualifiedName {
        self.member_type().unwrap_or(self)
    }

    /// Dotted form without type parameters.
    #[must_use]
    pub fn fully_qualified(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

fn invalid(raw: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidQualifiedName {
        name: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn split_parameters(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(inner[start..].trim());
    parts
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(member) = self.member_type() {
            return write!(f, "{member}[]");
        }
        write!(f, "{}", self.fully_qualified())?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self.parameters.iter().map(ToString::to_string).collect();
            write!(f, "<{}>", params.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for QualifiedName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_name() {
        let name = QualifiedName::parse("isic.uk.SIC2008").unwrap();
        assert_eq!(name.namespace(), "isic.uk");
        assert_eq!(name.short_name(), "SIC2008");
        assert_eq!(name.to_string(), "isic.uk.SIC2008");
        assert!(!name.is_collection());
    }

    #[test]
    fn array_shorthand_and_generic_are_equal() {
        let short = QualifiedName::parse("demo.Order[]").unwrap();
        let long = QualifiedName::parse("lang.taxi.Array<demo.Order>").unwrap();
        assert_eq!(short, long);
        assert_eq!(short.to_string(), "demo.Order[]");
        assert_eq!(short.nominal(), &QualifiedName::new("demo", "Order"));
    }

    #[test]
    fn rejects_invalid_segments() {
        assert!(QualifiedName::parse("demo..Order").is_err());
        assert!(QualifiedName::parse("demo.1Order").is_err());
        assert!(QualifiedName::parse("").is_err());
        assert!(QualifiedName::parse("lang.taxi.Array<demo.Order").is_err());
    }

    #[test]
    fn unqualified_name_has_empty_namespace() {
        let name = QualifiedName::parse("Money").unwrap();
        assert_eq!(name.namespace(), "");
        assert_eq!(name.fully_qualified(), "Money");
    }

    #[test]
    fn serializes_as_string() {
        let name = QualifiedName::parse("demo.Order[]").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"demo.Order[]\"");
        let back: QualifiedName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
