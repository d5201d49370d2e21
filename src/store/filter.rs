//! Field-level document filters.
//!
//! A filter is a tree of field predicates joined with AND / OR, built with
//! [`field`] and [`Filter::and`] / [`Filter::or`]:
//!
//! ```
//! use patient_migrator::store::filter::field;
//!
//! let seniors = field("Age").gte(88);
//! let alice = field("Name").eq("Alice Brown");
//! let either = seniors.or(alice);
//! ```

use super::Document;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field { field: String, predicate: Predicate },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// Matches every document
    All,
}

impl Filter {
    #[must_use]
    pub const fn all() -> Self {
        Self::All
    }

    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::All, other) | (other, Self::All) => other,
            (Self::And(mut lhs), Self::And(rhs)) => {
                lhs.extend(rhs);
                Self::And(lhs)
            }
            (Self::And(mut lhs), rhs) => {
                lhs.push(rhs);
                Self::And(lhs)
            }
            (lhs, rhs) => Self::And(vec![lhs, rhs]),
        }
    }

    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Or(mut lhs), Self::Or(rhs)) => {
                lhs.extend(rhs);
                Self::Or(lhs)
            }
            (Self::Or(mut lhs), rhs) => {
                lhs.push(rhs);
                Self::Or(lhs)
            }
            (lhs, rhs) => Self::Or(vec![lhs, rhs]),
        }
    }

    /// An empty AND matches everything, an empty OR matches nothing
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::And(filters) => filters.iter().all(|f| f.matches(document)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(document)),
            Self::Field { field, predicate } => predicate.matches(document.get(field)),
        }
    }
}

impl Predicate {
    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Predicate::Exists(expected) => actual.is_some() == *expected,
            // A missing field equals null
            Predicate::Eq(Value::Null) => actual.map_or(true, Value::is_null),
            Predicate::Eq(expected) => actual.is_some_and(|a| compare(a, expected) == Some(Ordering::Equal)),
            Predicate::Gt(bound) => ordering(actual, bound).is_some_and(|o| o == Ordering::Greater),
            Predicate::Gte(bound) => ordering(actual, bound).is_some_and(|o| o != Ordering::Less),
            Predicate::Lt(bound) => ordering(actual, bound).is_some_and(|o| o == Ordering::Less),
            Predicate::Lte(bound) => ordering(actual, bound).is_some_and(|o| o != Ordering::Greater),
        }
    }
}

fn ordering(actual: Option<&Value>, bound: &Value) -> Option<Ordering> {
    actual.and_then(|a| compare(a, bound))
}

/// Numbers compare numerically and strings lexicographically; other pairs
/// only compare when they are equal
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (x, y) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

#[must_use]
pub fn field(name: &str) -> FieldBuilder {
    FieldBuilder {
        name: name.to_string(),
    }
}

pub struct FieldBuilder {
    name: String,
}

impl FieldBuilder {
    fn build(self, predicate: Predicate) -> Filter {
        Filter::Field {
            field: self.name,
            predicate,
        }
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.build(Predicate::Eq(value.into()))
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.build(Predicate::Gt(value.into()))
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.build(Predicate::Gte(value.into()))
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.build(Predicate::Lt(value.into()))
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.build(Predicate::Lte(value.into()))
    }

    #[must_use]
    pub fn exists(self, present: bool) -> Filter {
        self.build(Predicate::Exists(present))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, filters: &[Filter], op: &str| -> fmt::Result {
            f.write_str("(")?;
            for (i, filter) in filters.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", op)?;
                }
                write!(f, "{}", filter)?;
            }
            f.write_str(")")
        };

        match self {
            Self::All => f.write_str("*"),
            Self::And(filters) => join(f, filters, "AND"),
            Self::Or(filters) => join(f, filters, "OR"),
            Self::Field { field, predicate } => match predicate {
                Predicate::Eq(v) => write!(f, "{} = {}", field, v),
                Predicate::Gt(v) => write!(f, "{} > {}", field, v),
                Predicate::Gte(v) => write!(f, "{} >= {}", field, v),
                Predicate::Lt(v) => write!(f, "{} < {}", field, v),
                Predicate::Lte(v) => write!(f, "{} <= {}", field, v),
                Predicate::Exists(true) => write!(f, "{} exists", field),
                Predicate::Exists(false) => write!(f, "{} missing", field),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_numeric_comparisons_ignore_int_float_split() {
        let d = doc(json!({ "Age": 88, "Billing Amount": 12000.0 }));
        assert!(field("Age").gte(88).matches(&d));
        assert!(field("Age").gte(87.5).matches(&d));
        assert!(!field("Age").gt(88).matches(&d));
        assert!(field("Billing Amount").eq(12000).matches(&d));
        assert!(field("Billing Amount").lte(12000).matches(&d));
        assert!(!field("Billing Amount").lt(0).matches(&d));
    }

    #[test]
    fn test_iso_dates_compare_as_strings() {
        let d = doc(json!({ "Discharge Date": "2024-03-05" }));
        assert!(field("Discharge Date").gte("2024-03-01").matches(&d));
        assert!(field("Discharge Date").lte("2024-03-05").matches(&d));
        assert!(!field("Discharge Date").gte("2024-04-01").matches(&d));
    }

    #[test]
    fn test_mixed_kinds_never_order() {
        let d = doc(json!({ "Age": "unknown" }));
        assert!(!field("Age").gte(0).matches(&d));
        assert!(!field("Age").lt(0).matches(&d));
        assert!(!field("Missing").gte(0).matches(&d));
    }

    #[test]
    fn test_exists_and_null_equality() {
        let d = doc(json!({ "Name": "Alice", "Medication": null }));
        assert!(field("Name").exists(true).matches(&d));
        assert!(field("Age").exists(false).matches(&d));
        assert!(field("Medication").exists(true).matches(&d));
        assert!(field("Medication").eq(Value::Null).matches(&d));
        assert!(field("Age").eq(Value::Null).matches(&d));
        assert!(!field("Name").eq(Value::Null).matches(&d));
    }

    #[test]
    fn test_and_or_combinators() {
        let d = doc(json!({ "Name": "Alice Brown", "Age": 25 }));
        let both = field("Name").eq("Alice Brown").and(field("Age").lt(30));
        let neither = field("Name").eq("Bob").or(field("Age").gt(30));
        assert!(both.matches(&d));
        assert!(!neither.matches(&d));
        assert!(neither.clone().or(Filter::all()).matches(&d));
        assert!(!Filter::Or(vec![]).matches(&d));
        assert!(Filter::And(vec![]).matches(&d));
    }

    #[test]
    fn test_and_flattens_and_drops_all() {
        let f = Filter::all()
            .and(field("A").eq(1))
            .and(field("B").eq(2))
            .and(field("C").eq(3));
        match &f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected AND, got {other}"),
        }
        assert_eq!(f.to_string(), "(A = 1 AND B = 2 AND C = 3)");
    }
}
