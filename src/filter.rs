//! Filter expressions over document fields, evaluated after any index narrowing.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datatype::compare_values;
use crate::document::Document;

/// Predicate applied to documents after index narrowing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

/// Starts a comparison on a document field.
pub fn field(name: impl Into<String>) -> Field {
    Field(name.into())
}

pub struct Field(String);

impl Field {
    pub fn eq(self, value: impl Into<Value>) -> Filter {
        Filter::Eq(self.0, value.into())
    }
    pub fn neq(self, value: impl Into<Value>) -> Filter {
        Filter::Neq(self.0, value.into())
    }
    pub fn lt(self, value: impl Into<Value>) -> Filter {
        Filter::Lt(self.0, value.into())
    }
    pub fn lte(self, value: impl Into<Value>) -> Filter {
        Filter::Lte(self.0, value.into())
    }
    pub fn gt(self, value: impl Into<Value>) -> Filter {
        Filter::Gt(self.0, value.into())
    }
    pub fn gte(self, value: impl Into<Value>) -> Filter {
        Filter::Gte(self.0, value.into())
    }
}

impl Filter {
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut all) => {
                all.push(other);
                Filter::And(all)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut any) => {
                any.push(other);
                Filter::Or(any)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(name, v) => compare(doc, name, v) == Ordering::Equal,
            Filter::Neq(name, v) => compare(doc, name, v) != Ordering::Equal,
            Filter::Lt(name, v) => compare(doc, name, v) == Ordering::Less,
            Filter::Lte(name, v) => compare(doc, name, v) != Ordering::Greater,
            Filter::Gt(name, v) => compare(doc, name, v) == Ordering::Greater,
            Filter::Gte(name, v) => compare(doc, name, v) != Ordering::Less,
            Filter::And(all) => all.iter().all(|f| f.matches(doc)),
            Filter::Or(any) => any.iter().any(|f| f.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
        }
    }
}

fn compare(doc: &Document, name: &str, value: &Value) -> Ordering {
    compare_values(&doc.field(name), value)
}
